// SPDX-License-Identifier: PMPL-1.0-or-later

//! Evidence arbiter port.
//!
//! An arbiter reads a conflict plus its source documents and names the edge
//! that is correct. The engine never trusts arbiter output blindly: transport
//! failures and malformed verdicts are converted into degraded decisions.

mod http;
mod latest;
mod scripted;

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use nexus_conflict::Conflict;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decision::ArbiterDecision;

pub use http::{ArbiterConfig, HttpArbiter};
pub use latest::LatestEvidenceArbiter;
pub use scripted::ScriptedArbiter;

pub(crate) const SYSTEM_PROMPT: &str = "You are an expert fact-checker and knowledge graph curator.";

/// Arbiter call failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArbiterError {
    #[error("Arbiter timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Arbiter returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed arbiter response: {0}")]
    Malformed(String),

    #[error("No scripted response left")]
    Exhausted,
}

/// Input to an arbiter call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrationRequest {
    pub conflict: Conflict,
    /// One document per conflicting edge, in snapshot order.
    pub source_documents: Vec<String>,
}

impl ArbitrationRequest {
    pub fn new(conflict: Conflict, source_documents: Vec<String>) -> Self {
        Self {
            conflict,
            source_documents,
        }
    }

    /// Human-readable summary of the conflict and its candidate edges.
    pub fn conflict_context(&self) -> String {
        let c = &self.conflict;
        let mut out = String::new();
        let _ = writeln!(out, "Entity: {} (ID: {})", c.entity_name, c.entity_id);
        let _ = writeln!(out, "Relationship Type: {}", c.relationship_type);
        let _ = writeln!(out, "Severity: {}", c.severity);
        out.push_str("\nConflicting Relationships:\n");

        for (i, snap) in c.conflicting_relationships.iter().enumerate() {
            let properties = serde_json::to_string(&snap.properties).unwrap_or_else(|_| "{}".into());
            let _ = writeln!(out, "\n{}. ID: {}", i + 1, snap.id);
            let _ = writeln!(out, "   Target: {}", snap.target_name);
            let _ = writeln!(out, "   Timestamp: {}", snap.timestamp.to_rfc3339());
            let _ = writeln!(out, "   Confidence: {}", snap.confidence);
            let _ = writeln!(
                out,
                "   Source: {}",
                snap.source_document.as_deref().unwrap_or("Unknown")
            );
            let _ = writeln!(out, "   Properties: {}", properties);
        }
        out
    }

    /// Full user prompt for a language-model arbiter.
    pub fn render_prompt(&self) -> String {
        let mut out = String::from(
            "You are a fact-checking agent analyzing conflicting information in a knowledge graph.\n\n",
        );
        out.push_str("Conflict Details:\n");
        out.push_str(&self.conflict_context());
        out.push_str("\nSource Documents:\n");
        for (i, doc) in self.source_documents.iter().enumerate() {
            let _ = write!(out, "\nDocument {}:\n{}\n", i + 1, doc);
        }
        out.push_str(
            "\nTask:\n\
             1. Analyze the source documents carefully\n\
             2. Determine which relationship is correct and current\n\
             3. Identify which relationships are outdated or incorrect\n\
             4. Provide a confidence score (0.0-1.0) for your decision\n\
             5. Explain your reasoning\n\
             \nRespond in JSON format:\n\
             {\n\
             \x20   \"correct_relationship_id\": \"<id of the correct relationship>\",\n\
             \x20   \"confidence\": <0.0-1.0>,\n\
             \x20   \"outdated_relationship_ids\": [\"<ids of outdated relationships>\"],\n\
             \x20   \"reasoning\": \"<explanation of your decision>\",\n\
             \x20   \"supporting_evidence\": \"<key evidence from documents>\"\n\
             }\n",
        );
        out
    }
}

/// Evidence arbiter capability
#[async_trait]
pub trait Arbiter: Send + Sync {
    /// Arbiter name for logs
    fn name(&self) -> &str;

    /// Judge a conflict
    async fn arbitrate(&self, request: &ArbitrationRequest) -> Result<ArbiterDecision, ArbiterError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, Utc};
    use nexus_conflict::{Conflict, DetectionMethod, Severity};
    use nexus_graph::{EntityId, Relationship, RelationshipId, RelationshipSnapshot};

    pub fn two_edge_conflict() -> Conflict {
        let now = Utc::now();
        let entity = EntityId::new("ent-amit");
        let old = Relationship::new(entity.clone(), EntityId::new("ent-x"), "CEO_OF")
            .with_id(RelationshipId::new("rel-a"))
            .with_source("company_records_2024.pdf")
            .at(now - Duration::days(200));
        let new = Relationship::new(entity.clone(), EntityId::new("ent-y"), "CEO_OF")
            .with_id(RelationshipId::new("rel-b"))
            .with_property("announced", "2025-01-05")
            .at(now - Duration::days(3));

        Conflict {
            conflict_id: Conflict::make_id(DetectionMethod::DuplicateRelationship, &entity, "CEO_OF"),
            entity_id: entity,
            entity_name: "Amit".into(),
            relationship_type: "CEO_OF".into(),
            detection_method: DetectionMethod::DuplicateRelationship,
            conflicting_relationships: vec![
                RelationshipSnapshot::capture(&old, "CompanyX"),
                RelationshipSnapshot::capture(&new, "CompanyY"),
            ],
            detected_at: now,
            severity: Severity::Low,
            description: "Entity 'Amit' has 2 relationships of type 'CEO_OF'".into(),
            resolved: false,
        }
    }
}
