// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fact triples: validated input and ingestion result.

use chrono::{DateTime, Utc};
use nexus_graph::{EntityId, Properties, RelationshipId};
use serde::{Deserialize, Serialize};

use crate::IngestError;

/// A validated `(subject, predicate, object)` triple with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub metadata: Properties,
    pub source_document: Option<String>,
    /// Defaults to the ingestion time when absent.
    pub timestamp: Option<DateTime<Utc>>,
    pub confidence: f64,
}

impl Fact {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            metadata: Properties::new(),
            source_document: None,
            timestamp: None,
            confidence: 1.0,
        }
    }

    pub fn with_metadata(mut self, metadata: Properties) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_source(mut self, source_document: impl Into<String>) -> Self {
        self.source_document = Some(source_document.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Type label for the subject node.
    pub fn subject_type(&self) -> &'static str {
        if self.predicate.ends_with("_OF") {
            "Person"
        } else {
            "Entity"
        }
    }

    /// Type label for the object node.
    pub fn object_type(&self) -> &'static str {
        if self.predicate.starts_with("CEO_") {
            "Organization"
        } else {
            "Entity"
        }
    }
}

/// Loosely-typed fact as it arrives in a batch (for example from JSON).
///
/// Every field is optional so one malformed item can be reported without
/// rejecting the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactInput {
    pub subject: Option<String>,
    pub predicate: Option<String>,
    pub object: Option<String>,
    #[serde(default)]
    pub metadata: Properties,
    pub source_document: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub confidence: Option<f64>,
}

impl FactInput {
    /// Validate required fields.
    pub fn into_fact(self) -> Result<Fact, IngestError> {
        let subject = required(self.subject, "subject")?;
        let predicate = required(self.predicate, "predicate")?;
        let object = required(self.object, "object")?;
        Ok(Fact {
            subject,
            predicate,
            object,
            metadata: self.metadata,
            source_document: self.source_document,
            timestamp: self.timestamp,
            confidence: self.confidence.unwrap_or(1.0),
        })
    }
}

impl From<Fact> for FactInput {
    fn from(fact: Fact) -> Self {
        Self {
            subject: Some(fact.subject),
            predicate: Some(fact.predicate),
            object: Some(fact.object),
            metadata: fact.metadata,
            source_document: fact.source_document,
            timestamp: fact.timestamp,
            confidence: Some(fact.confidence),
        }
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, IngestError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(IngestError::MissingField(field)),
    }
}

/// Identifiers written by one fact ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactIngested {
    pub subject_id: EntityId,
    pub object_id: EntityId,
    pub relationship_id: RelationshipId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_inference() {
        let ceo = Fact::new("Amit", "CEO_OF", "CompanyX");
        assert_eq!(ceo.subject_type(), "Person");
        assert_eq!(ceo.object_type(), "Organization");

        let cto = Fact::new("Sarah", "CTO_OF", "CompanyX");
        assert_eq!(cto.subject_type(), "Person");
        assert_eq!(cto.object_type(), "Entity");

        let hq = Fact::new("CompanyX", "HEADQUARTERED_IN", "San Francisco");
        assert_eq!(hq.subject_type(), "Entity");
        assert_eq!(hq.object_type(), "Entity");
    }

    #[test]
    fn test_fact_input_missing_field() {
        let input: FactInput =
            serde_json::from_str(r#"{"subject": "Amit", "predicate": "CEO_OF"}"#).unwrap();
        assert!(matches!(input.into_fact(), Err(IngestError::MissingField("object"))));

        let blank = FactInput {
            subject: Some("  ".to_string()),
            predicate: Some("CEO_OF".to_string()),
            object: Some("CompanyX".to_string()),
            ..Default::default()
        };
        assert!(matches!(blank.into_fact(), Err(IngestError::MissingField("subject"))));
    }

    #[test]
    fn test_fact_input_defaults_confidence() {
        let input: FactInput = serde_json::from_str(
            r#"{"subject": "Amit", "predicate": "CEO_OF", "object": "CompanyX",
                "metadata": {"since": "2024"}, "source_document": "records.pdf"}"#,
        )
        .unwrap();
        let fact = input.into_fact().unwrap();
        assert!((fact.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(fact.metadata.len(), 1);
        assert_eq!(fact.source_document.as_deref(), Some("records.pdf"));
    }
}
