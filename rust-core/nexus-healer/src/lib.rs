// SPDX-License-Identifier: PMPL-1.0-or-later
//! Nexus Healer
//!
//! Self-correction engine for detected conflicts. For each conflict the
//! engine synthesises evidence documents, asks an [`Arbiter`] which edge is
//! correct, and when the verdict is confident enough rewrites the graph:
//! the winner is verified, the losers are marked outdated, the entity flag is
//! cleared and the conflict log is resolved.
//!
//! Arbiters are injected. [`HttpArbiter`] talks to an OpenAI-compatible
//! endpoint, [`LatestEvidenceArbiter`] works offline, and
//! [`ScriptedArbiter`] gives tests a deterministic verdict source.

pub mod arbiter;
pub mod decision;
pub mod documents;
mod engine;
mod metrics;
pub mod outcome;

use chrono::{DateTime, Utc};
use nexus_graph::{EntityId, GraphError, RelationshipId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use arbiter::{
    Arbiter, ArbiterConfig, ArbiterError, ArbitrationRequest, HttpArbiter, LatestEvidenceArbiter,
    ScriptedArbiter,
};
pub use decision::ArbiterDecision;
pub use documents::fetch_source_documents;
pub use engine::SelfCorrectionEngine;
pub use outcome::{AppliedCorrection, HealOutcome, HealState, HealSummary, SkipReason};

/// Healer errors
#[derive(Error, Debug)]
pub enum HealerError {
    #[error("Store error: {0}")]
    Store(#[from] GraphError),

    #[error("Relationship not found: {0}")]
    MissingRelationship(RelationshipId),

    #[error("Entity not found: {0}")]
    MissingEntity(EntityId),

    #[error("Conflict log entry could not be resolved: {0}")]
    MissingConflictLog(String),

    #[error("Unusable arbiter decision: {0}")]
    InvalidDecision(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Metrics error: {0}")]
    Metrics(String),
}

/// Engine thresholds and pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealerConfig {
    /// Minimum arbiter confidence for a correction to be applied.
    pub apply_threshold: f64,
    pub cost_per_1k_tokens: f64,
    /// Entity groups healed concurrently within one batch.
    pub max_concurrent_entities: usize,
}

impl Default for HealerConfig {
    fn default() -> Self {
        Self {
            apply_threshold: 0.7,
            cost_per_1k_tokens: 0.03,
            max_concurrent_entities: 1,
        }
    }
}

/// Running totals of the engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealerStatus {
    /// Whether a batch is in progress
    pub running: bool,
    /// Exact arbiter tokens consumed
    pub total_tokens_used: u64,
    pub corrections_made: u64,
    pub skipped_count: u64,
    pub failure_count: u64,
    pub last_healed_at: Option<DateTime<Utc>>,
}

/// `tokens / 1000 * cost_per_1k_tokens`.
pub fn healing_cost(tokens: u64, cost_per_1k_tokens: f64) -> f64 {
    tokens as f64 / 1000.0 * cost_per_1k_tokens
}
