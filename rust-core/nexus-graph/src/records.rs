// SPDX-License-Identifier: PMPL-1.0-or-later

//! Persisted bookkeeping records: conflict logs and metrics snapshots.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{EntityId, RelationshipId, RelationshipSnapshot};

/// Severity of a detected conflict.
///
/// Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => f.write_str("low"),
            Severity::Medium => f.write_str("medium"),
            Severity::High => f.write_str("high"),
        }
    }
}

/// Persisted record of a detected conflict.
///
/// `id` is deterministic (`dup_<entity>_<type>` / `contra_<entity>_<type>`),
/// so re-detection of the same anomaly refreshes one record instead of
/// accumulating duplicates. A resolved record stays resolved while the same
/// edges keep being detected; an edge it has not seen before reopens it and
/// the earlier resolution moves to `previous_resolutions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictLogRecord {
    pub id: String,
    pub entity_id: EntityId,
    pub entity_name: String,
    pub relationship_type: String,
    pub detection_method: String,
    pub severity: Severity,
    pub description: String,
    pub detected_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Arbiter decision serialised as JSON, attached on resolution.
    pub resolution_decision: Option<String>,
    pub conflicting_relationships: Vec<RelationshipSnapshot>,
    /// Resolutions superseded by a reopening, oldest first.
    #[serde(default)]
    pub previous_resolutions: Vec<ResolutionAudit>,
}

/// A resolution that was later reopened by new evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionAudit {
    pub resolved_at: Option<DateTime<Utc>>,
    pub decision: Option<String>,
    /// Edges the resolution covered.
    pub relationship_ids: Vec<RelationshipId>,
}

impl ConflictLogRecord {
    /// Decide how `incoming` lands on top of the currently stored record.
    ///
    /// Returns the record to write (if any) and the write outcome. An
    /// unresolved record is replaced wholesale with `resolved` forced to
    /// false. A resolved record is left untouched unless `incoming` names an
    /// edge it does not cover, in which case it is reopened and its
    /// resolution is appended to the audit trail.
    pub fn merge(
        existing: Option<&ConflictLogRecord>,
        mut incoming: ConflictLogRecord,
    ) -> (Option<ConflictLogRecord>, ConflictLogWrite) {
        incoming.resolved = false;
        incoming.resolved_at = None;
        incoming.resolution_decision = None;
        let Some(current) = existing else {
            incoming.previous_resolutions.clear();
            return (Some(incoming), ConflictLogWrite::Inserted);
        };
        incoming.previous_resolutions = current.previous_resolutions.clone();
        if !current.resolved {
            return (Some(incoming), ConflictLogWrite::Refreshed);
        }
        if !incoming.has_edges_beyond(current) {
            return (None, ConflictLogWrite::AlreadyResolved);
        }
        incoming.previous_resolutions.push(ResolutionAudit {
            resolved_at: current.resolved_at,
            decision: current.resolution_decision.clone(),
            relationship_ids: current.relationship_ids(),
        });
        (Some(incoming), ConflictLogWrite::Reopened)
    }

    pub fn relationship_ids(&self) -> Vec<RelationshipId> {
        self.conflicting_relationships.iter().map(|s| s.id.clone()).collect()
    }

    fn has_edges_beyond(&self, other: &ConflictLogRecord) -> bool {
        let known: HashSet<&RelationshipId> =
            other.conflicting_relationships.iter().map(|s| &s.id).collect();
        self.conflicting_relationships.iter().any(|s| !known.contains(&s.id))
    }

    pub fn resolve(&mut self, decision: &str, at: DateTime<Utc>) {
        self.resolved = true;
        self.resolved_at = Some(at);
        self.resolution_decision = Some(decision.to_string());
    }
}

/// Outcome of writing a conflict log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictLogWrite {
    /// No record with this id existed.
    Inserted,
    /// An unresolved record was refreshed with the new detection.
    Refreshed,
    /// The record is already resolved and was left untouched.
    AlreadyResolved,
    /// A resolved record met edges it did not cover and is open again.
    Reopened,
}

/// Point-in-time rollup of graph health. Immutable once stored.
///
/// `total_tokens_used` and `total_healing_cost` are estimates derived from the
/// healing count, not the exact live counters of the correction engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_entities: u64,
    pub total_relationships: u64,
    pub entities_with_conflicts: u64,
    pub resolved_conflicts: u64,
    pub unresolved_conflicts: u64,
    pub unstable_nodes: u64,
    pub total_tokens_used: u64,
    pub total_healing_cost: f64,
    pub average_confidence: f64,
    pub data_accuracy_score: f64,
}

/// Result of idempotent schema setup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaReport {
    /// Constraints and indexes created by this call.
    pub created: Vec<String>,
    /// Constraints and indexes that already existed.
    pub existing: Vec<String>,
}

/// Uniqueness constraints and lookup indexes every backend provides.
pub const SCHEMA_ITEMS: &[&str] = &[
    "entity_id_unique",
    "relationship_id_unique",
    "conflict_log_id_unique",
    "entity_name_index",
    "relationship_type_index",
    "relationship_timestamp_index",
    "entity_conflict_flag_index",
    "entity_unstable_flag_index",
];
