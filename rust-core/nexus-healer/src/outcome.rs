// SPDX-License-Identifier: PMPL-1.0-or-later

//! Per-conflict healing outcomes and batch summaries.

use std::fmt;

use chrono::{DateTime, Utc};
use nexus_conflict::Conflict;
use nexus_graph::{EntityId, RelationshipId};
use serde::{Deserialize, Serialize};

use crate::decision::ArbiterDecision;

/// Why a conflict was left unresolved without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Arbiter confidence below the apply threshold
    LowConfidence,
    /// Arbiter errored, timed out, or returned an unusable verdict
    ArbiterFailure,
    /// The conflict log is already resolved
    AlreadyResolved,
    /// Every candidate edge was demoted since detection
    Superseded,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::LowConfidence => "low_confidence",
            SkipReason::ArbiterFailure => "arbiter_failure",
            SkipReason::AlreadyResolved => "already_resolved",
            SkipReason::Superseded => "superseded",
        };
        f.write_str(s)
    }
}

/// Terminal state of one healing attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum HealState {
    Resolved,
    Skipped(SkipReason),
    /// A graph write failed while applying the correction. Flags may be
    /// partially updated; re-run detection before trusting them.
    Failed(String),
}

/// Result of healing one conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealOutcome {
    pub conflict_id: String,
    pub entity_id: EntityId,
    pub state: HealState,
    pub success: bool,
    pub decision: Option<ArbiterDecision>,
    pub tokens_used: u64,
    pub reason: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl HealOutcome {
    fn build(
        conflict: &Conflict,
        state: HealState,
        decision: Option<ArbiterDecision>,
        reason: Option<String>,
    ) -> Self {
        Self {
            conflict_id: conflict.conflict_id.clone(),
            entity_id: conflict.entity_id.clone(),
            success: state == HealState::Resolved,
            tokens_used: decision.as_ref().map_or(0, |d| d.tokens_used),
            state,
            decision,
            reason,
            completed_at: Utc::now(),
        }
    }

    pub fn resolved(conflict: &Conflict, decision: ArbiterDecision) -> Self {
        Self::build(conflict, HealState::Resolved, Some(decision), None)
    }

    pub fn skipped(
        conflict: &Conflict,
        why: SkipReason,
        decision: Option<ArbiterDecision>,
        reason: impl Into<String>,
    ) -> Self {
        Self::build(conflict, HealState::Skipped(why), decision, Some(reason.into()))
    }

    pub fn failed(conflict: &Conflict, decision: Option<ArbiterDecision>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self::build(conflict, HealState::Failed(error.clone()), decision, Some(error))
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self.state {
            HealState::Skipped(why) => Some(why),
            _ => None,
        }
    }
}

/// What a successful correction changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedCorrection {
    pub winner: RelationshipId,
    pub outdated: Vec<RelationshipId>,
    /// Entity healing count after this correction.
    pub healing_count: u64,
    pub applied_at: DateTime<Utc>,
}

/// Aggregate result of a healing batch.
///
/// `successful + skipped + failed + abandoned == total`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealSummary {
    pub total: usize,
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Conflicts never attempted because shutdown was signalled.
    pub abandoned: usize,
    pub abandoned_conflicts: Vec<String>,
    /// Tokens consumed by this batch only.
    pub total_tokens_used: u64,
    pub total_cost: f64,
    /// Attempted conflicts, in input order.
    pub results: Vec<HealOutcome>,
}

impl HealSummary {
    /// Conflicts that did not end resolved, for any reason.
    pub fn unsuccessful(&self) -> usize {
        self.total - self.successful
    }
}
