// SPDX-License-Identifier: PMPL-1.0-or-later

//! Offline arbiter: the most recent evidence wins.

use async_trait::async_trait;

use super::{Arbiter, ArbiterError, ArbitrationRequest};
use crate::decision::ArbiterDecision;

/// Picks the newest candidate edge and demotes the rest. Uses no tokens.
///
/// Ties on timestamp go to the lexically larger relationship id so the verdict
/// is deterministic.
pub struct LatestEvidenceArbiter {
    confidence: f64,
}

impl LatestEvidenceArbiter {
    pub fn new(confidence: f64) -> Self {
        Self {
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

impl Default for LatestEvidenceArbiter {
    fn default() -> Self {
        Self::new(0.8)
    }
}

#[async_trait]
impl Arbiter for LatestEvidenceArbiter {
    fn name(&self) -> &str {
        "latest-evidence"
    }

    async fn arbitrate(&self, request: &ArbitrationRequest) -> Result<ArbiterDecision, ArbiterError> {
        let snapshots = &request.conflict.conflicting_relationships;
        let Some(winner) = snapshots
            .iter()
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)))
        else {
            return Ok(ArbiterDecision::degraded("conflict has no candidate relationships"));
        };

        Ok(ArbiterDecision {
            correct_relationship_id: Some(winner.id.clone()),
            outdated_relationship_ids: snapshots
                .iter()
                .filter(|s| s.id != winner.id)
                .map(|s| s.id.clone())
                .collect(),
            confidence: self.confidence,
            reasoning: format!(
                "Most recent evidence names {} as of {}",
                winner.target_name,
                winner.timestamp.to_rfc3339()
            ),
            evidence_summary: winner
                .source_document
                .clone()
                .unwrap_or_else(|| "no source document".to_string()),
            tokens_used: 0,
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::test_support::two_edge_conflict;

    #[tokio::test]
    async fn test_newest_edge_wins() {
        let request = ArbitrationRequest::new(two_edge_conflict(), Vec::new());
        let decision = LatestEvidenceArbiter::default().arbitrate(&request).await.unwrap();
        assert_eq!(decision.correct_relationship_id.unwrap().as_str(), "rel-b");
        assert_eq!(decision.outdated_relationship_ids.len(), 1);
        assert_eq!(decision.outdated_relationship_ids[0].as_str(), "rel-a");
        assert_eq!(decision.tokens_used, 0);
        assert!((decision.confidence - 0.8).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_empty_conflict_is_degraded() {
        let mut conflict = two_edge_conflict();
        conflict.conflicting_relationships.clear();
        let request = ArbitrationRequest::new(conflict, Vec::new());
        let decision = LatestEvidenceArbiter::new(3.0).arbitrate(&request).await.unwrap();
        assert!(decision.is_error());
    }
}
