// SPDX-License-Identifier: PMPL-1.0-or-later

//! The self-correction engine.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use nexus_conflict::Conflict;
use nexus_graph::{EntityId, GraphStore, RelationshipId, RelationshipSnapshot};
use prometheus::Registry;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::arbiter::{Arbiter, ArbitrationRequest};
use crate::decision::ArbiterDecision;
use crate::documents::fetch_source_documents;
use crate::metrics::HealerMetrics;
use crate::outcome::{AppliedCorrection, HealOutcome, HealState, HealSummary, SkipReason};
use crate::{healing_cost, HealerConfig, HealerError, HealerStatus};

/// Edges a decision will touch, validated against the conflict.
struct CorrectionPlan {
    winner: RelationshipId,
    losers: Vec<RelationshipId>,
}

fn plan_correction(conflict: &Conflict, decision: &ArbiterDecision) -> Result<CorrectionPlan, String> {
    let winner = decision
        .correct_relationship_id
        .clone()
        .ok_or_else(|| "decision names no correct relationship".to_string())?;
    if !conflict.contains_relationship(&winner) {
        return Err(format!(
            "decision names relationship {} which is not part of conflict {}",
            winner, conflict.conflict_id
        ));
    }

    let mut losers: Vec<RelationshipId> = Vec::new();
    for id in &decision.outdated_relationship_ids {
        if *id == winner || losers.contains(id) {
            continue;
        }
        if !conflict.contains_relationship(id) {
            warn!(
                conflict_id = %conflict.conflict_id,
                relationship_id = %id,
                "Ignoring outdated id outside the conflict"
            );
            continue;
        }
        losers.push(id.clone());
    }
    Ok(CorrectionPlan { winner, losers })
}

/// Conflicts grouped by entity, keeping first-appearance order of entities
/// and input order within each entity.
fn group_by_entity(conflicts: &[Conflict]) -> Vec<Vec<(usize, &Conflict)>> {
    let mut slots: HashMap<&EntityId, usize> = HashMap::new();
    let mut groups: Vec<Vec<(usize, &Conflict)>> = Vec::new();
    for (index, conflict) in conflicts.iter().enumerate() {
        let slot = *slots.entry(&conflict.entity_id).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push((index, conflict));
    }
    groups
}

/// Heals conflicts by arbitrating evidence and rewriting edge flags.
pub struct SelfCorrectionEngine {
    store: Arc<dyn GraphStore>,
    arbiter: Arc<dyn Arbiter>,
    config: HealerConfig,
    status: Arc<RwLock<HealerStatus>>,
    batch_lock: Mutex<()>,
    metrics: Option<HealerMetrics>,
    result_sender: Option<mpsc::Sender<HealOutcome>>,
}

impl SelfCorrectionEngine {
    pub fn new(store: Arc<dyn GraphStore>, arbiter: Arc<dyn Arbiter>, config: HealerConfig) -> Self {
        Self {
            store,
            arbiter,
            config,
            status: Arc::new(RwLock::new(HealerStatus::default())),
            batch_lock: Mutex::new(()),
            metrics: None,
            result_sender: None,
        }
    }

    pub fn with_defaults(store: Arc<dyn GraphStore>, arbiter: Arc<dyn Arbiter>) -> Self {
        Self::new(store, arbiter, HealerConfig::default())
    }

    /// Publish every outcome on a channel.
    pub fn with_result_channel(mut self, sender: mpsc::Sender<HealOutcome>) -> Self {
        self.result_sender = Some(sender);
        self
    }

    /// Register Prometheus counters for healing outcomes.
    pub fn with_prometheus(mut self, registry: &Registry) -> Result<Self, HealerError> {
        self.metrics = Some(HealerMetrics::register(registry)?);
        Ok(self)
    }

    pub fn config(&self) -> &HealerConfig {
        &self.config
    }

    pub fn arbiter_name(&self) -> &str {
        self.arbiter.name()
    }

    /// Running totals since construction.
    pub async fn status(&self) -> HealerStatus {
        self.status.read().await.clone()
    }

    /// Cost of `tokens` at the configured rate.
    pub fn cost_of(&self, tokens: u64) -> f64 {
        healing_cost(tokens, self.config.cost_per_1k_tokens)
    }

    // -- correction ----------------------------------------------------------

    /// Apply an arbiter verdict to the graph.
    ///
    /// Four statements run in order: verify the winner, demote the losers,
    /// clear the entity flag, resolve the log entry. They are not isolated
    /// from each other. On error, earlier statements may already be
    /// committed and the caller should re-run detection.
    #[instrument(skip(self, conflict, decision), fields(conflict_id = %conflict.conflict_id))]
    pub async fn apply_correction(
        &self,
        conflict: &Conflict,
        decision: &ArbiterDecision,
    ) -> Result<AppliedCorrection, HealerError> {
        let plan = plan_correction(conflict, decision).map_err(HealerError::InvalidDecision)?;
        if let Some(winner) = self.store.get_relationship(&plan.winner).await? {
            if winner.outdated_at.is_some_and(|t| t >= conflict.detected_at) {
                return Err(HealerError::InvalidDecision(format!(
                    "winner {} was demoted after the conflict was detected",
                    plan.winner
                )));
            }
        }
        let at = Utc::now();
        let reasoning = decision.reasoning.as_str();

        if !self
            .store
            .verify_relationship(&plan.winner, decision.confidence, reasoning, at)
            .await?
        {
            return Err(HealerError::MissingRelationship(plan.winner));
        }

        let demoted = self.store.mark_outdated(&plan.losers, reasoning, at).await?;
        if demoted < plan.losers.len() {
            warn!(
                expected = plan.losers.len(),
                demoted, "Some outdated relationships no longer exist"
            );
        }

        let healing_count = self
            .store
            .clear_conflict(&conflict.entity_id, at)
            .await?
            .ok_or_else(|| HealerError::MissingEntity(conflict.entity_id.clone()))?;

        let payload = serde_json::to_string(decision)?;
        self.resolve_log(conflict, &payload, at).await?;

        {
            let mut status = self.status.write().await;
            status.corrections_made += 1;
            status.last_healed_at = Some(at);
        }
        if let Some(metrics) = &self.metrics {
            metrics.corrections.inc();
        }

        info!(
            winner = %plan.winner,
            outdated = plan.losers.len(),
            healing_count,
            confidence = decision.confidence,
            "Correction applied"
        );

        Ok(AppliedCorrection {
            winner: plan.winner,
            outdated: plan.losers,
            healing_count,
            applied_at: at,
        })
    }

    /// Mark the conflict's log entry resolved with `payload`.
    async fn resolve_log(
        &self,
        conflict: &Conflict,
        payload: &str,
        at: DateTime<Utc>,
    ) -> Result<(), HealerError> {
        if self
            .store
            .resolve_conflict_log(&conflict.conflict_id, payload, at)
            .await?
        {
            return Ok(());
        }
        // Healed without a prior detection cycle: log it, then resolve.
        self.store.upsert_conflict_log(conflict.to_log_record()).await?;
        if self
            .store
            .resolve_conflict_log(&conflict.conflict_id, payload, at)
            .await?
        {
            Ok(())
        } else {
            Err(HealerError::MissingConflictLog(conflict.conflict_id.clone()))
        }
    }

    /// The conflict with its candidates re-read from the store.
    ///
    /// Edges demoted or removed since detection are dropped, so a verdict
    /// applied earlier in the same batch is not undone by a stale snapshot.
    async fn live_candidates(&self, conflict: &Conflict) -> Result<Conflict, HealerError> {
        let mut live = conflict.clone();
        live.conflicting_relationships.clear();
        for snapshot in &conflict.conflicting_relationships {
            match self.store.get_relationship(&snapshot.id).await? {
                Some(rel) if rel.outdated_at.is_none() => live
                    .conflicting_relationships
                    .push(RelationshipSnapshot::capture(&rel, snapshot.target_name.clone())),
                Some(_) => debug!(relationship_id = %snapshot.id, "Candidate demoted since detection"),
                None => debug!(relationship_id = %snapshot.id, "Candidate no longer exists"),
            }
        }
        Ok(live)
    }

    /// Fetch evidence, arbitrate, and apply the verdict if confident enough.
    ///
    /// The arbiter only sees candidates still live in the store. When none
    /// remain the conflict is logged as resolved and skipped as `Superseded`.
    /// Only a failing store read before arbitration is returned as an error.
    /// Arbiter problems and low confidence become `Skipped`, write failures
    /// during the correction become `Failed`.
    #[instrument(skip(self, conflict), fields(conflict_id = %conflict.conflict_id))]
    pub async fn heal_conflict(&self, conflict: &Conflict) -> Result<HealOutcome, HealerError> {
        let already_resolved = conflict.resolved
            || self
                .store
                .get_conflict_log(&conflict.conflict_id)
                .await?
                .is_some_and(|log| log.resolved);
        if already_resolved {
            let outcome =
                HealOutcome::skipped(conflict, SkipReason::AlreadyResolved, None, "conflict already resolved");
            self.record(&outcome).await;
            return Ok(outcome);
        }

        let live = self.live_candidates(conflict).await?;
        if live.conflicting_relationships.is_empty() {
            let reason = "every candidate edge was demoted since detection";
            let payload = serde_json::json!({ "superseded": true, "reason": reason }).to_string();
            let outcome = match self.resolve_log(conflict, &payload, Utc::now()).await {
                Ok(()) => HealOutcome::skipped(conflict, SkipReason::Superseded, None, reason),
                Err(e) => HealOutcome::failed(conflict, None, e.to_string()),
            };
            info!(state = ?outcome.state, "Conflict superseded by an earlier correction");
            self.record(&outcome).await;
            return Ok(outcome);
        }

        let request = ArbitrationRequest::new(live.clone(), fetch_source_documents(&live));
        let decision = match self.arbiter.arbitrate(&request).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(arbiter = self.arbiter.name(), error = %e, "Arbiter failed, degrading");
                ArbiterDecision::degraded(e.to_string())
            }
        };
        debug!(
            confidence = decision.confidence,
            tokens = decision.tokens_used,
            "Arbiter decision received"
        );

        let outcome = if let Some(error) = decision.error.clone() {
            HealOutcome::skipped(conflict, SkipReason::ArbiterFailure, Some(decision), error)
        } else if decision.confidence < self.config.apply_threshold {
            HealOutcome::skipped(
                conflict,
                SkipReason::LowConfidence,
                Some(decision),
                "Low confidence or error in research",
            )
        } else {
            match self.apply_correction(conflict, &decision).await {
                Ok(_) => HealOutcome::resolved(conflict, decision),
                Err(HealerError::InvalidDecision(msg)) => {
                    HealOutcome::skipped(conflict, SkipReason::ArbiterFailure, Some(decision), msg)
                }
                Err(e) => {
                    warn!(error = %e, "Correction failed");
                    HealOutcome::failed(conflict, Some(decision), e.to_string())
                }
            }
        };

        self.record(&outcome).await;
        Ok(outcome)
    }

    /// Update running totals and notify listeners.
    async fn record(&self, outcome: &HealOutcome) {
        {
            let mut status = self.status.write().await;
            status.total_tokens_used += outcome.tokens_used;
            match outcome.state {
                HealState::Resolved => {}
                HealState::Skipped(_) => status.skipped_count += 1,
                HealState::Failed(_) => status.failure_count += 1,
            }
            if let Some(metrics) = &self.metrics {
                metrics.tokens.inc_by(outcome.tokens_used as f64);
                metrics.cost.set(self.cost_of(status.total_tokens_used));
                match outcome.state {
                    HealState::Resolved => {}
                    HealState::Skipped(_) => metrics.skipped.inc(),
                    HealState::Failed(_) => metrics.failures.inc(),
                }
            }
        }

        if let Some(sender) = &self.result_sender {
            if let Err(e) = sender.send(outcome.clone()).await {
                warn!(error = %e, "Outcome listener dropped");
            }
        }
    }

    // -- batches -------------------------------------------------------------

    /// Heal a batch of conflicts. Per-item failures are isolated.
    pub async fn heal_all_conflicts(&self, conflicts: &[Conflict]) -> HealSummary {
        let (_keep_open, shutdown) = watch::channel(false);
        self.heal_all_conflicts_until(conflicts, shutdown).await
    }

    /// Heal a batch, stopping between conflicts once `shutdown` reads `true`.
    ///
    /// Batches are serialised on the engine. Conflicts on the same entity are
    /// healed in input order; groups on distinct entities may run concurrently
    /// up to `max_concurrent_entities`.
    #[instrument(skip(self, conflicts, shutdown), fields(count = conflicts.len()))]
    pub async fn heal_all_conflicts_until(
        &self,
        conflicts: &[Conflict],
        shutdown: watch::Receiver<bool>,
    ) -> HealSummary {
        let _batch = self.batch_lock.lock().await;
        self.status.write().await.running = true;

        let width = self.config.max_concurrent_entities.max(1);
        let healing: BoxFuture<'_, Vec<(usize, Option<HealOutcome>)>> = stream::iter(group_by_entity(conflicts))
            .map(|group| self.heal_group(group, shutdown.clone()))
            .buffer_unordered(width)
            .flat_map(stream::iter)
            .collect()
            .boxed();
        let mut slots: Vec<(usize, Option<HealOutcome>)> = healing.await;
        slots.sort_by_key(|(index, _)| *index);

        let mut summary = HealSummary {
            total: conflicts.len(),
            ..Default::default()
        };
        for (index, slot) in slots {
            match slot {
                Some(outcome) => {
                    summary.total_tokens_used += outcome.tokens_used;
                    match outcome.state {
                        HealState::Resolved => summary.successful += 1,
                        HealState::Skipped(_) => summary.skipped += 1,
                        HealState::Failed(_) => summary.failed += 1,
                    }
                    summary.results.push(outcome);
                }
                None => {
                    summary.abandoned += 1;
                    summary.abandoned_conflicts.push(conflicts[index].conflict_id.clone());
                }
            }
        }
        summary.total_cost = self.cost_of(summary.total_tokens_used);

        self.status.write().await.running = false;
        info!(
            total = summary.total,
            successful = summary.successful,
            skipped = summary.skipped,
            failed = summary.failed,
            abandoned = summary.abandoned,
            tokens = summary.total_tokens_used,
            "Healing batch complete"
        );
        summary
    }

    async fn heal_group(
        &self,
        group: Vec<(usize, &Conflict)>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<(usize, Option<HealOutcome>)> {
        let mut out = Vec::with_capacity(group.len());
        for (index, conflict) in group {
            if *shutdown.borrow() {
                debug!(conflict_id = %conflict.conflict_id, "Shutdown requested, abandoning");
                out.push((index, None));
                continue;
            }
            let outcome = match self.heal_conflict(conflict).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(conflict_id = %conflict.conflict_id, error = %e, "Healing aborted");
                    let outcome = HealOutcome::failed(conflict, None, e.to_string());
                    self.record(&outcome).await;
                    outcome
                }
            };
            out.push((index, Some(outcome)));
        }
        out
    }
}
