// SPDX-License-Identifier: PMPL-1.0-or-later
//! Nexus Observability
//!
//! Aggregates graph health: entity and edge counts, conflict log totals,
//! mean confidence of current edges, and the data accuracy score. Also flags
//! entities that change too often as unstable and lists risky nodes.
//!
//! Token and cost figures here are estimates (healings x a fixed token
//! assumption). The correction engine tracks the exact running totals.

mod exporter;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use nexus_graph::{Entity, EntityId, GraphError, GraphStore, MetricsSnapshot, Relationship};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

pub use exporter::PrometheusExporter;

/// Observability errors
#[derive(Error, Debug)]
pub enum ObserveError {
    #[error("Store error: {0}")]
    Store(#[from] GraphError),

    #[error("Metrics error: {0}")]
    Metrics(String),
}

/// Thresholds and cost assumptions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserveConfig {
    /// Entities with at least this many changes are unstable.
    pub unstable_node_threshold: u64,
    /// Token estimate per healing event.
    pub tokens_per_healing: u64,
    pub cost_per_1k_tokens: f64,
    /// Accuracy at or above this is healthy.
    pub accuracy_threshold: f64,
    /// Accuracy below this is critical.
    pub critical_accuracy: f64,
}

impl Default for ObserveConfig {
    fn default() -> Self {
        Self {
            unstable_node_threshold: 3,
            tokens_per_healing: 1000,
            cost_per_1k_tokens: 0.03,
            accuracy_threshold: 0.95,
            critical_accuracy: 0.8,
        }
    }
}

/// Health of a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeHealth {
    pub entity_id: EntityId,
    pub entity_name: String,
    pub change_count: u64,
    pub healing_count: u64,
    pub last_healed_at: Option<DateTime<Utc>>,
    pub is_unstable: bool,
    pub has_conflict: bool,
    /// Mean confidence of current outgoing edges, 0.0 if none.
    pub confidence_score: f64,
}

/// Overall health classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

/// Health report built from current metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserveReport {
    pub status: HealthStatus,
    pub metrics: MetricsSnapshot,
    pub high_risk: Vec<NodeHealth>,
    pub checked_at: DateTime<Utc>,
}

/// `1 - conflicts / total`, or 1.0 for an empty graph.
pub fn data_accuracy_score(entities_with_conflicts: u64, total_entities: u64) -> f64 {
    if total_entities == 0 {
        return 1.0;
    }
    1.0 - entities_with_conflicts as f64 / total_entities as f64
}

/// Classify an accuracy score.
pub fn classify(accuracy: f64, config: &ObserveConfig) -> HealthStatus {
    if accuracy >= config.accuracy_threshold {
        HealthStatus::Healthy
    } else if accuracy >= config.critical_accuracy {
        HealthStatus::Degraded
    } else {
        HealthStatus::Critical
    }
}

/// Mean confidence of current outgoing edges per source entity.
fn confidence_by_source(relationships: &[Relationship]) -> HashMap<&EntityId, f64> {
    let mut sums: HashMap<&EntityId, (f64, u32)> = HashMap::new();
    for rel in relationships.iter().filter(|r| r.is_current) {
        let entry = sums.entry(&rel.source_entity_id).or_insert((0.0, 0));
        entry.0 += rel.confidence;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(id, (sum, n))| (id, sum / f64::from(n)))
        .collect()
}

fn node_health(entity: &Entity, confidence: &HashMap<&EntityId, f64>) -> NodeHealth {
    NodeHealth {
        entity_id: entity.id.clone(),
        entity_name: entity.name.clone(),
        change_count: entity.change_count,
        healing_count: entity.healing_count,
        last_healed_at: entity.last_healed_at,
        is_unstable: entity.is_unstable,
        has_conflict: entity.has_conflict,
        confidence_score: confidence.get(&entity.id).copied().unwrap_or(0.0),
    }
}

/// Metrics aggregator over a shared graph store.
pub struct ObservabilityTracker {
    store: Arc<dyn GraphStore>,
    config: ObserveConfig,
    exporter: Option<PrometheusExporter>,
}

impl ObservabilityTracker {
    pub fn new(store: Arc<dyn GraphStore>, config: ObserveConfig) -> Self {
        Self {
            store,
            config,
            exporter: None,
        }
    }

    pub fn with_defaults(store: Arc<dyn GraphStore>) -> Self {
        Self::new(store, ObserveConfig::default())
    }

    /// Publish every computed snapshot as Prometheus gauges.
    pub fn with_prometheus(mut self, registry: &prometheus::Registry) -> Result<Self, ObserveError> {
        self.exporter = Some(PrometheusExporter::new(registry)?);
        Ok(self)
    }

    pub fn config(&self) -> &ObserveConfig {
        &self.config
    }

    /// Estimated cost of `tokens` at the configured rate.
    pub fn calculate_healing_cost(&self, tokens: u64) -> f64 {
        tokens as f64 / 1000.0 * self.config.cost_per_1k_tokens
    }

    /// Aggregate current graph metrics.
    #[instrument(skip(self))]
    pub async fn get_current_metrics(&self) -> Result<MetricsSnapshot, ObserveError> {
        let entities = self.store.list_entities().await?;
        let relationships = self.store.list_relationships().await?;
        let logs = self.store.list_conflict_logs().await?;

        let total_entities = entities.len() as u64;
        let entities_with_conflicts = entities.iter().filter(|e| e.has_conflict).count() as u64;
        let unstable_nodes = entities.iter().filter(|e| e.is_unstable).count() as u64;
        let resolved_conflicts = logs.iter().filter(|l| l.resolved).count() as u64;

        let current: Vec<f64> = relationships
            .iter()
            .filter(|r| r.is_current)
            .map(|r| r.confidence)
            .collect();
        let average_confidence = if current.is_empty() {
            0.0
        } else {
            current.iter().sum::<f64>() / current.len() as f64
        };

        let healings: u64 = entities.iter().map(|e| e.healing_count).sum();
        let total_tokens_used = healings * self.config.tokens_per_healing;

        let snapshot = MetricsSnapshot {
            timestamp: Utc::now(),
            total_entities,
            total_relationships: relationships.len() as u64,
            entities_with_conflicts,
            resolved_conflicts,
            unresolved_conflicts: logs.len() as u64 - resolved_conflicts,
            unstable_nodes,
            total_tokens_used,
            total_healing_cost: self.calculate_healing_cost(total_tokens_used),
            average_confidence,
            data_accuracy_score: data_accuracy_score(entities_with_conflicts, total_entities),
        };

        if let Some(exporter) = &self.exporter {
            exporter.publish(&snapshot);
        }
        debug!(
            entities = snapshot.total_entities,
            accuracy = snapshot.data_accuracy_score,
            "Metrics computed"
        );
        Ok(snapshot)
    }

    /// Flag entities at or over the change threshold. Returns newly flagged count.
    #[instrument(skip(self))]
    pub async fn mark_unstable_nodes(&self) -> Result<usize, ObserveError> {
        let flipped = self
            .store
            .mark_unstable(self.config.unstable_node_threshold, Utc::now())
            .await?;
        if flipped > 0 {
            info!(flipped, threshold = self.config.unstable_node_threshold, "Nodes marked unstable");
        }
        Ok(flipped)
    }

    /// Unstable entities, most-changed first.
    pub async fn get_unstable_nodes(&self, limit: usize) -> Result<Vec<NodeHealth>, ObserveError> {
        let mut nodes = self.nodes_where(|e| e.is_unstable).await?;
        nodes.sort_by(|a, b| {
            b.change_count
                .cmp(&a.change_count)
                .then_with(|| a.entity_name.cmp(&b.entity_name))
        });
        nodes.truncate(limit);
        Ok(nodes)
    }

    /// Entities both unstable and conflicted, most-changed first, then least
    /// confident.
    pub async fn get_high_risk_nodes(&self, limit: usize) -> Result<Vec<NodeHealth>, ObserveError> {
        let mut nodes = self.nodes_where(|e| e.is_unstable && e.has_conflict).await?;
        nodes.sort_by(|a, b| {
            b.change_count
                .cmp(&a.change_count)
                .then_with(|| a.confidence_score.total_cmp(&b.confidence_score))
                .then_with(|| a.entity_name.cmp(&b.entity_name))
        });
        nodes.truncate(limit);
        Ok(nodes)
    }

    async fn nodes_where(&self, keep: impl Fn(&Entity) -> bool) -> Result<Vec<NodeHealth>, ObserveError> {
        let entities = self.store.list_entities().await?;
        let relationships = self.store.list_relationships().await?;
        let confidence = confidence_by_source(&relationships);
        Ok(entities
            .iter()
            .filter(|e| keep(e))
            .map(|e| node_health(e, &confidence))
            .collect())
    }

    pub fn store_metrics_snapshot<'a>(
        &'a self,
        snapshot: &'a MetricsSnapshot,
    ) -> impl std::future::Future<Output = Result<(), ObserveError>> + Send + 'a {
        async move {
            self.store.store_metrics_snapshot(snapshot).await?;
            Ok(())
        }
    }

    /// Snapshots from the last `days` days, newest first.
    pub async fn get_metrics_history(&self, days: i64) -> Result<Vec<MetricsSnapshot>, ObserveError> {
        let cutoff = Utc::now() - Duration::days(days);
        let mut history = self.store.metrics_since(cutoff).await?;
        history.reverse();
        Ok(history)
    }

    /// Current metrics with a health classification and top high-risk nodes.
    pub async fn health_report(&self) -> Result<ObserveReport, ObserveError> {
        let metrics = self.get_current_metrics().await?;
        let high_risk = self.get_high_risk_nodes(20).await?;
        Ok(ObserveReport {
            status: classify(metrics.data_accuracy_score, &self.config),
            metrics,
            high_risk,
            checked_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_graph_is_fully_accurate() {
        assert_eq!(data_accuracy_score(0, 0), 1.0);
    }

    #[test]
    fn test_classification_bands() {
        let config = ObserveConfig::default();
        assert_eq!(classify(1.0, &config), HealthStatus::Healthy);
        assert_eq!(classify(0.95, &config), HealthStatus::Healthy);
        assert_eq!(classify(0.9, &config), HealthStatus::Degraded);
        assert_eq!(classify(0.6, &config), HealthStatus::Critical);
    }

    #[test]
    fn test_confidence_ignores_outdated_edges() {
        let a = EntityId::new("a");
        let b = EntityId::new("b");
        let mut stale = Relationship::new(a.clone(), b.clone(), "R").with_confidence(0.1);
        stale.is_current = false;
        let rels = vec![
            Relationship::new(a.clone(), b.clone(), "R").with_confidence(0.9),
            Relationship::new(a.clone(), b.clone(), "R").with_confidence(0.5),
            stale,
        ];
        let by_source = confidence_by_source(&rels);
        assert!((by_source[&a] - 0.7).abs() < 1e-12);
        assert!(!by_source.contains_key(&b));
    }

    proptest! {
        #[test]
        fn accuracy_matches_formula(total in 0u64..10_000, frac in 0.0f64..=1.0) {
            let conflicts = (total as f64 * frac).floor() as u64;
            let score = data_accuracy_score(conflicts, total);
            if total == 0 {
                prop_assert_eq!(score, 1.0);
            } else {
                let expected = 1.0 - conflicts as f64 / total as f64;
                prop_assert!((score - expected).abs() < 1e-12);
            }
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }
}
