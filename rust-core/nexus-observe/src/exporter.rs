// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus gauges mirroring the latest metrics snapshot.

use prometheus::{Gauge, Registry};

use nexus_graph::MetricsSnapshot;

use crate::ObserveError;

/// Publishes each snapshot field as a `nexus_graph_*` gauge.
#[derive(Clone)]
pub struct PrometheusExporter {
    total_entities: Gauge,
    total_relationships: Gauge,
    entities_with_conflicts: Gauge,
    resolved_conflicts: Gauge,
    unresolved_conflicts: Gauge,
    unstable_nodes: Gauge,
    estimated_tokens: Gauge,
    estimated_cost: Gauge,
    average_confidence: Gauge,
    data_accuracy: Gauge,
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<Gauge, ObserveError> {
    let gauge = Gauge::new(name, help).map_err(|e| ObserveError::Metrics(e.to_string()))?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(|e| ObserveError::Metrics(e.to_string()))?;
    Ok(gauge)
}

impl PrometheusExporter {
    pub fn new(registry: &Registry) -> Result<Self, ObserveError> {
        Ok(Self {
            total_entities: gauge(registry, "nexus_graph_entities", "Entities in the graph")?,
            total_relationships: gauge(registry, "nexus_graph_relationships", "Fact edges in the graph")?,
            entities_with_conflicts: gauge(
                registry,
                "nexus_graph_entities_with_conflicts",
                "Entities currently flagged with a conflict",
            )?,
            resolved_conflicts: gauge(registry, "nexus_graph_conflicts_resolved", "Resolved conflict log entries")?,
            unresolved_conflicts: gauge(
                registry,
                "nexus_graph_conflicts_unresolved",
                "Unresolved conflict log entries",
            )?,
            unstable_nodes: gauge(registry, "nexus_graph_unstable_nodes", "Entities flagged unstable")?,
            estimated_tokens: gauge(
                registry,
                "nexus_graph_estimated_healing_tokens",
                "Estimated tokens spent on healing",
            )?,
            estimated_cost: gauge(
                registry,
                "nexus_graph_estimated_healing_cost",
                "Estimated healing cost",
            )?,
            average_confidence: gauge(
                registry,
                "nexus_graph_average_confidence",
                "Mean confidence of current edges",
            )?,
            data_accuracy: gauge(registry, "nexus_graph_data_accuracy", "1 - conflicted / total entities")?,
        })
    }

    pub fn publish(&self, snapshot: &MetricsSnapshot) {
        self.total_entities.set(snapshot.total_entities as f64);
        self.total_relationships.set(snapshot.total_relationships as f64);
        self.entities_with_conflicts.set(snapshot.entities_with_conflicts as f64);
        self.resolved_conflicts.set(snapshot.resolved_conflicts as f64);
        self.unresolved_conflicts.set(snapshot.unresolved_conflicts as f64);
        self.unstable_nodes.set(snapshot.unstable_nodes as f64);
        self.estimated_tokens.set(snapshot.total_tokens_used as f64);
        self.estimated_cost.set(snapshot.total_healing_cost);
        self.average_confidence.set(snapshot.average_confidence);
        self.data_accuracy.set(snapshot.data_accuracy_score);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_publish_sets_gauges() {
        let registry = Registry::new();
        let exporter = PrometheusExporter::new(&registry).unwrap();
        exporter.publish(&MetricsSnapshot {
            timestamp: Utc::now(),
            total_entities: 5,
            total_relationships: 4,
            entities_with_conflicts: 2,
            resolved_conflicts: 0,
            unresolved_conflicts: 2,
            unstable_nodes: 1,
            total_tokens_used: 0,
            total_healing_cost: 0.0,
            average_confidence: 0.875,
            data_accuracy_score: 0.6,
        });

        let text = prometheus::TextEncoder::new()
            .encode_to_string(&registry.gather())
            .unwrap();
        assert!(text.contains("nexus_graph_entities 5"));
        assert!(text.contains("nexus_graph_average_confidence 0.875"));
        assert!(text.contains("nexus_graph_data_accuracy 0.6"));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        PrometheusExporter::new(&registry).unwrap();
        assert!(matches!(
            PrometheusExporter::new(&registry),
            Err(ObserveError::Metrics(_))
        ));
    }
}
