// SPDX-License-Identifier: PMPL-1.0-or-later

use std::sync::Arc;

use chrono::{Duration, Utc};
use nexus_conflict::ConflictDetector;
use nexus_graph::{EntityId, GraphStore, InMemoryGraphStore, MetricsSnapshot};
use nexus_ingest::{Fact, TemporalIngestion};
use nexus_observe::{HealthStatus, ObservabilityTracker, ObserveConfig};

async fn demo_graph() -> Arc<InMemoryGraphStore> {
    let store = Arc::new(InMemoryGraphStore::new());
    let ingest = TemporalIngestion::new(store.clone());
    let now = Utc::now();
    for fact in [
        Fact::new("Amit", "CEO_OF", "CompanyX").at(now - Duration::days(10)),
        Fact::new("Amit", "CEO_OF", "CompanyY").at(now - Duration::days(2)),
        Fact::new("Sarah", "CTO_OF", "CompanyX").with_confidence(0.5),
        Fact::new("CompanyX", "HEADQUARTERED_IN", "San Francisco"),
    ] {
        ingest.ingest_fact(fact).await.unwrap();
    }
    store
}

#[tokio::test]
async fn current_metrics_reflect_graph() {
    let store = demo_graph().await;
    ConflictDetector::with_defaults(store.clone())
        .run_detection_cycle()
        .await
        .unwrap();
    let tracker = ObservabilityTracker::with_defaults(store.clone());

    let m = tracker.get_current_metrics().await.unwrap();
    assert_eq!(m.total_entities, 5);
    assert_eq!(m.total_relationships, 4);
    assert_eq!(m.entities_with_conflicts, 2);
    assert_eq!(m.resolved_conflicts, 0);
    assert_eq!(m.unresolved_conflicts, 2);
    assert_eq!(m.total_tokens_used, 0);
    assert!((m.average_confidence - 0.875).abs() < 1e-12);
    assert!((m.data_accuracy_score - 0.6).abs() < 1e-12);
}

#[tokio::test]
async fn token_estimate_follows_healing_count() {
    let store = demo_graph().await;
    let now = Utc::now();
    store.clear_conflict(&EntityId::from_name("Amit"), now).await.unwrap();
    store.clear_conflict(&EntityId::from_name("Amit"), now).await.unwrap();
    store.clear_conflict(&EntityId::from_name("Sarah"), now).await.unwrap();

    let tracker = ObservabilityTracker::new(
        store.clone(),
        ObserveConfig {
            cost_per_1k_tokens: 0.5,
            ..Default::default()
        },
    );
    let m = tracker.get_current_metrics().await.unwrap();
    assert_eq!(m.total_tokens_used, 3000);
    assert!((m.total_healing_cost - 1.5).abs() < 1e-12);
}

#[tokio::test]
async fn unstable_marking_is_idempotent() {
    let store = demo_graph().await;
    let tracker = ObservabilityTracker::with_defaults(store.clone());

    // CompanyX was written by three facts.
    assert_eq!(tracker.mark_unstable_nodes().await.unwrap(), 1);
    assert_eq!(tracker.mark_unstable_nodes().await.unwrap(), 0);

    let unstable = tracker.get_unstable_nodes(50).await.unwrap();
    assert_eq!(unstable.len(), 1);
    assert_eq!(unstable[0].entity_name, "CompanyX");
    assert_eq!(unstable[0].change_count, 3);
    assert!((unstable[0].confidence_score - 1.0).abs() < 1e-12);
}

#[tokio::test]
async fn high_risk_requires_conflict_and_instability() {
    let store = demo_graph().await;
    let tracker = ObservabilityTracker::new(
        store.clone(),
        ObserveConfig {
            unstable_node_threshold: 2,
            ..Default::default()
        },
    );
    tracker.mark_unstable_nodes().await.unwrap();
    assert!(tracker.get_high_risk_nodes(20).await.unwrap().is_empty());

    ConflictDetector::with_defaults(store.clone())
        .run_detection_cycle()
        .await
        .unwrap();
    let risky = tracker.get_high_risk_nodes(20).await.unwrap();
    let names: Vec<&str> = risky.iter().map(|n| n.entity_name.as_str()).collect();
    assert_eq!(names, vec!["Amit"]);

    let unstable = tracker.get_unstable_nodes(1).await.unwrap();
    assert_eq!(unstable.len(), 1);
    assert_eq!(unstable[0].entity_name, "CompanyX");
}

#[tokio::test]
async fn history_is_newest_first_and_bounded() {
    let store = demo_graph().await;
    let tracker = ObservabilityTracker::with_defaults(store.clone());
    let base = tracker.get_current_metrics().await.unwrap();

    for age in [30, 3, 1] {
        let snapshot = MetricsSnapshot {
            timestamp: Utc::now() - Duration::days(age),
            ..base.clone()
        };
        tracker.store_metrics_snapshot(&snapshot).await.unwrap();
    }

    let week = tracker.get_metrics_history(7).await.unwrap();
    assert_eq!(week.len(), 2);
    assert!(week[0].timestamp > week[1].timestamp);
    assert_eq!(tracker.get_metrics_history(60).await.unwrap().len(), 3);
}

#[tokio::test]
async fn health_report_classifies_accuracy() {
    let store = demo_graph().await;
    let tracker = ObservabilityTracker::with_defaults(store.clone());
    assert_eq!(tracker.health_report().await.unwrap().status, HealthStatus::Healthy);

    ConflictDetector::with_defaults(store.clone())
        .run_detection_cycle()
        .await
        .unwrap();
    let report = tracker.health_report().await.unwrap();
    assert_eq!(report.status, HealthStatus::Critical);
    assert!((report.metrics.data_accuracy_score - 0.6).abs() < 1e-12);
}

#[tokio::test]
async fn metrics_are_exported() {
    let store = demo_graph().await;
    let registry = prometheus::Registry::new();
    let tracker = ObservabilityTracker::with_defaults(store.clone())
        .with_prometheus(&registry)
        .unwrap();
    tracker.get_current_metrics().await.unwrap();

    let text = prometheus::TextEncoder::new()
        .encode_to_string(&registry.gather())
        .unwrap();
    assert!(text.contains("nexus_graph_entities 5"));
    assert!(text.contains("nexus_graph_relationships 4"));
}
