// SPDX-License-Identifier: PMPL-1.0-or-later
//! One detect, heal, observe cycle over a shared store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use nexus_conflict::{ConflictDetector, DetectionStats};
use nexus_graph::{GraphStore, MetricsSnapshot, SchemaReport};
use nexus_healer::{Arbiter, HealSummary, SelfCorrectionEngine};
use nexus_ingest::TemporalIngestion;
use nexus_observe::ObservabilityTracker;
use prometheus::Registry;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, instrument};

use crate::config::NexusConfig;
use crate::OrchestratorError;

/// Result of one pipeline cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub detection: DetectionStats,
    pub healing: HealSummary,
    /// Entities newly flagged unstable by this cycle.
    pub newly_unstable: usize,
    pub metrics: MetricsSnapshot,
}

/// Every component wired to one store.
pub struct Pipeline {
    store: Arc<dyn GraphStore>,
    ingestion: TemporalIngestion,
    detector: ConflictDetector,
    engine: SelfCorrectionEngine,
    tracker: ObservabilityTracker,
}

impl Pipeline {
    pub fn new(store: Arc<dyn GraphStore>, arbiter: Arc<dyn Arbiter>, config: &NexusConfig) -> Self {
        Self {
            ingestion: TemporalIngestion::new(store.clone()),
            detector: ConflictDetector::new(store.clone(), config.detector.clone()),
            engine: SelfCorrectionEngine::new(store.clone(), arbiter, config.healer.clone()),
            tracker: ObservabilityTracker::new(store.clone(), config.observe.clone()),
            store,
        }
    }

    /// Register healer counters and graph gauges on `registry`.
    pub fn with_prometheus(mut self, registry: &Registry) -> Result<Self, OrchestratorError> {
        self.engine = self.engine.with_prometheus(registry)?;
        self.tracker = self.tracker.with_prometheus(registry)?;
        Ok(self)
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn ingestion(&self) -> &TemporalIngestion {
        &self.ingestion
    }

    pub fn detector(&self) -> &ConflictDetector {
        &self.detector
    }

    pub fn engine(&self) -> &SelfCorrectionEngine {
        &self.engine
    }

    pub fn tracker(&self) -> &ObservabilityTracker {
        &self.tracker
    }

    pub async fn setup(&self) -> Result<SchemaReport, OrchestratorError> {
        let report = self.store.setup_schema().await?;
        info!(
            backend = self.store.name(),
            created = report.created.len(),
            existing = report.existing.len(),
            "Schema ready"
        );
        Ok(report)
    }

    /// Detect conflicts, then heal those not already resolved.
    pub async fn detect_and_heal(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(DetectionStats, HealSummary), OrchestratorError> {
        let (conflicts, stats) = self.detector.run_detection_cycle_with_stats().await?;
        let pending: Vec<_> = conflicts.into_iter().filter(|c| !c.resolved).collect();
        let summary = self.engine.heal_all_conflicts_until(&pending, shutdown).await;
        Ok((stats, summary))
    }

    /// Run one full cycle without an external stop signal.
    pub async fn run_cycle(&self) -> Result<CycleReport, OrchestratorError> {
        let (_keep_open, shutdown) = watch::channel(false);
        self.run_cycle_until(shutdown).await
    }

    /// Detect, heal, mark unstable nodes, snapshot metrics.
    ///
    /// A shutdown signal stops healing between conflicts; the remaining
    /// steps still run so the stored snapshot reflects the partial cycle.
    #[instrument(skip(self, shutdown))]
    pub async fn run_cycle_until(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<CycleReport, OrchestratorError> {
        let started_at = Utc::now();
        let (detection, healing) = self.detect_and_heal(shutdown).await?;
        let newly_unstable = self.tracker.mark_unstable_nodes().await?;
        let metrics = self.tracker.get_current_metrics().await?;
        self.tracker.store_metrics_snapshot(&metrics).await?;

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            detection,
            healing,
            newly_unstable,
            metrics,
        };
        info!(
            detected = report.detection.detected,
            healed = report.healing.successful,
            abandoned = report.healing.abandoned,
            accuracy = report.metrics.data_accuracy_score,
            "Cycle complete"
        );
        Ok(report)
    }
}
