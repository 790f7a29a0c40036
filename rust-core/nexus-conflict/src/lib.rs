// SPDX-License-Identifier: PMPL-1.0-or-later
//! Nexus Conflict Detection
//!
//! Scans the graph for semantic collisions: entities holding several edges
//! of the same type, and entities holding low-confidence or stale edges.
//! Each finding becomes a [`Conflict`] with a deterministic identifier, so
//! repeated scans of an unchanged graph yield the same conflicts.
//!
//! [`ConflictDetector::detect_all_conflicts`] is read-only.
//! [`ConflictDetector::run_detection_cycle`] additionally flags entities and
//! writes the conflict log.

pub mod model;
pub mod scan;
pub mod severity;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use nexus_graph::{ConflictLogWrite, GraphError, GraphStore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

pub use model::{Conflict, DetectionMethod};
pub use nexus_graph::Severity;
pub use severity::{assess_severity, assess_severity_within, RECENT_WINDOW_DAYS};

/// Conflict detection errors
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Store error: {0}")]
    Store(#[from] GraphError),

    #[error("Invalid conflict log record: {0}")]
    InvalidLogRecord(String),
}

/// Detector thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Edges younger than this many days count as recent for severity.
    pub recent_window_days: i64,
    /// Edges below this confidence are suspect.
    pub low_confidence_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            recent_window_days: RECENT_WINDOW_DAYS,
            low_confidence_threshold: 0.7,
        }
    }
}

/// Counters from one detection cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionStats {
    pub detected: usize,
    pub logged: usize,
    pub refreshed: usize,
    pub already_resolved: usize,
    #[serde(default)]
    pub reopened: usize,
    pub entities_flagged: usize,
}

/// Conflict detector over a shared graph store.
pub struct ConflictDetector {
    store: Arc<dyn GraphStore>,
    config: DetectorConfig,
}

impl ConflictDetector {
    pub fn new(store: Arc<dyn GraphStore>, config: DetectorConfig) -> Self {
        Self { store, config }
    }

    pub fn with_defaults(store: Arc<dyn GraphStore>) -> Self {
        Self::new(store, DetectorConfig::default())
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    // -- pure scans ----------------------------------------------------------

    /// Entities with more than one outgoing edge of the same type.
    pub async fn detect_duplicate_relationships(&self) -> Result<Vec<Conflict>, DetectorError> {
        let entities = self.store.list_entities().await?;
        let relationships = self.store.list_relationships().await?;
        Ok(scan::duplicate_conflicts(
            &entities,
            &relationships,
            Utc::now(),
            &self.config,
        ))
    }

    /// Entities with low-confidence or non-current edges.
    pub async fn detect_low_confidence(&self) -> Result<Vec<Conflict>, DetectorError> {
        let entities = self.store.list_entities().await?;
        let relationships = self.store.list_relationships().await?;
        Ok(scan::low_confidence_conflicts(
            &entities,
            &relationships,
            Utc::now(),
            &self.config,
        ))
    }

    /// Both scans, unioned. Never writes to the store.
    pub async fn detect_all_conflicts(&self) -> Result<Vec<Conflict>, DetectorError> {
        self.detect_all_conflicts_at(Utc::now()).await
    }

    /// Both scans evaluated at a fixed detection time.
    pub async fn detect_all_conflicts_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Conflict>, DetectorError> {
        let entities = self.store.list_entities().await?;
        let relationships = self.store.list_relationships().await?;
        let conflicts = scan::all_conflicts(&entities, &relationships, now, &self.config);
        debug!(count = conflicts.len(), "Conflict scan complete");
        Ok(conflicts)
    }

    // -- detection cycle -----------------------------------------------------

    /// Detect, log and flag.
    ///
    /// Each conflict's log record is inserted or refreshed and its entity is
    /// flagged `has_conflict`. Conflicts whose log is already resolved for the
    /// same edges are returned with `resolved = true` and do not re-flag their
    /// entity. A resolved log that meets a new edge is reopened and flagged.
    #[instrument(skip(self))]
    pub async fn run_detection_cycle(&self) -> Result<Vec<Conflict>, DetectorError> {
        let (conflicts, _) = self.run_detection_cycle_with_stats().await?;
        Ok(conflicts)
    }

    pub async fn run_detection_cycle_with_stats(
        &self,
    ) -> Result<(Vec<Conflict>, DetectionStats), DetectorError> {
        let mut conflicts = self.detect_all_conflicts().await?;
        let mut stats = DetectionStats {
            detected: conflicts.len(),
            ..Default::default()
        };

        for conflict in &mut conflicts {
            match self.store.upsert_conflict_log(conflict.to_log_record()).await? {
                ConflictLogWrite::AlreadyResolved => {
                    conflict.resolved = true;
                    stats.already_resolved += 1;
                    continue;
                }
                ConflictLogWrite::Inserted => stats.logged += 1,
                ConflictLogWrite::Refreshed => stats.refreshed += 1,
                ConflictLogWrite::Reopened => {
                    stats.reopened += 1;
                    info!(conflict_id = %conflict.conflict_id, "Resolved conflict reopened by new evidence");
                }
            }

            if self
                .store
                .flag_conflict(&conflict.entity_id, &conflict.description, conflict.detected_at)
                .await?
            {
                stats.entities_flagged += 1;
            }

            info!(
                conflict_id = %conflict.conflict_id,
                entity_id = %conflict.entity_id,
                severity = %conflict.severity,
                "Conflict detected"
            );
        }

        info!(
            detected = stats.detected,
            logged = stats.logged,
            refreshed = stats.refreshed,
            already_resolved = stats.already_resolved,
            reopened = stats.reopened,
            "Detection cycle complete"
        );
        Ok((conflicts, stats))
    }

    /// Unresolved conflicts from the persisted log.
    pub async fn unresolved_from_log(&self) -> Result<Vec<Conflict>, DetectorError> {
        self.store
            .list_conflict_logs()
            .await?
            .into_iter()
            .filter(|record| !record.resolved)
            .map(Conflict::from_log_record)
            .collect()
    }
}
