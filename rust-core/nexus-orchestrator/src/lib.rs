// SPDX-License-Identifier: PMPL-1.0-or-later
//! Nexus Orchestrator
//!
//! Wires ingestion, detection, healing and observability to one store and
//! runs them as a cycle, once or on an interval.

pub mod config;
pub mod demo;
pub mod pipeline;
pub mod runner;

use nexus_conflict::DetectorError;
use nexus_graph::GraphError;
use nexus_healer::HealerError;
use nexus_ingest::IngestError;
use nexus_observe::ObserveError;
use thiserror::Error;

pub use config::NexusConfig;
pub use pipeline::{CycleReport, Pipeline};
pub use runner::{CycleRunner, RunnerStats};

/// Orchestrator errors
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid configuration {var}={value:?}: {reason}")]
    Config {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Store error: {0}")]
    Store(#[from] GraphError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Detection error: {0}")]
    Detector(#[from] DetectorError),

    #[error("Healing error: {0}")]
    Healer(#[from] HealerError),

    #[error("Observability error: {0}")]
    Observe(#[from] ObserveError),

    #[error("Persistent storage requested but the `persistent` feature is not enabled")]
    PersistenceDisabled,
}
