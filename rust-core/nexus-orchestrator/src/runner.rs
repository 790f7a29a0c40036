// SPDX-License-Identifier: PMPL-1.0-or-later
//! Periodic cycle runner.
//!
//! At most one cycle is in flight. A tick that arrives while a cycle is
//! still running is skipped and counted, never queued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::pipeline::{CycleReport, Pipeline};
use crate::OrchestratorError;

/// Counters for a runner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerStats {
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

/// Runs pipeline cycles on a fixed interval.
pub struct CycleRunner {
    pipeline: Arc<Pipeline>,
    period: Duration,
    in_flight: Arc<Mutex<()>>,
    counters: Arc<Counters>,
}

impl CycleRunner {
    pub fn new(pipeline: Arc<Pipeline>, period: Duration) -> Self {
        Self {
            pipeline,
            period,
            in_flight: Arc::new(Mutex::new(())),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn stats(&self) -> RunnerStats {
        RunnerStats {
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            skipped: self.counters.skipped.load(Ordering::SeqCst),
        }
    }

    /// Run one cycle now unless one is already running.
    ///
    /// Returns `Ok(None)` when skipped.
    pub async fn trigger(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Option<CycleReport>, OrchestratorError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            self.counters.skipped.fetch_add(1, Ordering::SeqCst);
            warn!("Previous cycle still running, skipping");
            return Ok(None);
        };
        match self.pipeline.run_cycle_until(shutdown).await {
            Ok(report) => {
                self.counters.completed.fetch_add(1, Ordering::SeqCst);
                Ok(Some(report))
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Tick until `shutdown` turns true, then wait for the in-flight cycle.
    ///
    /// The first cycle starts one full period after the call.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> RunnerStats {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        let mut stop = shutdown.clone();
        info!(period = ?self.period, "Continuous mode started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let guard = match self.in_flight.clone().try_lock_owned() {
                        Ok(guard) => guard,
                        Err(_) => {
                            self.counters.skipped.fetch_add(1, Ordering::SeqCst);
                            warn!("Previous cycle still running, skipping");
                            continue;
                        }
                    };
                    let pipeline = self.pipeline.clone();
                    let counters = self.counters.clone();
                    let cycle_shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        let _guard = guard;
                        match pipeline.run_cycle_until(cycle_shutdown).await {
                            Ok(_) => {
                                counters.completed.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(e) => {
                                counters.failed.fetch_add(1, Ordering::SeqCst);
                                error!(error = %e, "Scheduled cycle failed");
                            }
                        }
                    });
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        // Let the in-flight cycle finish its current conflict and wrap up.
        let _drained = self.in_flight.lock().await;
        let stats = self.stats();
        info!(
            completed = stats.completed,
            failed = stats.failed,
            skipped = stats.skipped,
            "Continuous mode stopped"
        );
        stats
    }
}
