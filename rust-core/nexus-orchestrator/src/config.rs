// SPDX-License-Identifier: PMPL-1.0-or-later
//! Runtime configuration.
//!
//! Defaults match the component defaults; environment variables override
//! them. A variable that is set but does not parse is an error.
//!
//! | Variable | Field |
//! |---|---|
//! | `TOKEN_COST_PER_1K` | healer and observe cost rate |
//! | `ACCURACY_THRESHOLD` | observe healthy accuracy |
//! | `UNSTABLE_NODE_THRESHOLD` | observe unstable change count |
//! | `HEALING_CHECK_INTERVAL` | cycle interval, seconds |
//! | `HEALING_APPLY_THRESHOLD` | minimum arbiter confidence |
//! | `HEALING_MAX_CONCURRENT` | entity groups healed at once |
//! | `OPENAI_API_KEY` / `OPENAI_MODEL` / `OPENAI_BASE_URL` | arbiter endpoint |
//! | `ARBITER_TIMEOUT_SECS` | arbiter call timeout |
//! | `NEXUS_DATA_DIR` | persistent store directory |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use nexus_conflict::DetectorConfig;
use nexus_healer::{ArbiterConfig, HealerConfig};
use nexus_observe::ObserveConfig;
use serde::{Deserialize, Serialize};

use crate::OrchestratorError;

/// Configuration for the whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NexusConfig {
    pub detector: DetectorConfig,
    pub healer: HealerConfig,
    pub observe: ObserveConfig,
    pub arbiter: ArbiterConfig,
    /// Seconds between cycles in continuous mode.
    pub healing_check_interval_secs: u64,
    pub data_dir: Option<PathBuf>,
}

impl Default for NexusConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            healer: HealerConfig::default(),
            observe: ObserveConfig::default(),
            arbiter: ArbiterConfig::default(),
            healing_check_interval_secs: 3600,
            data_dir: None,
        }
    }
}

fn parse<T: FromStr>(var: &'static str, raw: String) -> Result<T, OrchestratorError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| OrchestratorError::Config {
        var,
        value: raw.clone(),
        reason: e.to_string(),
    })
}

fn unit_interval(var: &'static str, value: f64) -> Result<f64, OrchestratorError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(OrchestratorError::Config {
            var,
            value: value.to_string(),
            reason: "must be within [0, 1]".to_string(),
        })
    }
}

impl NexusConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, OrchestratorError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden by `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, OrchestratorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("TOKEN_COST_PER_1K") {
            let rate: f64 = parse("TOKEN_COST_PER_1K", raw)?;
            if !(rate.is_finite() && rate >= 0.0) {
                return Err(OrchestratorError::Config {
                    var: "TOKEN_COST_PER_1K",
                    value: rate.to_string(),
                    reason: "must be a non-negative number".to_string(),
                });
            }
            config.healer.cost_per_1k_tokens = rate;
            config.observe.cost_per_1k_tokens = rate;
        }
        if let Some(raw) = lookup("ACCURACY_THRESHOLD") {
            config.observe.accuracy_threshold =
                unit_interval("ACCURACY_THRESHOLD", parse("ACCURACY_THRESHOLD", raw)?)?;
        }
        if let Some(raw) = lookup("UNSTABLE_NODE_THRESHOLD") {
            config.observe.unstable_node_threshold = parse("UNSTABLE_NODE_THRESHOLD", raw)?;
        }
        if let Some(raw) = lookup("HEALING_CHECK_INTERVAL") {
            config.healing_check_interval_secs = parse("HEALING_CHECK_INTERVAL", raw)?;
        }
        if let Some(raw) = lookup("HEALING_APPLY_THRESHOLD") {
            config.healer.apply_threshold =
                unit_interval("HEALING_APPLY_THRESHOLD", parse("HEALING_APPLY_THRESHOLD", raw)?)?;
        }
        if let Some(raw) = lookup("HEALING_MAX_CONCURRENT") {
            config.healer.max_concurrent_entities = parse("HEALING_MAX_CONCURRENT", raw)?;
        }
        if let Some(raw) = lookup("ARBITER_TIMEOUT_SECS") {
            config.arbiter.timeout_secs = parse("ARBITER_TIMEOUT_SECS", raw)?;
        }
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
            config.arbiter.api_key = Some(key);
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            config.arbiter.model = model;
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            config.arbiter.base_url = url;
        }
        if let Some(dir) = lookup("NEXUS_DATA_DIR").filter(|d| !d.trim().is_empty()) {
            config.data_dir = Some(PathBuf::from(dir));
        }

        if config.healing_check_interval_secs == 0 {
            return Err(OrchestratorError::Config {
                var: "HEALING_CHECK_INTERVAL",
                value: "0".to_string(),
                reason: "must be at least one second".to_string(),
            });
        }
        Ok(config)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.healing_check_interval_secs)
    }

    /// Whether a remote arbiter can be used.
    pub fn has_arbiter_credentials(&self) -> bool {
        self.arbiter.api_key.is_some()
    }
}
