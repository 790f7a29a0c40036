// SPDX-License-Identifier: PMPL-1.0-or-later

use prometheus::{Counter, Gauge, Registry};

use crate::HealerError;

/// Prometheus handles for healing outcomes.
#[derive(Clone)]
pub(crate) struct HealerMetrics {
    pub corrections: Counter,
    pub skipped: Counter,
    pub failures: Counter,
    pub tokens: Counter,
    pub cost: Gauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<Counter, HealerError> {
    let counter = Counter::new(name, help).map_err(|e| HealerError::Metrics(e.to_string()))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| HealerError::Metrics(e.to_string()))?;
    Ok(counter)
}

impl HealerMetrics {
    pub fn register(registry: &Registry) -> Result<Self, HealerError> {
        let cost = Gauge::new(
            "nexus_healer_cost_total",
            "Running arbiter cost in configured currency units",
        )
        .map_err(|e| HealerError::Metrics(e.to_string()))?;
        registry
            .register(Box::new(cost.clone()))
            .map_err(|e| HealerError::Metrics(e.to_string()))?;

        Ok(Self {
            corrections: counter(registry, "nexus_healer_corrections_total", "Corrections applied")?,
            skipped: counter(registry, "nexus_healer_skipped_total", "Conflicts skipped without correction")?,
            failures: counter(registry, "nexus_healer_failures_total", "Corrections that failed mid-apply")?,
            tokens: counter(registry, "nexus_healer_tokens_total", "Arbiter tokens consumed")?,
            cost,
        })
    }
}
