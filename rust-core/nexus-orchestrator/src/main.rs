// SPDX-License-Identifier: PMPL-1.0-or-later
//! Nexus command line.
//!
//! Runs one pipeline stage, or the full cycle, against the configured
//! store. `--continuous` keeps healing on an interval until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use nexus_graph::{GraphStore, InMemoryGraphStore};
use nexus_healer::{Arbiter, HttpArbiter, LatestEvidenceArbiter};
use nexus_orchestrator::demo::ingest_demo;
use nexus_orchestrator::{CycleRunner, NexusConfig, OrchestratorError, Pipeline};
use prometheus::{Registry, TextEncoder};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Create constraints and indexes.
    Setup,
    /// Load the demonstration facts.
    Demo,
    /// Scan for conflicts and log them.
    Detect,
    /// Detect, then resolve conflicts through the arbiter.
    Heal,
    /// Mark unstable nodes and report graph health.
    Observe,
    /// Setup, demo, then one complete cycle.
    Full,
}

/// Self-healing temporal knowledge graph.
#[derive(Parser, Debug)]
#[command(name = "nexus", version, about = "Self-healing temporal knowledge graph")]
struct Cli {
    /// Stage to run.
    #[arg(long, value_enum, default_value_t = Mode::Full)]
    mode: Mode,

    /// Keep running detect, heal and observe cycles until interrupted.
    #[arg(long)]
    continuous: bool,

    /// Seconds between continuous cycles. Overrides HEALING_CHECK_INTERVAL.
    #[arg(long)]
    interval: Option<u64>,

    /// Directory for the persistent store. Overrides NEXUS_DATA_DIR.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Resolve conflicts locally by recency instead of calling a model.
    #[arg(long)]
    offline: bool,

    /// Print Prometheus metrics on exit.
    #[arg(long)]
    print_metrics: bool,
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("NEXUS_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn open_store(config: &NexusConfig) -> Result<Arc<dyn GraphStore>, OrchestratorError> {
    match &config.data_dir {
        #[cfg(feature = "persistent")]
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                OrchestratorError::Store(nexus_graph::GraphError::StoreUnavailable(format!(
                    "{}: {e}",
                    dir.display()
                )))
            })?;
            let store = nexus_graph::RedbGraphStore::persistent(dir.join("nexus.redb"))?;
            info!(path = %dir.display(), "Using persistent store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "persistent"))]
        Some(_) => Err(OrchestratorError::PersistenceDisabled),
        None => {
            info!("Using in-memory store");
            Ok(Arc::new(InMemoryGraphStore::new()))
        }
    }
}

fn choose_arbiter(config: &NexusConfig, offline: bool) -> Arc<dyn Arbiter> {
    if offline {
        return Arc::new(LatestEvidenceArbiter::default());
    }
    if !config.has_arbiter_credentials() {
        warn!("OPENAI_API_KEY not set, falling back to the recency arbiter");
        return Arc::new(LatestEvidenceArbiter::default());
    }
    Arc::new(HttpArbiter::new(config.arbiter.clone()))
}

fn print_json<T: Serialize>(label: &str, value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("rendering report")?;
    println!("== {label} ==\n{rendered}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

async fn run_mode(pipeline: &Pipeline, mode: Mode, shutdown: watch::Receiver<bool>) -> Result<()> {
    match mode {
        Mode::Setup => {
            print_json("schema", &pipeline.setup().await?)?;
        }
        Mode::Demo => {
            pipeline.setup().await?;
            load_demo(pipeline).await?;
        }
        Mode::Detect => {
            let (conflicts, stats) = pipeline.detector().run_detection_cycle_with_stats().await?;
            print_json("detection", &stats)?;
            print_json("conflicts", &conflicts)?;
        }
        Mode::Heal => {
            let (stats, summary) = pipeline.detect_and_heal(shutdown).await?;
            print_json("detection", &stats)?;
            print_json("healing", &summary)?;
        }
        Mode::Observe => {
            observe(pipeline, true).await?;
        }
        Mode::Full => {
            pipeline.setup().await?;
            load_demo(pipeline).await?;
            let report = pipeline.run_cycle_until(shutdown).await?;
            print_json("cycle", &report)?;
            observe(pipeline, false).await?;
        }
    }
    Ok(())
}

async fn load_demo(pipeline: &Pipeline) -> Result<()> {
    let mut ingested = Vec::new();
    for result in ingest_demo(pipeline.ingestion()).await {
        match result {
            Ok(fact) => ingested.push(fact),
            Err(e) => warn!(error = %e, "Demo fact rejected"),
        }
    }
    print_json("ingested", &ingested)
}

/// Report health. With `record`, also mark unstable nodes and store a snapshot.
async fn observe(pipeline: &Pipeline, record: bool) -> Result<()> {
    let tracker = pipeline.tracker();
    if record {
        tracker.mark_unstable_nodes().await?;
    }
    let report = tracker.health_report().await?;
    if record {
        tracker.store_metrics_snapshot(&report.metrics).await?;
    }
    print_json("health", &report)?;
    print_json("high risk", &tracker.get_high_risk_nodes(5).await?)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = NexusConfig::from_env()?;
    if let Some(secs) = cli.interval {
        anyhow::ensure!(secs > 0, "--interval must be at least one second");
        config.healing_check_interval_secs = secs;
    }
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = Some(dir);
    }

    let store = open_store(&config)?;
    if config.data_dir.is_none() && !matches!(cli.mode, Mode::Full | Mode::Setup | Mode::Demo) {
        warn!(mode = ?cli.mode, "In-memory store starts empty; use --data-dir to keep state between runs");
    }
    let arbiter = choose_arbiter(&config, cli.offline);
    let registry = Registry::new();
    let pipeline = Arc::new(Pipeline::new(store, arbiter, &config).with_prometheus(&registry)?);
    info!(mode = ?cli.mode, arbiter = pipeline.engine().arbiter_name(), "Nexus starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping after the current conflict");
            shutdown_tx.send_replace(true);
        }
    });

    run_mode(&pipeline, cli.mode, shutdown_rx.clone()).await?;

    if cli.continuous && !*shutdown_rx.borrow() {
        let runner = CycleRunner::new(pipeline.clone(), config.interval());
        let stats = runner.run(shutdown_rx).await;
        print_json("runner", &stats)?;
    }

    let status = pipeline.engine().status().await;
    print_json("healer", &status)?;

    if cli.print_metrics {
        let text = TextEncoder::new()
            .encode_to_string(&registry.gather())
            .context("encoding metrics")?;
        println!("{text}");
    }
    Ok(())
}
