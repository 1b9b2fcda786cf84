//! Replay a scripted discussion through the consensus engine.
//!
//! # Usage
//!
//! ```bash
//! # Replay a scenario and print the final report
//! consensus-replay demos/cache_rollout.toml
//!
//! # Custom thresholds, persisted state
//! consensus-replay demos/cache_rollout.toml --config engine.toml --snapshot-out state.json
//!
//! # Continue from a saved state
//! CONSENSUS_TOTAL_ROUNDS=12 consensus-replay next_rounds.toml --restore state.json
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use consensus_coordination::{EngineConfig, Scenario, Tracker};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario TOML with the rounds to replay
    scenario: PathBuf,

    /// Engine config TOML (missing sections keep their defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the tracker state as JSON after the replay
    #[arg(long)]
    snapshot_out: Option<PathBuf>,

    /// Start from a JSON state written by --snapshot-out
    #[arg(long)]
    restore: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("consensus_coordination=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load engine config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config
        .apply_env()
        .context("Invalid CONSENSUS_* environment override")?;

    let mut tracker = Tracker::with_config(&config);
    if let Some(path) = &args.restore {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        tracker
            .restore_json(&json)
            .with_context(|| format!("Failed to restore snapshot {}", path.display()))?;
        tracing::info!(path = %path.display(), round = tracker.current_round(), "Resuming from snapshot");
    }

    let scenario = Scenario::load(&args.scenario)?;
    let summary = scenario.replay(&mut tracker);

    if let Some(path) = &args.snapshot_out {
        let json = tracker.export_json().context("Failed to serialize tracker state")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        tracing::info!(path = %path.display(), "Snapshot written");
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Failed to serialize report")?
    );
    Ok(())
}
