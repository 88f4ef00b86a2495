//! stop-clusters - derive stop events from a vehicle GPS trace
//!
//! Usage:
//!   stop-clusters run --input trace.csv [--out-dir output] [--model st-dbscan]
//!   stop-clusters validate --input output/gps_clusters.csv
//!   stop-clusters sample --output gps_records_sample.csv
//!
//! Module structure:
//! - `domain/` - Trace, stop and error types
//! - `services/` - Clustering adapters, aggregation, join, validation
//! - `io/` - CSV ingestion and result egress
//! - `infra/` - Configuration

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::PathBuf;
use stop_clusters::infra::{Config, ModelKind};
use stop_clusters::io::{read_enriched, read_trace_file, write_output, write_sample};
use stop_clusters::services::{build_model, run_pipeline};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Stop clusters - GPS dwell detection for a single vehicle
#[derive(Parser, Debug)]
#[command(name = "stop-clusters", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cluster a trace and write enriched points and stop tables
    Run {
        /// CSV trace with route_id, lat, lon, datetime, unixtime
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory (overrides config)
        #[arg(short, long)]
        out_dir: Option<String>,

        /// Cluster assignment model (overrides config)
        #[arg(short, long, value_enum)]
        model: Option<ModelKind>,
    },

    /// Re-validate an exported enriched points CSV
    Validate {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Write the bundled sample trace
    Sample {
        #[arg(short, long, default_value = "gps_records_sample.csv")]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-stage visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    info!(version = env!("CARGO_PKG_VERSION"), git_hash = env!("GIT_HASH"), "stop_clusters_starting");

    let config_path = Config::resolve_config_path(args.config.as_deref());
    let mut config = Config::load_from_path(&config_path);

    match args.command {
        Command::Run { input, out_dir, model } => {
            if let Some(model) = model {
                config = config.with_model(model);
            }
            if let Some(dir) = out_dir {
                config = config.with_output_dir(&dir);
            }
            info!(
                config_file = %config.config_file(),
                input = %input.display(),
                model = %config.model().as_str(),
                eps_meters = %config.clustering().eps_meters,
                eps_seconds = %config.clustering().eps_seconds,
                min_samples = %config.clustering().min_samples,
                output_dir = %config.output_dir(),
                "config_loaded"
            );

            let trace = read_trace_file(&input, config.delimiter())
                .with_context(|| format!("Failed to load trace {}", input.display()))?;
            let model = build_model(config.clustering(), trace.labels)?;
            let output = run_pipeline(trace.points, &*model)?;
            output.summary.log();

            write_output(&config, &output)?;
        }
        Command::Validate { input } => {
            let file = File::open(&input).with_context(|| format!("Failed to open {}", input.display()))?;
            let points = read_enriched(file, config.delimiter())
                .with_context(|| format!("Validation failed for {}", input.display()))?;
            let stops = points.iter().filter(|p| p.stop.is_some()).count();
            info!(input = %input.display(), rows = %points.len(), rows_with_stop = %stops, "table_valid");
        }
        Command::Sample { output } => {
            write_sample(&output)?;
        }
    }

    Ok(())
}
