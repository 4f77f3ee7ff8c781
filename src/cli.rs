//! Corridor engine CLI surface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "corridor", about = "Metric-anomaly baseline cache engine")]
pub struct Cli {
    /// Path to config.toml; defaults to ~/.corridor/config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the manager loop, periodically sweeping TTL-expired cache rows.
    Serve {
        /// Seconds between TTL sweeps.
        #[arg(long, default_value_t = 60)]
        sweep_interval_secs: u64,
    },
    /// Get or build a corridor model for one fingerprint.
    Query {
        #[arg(long)]
        query_id: String,
        #[arg(long)]
        instance_id: String,
        /// Register/refresh this instance's base URL before querying.
        #[arg(long)]
        instance_base_url: Option<String>,
        #[arg(long)]
        metric_query: String,
        /// JSON object of labels, e.g. '{"host":"a"}'
        #[arg(long, default_value = "{}")]
        labels: String,
        #[arg(long)]
        start: i64,
        #[arg(long)]
        end: i64,
    },
    /// Remove a cached fingerprint, forcing the next query to rebuild.
    Invalidate {
        #[arg(long)]
        metric_query: String,
        #[arg(long, default_value = "{}")]
        labels: String,
    },
    /// Print cache/lease counters.
    Stats,
}
