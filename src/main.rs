//! Corridor engine entry point: parse CLI args, load config, dispatch.

use clap::Parser;
use colored::Colorize;
use corridor_engine::cli::{Cli, Commands};
use corridor_engine::commands::{invalidate, query, serve, stats};
use corridor_engine::config::Config;
use std::process::exit;

fn main() {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config);

    init_logging(&config);

    let result = match &cli.command {
        Commands::Serve { sweep_interval_secs } => serve::run(&config, *sweep_interval_secs),
        Commands::Query { query_id, instance_id, instance_base_url, metric_query, labels, start, end } => {
            query::run(&config, query_id, instance_id, instance_base_url.as_deref(), metric_query, labels, *start, *end)
        }
        Commands::Invalidate { metric_query, labels } => invalidate::run(&config, metric_query, labels),
        Commands::Stats => stats::run(&config),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "error:".bright_red().bold(), e);
        exit(1);
    }
}

fn init_logging(config: &Config) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let filename = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("corridor.log"));
            let file_appender = tracing_appender::rolling::daily(dir, filename);
            subscriber.with_writer(file_appender).with_ansi(false).init();
        }
        None => {
            subscriber.init();
        }
    }
}
