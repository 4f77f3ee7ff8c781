use crate::commands::build_context;
use crate::config::Config;
use anyhow::Result;
use colored::Colorize;

pub fn run(config: &Config, metric_query: &str, labels: &str) -> Result<()> {
    let ctx = build_context(config)?;
    ctx.manager.invalidate(metric_query, labels)?;
    println!("{} invalidated cache entry for '{}'", "ok:".green().bold(), metric_query);
    Ok(())
}
