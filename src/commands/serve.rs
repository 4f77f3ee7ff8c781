use crate::commands::{build_context, now_unix};
use crate::config::Config;
use anyhow::Result;
use std::time::Duration;
use tracing::info;

/// Run the TTL sweep loop until the process is killed. The manager itself is
/// stateless per call — `serve` only owns the periodic housekeeping; actual
/// rebuilds happen lazily inside whatever process calls `recalculate_stats`
/// (e.g. via `corridor query`, or an embedding application using this crate
/// as a library).
pub fn run(config: &Config, sweep_interval_secs: u64) -> Result<()> {
    let ctx = build_context(config)?;
    info!(sweep_interval_secs, "corridor engine serving, sweeping expired cache rows");
    loop {
        let swept = ctx.store.sweep_expired(now_unix())?;
        if swept > 0 {
            info!(swept, "sweep removed expired dft_cache rows");
        }
        std::thread::sleep(Duration::from_secs(sweep_interval_secs));
    }
}
