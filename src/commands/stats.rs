use crate::commands::build_context;
use crate::config::Config;
use anyhow::Result;

pub fn run(config: &Config) -> Result<()> {
    let ctx = build_context(config)?;
    let counters = ctx.store.counters()?;
    println!("dft_cache rows       : {}", counters.dft_rows);
    println!("  fresh               : {}", counters.fresh_rows);
    println!("  placeholder         : {}", counters.placeholder_rows);
    println!("metrics_cache_permanent rows: {}", counters.permanent_rows);
    println!("active build leases   : {}", counters.active_leases);
    Ok(())
}
