pub mod invalidate;
pub mod query;
pub mod serve;
pub mod stats;

use crate::config::Config;
use crate::http::HttpTransport;
use crate::manager::StatsCacheManager;
use crate::source::{HttpMetricSource, MetricSource};
use crate::store::Store;
use anyhow::{Context as _, Result};
use std::sync::Arc;

/// The store/source/manager trio every subcommand needs, built once from a
/// loaded `Config`.
pub struct Handles {
    pub store: Arc<Store>,
    pub manager: StatsCacheManager,
}

pub fn build_context(config: &Config) -> Result<Handles> {
    let store = Arc::new(Store::open(&config.cache.database.path).context("open cache store")?);
    let transport = HttpTransport::new(&config.metric_source).context("build http transport")?;
    let source: Arc<dyn MetricSource> = Arc::new(HttpMetricSource::new(store.clone(), transport));
    let manager = StatsCacheManager::new(store.clone(), source, config.clone());
    Ok(Handles { store, manager })
}

pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
