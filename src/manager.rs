//! Stats Cache Manager (spec.md §4.E): the orchestrator tying the signal
//! kernel, data processor, anomaly detector, cache store, and metric source
//! adapter together behind `recalculate_stats`.
//!
//! Freshness state machine: `Absent -> Placeholder -> Fresh -> Stale ->
//! Fresh`, with `invalidate` resetting to `Absent` from any state. Exactly
//! one thread per `(query_id, metric_hash)` performs a rebuild at a time —
//! everyone else either reads the placeholder/stale row through or waits on
//! the in-process lease (spec.md §5, §9).

use crate::anomaly;
use crate::config::Config;
use crate::error::{CorridorError, Result};
use crate::hash::{canonicalize_labels, metric_hash};
use crate::kernel;
use crate::lease::LeaseManager;
use crate::processor::{self, Sample};
use crate::source::MetricSource;
use crate::store::model::{CorridorModel, Freshness, SCHEMA_VERSION};
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct StatsCacheManager {
    store: Arc<Store>,
    source: Arc<dyn MetricSource>,
    leases: LeaseManager,
    config: Config,
    /// Identifies this process's lease acquisitions in the `build_leases`
    /// table; distinct manager instances never collide on a held lease.
    holder_id: String,
}

/// What the caller asked for and what they got back, including whether this
/// call was the one that performed the rebuild.
pub struct Outcome {
    pub model: CorridorModel,
    pub rebuilt: bool,
}

impl StatsCacheManager {
    pub fn new(store: Arc<Store>, source: Arc<dyn MetricSource>, config: Config) -> Self {
        Self {
            store,
            source,
            leases: LeaseManager::new(),
            config,
            holder_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Fingerprint a `(query, labels_json)` pair into `(metric_hash, labels_canonical_json)`.
    pub fn fingerprint(&self, query: &str, labels_json: &str) -> Result<(String, String)> {
        let canonical = canonicalize_labels(labels_json)?;
        Ok((metric_hash(query, &canonical), canonical))
    }

    /// Get or build the corridor model for `(query_id, query, labels_json)`
    /// against `instance_id`, `start..end` at `step_seconds`.
    pub fn recalculate_stats(
        &self,
        query_id: &str,
        instance_id: &str,
        query: &str,
        labels_json: &str,
        start: i64,
        end: i64,
        now: i64,
    ) -> Result<Outcome> {
        let (hash, canonical_labels) = self.fingerprint(query, labels_json)?;
        let config_hash = self.config.config_hash();
        self.store.register_query(query_id, query, &canonical_labels, &hash, now)?;

        let (freshness, cached) = self.store.load(&hash, &config_hash, now)?;
        match freshness {
            Freshness::Fresh => {
                return Ok(Outcome { model: cached.expect("fresh row carries a payload"), rebuilt: false });
            }
            Freshness::Placeholder => {
                // Someone else is building it, or placeholder seeding raced
                // ahead of the build. Wait for the in-process lease if held
                // here; otherwise fall through and attempt to build — the
                // store-level lease (INSERT OR IGNORE) is the real guard
                // against duplicate work across processes.
                self.leases.wait_for_release(query_id, &hash, Duration::from_secs(self.config.cache.build_timeout_secs))?;
                let (freshness, cached) = self.store.load(&hash, &config_hash, now)?;
                if freshness == Freshness::Fresh {
                    return Ok(Outcome { model: cached.expect("fresh row carries a payload"), rebuilt: false });
                }
            }
            Freshness::Stale => {
                // Serve the stale row immediately and kick a rebuild; the
                // caller who triggers the rebuild is told `rebuilt = true`,
                // everyone else just gets the stale data back fast.
                if self.store.try_acquire_lease(query_id, &hash, self.holder_id.as_str(), now, self.config.cache.build_timeout_secs as i64)? {
                    let guard = self.leases.try_acquire(query_id, &hash);
                    let rebuild = self.rebuild(query_id, instance_id, query, &hash, &config_hash, &canonical_labels, start, end, now);
                    self.store.release_lease(query_id, &hash, self.holder_id.as_str())?;
                    drop(guard);
                    if let Ok(model) = rebuild {
                        return Ok(Outcome { model, rebuilt: true });
                    }
                }
                return Ok(Outcome { model: cached.expect("stale row carries a payload"), rebuilt: false });
            }
            Freshness::Absent => {}
        }

        if !self.store.try_acquire_lease(query_id, &hash, self.holder_id.as_str(), now, self.config.cache.build_timeout_secs as i64)? {
            self.leases.wait_for_release(query_id, &hash, Duration::from_secs(self.config.cache.build_timeout_secs))?;
            let (freshness, cached) = self.store.load(&hash, &config_hash, now)?;
            return match (freshness, cached) {
                (Freshness::Fresh, Some(model)) => Ok(Outcome { model, rebuilt: false }),
                _ => Err(CorridorError::LeaseTimeout),
            };
        }

        self.store.seed_placeholder(&hash, &config_hash, now, self.config.cache.database.max_ttl_secs)?;
        let guard = self.leases.try_acquire(query_id, &hash);
        let result = self.rebuild(query_id, instance_id, query, &hash, &config_hash, &canonical_labels, start, end, now);
        self.store.release_lease(query_id, &hash, self.holder_id.as_str())?;
        drop(guard);

        let model = result?;
        Ok(Outcome { model, rebuilt: true })
    }

    pub fn invalidate(&self, query: &str, labels_json: &str) -> Result<()> {
        let (hash, _) = self.fingerprint(query, labels_json)?;
        self.store.invalidate(&hash)
    }

    #[allow(clippy::too_many_arguments)]
    fn rebuild(
        &self,
        query_id: &str,
        instance_id: &str,
        query: &str,
        hash: &str,
        config_hash: &str,
        _canonical_labels: &str,
        start: i64,
        end: i64,
        now: i64,
    ) -> Result<CorridorModel> {
        info!(query_id, metric_hash = hash, "rebuilding corridor model");

        let samples = self.source.query_range(instance_id, query, start, end, self.config.history.step_seconds)?;
        let Some((actual_start, actual_end)) = processor::actual_data_range(&samples) else {
            warn!(query_id, "no data returned for rebuild window");
            return Err(CorridorError::UpstreamUnavailable("empty query_range response".to_string()));
        };

        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        let shape = kernel::fit(&values, self.config.dft.max_coefficients);

        let bounds = processor::calculate_bounds(
            &samples,
            actual_start,
            actual_end,
            self.config.history.step_seconds,
            self.config.corridor_params.rolling_window,
            self.config.corridor_params.default_percentiles,
            self.config.corridor_params.max_gap_steps,
        );

        let mut stats = anomaly::detect(
            &samples,
            &bounds,
            self.config.corridor_params.min_run_steps,
            self.config.history.step_seconds,
        );
        if let Some(historical) = self.store.load_anomaly_l1(hash)? {
            stats.weighted_integral_sum =
                anomaly::weighted_integral(stats.weighted_integral_sum, historical.weighted_integral_sum, 0.3);
        }

        let model = CorridorModel { schema_version: SCHEMA_VERSION, shape, bounds, anomaly_stats: stats };

        self.store.store_fresh(hash, config_hash, &model, now, self.config.cache.database.max_ttl_secs)?;
        self.store.store_permanent(hash, config_hash, &model, now)?;
        self.store.store_anomaly_l1(hash, &model.anomaly_stats, now)?;

        Ok(model)
    }
}
