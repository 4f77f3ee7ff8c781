//! End-to-end scenarios (spec.md §8) exercised against the public API:
//! `StatsCacheManager` wired to a real `Store` and a scripted `MetricSource`.
//! S5 (excursion counting) is covered inline in `src/anomaly.rs`; the rest
//! need a full orchestrator + store round trip and live here.

use corridor_engine::config::Config;
use corridor_engine::error::Result;
use corridor_engine::manager::StatsCacheManager;
use corridor_engine::processor::Sample;
use corridor_engine::source::MetricSource;
use corridor_engine::store::Store;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct ScriptedSource {
    samples: Vec<Sample>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(samples: Vec<Sample>) -> Self {
        Self { samples, calls: AtomicUsize::new(0) }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetricSource for ScriptedSource {
    fn get_metric_names(&self, _instance_id: &str) -> Result<Vec<String>> {
        Ok(vec![])
    }
    fn get_query_for_metric(&self, _instance_id: &str, _metric_name: &str) -> Result<Option<String>> {
        Ok(None)
    }
    fn get_last_data_source_type(&self, _instance_id: &str) -> Result<Option<String>> {
        Ok(None)
    }
    fn query_range(&self, _instance_id: &str, _query: &str, _start: i64, _end: i64, _step: i64) -> Result<Vec<Sample>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.samples.clone())
    }
}

const HOUR_START: i64 = 1_700_000_000;
const HOUR_END: i64 = 1_700_003_600;

fn flat_history() -> Vec<Sample> {
    let mut ts = HOUR_START;
    let mut out = Vec::new();
    while ts <= HOUR_END {
        out.push(Sample { timestamp: ts, value: 1.0 });
        ts += 60;
    }
    out
}

fn manager_with(samples: Vec<Sample>, db_path: &std::path::Path, configure: impl FnOnce(&mut Config)) -> (StatsCacheManager, Arc<ScriptedSource>) {
    let store = Arc::new(Store::open(db_path).unwrap());
    let source = Arc::new(ScriptedSource::new(samples));
    let mut config = Config::default();
    config.history.step_seconds = 60;
    config.cache.database.max_ttl_secs = 3600;
    configure(&mut config);
    let manager = StatsCacheManager::new(store, source.clone(), config);
    (manager, source)
}

/// S1 — cold fingerprint, single writer: a flat `y = 1.0` history over one
/// hour at step=60s should fit to a near-flat trend, at most one retained
/// coefficient, and no anomalies (every sample sits exactly on the bound).
#[test]
fn s1_cold_fingerprint_single_writer() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, source) = manager_with(flat_history(), &dir.path().join("cache.sqlite3"), |_| {});

    let outcome = manager
        .recalculate_stats("q-cpu", "inst-1", "cpu_usage", r#"{"host":"a"}"#, HOUR_START, HOUR_END, 0)
        .unwrap();

    assert!(outcome.rebuilt);
    assert_eq!(source.calls(), 1);
    assert!(outcome.model.shape.trend.slope.abs() < 1e-6);
    assert!((outcome.model.shape.trend.intercept - 1.0).abs() < 1e-6);
    assert!(outcome.model.shape.coefficients.len() <= 1);
    assert_eq!(outcome.model.anomaly_stats.combined.excursions.len(), 0);
}

/// S2 — concurrent callers: 8 threads racing `recalculate_stats` on the same
/// cold fingerprint must still only trigger one upstream fetch and exactly
/// one rebuild.
#[test]
fn s2_concurrent_callers_single_flight() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, source) = manager_with(flat_history(), &dir.path().join("cache.sqlite3"), |c| {
        c.cache.build_timeout_secs = 10;
    });

    let rebuilt_count: Vec<bool> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    manager
                        .recalculate_stats("q-cpu", "inst-1", "cpu_usage", r#"{"host":"a"}"#, HOUR_START, HOUR_END, 0)
                        .unwrap()
                        .rebuilt
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(source.calls(), 1, "exactly one upstream fetch across the group");
    assert_eq!(rebuilt_count.iter().filter(|&&r| r).count(), 1, "exactly one caller performed the rebuild");
}

/// S3 — config change: after a cold build, a second manager against the
/// same store but with `default_percentiles` changed from `[95,5]` to
/// `[90,10]` must see a config_hash mismatch, rebuild again, and end up
/// with a different config_hash on record.
#[test]
fn s3_config_change_forces_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("cache.sqlite3");

    let (manager_a, source_a) = manager_with(flat_history(), &db_path, |_| {});
    let config_hash_a = Config::default().config_hash();
    let outcome_a = manager_a
        .recalculate_stats("q-cpu", "inst-1", "cpu_usage", r#"{"host":"a"}"#, HOUR_START, HOUR_END, 0)
        .unwrap();
    assert!(outcome_a.rebuilt);

    let (manager_b, source_b) = manager_with(flat_history(), &db_path, |c| {
        c.corridor_params.default_percentiles = (90.0, 10.0);
    });
    let mut changed = Config::default();
    changed.corridor_params.default_percentiles = (90.0, 10.0);
    let config_hash_b = changed.config_hash();

    assert_ne!(config_hash_a, config_hash_b);

    let outcome_b = manager_b
        .recalculate_stats("q-cpu", "inst-1", "cpu_usage", r#"{"host":"a"}"#, HOUR_START, HOUR_END, 1)
        .unwrap();
    assert!(outcome_b.rebuilt);
    assert_eq!(source_a.calls() + source_b.calls(), 2, "two separate rebuilds total");
}

/// S4 — TTL expiry: once the clock has passed `created_at + max_ttl`, the
/// row is no longer Fresh, and the next call triggers a rebuild rather than
/// serving the old payload as current.
#[test]
fn s4_ttl_expiry_triggers_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, source) = manager_with(flat_history(), &dir.path().join("cache.sqlite3"), |c| {
        c.cache.database.max_ttl_secs = 10;
    });

    let first = manager
        .recalculate_stats("q-cpu", "inst-1", "cpu_usage", r#"{"host":"a"}"#, HOUR_START, HOUR_END, 0)
        .unwrap();
    assert!(first.rebuilt);

    // now = 1000 is well past created_at(0) + max_ttl(10).
    let second = manager
        .recalculate_stats("q-cpu", "inst-1", "cpu_usage", r#"{"host":"a"}"#, HOUR_START, HOUR_END, 1000)
        .unwrap();
    assert!(second.rebuilt, "a row past its TTL must be rebuilt rather than served as current");
    assert_eq!(source.calls(), 2);
}

/// S6 — canonical equality: saving under `{"b":2,"a":1}` and reading back
/// under `{"a":1,"b":2}` resolve to the same fingerprint, serve the cached
/// entry without a second rebuild, and never create a duplicate `dft_cache`
/// row.
#[test]
fn s6_canonical_label_equality() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("cache.sqlite3");
    let (manager, source) = manager_with(flat_history(), &db_path, |_| {});

    let (hash_a, _) = manager.fingerprint("cpu_usage", r#"{"b":2,"a":1}"#).unwrap();
    let (hash_b, _) = manager.fingerprint("cpu_usage", r#"{"a":1,"b":2}"#).unwrap();
    assert_eq!(hash_a, hash_b);

    let first = manager
        .recalculate_stats("q-cpu", "inst-1", "cpu_usage", r#"{"b":2,"a":1}"#, HOUR_START, HOUR_END, 0)
        .unwrap();
    assert!(first.rebuilt);

    let second = manager
        .recalculate_stats("q-cpu", "inst-1", "cpu_usage", r#"{"a":1,"b":2}"#, HOUR_START, HOUR_END, 1)
        .unwrap();
    assert!(!second.rebuilt, "shuffled-key labels must resolve to the already-cached entry");
    assert_eq!(source.calls(), 1);

    let store = Store::open(&db_path).unwrap();
    assert_eq!(store.counters().unwrap().dft_rows, 1, "no duplicate dft_cache row for equivalent labels");
}
