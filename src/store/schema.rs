//! DDL for the two-tier cache schema (spec.md §6).
//!
//! `dft_cache` is the TTL-bounded tier: rows expire and are swept.
//! `metrics_cache_permanent` / `autoscale_l1` never expire on their own —
//! they're superseded in place when a config or data change invalidates
//! them. `build_leases` backs the single-flight rebuild lease
//! (spec.md §4.E, §9).

pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS queries (
    query_id TEXT PRIMARY KEY,
    query TEXT NOT NULL,
    labels_canonical_json TEXT NOT NULL,
    metric_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_queries_metric_hash ON queries(metric_hash);

CREATE TABLE IF NOT EXISTS dft_cache (
    metric_hash TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    schema_version INTEGER NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('placeholder', 'fresh')),
    payload TEXT,
    created_at INTEGER NOT NULL,
    expires_at INTEGER,
    PRIMARY KEY (metric_hash, config_hash)
);

CREATE TABLE IF NOT EXISTS metrics_cache_permanent (
    metric_hash TEXT PRIMARY KEY,
    config_hash TEXT NOT NULL,
    schema_version INTEGER NOT NULL,
    payload TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS autoscale_l1 (
    metric_hash TEXT PRIMARY KEY,
    schema_version INTEGER NOT NULL,
    payload TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS grafana_instances (
    instance_id TEXT PRIMARY KEY,
    base_url TEXT NOT NULL,
    datasource_id TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS grafana_individual_metrics (
    instance_id TEXT NOT NULL REFERENCES grafana_instances(instance_id),
    metric_name TEXT NOT NULL,
    query TEXT NOT NULL,
    PRIMARY KEY (instance_id, metric_name)
);

CREATE TABLE IF NOT EXISTS build_leases (
    query_id TEXT NOT NULL,
    metric_hash TEXT NOT NULL,
    holder TEXT NOT NULL,
    acquired_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    PRIMARY KEY (query_id, metric_hash)
);
"#;
