//! Cache Store (spec.md §4.D): the content-addressed, two-tier persistent
//! store sitting underneath the Stats Cache Manager.
//!
//! Writes serialize through a single `Mutex<Connection>` (spec.md §5);
//! reads open their own short-lived WAL-mode connection so readers never
//! block behind a writer. Grounded on the embedded-store trait shape of
//! `sx9-foundation-data::storage::StorageBackend`, generalized to SQL
//! because spec.md §6's schema is explicitly relational.

pub mod model;
pub mod schema;

use crate::error::{CorridorError, Result};
use model::{CorridorModel, Freshness, GrafanaInstance, IndividualMetric, SCHEMA_VERSION};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct Store {
    path: PathBuf,
    writer: Mutex<Connection>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CorridorError::Internal(format!("create cache dir: {e}")))?;
            }
        }
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(schema::DDL)?;
        Ok(Self { path, writer: Mutex::new(conn) })
    }

    fn reader(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(conn)
    }

    // ---- query registry --------------------------------------------------

    pub fn register_query(
        &self,
        query_id: &str,
        query: &str,
        labels_canonical_json: &str,
        metric_hash: &str,
        now: i64,
    ) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO queries (query_id, query, labels_canonical_json, metric_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(query_id) DO UPDATE SET
                query = excluded.query,
                labels_canonical_json = excluded.labels_canonical_json,
                metric_hash = excluded.metric_hash",
            params![query_id, query, labels_canonical_json, metric_hash, now],
        )?;
        Ok(())
    }

    // ---- TTL-bounded tier (dft_cache) -------------------------------------

    pub fn seed_placeholder(&self, metric_hash: &str, config_hash: &str, now: i64, ttl_secs: i64) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        let expires_at = if ttl_secs > 0 { Some(now + ttl_secs) } else { None };
        conn.execute(
            "INSERT INTO dft_cache (metric_hash, config_hash, schema_version, status, payload, created_at, expires_at)
             VALUES (?1, ?2, ?3, 'placeholder', NULL, ?4, ?5)
             ON CONFLICT(metric_hash, config_hash) DO UPDATE SET
                status = 'placeholder', payload = NULL, created_at = excluded.created_at, expires_at = excluded.expires_at",
            params![metric_hash, config_hash, SCHEMA_VERSION, now, expires_at],
        )?;
        Ok(())
    }

    pub fn store_fresh(
        &self,
        metric_hash: &str,
        config_hash: &str,
        model: &CorridorModel,
        now: i64,
        ttl_secs: i64,
    ) -> Result<()> {
        let payload = serde_json::to_string(model)?;
        let expires_at = if ttl_secs > 0 { Some(now + ttl_secs) } else { None };
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO dft_cache (metric_hash, config_hash, schema_version, status, payload, created_at, expires_at)
             VALUES (?1, ?2, ?3, 'fresh', ?4, ?5, ?6)
             ON CONFLICT(metric_hash, config_hash) DO UPDATE SET
                status = 'fresh', payload = excluded.payload, schema_version = excluded.schema_version,
                created_at = excluded.created_at, expires_at = excluded.expires_at",
            params![metric_hash, config_hash, SCHEMA_VERSION, payload, now, expires_at],
        )?;
        Ok(())
    }

    /// Returns the row's freshness and, when `Fresh`, its decoded payload.
    /// `Stale` means a fresh row exists but `expires_at <= now`.
    pub fn load(&self, metric_hash: &str, config_hash: &str, now: i64) -> Result<(Freshness, Option<CorridorModel>)> {
        let conn = self.reader()?;
        let row: Option<(String, Option<String>, i64, Option<i64>, i64)> = conn
            .query_row(
                "SELECT status, payload, schema_version, expires_at, created_at
                 FROM dft_cache WHERE metric_hash = ?1 AND config_hash = ?2",
                params![metric_hash, config_hash],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
            )
            .optional()?;

        let Some((status, payload, schema_version, expires_at, _created_at)) = row else {
            return Ok((Freshness::Absent, None));
        };

        if status == "placeholder" {
            return Ok((Freshness::Placeholder, None));
        }

        let Some(payload) = payload else {
            return Ok((Freshness::Absent, None));
        };

        if schema_version != SCHEMA_VERSION {
            return Err(CorridorError::Corruption(format!(
                "cached schema_version {schema_version} does not match current {SCHEMA_VERSION}"
            )));
        }

        let is_stale = expires_at.is_some_and(|exp| exp <= now);
        let model: CorridorModel = serde_json::from_str(&payload)?;
        Ok((if is_stale { Freshness::Stale } else { Freshness::Fresh }, Some(model)))
    }

    pub fn invalidate(&self, metric_hash: &str) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute("DELETE FROM dft_cache WHERE metric_hash = ?1", params![metric_hash])?;
        Ok(())
    }

    /// Remove every `dft_cache` row whose `expires_at` has passed. Returns
    /// the number of rows swept.
    pub fn sweep_expired(&self, now: i64) -> Result<usize> {
        let conn = self.writer.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM dft_cache WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![now],
        )?;
        Ok(n)
    }

    // ---- permanent tier ----------------------------------------------------

    pub fn store_permanent(&self, metric_hash: &str, config_hash: &str, model: &CorridorModel, now: i64) -> Result<()> {
        let payload = serde_json::to_string(model)?;
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO metrics_cache_permanent (metric_hash, config_hash, schema_version, payload, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(metric_hash) DO UPDATE SET
                config_hash = excluded.config_hash, schema_version = excluded.schema_version,
                payload = excluded.payload, updated_at = excluded.updated_at",
            params![metric_hash, config_hash, SCHEMA_VERSION, payload, now],
        )?;
        Ok(())
    }

    pub fn load_permanent(&self, metric_hash: &str) -> Result<Option<(String, CorridorModel)>> {
        let conn = self.reader()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT config_hash, payload FROM metrics_cache_permanent WHERE metric_hash = ?1",
                params![metric_hash],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        match row {
            Some((config_hash, payload)) => Ok(Some((config_hash, serde_json::from_str(&payload)?))),
            None => Ok(None),
        }
    }

    /// `config_hash` drives "should recreate cache": a stored permanent row
    /// whose `config_hash` no longer matches the live config is superseded
    /// rather than trusted (spec.md §3).
    pub fn should_recreate_cache(&self, metric_hash: &str, live_config_hash: &str) -> Result<bool> {
        match self.load_permanent(metric_hash)? {
            Some((stored_hash, _)) => Ok(stored_hash != live_config_hash),
            None => Ok(true),
        }
    }

    pub fn store_anomaly_l1(&self, metric_hash: &str, stats: &crate::anomaly::AnomalyStats, now: i64) -> Result<()> {
        let payload = serde_json::to_string(stats)?;
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO autoscale_l1 (metric_hash, schema_version, payload, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(metric_hash) DO UPDATE SET
                schema_version = excluded.schema_version, payload = excluded.payload, updated_at = excluded.updated_at",
            params![metric_hash, SCHEMA_VERSION, payload, now],
        )?;
        Ok(())
    }

    pub fn load_anomaly_l1(&self, metric_hash: &str) -> Result<Option<crate::anomaly::AnomalyStats>> {
        let conn = self.reader()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM autoscale_l1 WHERE metric_hash = ?1",
                params![metric_hash],
                |r| r.get(0),
            )
            .optional()?;
        payload.map(|p| serde_json::from_str(&p).map_err(Into::into)).transpose()
    }

    // ---- Grafana instance / metric registry -------------------------------

    pub fn upsert_instance(&self, instance: &GrafanaInstance) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO grafana_instances (instance_id, base_url, datasource_id)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(instance_id) DO UPDATE SET base_url = excluded.base_url, datasource_id = excluded.datasource_id",
            params![instance.instance_id, instance.base_url, instance.datasource_id],
        )?;
        Ok(())
    }

    pub fn upsert_individual_metric(&self, metric: &IndividualMetric) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO grafana_individual_metrics (instance_id, metric_name, query)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(instance_id, metric_name) DO UPDATE SET query = excluded.query",
            params![metric.instance_id, metric.metric_name, metric.query],
        )?;
        Ok(())
    }

    pub fn get_instance(&self, instance_id: &str) -> Result<Option<GrafanaInstance>> {
        let conn = self.reader()?;
        conn.query_row(
            "SELECT instance_id, base_url, datasource_id FROM grafana_instances WHERE instance_id = ?1",
            params![instance_id],
            |r| Ok(GrafanaInstance { instance_id: r.get(0)?, base_url: r.get(1)?, datasource_id: r.get(2)? }),
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_metric_names(&self, instance_id: &str) -> Result<Vec<String>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT metric_name FROM grafana_individual_metrics WHERE instance_id = ?1 ORDER BY metric_name",
        )?;
        let rows = stmt.query_map(params![instance_id], |r| r.get(0))?;
        rows.collect::<rusqlite::Result<Vec<String>>>().map_err(Into::into)
    }

    pub fn query_for_metric(&self, instance_id: &str, metric_name: &str) -> Result<Option<String>> {
        let conn = self.reader()?;
        conn.query_row(
            "SELECT query FROM grafana_individual_metrics WHERE instance_id = ?1 AND metric_name = ?2",
            params![instance_id, metric_name],
            |r| r.get(0),
        )
        .optional()
        .map_err(Into::into)
    }

    // ---- build leases (backing store for single-flight; see src/lease.rs) --

    pub fn try_acquire_lease(&self, query_id: &str, metric_hash: &str, holder: &str, now: i64, ttl_secs: i64) -> Result<bool> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "DELETE FROM build_leases WHERE query_id = ?1 AND metric_hash = ?2 AND expires_at <= ?3",
            params![query_id, metric_hash, now],
        )?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO build_leases (query_id, metric_hash, holder, acquired_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![query_id, metric_hash, holder, now, now + ttl_secs],
        )?;
        Ok(inserted == 1)
    }

    pub fn release_lease(&self, query_id: &str, metric_hash: &str, holder: &str) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "DELETE FROM build_leases WHERE query_id = ?1 AND metric_hash = ?2 AND holder = ?3",
            params![query_id, metric_hash, holder],
        )?;
        Ok(())
    }

    // ---- counters (for `corridor stats`) ----------------------------------

    pub fn counters(&self) -> Result<StoreCounters> {
        let conn = self.reader()?;
        let dft_rows: i64 = conn.query_row("SELECT COUNT(*) FROM dft_cache", [], |r| r.get(0))?;
        let fresh_rows: i64 =
            conn.query_row("SELECT COUNT(*) FROM dft_cache WHERE status = 'fresh'", [], |r| r.get(0))?;
        let placeholder_rows: i64 =
            conn.query_row("SELECT COUNT(*) FROM dft_cache WHERE status = 'placeholder'", [], |r| r.get(0))?;
        let permanent_rows: i64 = conn.query_row("SELECT COUNT(*) FROM metrics_cache_permanent", [], |r| r.get(0))?;
        let active_leases: i64 = conn.query_row("SELECT COUNT(*) FROM build_leases", [], |r| r.get(0))?;
        Ok(StoreCounters { dft_rows, fresh_rows, placeholder_rows, permanent_rows, active_leases })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounters {
    pub dft_rows: i64,
    pub fresh_rows: i64,
    pub placeholder_rows: i64,
    pub permanent_rows: i64,
    pub active_leases: i64,
}
