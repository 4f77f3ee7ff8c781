//! Configuration recognized by the engine (spec.md §6).
//!
//! Parsing arbitrary `key.with.dots = value` CLI overrides and wiring into a
//! DI container are explicitly out of scope (spec.md §1/§9) — this module
//! only owns the shape of a TOML-loaded `Config`, its defaults, and the
//! `ConfigHash` derivation, which is the one piece of config the engine
//! itself is responsible for (spec.md §3).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::home_dir().map(|h| h.join(".corridor").join("config.toml"))
}

pub fn resolve_config_path(cli_path: &Option<PathBuf>) -> Option<PathBuf> {
    if let Some(p) = cli_path {
        return Some(p.clone());
    }
    default_config_path()
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create config parent dir {}", parent.display()))?;
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub corridor_params: CorridorParams,
    pub dft: DftConfig,
    pub history: HistoryConfig,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub blacklist: BlacklistConfig,
    pub metric_source: MetricSourceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            corridor_params: CorridorParams::default(),
            dft: DftConfig::default(),
            history: HistoryConfig::default(),
            log_level: "info".to_string(),
            log_file: None,
            blacklist: BlacklistConfig::default(),
            metric_source: MetricSourceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub database: DatabaseConfig,
    pub build_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { database: DatabaseConfig::default(), build_timeout_secs: 120 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_ttl_secs: i64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("corridor-cache.sqlite3"), max_ttl_secs: 3600 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorridorParams {
    pub default_percentiles: (f64, f64),
    pub rolling_window: usize,
    pub min_run_steps: usize,
    pub max_gap_steps: usize,
}

impl Default for CorridorParams {
    fn default() -> Self {
        Self { default_percentiles: (95.0, 5.0), rolling_window: 12, min_run_steps: 2, max_gap_steps: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DftConfig {
    pub max_coefficients: usize,
}

impl Default for DftConfig {
    fn default() -> Self {
        Self { max_coefficients: 8 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub span_seconds: i64,
    pub step_seconds: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { span_seconds: 7 * 24 * 3600, step_seconds: 60 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlacklistConfig {
    pub datasource_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricSourceConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub danger_accept_invalid_certs: bool,
}

impl Default for MetricSourceConfig {
    fn default() -> Self {
        Self { connect_timeout_secs: 10, request_timeout_secs: 30, danger_accept_invalid_certs: false }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn load_or_default(path: &Option<PathBuf>) -> Self {
        match resolve_config_path(path) {
            Some(p) if p.exists() => Config::load(&p).unwrap_or_default(),
            _ => Config::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).context("serialize config")?;
        ensure_parent_dir(path)?;
        crate::io::atomic::atomic_write(path, text.as_bytes())
            .with_context(|| format!("write config {}", path.display()))
    }

    /// Only the fields that materially affect baseline shape go into the
    /// `ConfigHash` (spec.md §3, §6): percentiles, window sizes, DFT
    /// retention, history span/step. TTL, paths, and logging are excluded.
    pub fn config_hash(&self) -> String {
        let subset = serde_json::json!({
            "default_percentiles": [self.corridor_params.default_percentiles.0, self.corridor_params.default_percentiles.1],
            "rolling_window": self.corridor_params.rolling_window,
            "min_run_steps": self.corridor_params.min_run_steps,
            "max_gap_steps": self.corridor_params.max_gap_steps,
            "max_coefficients": self.dft.max_coefficients,
            "history_span_seconds": self.history.span_seconds,
            "history_step_seconds": self.history.step_seconds,
        });
        let canonical = crate::hash::canonicalize_labels(&subset.to_string())
            .unwrap_or_else(|_| subset.to_string());
        format!("{:x}", md5::compute(canonical.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_hash_is_stable_for_unrelated_field_change() {
        let a = Config::default();
        let mut b = Config::default();
        b.cache.database.path = PathBuf::from("/tmp/somewhere-else.sqlite3");
        assert_eq!(a.config_hash(), b.config_hash(), "path must not affect the hash");
    }

    #[test]
    fn config_hash_changes_with_percentiles() {
        let a = Config::default();
        let mut b = Config::default();
        b.corridor_params.default_percentiles = (90.0, 10.0);
        assert_ne!(a.config_hash(), b.config_hash());
    }
}
