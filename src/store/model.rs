//! Row/value shapes persisted by the cache store (spec.md §3, §6).

use crate::anomaly::AnomalyStats;
use crate::kernel::CorridorShape;
use crate::processor::Bound;
use serde::{Deserialize, Serialize};

/// Bumped whenever `CorridorModel`'s on-disk shape changes; stored alongside
/// every payload so an old row can be detected and rebuilt instead of
/// misread (spec.md §9 "Mixed-schema cache rows").
pub const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorridorModel {
    pub schema_version: i64,
    pub shape: CorridorShape,
    pub bounds: Vec<Bound>,
    pub anomaly_stats: AnomalyStats,
}

/// Freshness state machine driving `recalculate_stats` (spec.md §4.E):
/// `Absent -> Placeholder -> Fresh -> Stale -> Fresh`, with `invalidate`
/// resetting any state back to `Absent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Absent,
    Placeholder,
    Fresh,
    Stale,
}

#[derive(Debug, Clone)]
pub struct CacheRowMeta {
    pub metric_hash: String,
    pub config_hash: String,
    pub schema_version: i64,
    pub status: Freshness,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrafanaInstance {
    pub instance_id: String,
    pub base_url: String,
    pub datasource_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualMetric {
    pub instance_id: String,
    pub metric_name: String,
    pub query: String,
}
