//! Single-flight build lease (spec.md §4.E, §5, §9): at most one rebuild per
//! `(query_id, metric_hash)` runs at a time; everyone else waits for it to
//! finish instead of racing a duplicate rebuild.
//!
//! The `build_leases` table (src/store/mod.rs) makes this safe across
//! processes; this module adds the in-process fast path so threads in the
//! same engine instance don't all fall through to SQLite to find out they
//! lost the race. Grounded on the `once_cell::sync::Lazy<Mutex<HashMap<...>>>`
//! pattern in the teacher's `core/artifact_cache.rs`, generalized from an LRU
//! byte cache to a `Condvar`-signaled wait list.

use crate::error::{CorridorError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Inner {
    /// Keys currently being built in this process.
    in_flight: Mutex<HashMap<String, ()>>,
    signal: Condvar,
}

#[derive(Clone, Default)]
pub struct LeaseManager {
    inner: Arc<Inner>,
}

fn key(query_id: &str, metric_hash: &str) -> String {
    format!("{query_id}:{metric_hash}")
}

/// RAII guard: releases the in-process slot and wakes waiters on drop.
pub struct LeaseGuard {
    manager: LeaseManager,
    key: String,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let mut map = self.manager.inner.in_flight.lock().unwrap();
        map.remove(&self.key);
        drop(map);
        self.manager.inner.signal.notify_all();
    }
}

impl LeaseManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to become the single builder for `(query_id, metric_hash)`. On
    /// success, returns a guard the caller holds for the duration of the
    /// rebuild. On failure, another thread in this process already holds
    /// it — the caller should wait via `wait_for_release`.
    pub fn try_acquire(&self, query_id: &str, metric_hash: &str) -> Option<LeaseGuard> {
        let k = key(query_id, metric_hash);
        let mut map = self.inner.in_flight.lock().unwrap();
        if map.contains_key(&k) {
            return None;
        }
        map.insert(k.clone(), ());
        Some(LeaseGuard { manager: self.clone(), key: k })
    }

    /// Block until the holder of `(query_id, metric_hash)` releases it, or
    /// `timeout` elapses.
    pub fn wait_for_release(&self, query_id: &str, metric_hash: &str, timeout: Duration) -> Result<()> {
        let k = key(query_id, metric_hash);
        let deadline = Instant::now() + timeout;
        let map = self.inner.in_flight.lock().unwrap();
        let mut map = map;
        while map.contains_key(&k) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(CorridorError::LeaseTimeout);
            }
            let (guard, timed_out) = self.inner.signal.wait_timeout(map, remaining).unwrap();
            map = guard;
            if timed_out.timed_out() && map.contains_key(&k) {
                return Err(CorridorError::LeaseTimeout);
            }
        }
        Ok(())
    }
}
