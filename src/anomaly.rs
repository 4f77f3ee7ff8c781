//! Anomaly Detector (spec.md §4.C): segments samples that fall outside the
//! corridor into runs, and rolls those runs up into summary statistics.
//!
//! Grounded on the severity/duration scoring shape of `AnomalyTag` in
//! `other_examples/.../oneone404-One-Shield__core-service-src-logic-baseline-types.rs.rs`,
//! adapted from a fixed tag enumeration to the continuous duration/size/
//! percent fields spec.md calls for.

use crate::processor::{Bound, Sample};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Above,
    Below,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Excursion {
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub steps: usize,
    /// `steps * step_seconds`: how long the run lasted.
    pub duration_seconds: f64,
    /// `sum(|value - bound crossed|) * step_seconds`: the area the run
    /// carves out of the corridor.
    pub size: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SideStats {
    pub excursions: Vec<Excursion>,
    pub total_steps: usize,
    pub time_outside_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyStats {
    pub above: SideStats,
    pub below: SideStats,
    /// Union of above+below runs collapsed onto the timeline: overlapping or
    /// adjacent runs from either side merge into one combined excursion.
    pub combined: SideStats,
    /// Integral of |value - nearer bound| over every out-of-corridor sample,
    /// weighted by how many times that query has been evaluated, for a
    /// running current/historical blend.
    pub weighted_integral_sum: f64,
}

/// Accumulates one in-progress run, keyed by an arbitrary `K` (the side, for
/// the per-side tallies; `()` for the side-blind combined tally).
struct RunAccumulator<K> {
    active: Option<K>,
    start: i64,
    end: i64,
    steps: usize,
    deviation_sum: f64,
}

impl<K: PartialEq + Copy> RunAccumulator<K> {
    fn empty() -> Self {
        Self { active: None, start: 0, end: 0, steps: 0, deviation_sum: 0.0 }
    }

    /// Advance the run with this sample's classification. Returns a
    /// finished excursion if `key` differs from the run in progress and
    /// that run met `min_run_steps`.
    fn advance(
        &mut self,
        key: Option<K>,
        timestamp: i64,
        deviation: f64,
        step_seconds: i64,
        min_run_steps: usize,
    ) -> Option<(K, Excursion)> {
        let finished = if key != self.active {
            self.take(step_seconds, min_run_steps)
        } else {
            None
        };

        if key == self.active && key.is_some() {
            self.end = timestamp;
            self.steps += 1;
            self.deviation_sum += deviation;
        } else {
            self.active = key;
            self.start = timestamp;
            self.end = timestamp;
            self.steps = if key.is_some() { 1 } else { 0 };
            self.deviation_sum = deviation;
        }

        finished
    }

    /// Flush whatever run is in progress (used at the very end of the
    /// series, or across a gap where a timestamp has no matching bound).
    fn take(&mut self, step_seconds: i64, min_run_steps: usize) -> Option<(K, Excursion)> {
        let result = if self.steps >= min_run_steps && self.steps > 0 {
            self.active.map(|k| {
                (
                    k,
                    Excursion {
                        start_timestamp: self.start,
                        end_timestamp: self.end,
                        steps: self.steps,
                        duration_seconds: self.steps as f64 * step_seconds as f64,
                        size: self.deviation_sum * step_seconds as f64,
                    },
                )
            })
        } else {
            None
        };
        self.active = None;
        self.steps = 0;
        self.deviation_sum = 0.0;
        result
    }
}

/// Segment `samples` against `bounds` (same cadence, matched by timestamp)
/// into excursion runs on each side, filtering runs shorter than
/// `min_run_steps`. `step_seconds` is the sample cadence, used to turn a
/// run's step count into a `duration_seconds`/`size` in real units.
pub fn detect(samples: &[Sample], bounds: &[Bound], min_run_steps: usize, step_seconds: i64) -> AnomalyStats {
    let mut bound_by_ts = std::collections::HashMap::with_capacity(bounds.len());
    for b in bounds {
        bound_by_ts.insert(b.timestamp, *b);
    }

    let mut above_runs = Vec::new();
    let mut below_runs = Vec::new();
    let mut combined_runs = Vec::new();

    let mut per_side = RunAccumulator::<Side>::empty();
    // Combined is side-blind: `()` as the key collapses above/below into one
    // union run whenever either side is active.
    let mut combined = RunAccumulator::<()>::empty();

    for sample in samples {
        let Some(bound) = bound_by_ts.get(&sample.timestamp) else {
            if let Some((side, excursion)) = per_side.take(step_seconds, min_run_steps) {
                push_by_side(side, excursion, &mut above_runs, &mut below_runs);
            }
            if let Some((_, excursion)) = combined.take(step_seconds, 1) {
                combined_runs.push(excursion);
            }
            continue;
        };

        let side = if bound.upper.is_finite() && sample.value > bound.upper {
            Some(Side::Above)
        } else if bound.lower.is_finite() && sample.value < bound.lower {
            Some(Side::Below)
        } else {
            None
        };

        let deviation = match side {
            Some(Side::Above) => sample.value - bound.upper,
            Some(Side::Below) => bound.lower - sample.value,
            None => 0.0,
        };

        if let Some((finished_side, excursion)) = per_side.advance(side, sample.timestamp, deviation, step_seconds, min_run_steps) {
            push_by_side(finished_side, excursion, &mut above_runs, &mut below_runs);
        }

        let combined_key = side.map(|_| ());
        if let Some((_, excursion)) = combined.advance(combined_key, sample.timestamp, deviation.abs(), step_seconds, 1) {
            combined_runs.push(excursion);
        }
    }

    if let Some((side, excursion)) = per_side.take(step_seconds, min_run_steps) {
        push_by_side(side, excursion, &mut above_runs, &mut below_runs);
    }
    if let Some((_, excursion)) = combined.take(step_seconds, 1) {
        combined_runs.push(excursion);
    }

    let total = samples.len().max(1) as f64;
    let above_total: usize = above_runs.iter().map(|e: &Excursion| e.steps).sum();
    let below_total: usize = below_runs.iter().map(|e: &Excursion| e.steps).sum();
    let combined_excursions: Vec<Excursion> = combined_runs.into_iter().filter(|e| e.steps >= min_run_steps).collect();
    let combined_total: usize = combined_excursions.iter().map(|e| e.steps).sum();

    let weighted_integral_sum = combined_excursions.iter().map(|e| e.size).sum();

    AnomalyStats {
        above: SideStats {
            total_steps: above_total,
            time_outside_percent: 100.0 * above_total as f64 / total,
            excursions: above_runs,
        },
        below: SideStats {
            total_steps: below_total,
            time_outside_percent: 100.0 * below_total as f64 / total,
            excursions: below_runs,
        },
        combined: SideStats {
            total_steps: combined_total,
            time_outside_percent: 100.0 * combined_total as f64 / total,
            excursions: combined_excursions,
        },
        weighted_integral_sum,
    }
}

fn push_by_side(side: Side, excursion: Excursion, above: &mut Vec<Excursion>, below: &mut Vec<Excursion>) {
    match side {
        Side::Above => above.push(excursion),
        Side::Below => below.push(excursion),
    }
}

/// Blend a freshly computed `current` stats snapshot with a previously
/// persisted `historical` one, weighting by a decay factor in `[0, 1]`
/// (0 = ignore history, 1 = ignore current).
pub fn weighted_integral(current: f64, historical: f64, historical_weight: f64) -> f64 {
    let w = historical_weight.clamp(0.0, 1.0);
    current * (1.0 - w) + historical * w
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_bounds(start: i64, end: i64, step: i64, upper: f64, lower: f64) -> Vec<Bound> {
        let mut v = Vec::new();
        let mut ts = start;
        while ts <= end {
            v.push(Bound { timestamp: ts, upper, lower });
            ts += step;
        }
        v
    }

    #[test]
    fn detect_finds_above_excursion() {
        let bounds = flat_bounds(0, 500, 100, 10.0, 0.0);
        let samples = vec![
            Sample { timestamp: 0, value: 5.0 },
            Sample { timestamp: 100, value: 20.0 },
            Sample { timestamp: 200, value: 25.0 },
            Sample { timestamp: 300, value: 5.0 },
            Sample { timestamp: 400, value: 5.0 },
            Sample { timestamp: 500, value: 5.0 },
        ];
        let stats = detect(&samples, &bounds, 2, 100);
        assert_eq!(stats.above.excursions.len(), 1);
        assert_eq!(stats.above.excursions[0].steps, 2);
        assert_eq!(stats.below.excursions.len(), 0);
    }

    #[test]
    fn detect_filters_runs_shorter_than_min_run_steps() {
        let bounds = flat_bounds(0, 300, 100, 10.0, 0.0);
        let samples = vec![
            Sample { timestamp: 0, value: 5.0 },
            Sample { timestamp: 100, value: 20.0 },
            Sample { timestamp: 200, value: 5.0 },
            Sample { timestamp: 300, value: 5.0 },
        ];
        let stats = detect(&samples, &bounds, 2, 100);
        assert!(stats.above.excursions.is_empty());
    }

    #[test]
    fn detect_computes_time_outside_percent() {
        let bounds = flat_bounds(0, 300, 100, 10.0, 0.0);
        let samples = vec![
            Sample { timestamp: 0, value: 20.0 },
            Sample { timestamp: 100, value: 20.0 },
            Sample { timestamp: 200, value: 5.0 },
            Sample { timestamp: 300, value: 5.0 },
        ];
        let stats = detect(&samples, &bounds, 2, 100);
        assert_eq!(stats.above.time_outside_percent, 50.0);
    }

    #[test]
    fn detect_combined_merges_above_and_below() {
        let bounds = flat_bounds(0, 400, 100, 10.0, 0.0);
        let samples = vec![
            Sample { timestamp: 0, value: 20.0 },
            Sample { timestamp: 100, value: -5.0 },
            Sample { timestamp: 200, value: 5.0 },
            Sample { timestamp: 300, value: 5.0 },
            Sample { timestamp: 400, value: 5.0 },
        ];
        let stats = detect(&samples, &bounds, 2, 100);
        assert_eq!(stats.combined.excursions.len(), 1);
        assert_eq!(stats.combined.excursions[0].steps, 2);
    }

    /// spec.md §8 scenario S5: upper bound uniformly 2.0, values
    /// `[1, 1, 1, 3, 3, 3, 1, 1]` at step=10s, `min_run_steps=2`.
    #[test]
    fn detect_matches_s5_excursion_scenario() {
        let bounds = flat_bounds(0, 70, 10, 2.0, f64::NAN);
        let values = [1.0, 1.0, 1.0, 3.0, 3.0, 3.0, 1.0, 1.0];
        let samples: Vec<Sample> =
            values.iter().enumerate().map(|(i, &v)| Sample { timestamp: i as i64 * 10, value: v }).collect();

        let stats = detect(&samples, &bounds, 2, 10);
        assert_eq!(stats.above.excursions.len(), 1);
        assert_eq!(stats.above.excursions[0].duration_seconds, 30.0);
        assert!((stats.above.excursions[0].size - 30.0).abs() < 1e-9);
        assert_eq!(stats.below.excursions.len(), 0);
        assert_eq!(stats.combined.time_outside_percent, 37.5);
    }

    #[test]
    fn weighted_integral_blends_within_bounds() {
        assert_eq!(weighted_integral(10.0, 0.0, 0.0), 10.0);
        assert_eq!(weighted_integral(10.0, 0.0, 1.0), 0.0);
        assert_eq!(weighted_integral(10.0, 0.0, 0.5), 5.0);
    }
}
