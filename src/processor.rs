//! Data Processor (spec.md §4.B): turns raw samples into a grid-aligned
//! rolling-percentile corridor. Grounded on
//! `src/core/titan/statistics.rs::percentile` for the interpolation rule.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

/// Inclusive actual range covered by `samples`, or `None` for an empty slice.
pub fn actual_data_range(samples: &[Sample]) -> Option<(i64, i64)> {
    let mut iter = samples.iter().map(|s| s.timestamp);
    let first = iter.next()?;
    let (mut lo, mut hi) = (first, first);
    for ts in iter {
        lo = lo.min(ts);
        hi = hi.max(ts);
    }
    Some((lo, hi))
}

/// Partition samples by their already-canonicalized label key. Within a
/// group, duplicate timestamps keep the last value seen (last-write-wins),
/// matching the order samples were appended in.
pub fn group_data(samples: &[(String, Sample)]) -> HashMap<String, Vec<Sample>> {
    let mut by_key: HashMap<String, HashMap<i64, f64>> = HashMap::new();
    let mut order: HashMap<String, Vec<i64>> = HashMap::new();

    for (key, sample) in samples {
        let slot = by_key.entry(key.clone()).or_default();
        if slot.insert(sample.timestamp, sample.value).is_none() {
            order.entry(key.clone()).or_default().push(sample.timestamp);
        }
    }

    by_key
        .into_iter()
        .map(|(key, values)| {
            let timestamps = order.remove(&key).unwrap_or_default();
            let series = timestamps
                .into_iter()
                .map(|ts| Sample { timestamp: ts, value: values[&ts] })
                .collect();
            (key, series)
        })
        .collect()
}

/// Linear-interpolation percentile over `values`, matching the teacher's
/// `titan/statistics.rs::percentile`. `p` is in `[0, 100]`. Returns `NaN` for
/// an empty slice.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    if sorted.len() == 1 {
        return sorted[0];
    }

    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub timestamp: i64,
    pub upper: f64,
    pub lower: f64,
}

/// Compute rolling-window percentile bounds over a grid aligned to
/// `step_seconds`, spanning `[start, end]` inclusive. Each grid point looks
/// back `rolling_window` grid steps (itself included) and takes the
/// `(upper_pct, lower_pct)` percentiles of whatever actual samples land in
/// that window. Grid points with no samples in range are filled by linear
/// interpolation across a gap of up to `max_gap_steps`; beyond that the
/// bound is `NaN`.
pub fn calculate_bounds(
    samples: &[Sample],
    start: i64,
    end: i64,
    step_seconds: i64,
    rolling_window: usize,
    percentiles: (f64, f64),
    max_gap_steps: usize,
) -> Vec<Bound> {
    if step_seconds <= 0 || end < start {
        return Vec::new();
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by_key(|s| s.timestamp);

    let grid_count = ((end - start) / step_seconds) as usize + 1;
    let mut raw: Vec<Option<(f64, f64)>> = Vec::with_capacity(grid_count);

    for i in 0..grid_count {
        let grid_ts = start + (i as i64) * step_seconds;
        let window_start = grid_ts - (rolling_window.max(1) as i64 - 1) * step_seconds;
        let window: Vec<f64> = sorted
            .iter()
            .filter(|s| s.timestamp > window_start - step_seconds / 2 && s.timestamp <= grid_ts + step_seconds / 2)
            .map(|s| s.value)
            .collect();

        if window.is_empty() {
            raw.push(None);
        } else {
            let upper = percentile(&window, percentiles.0);
            let lower = percentile(&window, percentiles.1);
            raw.push(Some((upper, lower)));
        }
    }

    interpolate_gaps(&mut raw, max_gap_steps);

    raw.into_iter()
        .enumerate()
        .map(|(i, slot)| {
            let ts = start + (i as i64) * step_seconds;
            match slot {
                Some((u, l)) => Bound { timestamp: ts, upper: u, lower: l },
                None => Bound { timestamp: ts, upper: f64::NAN, lower: f64::NAN },
            }
        })
        .collect()
}

/// Fill `None` runs up to `max_gap_steps` long by linearly interpolating
/// between the nearest known neighbors on either side. Runs longer than
/// that, or at either edge with no bounding neighbor, stay `None`.
fn interpolate_gaps(values: &mut [Option<(f64, f64)>], max_gap_steps: usize) {
    let n = values.len();
    let mut i = 0;
    while i < n {
        if values[i].is_some() {
            i += 1;
            continue;
        }
        let gap_start = i;
        let mut gap_end = i;
        while gap_end < n && values[gap_end].is_none() {
            gap_end += 1;
        }
        let gap_len = gap_end - gap_start;

        let left = if gap_start > 0 { values[gap_start - 1] } else { None };
        let right = if gap_end < n { values[gap_end] } else { None };

        if gap_len <= max_gap_steps {
            if let (Some((lu, ll)), Some((ru, rl))) = (left, right) {
                for (step, slot) in values[gap_start..gap_end].iter_mut().enumerate() {
                    let frac = (step + 1) as f64 / (gap_len + 1) as f64;
                    *slot = Some((lu + (ru - lu) * frac, ll + (rl - ll) * frac));
                }
            }
        }
        i = gap_end;
    }
}
