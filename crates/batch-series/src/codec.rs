//! Decodes the packed binary time-series blob, sorts it, and computes
//! the non-negative derivative transform (spec.md §4.2).

use batch_common::SeriesPoint;
use tracing::debug;

/// Decode a MessagePack-encoded array of `[timestamp, value]` pairs
/// (the wire format the original streams through a msgpack
/// `Unpacker`). Any parse failure yields an empty series — no
/// exception surfaces to the caller.
pub fn decode(blob: &[u8]) -> Vec<SeriesPoint> {
    match rmp_serde::from_slice::<Vec<(i64, f64)>>(blob) {
        Ok(points) => points,
        Err(err) => {
            debug!(error = %err, "series blob failed to decode, treating as empty");
            Vec::new()
        }
    }
}

/// Sort by timestamp ascending. Applied unconditionally after decode
/// because upstream collectors may interleave (spec.md §4.2).
pub fn sort_ascending(mut series: Vec<SeriesPoint>) -> Vec<SeriesPoint> {
    series.sort_by_key(|(ts, _)| *ts);
    series
}

/// First differences, clamped at zero; the first point is elided.
/// Empty or single-point input yields an empty series.
pub fn non_negative_derivative(series: &[SeriesPoint]) -> Vec<SeriesPoint> {
    if series.len() < 2 {
        return Vec::new();
    }
    series
        .windows(2)
        .map(|pair| {
            let (_, prev_v) = pair[0];
            let (ts, v) = pair[1];
            let delta = v - prev_v;
            (ts, if delta < 0.0 { 0.0 } else { delta })
        })
        .collect()
}

/// True if the series is non-decreasing throughout with at least one
/// strict increase (spec.md §4.3 step 4).
pub fn strictly_increasing_monotonicity(series: &[SeriesPoint]) -> bool {
    if series.len() < 2 {
        return false;
    }
    let mut saw_strict_increase = false;
    for pair in series.windows(2) {
        let (_, a) = pair[0];
        let (_, b) = pair[1];
        if b < a {
            return false;
        }
        if b > a {
            saw_strict_increase = true;
        }
    }
    saw_strict_increase
}
