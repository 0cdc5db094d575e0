//! Wire-level types shared by every component: work items, series
//! points, routing flags and run counters.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A unit of work drawn from the `analyzer.batch` set: a metric name
/// paired with the timestamp up to which it has already been analyzed.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub metric_name: String,
    pub last_analyzed_ts: i64,
}

/// Field separator used by the textual WorkItem encoding. Chosen over
/// a Python-tuple-literal encoding per the open design note on wire
/// format (see SPEC_FULL.md §3) — any ASCII character not legal in a
/// metric name would do; `\x1f` (unit separator) was picked so a plain
/// `redis-cli SMEMBERS` dump still shows readable metric names.
const WORK_ITEM_SEP: char = '\u{1f}';

impl WorkItem {
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.metric_name, WORK_ITEM_SEP, self.last_analyzed_ts)
    }

    /// Decode a work item. Malformed entries are skipped, not fatal,
    /// per spec.md §9: producer/consumer only need to agree, and a
    /// garbled member must not crash the Supervisor's draw loop.
    pub fn decode(raw: &str) -> Option<Self> {
        let (metric_name, ts) = raw.rsplit_once(WORK_ITEM_SEP)?;
        let last_analyzed_ts = ts.parse().ok()?;
        if metric_name.is_empty() {
            return None;
        }
        Some(Self {
            metric_name: metric_name.to_string(),
            last_analyzed_ts,
        })
    }
}

/// One (timestamp, value) sample of a decoded time series.
pub type SeriesPoint = (i64, f64);

/// Membership-set derived classification of a metric for a single run.
/// `ionosphere_metric` overrides `analyzer_metric`; `mirage_metric`
/// overrides both for routing purposes (spec.md §3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricClassification {
    pub analyzer_metric: bool,
    pub mirage_metric: bool,
    pub ionosphere_metric: bool,
    pub smtp_alert_enabled: bool,
}

/// The closed set of exception counters, always zero-filled.
pub const EXCEPTION_KEYS: [&str; 5] = ["Boring", "Stale", "TooShort", "Other", "DeletedByRoomba"];

/// Classified ensemble failures, replacing exception-driven control
/// flow in the original with a tagged verdict (spec.md §9).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsembleFailure {
    #[error("window shorter than the minimum required length")]
    TooShort,
    #[error("latest point too old relative to window end")]
    Stale,
    #[error("insufficient variance in the window")]
    Boring,
    #[error("series went missing between fetch and analyze")]
    DeletedByRoomba,
    #[error("unclassified ensemble failure")]
    Other,
}

impl EnsembleFailure {
    pub fn counter_key(&self) -> &'static str {
        match self {
            EnsembleFailure::TooShort => "TooShort",
            EnsembleFailure::Stale => "Stale",
            EnsembleFailure::Boring => "Boring",
            EnsembleFailure::DeletedByRoomba => "DeletedByRoomba",
            EnsembleFailure::Other => "Other",
        }
    }

    /// Whether the sentinel should be set to the batch timestamp being
    /// analyzed (true) or to the current wall clock (false) — see
    /// spec.md §4.6 step 5c.
    pub fn sentinel_uses_batch_timestamp(&self) -> bool {
        matches!(self, EnsembleFailure::TooShort | EnsembleFailure::Stale | EnsembleFailure::Boring)
    }
}

/// Outcome of a single ensemble invocation on a window.
#[derive(Debug, Clone)]
pub struct EnsembleVerdict {
    pub anomalous: bool,
    pub votes: Vec<bool>,
    pub last_datapoint: f64,
    pub negatives_found: Vec<SeriesPoint>,
}

/// Per-run tallies drained to the two result queues at the end of a
/// Supervisor iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunCounters {
    pub exceptions: HashMap<String, u64>,
    pub anomaly_breakdown: HashMap<String, u64>,
}

impl RunCounters {
    pub fn record_exception(&mut self, failure: EnsembleFailure) {
        *self.exceptions.entry(failure.counter_key().to_string()).or_insert(0) += 1;
    }

    pub fn record_anomaly_breakdown(&mut self, algorithm_names: &[String], votes: &[bool]) {
        for (name, triggered) in algorithm_names.iter().zip(votes.iter()) {
            if *triggered {
                *self.anomaly_breakdown.entry(name.clone()).or_insert(0) += 1;
            }
        }
    }

    /// Zero-fill against the closed exception set and the configured
    /// algorithm list so every run emits a complete aggregate, per
    /// spec.md §4.7.
    pub fn zero_filled(mut self, algorithm_names: &[String]) -> Self {
        for key in EXCEPTION_KEYS {
            self.exceptions.entry(key.to_string()).or_insert(0);
        }
        for name in algorithm_names {
            self.anomaly_breakdown.entry(name.clone()).or_insert(0);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_item_round_trips() {
        let item = WorkItem { metric_name: "metrics.foo".into(), last_analyzed_ts: 200 };
        let decoded = WorkItem::decode(&item.encode()).unwrap();
        assert_eq!(item, decoded);
    }

    #[test]
    fn work_item_decode_skips_garbage() {
        assert!(WorkItem::decode("not-a-work-item").is_none());
        assert!(WorkItem::decode("metric\u{1f}not-a-number").is_none());
        assert!(WorkItem::decode("\u{1f}200").is_none());
    }

    #[test]
    fn zero_fill_covers_closed_exception_set() {
        let counters = RunCounters::default().zero_filled(&["alg0".to_string()]);
        for key in EXCEPTION_KEYS {
            assert_eq!(counters.exceptions.get(key), Some(&0));
        }
        assert_eq!(counters.anomaly_breakdown.get("alg0"), Some(&0));
    }
}
