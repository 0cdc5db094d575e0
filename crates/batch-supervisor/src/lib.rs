//! Supervisor (spec.md §4.7): picks one work item per iteration,
//! supervises an isolated child process running it, and aggregates the
//! two result queues the child drains its counters into. The run loop
//! itself lives in `src/bin/supervisor.rs` since it is pure I/O
//! orchestration; this crate holds the parts worth testing without a
//! live store or a real child process.

use batch_common::{Result, RunCounters, WorkItem};
use std::collections::HashMap;

/// Picks the first decodable member of a `analyzer.batch` set draw,
/// skipping garbage entries rather than failing the whole iteration
/// (spec.md §9: a malformed member must not crash the draw loop).
pub fn pick_work_item(members: &[String]) -> Option<WorkItem> {
    members.iter().find_map(|raw| WorkItem::decode(raw))
}

/// Folds one queue entry (a JSON object of counter name to count) into
/// a running aggregate, summing on collision.
pub fn merge_count_entries(aggregate: &mut HashMap<String, u64>, raw_entries: &[String]) -> Result<()> {
    for raw in raw_entries {
        let entry: HashMap<String, u64> =
            serde_json::from_str(raw).map_err(batch_common::Error::Serialization)?;
        for (key, value) in entry {
            *aggregate.entry(key).or_insert(0) += value;
        }
    }
    Ok(())
}

/// Builds the zero-filled aggregate for one Supervisor iteration from
/// the two drained result queues (spec.md §4.7: "zero-fill aggregates
/// against the closed exception set and the algorithm list").
pub fn aggregate_from_queues(
    anomaly_breakdown_entries: &[String],
    exception_entries: &[String],
    algorithm_names: &[String],
) -> Result<RunCounters> {
    let mut counters = RunCounters::default();
    merge_count_entries(&mut counters.anomaly_breakdown, anomaly_breakdown_entries)?;
    merge_count_entries(&mut counters.exceptions, exception_entries)?;
    Ok(counters.zero_filled(algorithm_names))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_work_item_skips_garbage_and_returns_first_valid() {
        let members = vec!["garbage".to_string(), "metrics.foo\u{1f}100".to_string()];
        let picked = pick_work_item(&members).unwrap();
        assert_eq!(picked.metric_name, "metrics.foo");
        assert_eq!(picked.last_analyzed_ts, 100);
    }

    #[test]
    fn pick_work_item_on_empty_set_is_none() {
        assert!(pick_work_item(&[]).is_none());
    }

    #[test]
    fn merge_count_entries_sums_across_entries() {
        let mut aggregate = HashMap::new();
        let entries = vec![
            r#"{"Stale": 1, "Boring": 2}"#.to_string(),
            r#"{"Stale": 3}"#.to_string(),
        ];
        merge_count_entries(&mut aggregate, &entries).unwrap();
        assert_eq!(aggregate.get("Stale"), Some(&4));
        assert_eq!(aggregate.get("Boring"), Some(&2));
    }

    #[test]
    fn aggregate_from_queues_zero_fills_closed_sets() {
        let breakdown = vec![r#"{"alg0": 1}"#.to_string()];
        let exceptions = vec![r#"{"Stale": 1}"#.to_string()];
        let counters = aggregate_from_queues(&breakdown, &exceptions, &["alg0".to_string(), "alg1".to_string()]).unwrap();
        assert_eq!(counters.anomaly_breakdown.get("alg0"), Some(&1));
        assert_eq!(counters.anomaly_breakdown.get("alg1"), Some(&0));
        assert_eq!(counters.exceptions.get("TooShort"), Some(&0));
    }
}
