//! The state machine: FETCH -> DECODE -> CLASSIFY_DERIVATIVE ->
//! ITERATE_WINDOWS -> FINALIZE (spec.md §4.6).

use batch_common::config::Config;
use batch_common::{EnsembleFailure, Result, RunCounters, SeriesPoint, WorkItem};
use batch_ensemble::AlgorithmEnsemble;
use batch_router::{AnomalyContext, AnomalyRouter, LearnerSubmission};
use batch_series::{classify_derivative, decode, non_negative_derivative, sort_ascending, DerivativeDecision};
use batch_store::SharedStoreClient;
use chrono::Utc;
use tracing::{debug, instrument, warn};

const WORK_ITEM_SET: &str = "analyzer.batch";

/// What happened to the work item, for the caller (the worker binary)
/// to log and for the Supervisor's result queues to record.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// Series absent from the store; WorkItem was left in place.
    SeriesMissing,
    /// No timestamps newer than `last_analyzed_ts`; WorkItem removed,
    /// no sentinel write.
    NothingToDo,
    /// One or more timestamps were analyzed; WorkItem removed.
    Processed(RunCounters),
}

fn last_timestamp_key(base_name: &str) -> String {
    format!("last_timestamp.{base_name}")
}

/// Matches the original's `matched_or_regexed_in_list`: each configured
/// pattern is tried first as a literal substring, then as a regex.
fn matches_any_pattern(base_name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| {
        if base_name.contains(pattern.as_str()) {
            return true;
        }
        regex::Regex::new(pattern).map(|re| re.is_match(base_name)).unwrap_or(false)
    })
}

/// Processes one [`WorkItem`]: fetches its series, derives the new
/// timestamps to analyze, runs each through the ensemble, and routes
/// any anomalies. The caller is responsible for the parent-liveness
/// check between iterations (spec.md §4.7) since that is a concern of
/// the worker *process*, not of this pure state machine.
#[instrument(skip(store, ensemble, learner, config), fields(metric = %work_item.metric_name))]
pub async fn process_work_item(
    store: &dyn SharedStoreClient,
    ensemble: &dyn AlgorithmEnsemble,
    learner: &dyn LearnerSubmission,
    config: &Config,
    work_item: &WorkItem,
) -> Result<ProcessOutcome> {
    let Some(blob) = store.get_bytes(&work_item.metric_name).await? else {
        warn!("series missing from store, leaving work item in place");
        return Ok(ProcessOutcome::SeriesMissing);
    };

    let series = sort_ascending(decode(&blob));

    let timestamps_to_analyze = extract_new_timestamps(&series, work_item.last_analyzed_ts);
    if timestamps_to_analyze.is_empty() {
        remove_work_item(store, work_item).await?;
        return Ok(ProcessOutcome::NothingToDo);
    }

    let base_name = work_item
        .metric_name
        .strip_prefix(&config.store.full_namespace)
        .unwrap_or(&work_item.metric_name);
    let decision = classify_derivative(
        store,
        base_name,
        &series,
        &config.analysis.non_derivative_monotonic_metrics,
        config.analysis.derivative_sentinel_ttl_secs,
    )
    .await?;
    let is_derivative = decision == DerivativeDecision::Derivative;
    let check_negatives =
        config.routing.ionosphere_enabled && !matches_any_pattern(base_name, &config.analysis.known_negative_metrics);

    let router = AnomalyRouter::new(
        store,
        learner,
        config.filesystem.clone(),
        config.routing.clone(),
        config.analysis.algorithm_names.clone(),
        config.analysis.full_duration_secs,
        config.analysis.heartbeat_app_name.clone(),
    );

    let mut counters = RunCounters::default();

    for batch_timestamp in timestamps_to_analyze {
        let prefix: Vec<SeriesPoint> = series.iter().copied().filter(|(ts, _)| *ts <= batch_timestamp).collect();
        let window = if is_derivative { non_negative_derivative(&prefix) } else { prefix };

        match ensemble.run(&window, base_name, check_negatives).await {
            Ok(verdict) => {
                set_sentinel(store, base_name, batch_timestamp, 2_592_000).await?;

                if verdict.anomalous {
                    counters.record_anomaly_breakdown(&config.analysis.algorithm_names, &verdict.votes);

                    if check_negatives && !verdict.negatives_found.is_empty() {
                        record_untrainable(store, base_name, batch_timestamp, verdict.last_datapoint, &verdict.negatives_found, config.analysis.full_duration_secs).await?;
                    }

                    store
                        .set_with_ttl(&format!("analyzer_batch.anomaly.{batch_timestamp}.{base_name}"), "1", 3600)
                        .await?;

                    let triggered_algorithms: Vec<String> = config
                        .analysis
                        .algorithm_names
                        .iter()
                        .zip(verdict.votes.iter())
                        .filter(|(_, triggered)| **triggered)
                        .map(|(name, _)| name.clone())
                        .collect();

                    router
                        .route(AnomalyContext {
                            base_name: base_name.to_string(),
                            metric_timestamp: batch_timestamp,
                            from_timestamp: window.first().map(|(t, _)| *t).unwrap_or(batch_timestamp),
                            datapoint: verdict.last_datapoint,
                            triggered_algorithms,
                            window: window.clone(),
                        })
                        .await?;

                    debug!(batch_timestamp, "anomaly routed");
                }
            }
            Err(failure) => {
                counters.record_exception(failure);
                let sentinel_value = if failure.sentinel_uses_batch_timestamp() {
                    batch_timestamp
                } else {
                    Utc::now().timestamp()
                };
                set_sentinel(store, base_name, sentinel_value, 2_592_000).await?;
            }
        }
    }

    let counters = counters.zero_filled(&config.analysis.algorithm_names);
    drain_counters_to_queues(store, &counters).await?;
    remove_work_item(store, work_item).await?;
    Ok(ProcessOutcome::Processed(counters))
}

const ANOMALY_BREAKDOWN_QUEUE: &str = "batch_anomaly_breakdown_q";
const EXCEPTIONS_QUEUE: &str = "batch_exceptions_q";

/// Pushes this run's tallies onto the two result queues the Supervisor
/// drains after its watchdog returns (spec.md §4.6 step 6).
async fn drain_counters_to_queues(store: &dyn SharedStoreClient, counters: &RunCounters) -> Result<()> {
    let breakdown = serde_json::to_string(&counters.anomaly_breakdown).map_err(batch_common::Error::Serialization)?;
    store.list_push(ANOMALY_BREAKDOWN_QUEUE, &breakdown).await?;
    let exceptions = serde_json::to_string(&counters.exceptions).map_err(batch_common::Error::Serialization)?;
    store.list_push(EXCEPTIONS_QUEUE, &exceptions).await
}

/// Scans the series in reverse, collecting timestamps strictly greater
/// than `last_analyzed_ts` and halting at the first one that isn't,
/// then restores ascending order (spec.md §4.6 step 3).
fn extract_new_timestamps(series: &[SeriesPoint], last_analyzed_ts: i64) -> Vec<i64> {
    let mut collected = Vec::new();
    for &(ts, _) in series.iter().rev() {
        if ts <= last_analyzed_ts {
            break;
        }
        collected.push(ts);
    }
    collected.reverse();
    collected
}

async fn set_sentinel(store: &dyn SharedStoreClient, base_name: &str, value: i64, ttl_secs: i64) -> Result<()> {
    store.set_with_ttl(&last_timestamp_key(base_name), &value.to_string(), ttl_secs).await
}

async fn record_untrainable(
    store: &dyn SharedStoreClient,
    metric_name: &str,
    batch_timestamp: i64,
    datapoint: f64,
    negatives: &[SeriesPoint],
    full_duration_secs: i64,
) -> Result<()> {
    let (last_negative_ts, last_negative_value) = negatives.last().copied().unwrap_or((0, 0.0));
    let remove_after_timestamp = batch_timestamp + full_duration_secs;
    let record = format!(
        "[{metric_name}, {batch_timestamp}, {datapoint}, {last_negative_ts}, {last_negative_value}, {full_duration_secs}, {remove_after_timestamp}]"
    );
    store.set_add("ionosphere.untrainable_metrics", &record).await
}

async fn remove_work_item(store: &dyn SharedStoreClient, work_item: &WorkItem) -> Result<()> {
    if let Err(err) = store.set_remove(WORK_ITEM_SET, &work_item.encode()).await {
        warn!(error = %err, "failed to remove work item from queue");
    }
    Ok(())
}
