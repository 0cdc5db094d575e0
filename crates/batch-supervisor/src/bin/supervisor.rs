//! Supervisor run loop (spec.md §4.7): ping/reconnect, heartbeat, draw
//! one work item, spawn and watch an isolated `batch-worker` child,
//! drain and aggregate its result queues, repeat forever.

use batch_common::config::Config;
use batch_common::{logging, RetryPolicy};
use batch_store::{RedisStore, SharedStoreClient};
use chrono::Utc;
use clap::Parser;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{info, warn};

const WORK_ITEM_SET: &str = "analyzer.batch";
const ANOMALY_BREAKDOWN_QUEUE: &str = "batch_anomaly_breakdown_q";
const EXCEPTIONS_QUEUE: &str = "batch_exceptions_q";

#[derive(Parser, Debug)]
#[command(name = "batch-supervisor")]
struct Args {
    #[arg(long, env = "BATCH_CONFIG")]
    config: Option<std::path::PathBuf>,
    /// Path to the `batch-worker` binary to spawn per work item.
    #[arg(long, default_value = "batch-worker")]
    worker_bin: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    logging::init(&config.logging);

    let store = RedisStore::connect(&config.store.redis_url).await?;
    let ping_backoff = RetryPolicy::fixed_secs(config.store.ping_backoff_secs);
    let own_pid = std::process::id();

    let mut ordinal: u64 = 0;
    loop {
        ping_backoff.retry_until_ok("store ping", || store.ping()).await;

        let work_item = loop {
            store
                .set_with_ttl(&config.analysis.heartbeat_app_name, &Utc::now().timestamp().to_string(), config.analysis.heartbeat_ttl_secs)
                .await?;

            let members = store.set_members(WORK_ITEM_SET).await?;
            if let Some(picked) = batch_supervisor::pick_work_item(&members) {
                break picked;
            }
            sleep(Duration::from_secs(config.analysis.empty_queue_poll_secs)).await;
        };

        ordinal += 1;
        let run_timestamp = Utc::now().timestamp();
        info!(ordinal, metric = %work_item.metric_name, "spawning batch worker");

        let mut child = match Command::new(&args.worker_bin)
            .arg(ordinal.to_string())
            .arg(run_timestamp.to_string())
            .arg(&work_item.metric_name)
            .arg(work_item.last_analyzed_ts.to_string())
            .arg(own_pid.to_string())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                warn!(error = %err, "failed to spawn batch worker, leaving item queued");
                sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        watch_child(&mut child, Duration::from_secs(config.analysis.watchdog_timeout_secs), Duration::from_millis(config.analysis.watchdog_poll_ms)).await;

        let anomaly_breakdown_entries = store.list_range(ANOMALY_BREAKDOWN_QUEUE).await?;
        let exception_entries = store.list_range(EXCEPTIONS_QUEUE).await?;
        let aggregate = batch_supervisor::aggregate_from_queues(
            &anomaly_breakdown_entries,
            &exception_entries,
            &config.analysis.algorithm_names,
        )?;
        info!(ordinal, anomaly_breakdown = ?aggregate.anomaly_breakdown, exceptions = ?aggregate.exceptions, "iteration complete");

        store.list_clear(ANOMALY_BREAKDOWN_QUEUE).await?;
        store.list_clear(EXCEPTIONS_QUEUE).await?;
    }
}

/// Polls `try_wait()` until the child exits or `timeout` elapses, then
/// terminates it (spec.md §4.7, §5: the only cancellation mechanism is
/// the parent killing the child after 300s).
async fn watch_child(child: &mut tokio::process::Child, timeout: Duration, poll_interval: Duration) {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                info!(?status, "batch worker exited");
                return;
            }
            Ok(None) => {
                if started.elapsed() >= timeout {
                    warn!("batch worker exceeded watchdog timeout, terminating");
                    if let Err(err) = child.kill().await {
                        warn!(error = %err, "failed to kill batch worker");
                    }
                    let _ = child.wait().await;
                    return;
                }
                sleep(poll_interval).await;
            }
            Err(err) => {
                warn!(error = %err, "failed to poll batch worker status");
                return;
            }
        }
    }
}
