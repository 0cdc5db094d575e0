//! Batch Worker entrypoint. Invoked by the Supervisor as a child
//! process with five positional arguments: an ordinal, the run
//! timestamp, the metric name, the last-analyzed timestamp, and the
//! parent's pid (spec.md §6, §4.7 process boundary).

use batch_common::config::Config;
use batch_common::{logging, WorkItem};
use batch_ensemble::AlgorithmEnsemble;
use batch_router::LoggingLearnerClient;
use batch_store::RedisStore;
use batch_worker::liveness;
use clap::Parser;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "batch-worker")]
struct Args {
    /// Ordinal of this worker within the current Supervisor iteration,
    /// used only for log correlation.
    ordinal: u64,
    /// The Supervisor run's wall-clock timestamp.
    run_timestamp: i64,
    /// The metric being analyzed.
    metric_name: String,
    /// Timestamp up to which this metric has already been analyzed.
    last_analyzed_ts: i64,
    /// Pid of the spawning Supervisor, checked for liveness between
    /// timestamps so an orphaned worker exits on its own.
    parent_pid: u32,
    #[arg(long, env = "BATCH_CONFIG")]
    config: Option<std::path::PathBuf>,
}

/// Real statistical ensembles are out of scope here (spec.md §1, §4.4);
/// this placeholder always reports [`batch_common::EnsembleFailure::Other`]
/// so the worker binary is runnable end to end without one. A production
/// deployment substitutes a real `AlgorithmEnsemble` implementation.
struct UnimplementedEnsemble;

#[async_trait::async_trait]
impl AlgorithmEnsemble for UnimplementedEnsemble {
    async fn run(
        &self,
        _window: &[(i64, f64)],
        _metric_name: &str,
        _check_negatives: bool,
    ) -> Result<batch_common::EnsembleVerdict, batch_common::EnsembleFailure> {
        Err(batch_common::EnsembleFailure::Other)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    logging::init(&config.logging);

    info!(
        ordinal = args.ordinal,
        metric = %args.metric_name,
        run_timestamp = args.run_timestamp,
        "batch worker starting"
    );

    if !liveness::parent_is_alive(args.parent_pid) {
        warn!(parent_pid = args.parent_pid, "parent already gone, exiting");
        return Ok(());
    }

    let store = RedisStore::connect(&config.store.redis_url).await?;
    let ensemble = UnimplementedEnsemble;
    let learner = LoggingLearnerClient;
    let work_item = WorkItem { metric_name: args.metric_name.clone(), last_analyzed_ts: args.last_analyzed_ts };

    let liveness_guard = tokio::spawn(watch_parent_liveness(args.parent_pid));

    let outcome = batch_worker::process_work_item(&store, &ensemble, &learner, &config, &work_item).await;
    liveness_guard.abort();

    match outcome {
        Ok(outcome) => {
            info!(?outcome, "batch worker finished");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "batch worker failed");
            Err(err.into())
        }
    }
}

/// Polls parent liveness in the background for the duration of the
/// analysis; exits the process immediately if the parent disappears,
/// since there is no cooperative cancellation channel (spec.md §4.7).
async fn watch_parent_liveness(parent_pid: u32) {
    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        ticker.tick().await;
        if !liveness::parent_is_alive(parent_pid) {
            warn!(parent_pid, "parent process gone, exiting");
            std::process::exit(0);
        }
    }
}
