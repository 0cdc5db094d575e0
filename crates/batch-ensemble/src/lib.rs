//! Algorithm Ensemble (AE) — external collaborator, specified here by
//! its call contract only (spec.md §4.4). The statistical detectors
//! themselves are out of scope.

use async_trait::async_trait;
use batch_common::{EnsembleFailure, EnsembleVerdict, SeriesPoint};

/// For a given series window and metric name, decide whether the last
/// point is anomalous. `ensemble_votes` in the returned verdict is
/// positionally aligned with the configured algorithm name list.
#[async_trait]
pub trait AlgorithmEnsemble: Send + Sync {
    async fn run(
        &self,
        window: &[SeriesPoint],
        metric_name: &str,
        check_negatives: bool,
    ) -> Result<EnsembleVerdict, EnsembleFailure>;
}

/// A scriptable ensemble for exercising the Batch Worker's state
/// machine without the real statistical detectors. Not `cfg(test)`
/// gated because batch-worker and batch-supervisor need it from their
/// own test modules.
pub mod stub {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    pub enum Scripted {
        Verdict(EnsembleVerdict),
        Failure(EnsembleFailure),
    }

    #[derive(Default)]
    pub struct StubEnsemble {
        /// Keyed by the window's last timestamp, so a test can script a
        /// distinct outcome per batch timestamp.
        pub responses: Mutex<HashMap<i64, Scripted>>,
        pub default_votes: Vec<bool>,
        /// Optional test-fixture injection point. Per spec.md §9's open
        /// design note, this mutates a single datapoint in-place when
        /// its timestamp matches `test_anomaly_at`; it exists only for
        /// test setup and is never reachable from production code.
        pub test_anomaly_at: Option<i64>,
    }

    impl StubEnsemble {
        pub fn new() -> Self {
            Self { default_votes: vec![false, false, false], ..Default::default() }
        }

        pub async fn script(&self, last_ts: i64, outcome: Scripted) {
            self.responses.lock().await.insert(last_ts, outcome);
        }
    }

    #[async_trait]
    impl AlgorithmEnsemble for StubEnsemble {
        async fn run(
            &self,
            window: &[SeriesPoint],
            _metric_name: &str,
            check_negatives: bool,
        ) -> Result<EnsembleVerdict, EnsembleFailure> {
            let mut window = window.to_vec();
            if let (Some(target), Some(last)) = (self.test_anomaly_at, window.last_mut()) {
                if last.0 == target {
                    last.1 += 1000.0;
                }
            }
            let Some((last_ts, last_datapoint)) = window.last().copied() else {
                return Err(EnsembleFailure::TooShort);
            };
            let mut responses = self.responses.lock().await;
            match responses.remove(&last_ts) {
                Some(Scripted::Verdict(mut verdict)) => {
                    verdict.last_datapoint = last_datapoint;
                    if !check_negatives {
                        verdict.negatives_found.clear();
                    }
                    Ok(verdict)
                }
                Some(Scripted::Failure(failure)) => Err(failure),
                None => Ok(EnsembleVerdict {
                    anomalous: false,
                    votes: self.default_votes.clone(),
                    last_datapoint,
                    negatives_found: Vec::new(),
                }),
            }
        }
    }

}
