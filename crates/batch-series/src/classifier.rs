//! Derivative Classifier (DC): decides whether a metric's raw values
//! are cumulative and must be first-differenced before analysis
//! (spec.md §4.3).

use batch_common::{Result, SeriesPoint};
use batch_store::SharedStoreClient;
use regex::Regex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivativeDecision {
    Derivative,
    NonDerivative,
}

const NON_DERIVATIVE_METRICS_SET: &str = "non_derivative_metrics";
const DERIVATIVE_METRICS_SET: &str = "derivative_metrics";

fn sentinel_key(base_name: &str) -> String {
    format!("z.derivative_metric.{base_name}")
}

/// Matches the original's `matched_or_regexed_in_list`: each configured
/// pattern is tried first as a literal substring, then as a regex.
fn matches_any_pattern(base_name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| {
        if base_name.contains(pattern.as_str()) {
            return true;
        }
        Regex::new(pattern).map(|re| re.is_match(base_name)).unwrap_or(false)
    })
}

pub async fn classify_derivative(
    store: &dyn SharedStoreClient,
    base_name: &str,
    series: &[SeriesPoint],
    non_derivative_monotonic_patterns: &[String],
    sentinel_ttl_secs: i64,
) -> Result<DerivativeDecision> {
    if store.set_members(NON_DERIVATIVE_METRICS_SET).await?.iter().any(|m| m == base_name) {
        debug!(base_name, "classified non-derivative via memoized set");
        return Ok(DerivativeDecision::NonDerivative);
    }
    if store.set_members(DERIVATIVE_METRICS_SET).await?.iter().any(|m| m == base_name) {
        debug!(base_name, "classified derivative via memoized set");
        return Ok(DerivativeDecision::Derivative);
    }

    if store.get_string(&sentinel_key(base_name)).await?.is_some() {
        debug!(base_name, "classified derivative via sentinel, skipping re-test");
        persist(store, base_name, DerivativeDecision::Derivative, sentinel_ttl_secs).await?;
        return Ok(DerivativeDecision::Derivative);
    }

    let decision = if matches_any_pattern(base_name, non_derivative_monotonic_patterns) {
        DerivativeDecision::NonDerivative
    } else if crate::codec::strictly_increasing_monotonicity(series) {
        DerivativeDecision::Derivative
    } else {
        DerivativeDecision::NonDerivative
    };

    persist(store, base_name, decision, sentinel_ttl_secs).await?;
    Ok(decision)
}

async fn persist(
    store: &dyn SharedStoreClient,
    base_name: &str,
    decision: DerivativeDecision,
    sentinel_ttl_secs: i64,
) -> Result<()> {
    match decision {
        DerivativeDecision::Derivative => {
            store.set_add(DERIVATIVE_METRICS_SET, base_name).await?;
            store.set_with_ttl(&sentinel_key(base_name), "1", sentinel_ttl_secs).await?;
        }
        DerivativeDecision::NonDerivative => {
            store.set_add(NON_DERIVATIVE_METRICS_SET, base_name).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use batch_store::fake::FakeStore;

    #[tokio::test]
    async fn honors_non_derivative_memo_over_monotonic_series() {
        let store = FakeStore::default();
        store.set_add(NON_DERIVATIVE_METRICS_SET, "metrics.bar").await.unwrap();
        let series = vec![(100, 10.0), (160, 20.0), (220, 30.0)];
        let decision = classify_derivative(&store, "metrics.bar", &series, &[], 3600).await.unwrap();
        assert_eq!(decision, DerivativeDecision::NonDerivative);
    }

    #[tokio::test]
    async fn classifies_strictly_increasing_series_as_derivative_and_persists() {
        let store = FakeStore::default();
        let series = vec![(100, 10.0), (160, 20.0), (220, 30.0), (280, 40.0)];
        let decision = classify_derivative(&store, "metrics.bar", &series, &[], 3600).await.unwrap();
        assert_eq!(decision, DerivativeDecision::Derivative);
        assert!(store.set_members(DERIVATIVE_METRICS_SET).await.unwrap().contains(&"metrics.bar".to_string()));
    }

    #[tokio::test]
    async fn configured_pattern_forces_non_derivative_despite_monotonic_series() {
        let store = FakeStore::default();
        let series = vec![(100, 10.0), (160, 20.0), (220, 30.0)];
        let decision = classify_derivative(
            &store,
            "metrics.counter.total",
            &series,
            &["counter".to_string()],
            3600,
        )
        .await
        .unwrap();
        assert_eq!(decision, DerivativeDecision::NonDerivative);
    }

    #[tokio::test]
    async fn sentinel_present_skips_re_test() {
        let store = FakeStore::default();
        store.set_with_ttl("z.derivative_metric.metrics.bar", "1", 3600).await.unwrap();
        let flat_series = vec![(100, 10.0), (160, 10.0)];
        let decision = classify_derivative(&store, "metrics.bar", &flat_series, &[], 3600).await.unwrap();
        assert_eq!(decision, DerivativeDecision::Derivative);
    }
}
