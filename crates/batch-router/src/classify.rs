//! Membership-set derived routing classification (spec.md §3, §4.5).

use batch_common::{MetricClassification, Result};
use batch_store::SharedStoreClient;

const MIRAGE_SET: &str = "mirage.unique_metrics";
const IONOSPHERE_SET: &str = "ionosphere.unique_metrics";
const NON_SMTP_ALERTER_SET: &str = "analyzer.non_smtp_alerter_metrics";

/// Derives the routing flags for a metric. Mutually exclusive by
/// priority: `mirage_metric` overrides `ionosphere_metric`, which
/// overrides `analyzer_metric`; a metric in neither unique-metrics set
/// is `analyzer_metric` by default (spec.md §3).
pub async fn classify_metric(store: &dyn SharedStoreClient, base_name: &str) -> Result<MetricClassification> {
    let in_mirage = store.set_members(MIRAGE_SET).await?.iter().any(|m| m == base_name);
    let in_ionosphere = store.set_members(IONOSPHERE_SET).await?.iter().any(|m| m == base_name);
    let suppressed = store.set_members(NON_SMTP_ALERTER_SET).await?.iter().any(|m| m == base_name);

    let mirage_metric = in_mirage;
    let ionosphere_metric = !mirage_metric && in_ionosphere;
    let analyzer_metric = !mirage_metric && !ionosphere_metric;

    Ok(MetricClassification {
        analyzer_metric,
        mirage_metric,
        ionosphere_metric,
        smtp_alert_enabled: !suppressed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use batch_store::fake::FakeStore;

    #[tokio::test]
    async fn default_classification_is_analyzer_only() {
        let store = FakeStore::default();
        let classification = classify_metric(&store, "metrics.foo").await.unwrap();
        assert!(classification.analyzer_metric);
        assert!(!classification.mirage_metric);
        assert!(!classification.ionosphere_metric);
    }

    #[tokio::test]
    async fn mirage_overrides_ionosphere_and_analyzer() {
        let store = FakeStore::default();
        store.set_add(MIRAGE_SET, "metrics.foo").await.unwrap();
        store.set_add(IONOSPHERE_SET, "metrics.foo").await.unwrap();
        let classification = classify_metric(&store, "metrics.foo").await.unwrap();
        assert!(classification.mirage_metric);
        assert!(!classification.ionosphere_metric);
        assert!(!classification.analyzer_metric);
    }

    #[tokio::test]
    async fn ionosphere_overrides_analyzer_but_not_mirage() {
        let store = FakeStore::default();
        store.set_add(IONOSPHERE_SET, "metrics.foo").await.unwrap();
        let classification = classify_metric(&store, "metrics.foo").await.unwrap();
        assert!(classification.ionosphere_metric);
        assert!(!classification.analyzer_metric);
    }

    #[tokio::test]
    async fn non_smtp_alerter_suppresses_alert_flag_only() {
        let store = FakeStore::default();
        store.set_add(NON_SMTP_ALERTER_SET, "metrics.foo").await.unwrap();
        let classification = classify_metric(&store, "metrics.foo").await.unwrap();
        assert!(!classification.smtp_alert_enabled);
        assert!(classification.analyzer_metric);
    }
}
