//! Side-effect emission for a routed anomaly (spec.md §4.5).

use crate::classify::classify_metric;
use async_trait::async_trait;
use batch_common::config::{FilesystemConfig, RoutingConfig};
use batch_common::{Error, Result, SeriesPoint};
use batch_store::SharedStoreClient;
use chrono::Utc;
use tracing::{info, warn};

/// Everything the router needs to know about one anomalous point.
pub struct AnomalyContext {
    pub base_name: String,
    pub metric_timestamp: i64,
    pub from_timestamp: i64,
    pub datapoint: f64,
    pub triggered_algorithms: Vec<String>,
    pub window: Vec<SeriesPoint>,
}

/// Request shape for the learner's "send anomalous metric" IPC — a
/// contract-only external interface (spec.md §1); `LearnerSubmission`
/// lets tests observe the call without a real learner process.
pub struct LearnerRequest {
    pub directory: std::path::PathBuf,
    pub metric_timestamp: i64,
    pub base_name: String,
    pub datapoint: f64,
    pub from_timestamp: i64,
    pub triggered_algorithms: Vec<String>,
    pub window: Vec<SeriesPoint>,
    pub full_duration_secs: i64,
    pub parent_id: u64,
}

#[async_trait]
pub trait LearnerSubmission: Send + Sync {
    async fn send_anomalous_metric_to(&self, request: LearnerRequest) -> Result<()>;
}

/// Default production implementation: the learner process itself is
/// out of scope (spec.md §1), so this only logs the handoff.
pub struct LoggingLearnerClient;

#[async_trait]
impl LearnerSubmission for LoggingLearnerClient {
    async fn send_anomalous_metric_to(&self, request: LearnerRequest) -> Result<()> {
        info!(
            base_name = %request.base_name,
            ts = request.metric_timestamp,
            directory = %request.directory.display(),
            "submitted anomalous window to learner"
        );
        Ok(())
    }
}

pub struct AnomalyRouter<'a> {
    store: &'a dyn SharedStoreClient,
    learner: &'a dyn LearnerSubmission,
    filesystem: FilesystemConfig,
    routing: RoutingConfig,
    algorithm_names: Vec<String>,
    full_duration_secs: i64,
    app_name: String,
}

impl<'a> AnomalyRouter<'a> {
    pub fn new(
        store: &'a dyn SharedStoreClient,
        learner: &'a dyn LearnerSubmission,
        filesystem: FilesystemConfig,
        routing: RoutingConfig,
        algorithm_names: Vec<String>,
        full_duration_secs: i64,
        app_name: String,
    ) -> Self {
        Self { store, learner, filesystem, routing, algorithm_names, full_duration_secs, app_name }
    }

    pub async fn route(&self, ctx: AnomalyContext) -> Result<()> {
        let classification = classify_metric(self.store, &ctx.base_name).await?;

        if self.routing.mirage_enabled && classification.mirage_metric {
            self.write_mirage_json(&ctx).await?;
            self.write_alert_key(&ctx).await?;
        } else if classification.ionosphere_metric {
            self.route_ionosphere(&ctx, &classification).await?;
        } else {
            if self.routing.record_store_enabled {
                self.write_record_store_file(&ctx).await?;
            }
            self.write_alert_key(&ctx).await?;
        }
        Ok(())
    }

    fn training_dir(&self, ts: i64, base_name: &str) -> std::path::PathBuf {
        self.filesystem.data_root.join(ts.to_string()).join(base_name.replace('.', "/"))
    }

    /// Pre-materializes the training window so the learner's later
    /// layering step has it available, even when the recency gate
    /// would otherwise suppress a live submission (spec.md §9 open
    /// question 2 — the routing table is authoritative).
    async fn write_mirage_json(&self, ctx: &AnomalyContext) -> Result<()> {
        let dir = self.training_dir(ctx.metric_timestamp, &ctx.base_name);
        tokio::fs::create_dir_all(&dir).await.map_err(Error::Io)?;
        let hours = (self.full_duration_secs / 3600).max(1);
        let path = dir.join(format!("{}.mirage.redis.{}h.json", ctx.base_name, hours));
        tokio::fs::write(&path, format_series_as_parenthesized(&ctx.window))
            .await
            .map_err(Error::Io)?;
        Ok(())
    }

    async fn route_ionosphere(&self, ctx: &AnomalyContext, classification: &batch_common::MetricClassification) -> Result<()> {
        if !self.routing.ionosphere_enabled || !classification.smtp_alert_enabled {
            return Ok(());
        }
        let recent_alert = self
            .store
            .get_string(&format!("last_alert.smtp.{}", ctx.base_name))
            .await?
            .is_some();
        if recent_alert {
            return Ok(());
        }

        let dir = self.training_dir(ctx.metric_timestamp, &ctx.base_name);
        tokio::fs::create_dir_all(&dir).await.map_err(Error::Io)?;
        self.learner
            .send_anomalous_metric_to(LearnerRequest {
                directory: dir,
                metric_timestamp: ctx.metric_timestamp,
                base_name: ctx.base_name.clone(),
                datapoint: ctx.datapoint,
                from_timestamp: ctx.from_timestamp,
                triggered_algorithms: ctx.triggered_algorithms.clone(),
                window: ctx.window.clone(),
                full_duration_secs: self.full_duration_secs,
                parent_id: 0,
            })
            .await?;

        self.store.set_add("analyzer.batch.sent_to_ionosphere", &ctx.base_name).await?;
        let key = format!("ionosphere.training_data.{}.{}", ctx.metric_timestamp, ctx.base_name);
        let value = format!(
            "[{}, {}, {}]",
            ctx.metric_timestamp,
            ctx.base_name,
            ctx.datapoint
        );
        self.store
            .set_with_ttl(&key, &value, self.routing.ionosphere_keep_training_timeseries_for_secs)
            .await
            .or_else(|e| {
                warn!(error = %e, "failed to write ionosphere training data index, continuing");
                Ok(())
            })
    }

    async fn write_record_store_file(&self, ctx: &AnomalyContext) -> Result<()> {
        let added_at = Utc::now().timestamp();
        let added_by = std::env::var("HOSTNAME").unwrap_or_else(|_| "batch-worker".to_string());
        let safe_base = ctx.base_name.replace('/', ".");
        let path = self.filesystem.record_store_check_path.join(format!("{added_at}.{safe_base}.txt"));
        tokio::fs::create_dir_all(&self.filesystem.record_store_check_path).await.map_err(Error::Io)?;
        let contents = format!(
            "metric = '{base}'\n\
             value = '{value}'\n\
             from_timestamp = '{from_ts}'\n\
             metric_timestamp = '{ts}'\n\
             algorithms = {algorithms}\n\
             triggered_algorithms = {triggered}\n\
             app = '{app}'\n\
             source = 'graphite'\n\
             added_by = '{added_by}'\n\
             added_at = '{added_at}'\n",
            base = ctx.base_name,
            value = ctx.datapoint,
            from_ts = ctx.from_timestamp,
            ts = ctx.metric_timestamp,
            algorithms = python_list_repr(&self.algorithm_names),
            triggered = python_list_repr(&ctx.triggered_algorithms),
            app = self.app_name,
        );
        tokio::fs::write(&path, contents).await.map_err(Error::Io)?;
        self.store.set_add("analyzer_batch.sent_to_panorama", &ctx.base_name).await?;
        Ok(())
    }

    async fn write_alert_key(&self, ctx: &AnomalyContext) -> Result<()> {
        let key = format!("{}.alert.{}.{}", self.app_name, ctx.metric_timestamp, ctx.base_name);
        let triggered = ctx
            .triggered_algorithms
            .iter()
            .map(|a| format!("'{a}'"))
            .collect::<Vec<_>>()
            .join(", ");
        let value = format!(
            "[{}, '{}', {}, [{}]]",
            ctx.datapoint, ctx.base_name, ctx.metric_timestamp, triggered
        );
        self.store
            .set_with_ttl(&key, &value, 300)
            .await
            .map_err(|e| Error::Router(format!("alert key write failed: {e}")))
    }
}

fn format_series_as_parenthesized(series: &[SeriesPoint]) -> String {
    let items = series.iter().map(|(t, v)| format!("({t}, {v})")).collect::<Vec<_>>().join(", ");
    format!("({items})")
}

/// Raw Python list repr, e.g. `['alg0', 'alg2']` (analyzer_batch.py:763-776).
fn python_list_repr(items: &[String]) -> String {
    let inner = items.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(", ");
    format!("[{inner}]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use batch_store::fake::FakeStore;
    use tempfile::tempdir;

    struct NoopLearner {
        calls: tokio::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LearnerSubmission for NoopLearner {
        async fn send_anomalous_metric_to(&self, request: LearnerRequest) -> Result<()> {
            self.calls.lock().await.push(request.base_name);
            Ok(())
        }
    }

    fn test_router<'a>(store: &'a FakeStore, learner: &'a NoopLearner, root: &std::path::Path) -> AnomalyRouter<'a> {
        AnomalyRouter::new(
            store,
            learner,
            FilesystemConfig {
                data_root: root.join("data"),
                profiles_root: root.join("profiles"),
                record_store_check_path: root.join("panorama"),
            },
            RoutingConfig {
                ionosphere_enabled: true,
                mirage_enabled: true,
                record_store_enabled: true,
                ionosphere_keep_training_timeseries_for_secs: 86_400,
            },
            vec!["alg0".to_string(), "alg1".to_string(), "alg2".to_string()],
            86_400,
            "analyzer_batch".to_string(),
        )
    }

    fn ctx() -> AnomalyContext {
        AnomalyContext {
            base_name: "metrics.foo".to_string(),
            metric_timestamp: 280,
            from_timestamp: 100,
            datapoint: 50.0,
            triggered_algorithms: vec!["alg0".to_string(), "alg2".to_string()],
            window: vec![(100, 1.0), (160, 1.0), (220, 1.0), (280, 50.0)],
        }
    }

    #[tokio::test]
    async fn analyzer_only_writes_record_file_and_alert_key() {
        let dir = tempdir().unwrap();
        let store = FakeStore::default();
        let learner = NoopLearner { calls: Default::default() };
        let router = test_router(&store, &learner, dir.path());
        router.route(ctx()).await.unwrap();

        let alert = store.get_string("analyzer_batch.alert.280.metrics.foo").await.unwrap();
        assert!(alert.is_some());
        assert!(alert.unwrap().contains("'alg0'"));

        let mut entries = tokio::fs::read_dir(dir.path().join("panorama")).await.unwrap();
        let entry = entries.next_entry().await.unwrap().unwrap();
        let contents = tokio::fs::read_to_string(entry.path()).await.unwrap();
        assert!(contents.contains("metric = 'metrics.foo'"));
        assert!(store.set_members("analyzer_batch.sent_to_panorama").await.unwrap().contains(&"metrics.foo".to_string()));
    }

    #[tokio::test]
    async fn mirage_metric_writes_training_json_not_record_file() {
        let dir = tempdir().unwrap();
        let store = FakeStore::default();
        store.set_add("mirage.unique_metrics", "metrics.foo").await.unwrap();
        let learner = NoopLearner { calls: Default::default() };
        let router = test_router(&store, &learner, dir.path());
        router.route(ctx()).await.unwrap();

        let expected_path = dir.path().join("data").join("280").join("metrics/foo").join("metrics.foo.mirage.redis.24h.json");
        let contents = tokio::fs::read_to_string(&expected_path).await.unwrap();
        assert!(contents.starts_with('('));
        assert!(contents.contains("(100, 1)"));

        assert!(!dir.path().join("panorama").exists() || tokio::fs::read_dir(dir.path().join("panorama")).await.unwrap().next_entry().await.unwrap().is_none());
        let alert = store.get_string("analyzer_batch.alert.280.metrics.foo").await.unwrap();
        assert!(alert.is_some());
    }

    #[tokio::test]
    async fn ionosphere_metric_submits_to_learner_and_skips_alert_key() {
        let dir = tempdir().unwrap();
        let store = FakeStore::default();
        store.set_add("ionosphere.unique_metrics", "metrics.foo").await.unwrap();
        let learner = NoopLearner { calls: Default::default() };
        let router = test_router(&store, &learner, dir.path());
        router.route(ctx()).await.unwrap();

        assert_eq!(learner.calls.lock().await.as_slice(), ["metrics.foo"]);
        assert!(store.set_members("analyzer.batch.sent_to_ionosphere").await.unwrap().contains(&"metrics.foo".to_string()));
        let alert = store.get_string("analyzer_batch.alert.280.metrics.foo").await.unwrap();
        assert!(alert.is_none());
    }

    #[tokio::test]
    async fn ionosphere_recency_gate_suppresses_learner_submission() {
        let dir = tempdir().unwrap();
        let store = FakeStore::default();
        store.set_add("ionosphere.unique_metrics", "metrics.foo").await.unwrap();
        store.set_with_ttl("last_alert.smtp.metrics.foo", "1", 300).await.unwrap();
        let learner = NoopLearner { calls: Default::default() };
        let router = test_router(&store, &learner, dir.path());
        router.route(ctx()).await.unwrap();

        assert!(learner.calls.lock().await.is_empty());
    }
}
