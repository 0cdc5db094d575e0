//! Configuration for the batch anomaly worker.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration, loaded from a TOML file with environment
/// override (`BATCH_` prefixed variables), falling back to `Default`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub analysis: AnalysisConfig,
    pub routing: RoutingConfig,
    pub filesystem: FilesystemConfig,
    pub logging: LoggingConfig,
}

/// Shared Store Client connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub redis_url: String,
    pub full_namespace: String,
    pub ping_backoff_secs: u64,
}

/// Analysis-window and algorithm settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub full_duration_secs: i64,
    pub algorithm_names: Vec<String>,
    pub non_derivative_monotonic_metrics: Vec<String>,
    pub known_negative_metrics: Vec<String>,
    pub derivative_sentinel_ttl_secs: i64,
    pub heartbeat_app_name: String,
    pub heartbeat_ttl_secs: i64,
    pub watchdog_timeout_secs: u64,
    pub watchdog_poll_ms: u64,
    pub empty_queue_poll_secs: u64,
}

/// Downstream subsystem enable flags and retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub ionosphere_enabled: bool,
    pub mirage_enabled: bool,
    pub record_store_enabled: bool,
    pub ionosphere_keep_training_timeseries_for_secs: i64,
}

/// Filesystem roots used by the Anomaly Router and Feature Extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemConfig {
    pub data_root: PathBuf,
    pub profiles_root: PathBuf,
    pub record_store_check_path: PathBuf,
}

/// Ambient logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                redis_url: "redis://127.0.0.1:6379".to_string(),
                full_namespace: "metrics.".to_string(),
                ping_backoff_secs: 10,
            },
            analysis: AnalysisConfig {
                full_duration_secs: 86_400,
                algorithm_names: vec![
                    "first_hour_average".to_string(),
                    "stddev_from_average".to_string(),
                    "median_absolute_deviation".to_string(),
                ],
                non_derivative_monotonic_metrics: Vec::new(),
                known_negative_metrics: Vec::new(),
                derivative_sentinel_ttl_secs: 3600,
                heartbeat_app_name: "analyzer_batch".to_string(),
                heartbeat_ttl_secs: 120,
                watchdog_timeout_secs: 300,
                watchdog_poll_ms: 100,
                empty_queue_poll_secs: 1,
            },
            routing: RoutingConfig {
                ionosphere_enabled: true,
                mirage_enabled: true,
                record_store_enabled: true,
                ionosphere_keep_training_timeseries_for_secs: 2_592_000,
            },
            filesystem: FilesystemConfig {
                data_root: PathBuf::from("/opt/skyline/ionosphere/data"),
                profiles_root: PathBuf::from("/opt/skyline/ionosphere/features_profiles"),
                record_store_check_path: PathBuf::from("/opt/skyline/panorama/check"),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file at `path`, layering
    /// `BATCH_`-prefixed environment variables on top, and falling
    /// back to defaults for anything unset.
    pub fn load(path: Option<&std::path::Path>) -> crate::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default()).map_err(|e| {
                crate::Error::Configuration(format!("failed to seed defaults: {e}"))
            })?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("BATCH").separator("__"));
        let built = builder
            .build()
            .map_err(|e| crate::Error::Configuration(e.to_string()))?;
        built
            .try_deserialize()
            .map_err(|e| crate::Error::Configuration(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let cfg = Config::default();
        let toml_str = toml::to_string(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.analysis.algorithm_names, cfg.analysis.algorithm_names);
    }
}
