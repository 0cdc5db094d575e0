//! Logging bootstrap, shared by the supervisor and worker binaries.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber. Call once per process,
/// before any other logging happens.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if config.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
