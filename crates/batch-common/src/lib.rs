//! Shared foundation for the batch anomaly-analysis worker.
//!
//! Holds the error taxonomy, configuration, wire-level types, retry
//! policy and logging bootstrap used by every other crate in the
//! workspace.

pub mod config;
pub mod error;
pub mod logging;
pub mod retry;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use retry::RetryPolicy;
pub use types::*;
