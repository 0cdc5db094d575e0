//! Anomaly Router (AR): classifies an anomalous metric and fans the
//! finding out to the downstream subsystems (spec.md §4.5).

mod classify;
mod route;

pub use classify::classify_metric;
pub use route::{AnomalyContext, AnomalyRouter};
