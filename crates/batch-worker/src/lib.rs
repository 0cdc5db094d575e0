//! Batch Worker (BW): processes one work item end to end (spec.md §4.6).

pub mod liveness;
mod process;

pub use process::{process_work_item, ProcessOutcome};
