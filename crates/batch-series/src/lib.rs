//! Series Codec (SC) and Derivative Classifier (DC).

mod classifier;
mod codec;

pub use classifier::{classify_derivative, DerivativeDecision};
pub use codec::{decode, non_negative_derivative, sort_ascending, strictly_increasing_monotonicity};
