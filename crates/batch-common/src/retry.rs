//! Retry policy for shared-store reconnects.
//!
//! The spec calls for exactly one retry shape — a fixed back-off before
//! reconnecting after a failed store ping (spec.md §4.1, §4.7) — so this
//! is deliberately smaller than a general-purpose retry executor: one
//! policy, one call site per binary.

use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn fixed_secs(secs: u64) -> Self {
        Self { delay: Duration::from_secs(secs) }
    }

    /// Run `attempt` until it succeeds, sleeping `delay` between
    /// failures and logging each one. Never gives up — the Supervisor
    /// loop is meant to run forever.
    pub async fn retry_until_ok<F, Fut, T, E>(&self, operation_name: &str, mut attempt: F) -> T
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        loop {
            match attempt().await {
                Ok(value) => return value,
                Err(err) => {
                    warn!(operation = operation_name, error = %err, delay_secs = self.delay.as_secs(), "retrying after backoff");
                    sleep(self.delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let policy = RetryPolicy::fixed_secs(0);
        let attempts = AtomicU32::new(0);
        let result = policy
            .retry_until_ok("test", || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err("not yet")
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
