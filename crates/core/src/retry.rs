use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::QaError;

/// Capped retry around upstream calls. `max_attempts = 1` disables retrying.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_backoff_ms: 250,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
        }
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent. Backoff doubles after every failed attempt.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, QaError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, QaError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut backoff = Duration::from_millis(self.initial_backoff_ms);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts,
                        error = %error,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
