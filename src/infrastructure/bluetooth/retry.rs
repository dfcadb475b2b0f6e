use crate::domain::error::TowerError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bounded retry with a fixed pause between attempts.
///
/// Only meant for the window right after connecting, when the attribute table
/// may not answer yet. Reads and writes on a ready session are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Run `operation` until it succeeds or `max_attempts` is used up.
    ///
    /// The closure receives the 1-based attempt number. `on_retry` is called
    /// with the attempt number, its error and the pause before the next
    /// attempt; it is not called for the final failure, which is wrapped in
    /// [`TowerError::RetriesExhausted`].
    pub async fn run<T, F, Fut, R>(
        &self,
        mut operation: F,
        mut on_retry: R,
    ) -> Result<T, TowerError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TowerError>>,
        R: FnMut(u32, &TowerError, Duration),
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => {
                    return Err(TowerError::RetriesExhausted {
                        attempts,
                        cause: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt, attempts, e, self.delay
                    );
                    on_retry(attempt, &e, self.delay);
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
