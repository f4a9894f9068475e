//! Bounded exponential-backoff retry with per-attempt timeouts

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::error::Error;

/// Longest single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Retry budget for calls to an external model
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry
    pub base_delay: Duration,
    /// Deadline for a single attempt
    pub attempt_timeout: Option<Duration>,
    /// Whether a timed-out attempt is retried or ends the call
    pub retry_timeouts: bool,
}

/// Why a retried call gave up
#[derive(Debug)]
pub enum RetryError {
    /// An attempt exceeded `attempt_timeout` (and timeouts are not retried,
    /// or the last attempt timed out)
    TimedOut { attempts: u32, timeout: Duration },
    /// Every attempt failed with a transient error
    Exhausted { attempts: u32, last: Error },
    /// A non-transient error; not retried
    Fatal(Error),
}

enum Failure {
    TimedOut(Duration),
    Failed(Error),
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            attempt_timeout: None,
            retry_timeouts: true,
        }
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = Some(attempt_timeout);
        self
    }

    pub fn with_retry_timeouts(mut self, retry_timeouts: bool) -> Self {
        self.retry_timeouts = retry_timeouts;
        self
    }

    /// Backoff before retry number `attempt + 1`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Run `operation` until it succeeds, fails permanently or the budget is spent
    pub async fn run<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = crate::error::Result<T>>,
    {
        let mut last_failure = None;
        let mut attempts = 0;

        for attempt in 0..=self.max_retries {
            attempts = attempt + 1;

            let outcome = match self.attempt_timeout {
                Some(limit) => match timeout(limit, operation()).await {
                    Ok(result) => result.map_err(Failure::Failed),
                    Err(_) => Err(Failure::TimedOut(limit)),
                },
                None => operation().await.map_err(Failure::Failed),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(Failure::Failed(e)) if !e.is_transient() => return Err(RetryError::Fatal(e)),
                Err(Failure::TimedOut(limit)) if !self.retry_timeouts => {
                    tracing::warn!("[{}] attempt {} timed out after {:?}", label, attempts, limit);
                    return Err(RetryError::TimedOut {
                        attempts,
                        timeout: limit,
                    });
                }
                Err(failure) => {
                    match &failure {
                        Failure::TimedOut(limit) => {
                            tracing::warn!("[{}] attempt {} timed out after {:?}", label, attempts, limit)
                        }
                        Failure::Failed(e) => {
                            tracing::warn!("[{}] attempt {} failed: {}", label, attempts, e)
                        }
                    }
                    last_failure = Some(failure);

                    if attempt < self.max_retries {
                        let delay = self.delay_for(attempt);
                        tracing::warn!(
                            "[{}] retrying (attempt {}/{}) in {:?}",
                            label,
                            attempts + 1,
                            self.max_retries + 1,
                            delay
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(match last_failure {
            Some(Failure::TimedOut(limit)) => RetryError::TimedOut {
                attempts,
                timeout: limit,
            },
            Some(Failure::Failed(last)) => RetryError::Exhausted { attempts, last },
            None => RetryError::Exhausted {
                attempts,
                last: Error::internal("retry loop ran no attempts"),
            },
        })
    }
}
