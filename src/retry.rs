//! Per-request retry loop.
//!
//! Transport errors and unexpected statuses are both retried with the same
//! backoff curve. Nothing escapes the loop: every call to
//! [`RetryPolicy::execute`] ends in an [`Outcome`].

use crate::client::HttpClient;
use crate::error::RequestError;
use crate::item::{Attempt, Outcome, WorkItem};
use crate::signal::StopSignal;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` means a single attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub base_delay: Duration,
    /// Upper bound on any single backoff.
    pub max_delay: Duration,
    /// The only status counted as success.
    pub success_status: u16,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            success_status: 200,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_success_status(mut self, status: u16) -> Self {
        self.success_status = status;
        self
    }

    /// Delay to wait after the failed attempt with 0-based index `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs up to `max_retries + 1` attempts for `item`, then releases it
    /// from `client`.
    ///
    /// Once `stop` is raised no further attempt starts; the last error is
    /// returned as the failure.
    pub async fn execute(
        &self,
        client: &dyn HttpClient,
        item: &WorkItem,
        stop: &StopSignal,
    ) -> Outcome {
        let outcome = self.attempt_until_done(client, item, stop).await;
        client.release(item);
        outcome
    }

    async fn attempt_until_done(
        &self,
        client: &dyn HttpClient,
        item: &WorkItem,
        stop: &StopSignal,
    ) -> Outcome {
        let mut index = 0u32;
        loop {
            let started = Instant::now();
            let result = match client.get(item).await {
                Ok(res) if res.status == self.success_status => Ok(res.latency),
                Ok(res) => Err(RequestError::Status(res.status)),
                Err(e) => Err(e),
            };
            let attempt = Attempt {
                index,
                started,
                result,
            };

            let error = match attempt.result {
                Ok(latency) => {
                    return Outcome::Success {
                        latency,
                        attempts: attempt.index + 1,
                    };
                }
                Err(error) => error,
            };

            let attempts = attempt.index + 1;
            if attempt.index >= self.max_retries {
                log::error!(
                    "Request to {} failed after {} attempts: {}",
                    item.endpoint(),
                    attempts,
                    error
                );
                return Outcome::Failure { error, attempts };
            }

            let delay = self.backoff(attempt.index);
            log::debug!(
                "Attempt {} for {} failed after {:?}: {} (retrying in {:?})",
                attempts,
                item.endpoint(),
                attempt.started.elapsed(),
                error,
                delay
            );
            if !stop.sleep(delay).await {
                log::warn!(
                    "Stop raised, giving up on {} after {} attempts: {}",
                    item.endpoint(),
                    attempts,
                    error
                );
                return Outcome::Failure { error, attempts };
            }
            index += 1;
        }
    }
}
