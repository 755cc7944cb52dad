//! Retrying upload client.
//!
//! Wraps a single-attempt [`LayoutServer`] with bounded exponential backoff.
//! Only [`UploadError::Retryable`] failures are retried; a fatal response ends
//! the call at once. The backoff sleep races the run's cancellation token, so a
//! cancelled run never waits out a delay.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::server::{LayoutMetadata, LayoutServer, LayoutTarget};
use crate::error::UploadError;
use crate::pyramid::TileKey;

/// Default number of attempts per request (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);

/// Default cap on a single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

// =============================================================================
// Retry Policy
// =============================================================================

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Same attempt budget, no waiting between attempts.
    pub fn no_delay(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Delay after the given failed attempt (1-based): base * 2^(attempt-1), capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

// =============================================================================
// Upload Client
// =============================================================================

/// A [`LayoutServer`] plus a retry policy.
#[derive(Debug)]
pub struct UploadClient<S> {
    server: S,
    policy: RetryPolicy,
}

impl<S: LayoutServer> UploadClient<S> {
    pub fn new(server: S) -> Self {
        Self::with_policy(server, RetryPolicy::default())
    }

    pub fn with_policy(server: S, policy: RetryPolicy) -> Self {
        Self { server, policy }
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Upload one tile, retrying transient failures.
    pub async fn upload_tile(
        &self,
        target: &LayoutTarget,
        key: &TileKey,
        payload: Bytes,
        cancel: &CancellationToken,
    ) -> Result<(), UploadError> {
        let label = key.to_string();
        self.with_retry(&label, cancel, || {
            self.server.send_tile(target, key, payload.clone())
        })
        .await
    }

    /// Register the finished layout, retrying transient failures.
    pub async fn finalize(
        &self,
        target: &LayoutTarget,
        metadata: &LayoutMetadata,
        cancel: &CancellationToken,
    ) -> Result<(), UploadError> {
        self.with_retry("finalize", cancel, || {
            self.server.register_layout(target, metadata)
        })
        .await
    }

    async fn with_retry<F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut attempt_fn: F,
    ) -> Result<(), UploadError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), UploadError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let err = match attempt_fn().await {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(request = label, attempt, "Request succeeded after retry");
                    }
                    return Ok(());
                }
                Err(err) if err.is_retryable() => err,
                Err(err) => return Err(err),
            };

            if attempt >= max_attempts {
                warn!(request = label, attempts = attempt, error = %err, "Retries exhausted");
                return Err(UploadError::Exhausted {
                    attempts: attempt,
                    message: err.to_string(),
                });
            }

            let delay = self.policy.delay_for(attempt);
            warn!(
                request = label,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient failure, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
