//! Retry with exponential backoff.
//!
//! Every store interaction runs through [`Retrier::run`], which rebuilds
//! the operation future for each attempt. Whether a failure is retried is
//! decided by its [`FaultKind`](cloudhaul_core::FaultKind): transient and
//! injected-abort failures always are, client faults only when the
//! configuration says so, usage and integrity failures never.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cloudhaul_core::{ClientConfig, CloudHaulError, CloudHaulResult};
use tracing::warn;

/// Observer notified on every retry, before the backoff sleep.
pub trait RetryListener: Send + Sync {
    /// `attempt` is 1-based: the first retry reports 1.
    fn on_retry(&self, url: &str, attempt: usize, error: &CloudHaulError);
}

/// Retry policy plus the listeners to notify.
#[derive(Clone)]
pub struct Retrier {
    count: usize,
    retry_client_faults: bool,
    initial_delay: Duration,
    max_delay: Duration,
    listeners: Vec<Arc<dyn RetryListener>>,
}

impl std::fmt::Debug for Retrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retrier")
            .field("count", &self.count)
            .field("retry_client_faults", &self.retry_client_faults)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Retrier {
    /// Build a retrier from the client configuration.
    #[must_use]
    pub fn new(config: &ClientConfig, listeners: Vec<Arc<dyn RetryListener>>) -> Self {
        Self {
            count: config.retry_count,
            retry_client_faults: config.retry_client_faults,
            initial_delay: Duration::from_millis(config.retry_initial_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            listeners,
        }
    }

    /// Run `operation`, retrying retryable failures up to the configured
    /// count. The closure is invoked fresh for every attempt.
    pub async fn run<T, F, Fut>(&self, url: &str, mut operation: F) -> CloudHaulResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CloudHaulResult<T>>,
    {
        let mut attempt = 0_usize;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    attempt += 1;
                    if attempt > self.count
                        || !error.kind().is_retryable(self.retry_client_faults)
                    {
                        return Err(error);
                    }
                    warn!(url, attempt, error = %error, "retrying after failure");
                    for listener in &self.listeners {
                        listener.on_retry(url, attempt, &error);
                    }
                    tokio::time::sleep(self.delay_for(attempt)).await;
                }
            }
        }
    }

    /// Delay before retry `attempt`: the initial delay doubled per prior
    /// retry, capped at the configured maximum.
    fn delay_for(&self, attempt: usize) -> Duration {
        let doublings = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        // The cap makes larger shifts pointless; clamping avoids overflow.
        let factor = 1_u32.checked_shl(doublings.min(16)).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}
