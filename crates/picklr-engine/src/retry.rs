//! Retry/timeout helper for provider operations (§4.11).

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use picklr_provider::ProviderError;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub timeout: Duration,
    pub base_interval: Duration,
    pub max_interval: Duration,
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            timeout: Duration::from_secs(30 * 60),
            base_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("cancelled during retry backoff")]
    Cancelled,
    #[error(transparent)]
    Inner(#[from] ProviderError),
}

/// Transient-error classifier: provider errors don't carry a structured
/// status code (the boundary is plain JSON, per the provider contract), so
/// this matches on the rendered message the way an embedder shimming a
/// non-Rust provider process would have to.
pub fn is_transient(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["throttl", "rate limit", "connection reset", "timed out", "timeout", "503", "502", "504"]
        .iter()
        .any(|kw| lower.contains(kw))
}

/// Poll `is_cancelled` in short ticks instead of sleeping the whole interval
/// at once, so cancellation during backoff propagates promptly rather than
/// waiting out the full delay.
async fn sleep_cancellable(duration: Duration, is_cancelled: &mut impl FnMut() -> bool) -> bool {
    const TICK: Duration = Duration::from_millis(100);
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if is_cancelled() {
            return true;
        }
        let step = remaining.min(TICK);
        tokio::time::sleep(step).await;
        remaining -= step;
    }
    is_cancelled()
}

/// Run `operation` under a per-attempt timeout, retrying transient failures
/// with exponential backoff (jittered, per `backoff`'s default randomization
/// factor) up to `config.max_retries` times.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    mut is_cancelled: impl FnMut() -> bool,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    let mut backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(config.base_interval)
        .with_max_interval(config.max_interval)
        .with_max_elapsed_time(None)
        .build();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let outcome = match tokio::time::timeout(config.timeout, operation()).await {
            Ok(result) => result,
            Err(_) => return Err(RetryError::Timeout(config.timeout)),
        };

        match outcome {
            Ok(value) => {
                if attempts > 1 {
                    debug!(attempts, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                if attempts > config.max_retries || !is_transient(&e.to_string()) {
                    return Err(RetryError::Inner(e));
                }
                let Some(delay) = backoff.next_backoff() else {
                    return Err(RetryError::Inner(e));
                };
                warn!(attempts, error = %e, retry_in_ms = delay.as_millis(), "retrying after transient error");
                if sleep_cancellable(delay, &mut is_cancelled).await {
                    return Err(RetryError::Cancelled);
                }
            }
        }
    }
}
