//! Iterative retry policy for remote fetch failures
//!
//! One loop implements the whole failure taxonomy: throttling signals are
//! waited out without bound (sleeping at least the signaled duration, plus
//! capped exponential growth under sustained throttling), transient failures
//! retry with bounded exponential backoff and optional jitter, and permanent
//! failures propagate immediately. The loop is explicitly iterative so
//! sustained throttling cannot grow the call stack.

use crate::config::RetryConfig;
use crate::error::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Execute a remote operation under the retry policy
///
/// `operation` is re-invoked until it succeeds, fails permanently, or
/// exhausts the transient-failure budget. Throttles do not consume that
/// budget. `on_throttle` is invoked with the chosen wait duration before
/// each throttle sleep, so callers can surface backpressure to observers.
pub async fn fetch_with_policy<F, Fut, T, H>(
    config: &RetryConfig,
    mut operation: F,
    mut on_throttle: H,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
    H: FnMut(Duration),
{
    let mut transient_attempts: u32 = 0;
    let mut throttle_count: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if transient_attempts > 0 || throttle_count > 0 {
                    tracing::info!(
                        transient_attempts,
                        throttle_count,
                        "operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(FetchError::Throttled { retry_after }) => {
                throttle_count += 1;
                let delay = backoff_delay(config, throttle_count - 1).max(retry_after);
                tracing::warn!(
                    throttle_count,
                    signaled_ms = retry_after.as_millis() as u64,
                    delay_ms = delay.as_millis() as u64,
                    "source throttled, backing off"
                );
                on_throttle(delay);
                tokio::time::sleep(delay).await;
            }
            Err(error @ FetchError::Transient(_)) if transient_attempts < config.max_attempts => {
                transient_attempts += 1;
                let mut delay = backoff_delay(config, transient_attempts - 1);
                if config.jitter {
                    delay = add_jitter(delay);
                }
                tracing::warn!(
                    error = %error,
                    attempt = transient_attempts,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                match &error {
                    FetchError::Transient(_) => tracing::error!(
                        error = %error,
                        attempts = transient_attempts + 1,
                        "operation failed after all retry attempts exhausted"
                    ),
                    _ => tracing::error!(error = %error, "operation failed permanently"),
                }
                return Err(error);
            }
        }
    }
}

/// Exponential backoff delay for the given zero-based attempt, capped at the
/// configured maximum
pub(crate) fn backoff_delay(config: &RetryConfig, exponent: u32) -> Duration {
    let factor = config.backoff_multiplier.powi(exponent.min(32) as i32);
    let delay = Duration::from_secs_f64(config.initial_delay.as_secs_f64() * factor);
    delay.min(config.max_delay)
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual delay is between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
