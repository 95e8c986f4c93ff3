//! Retry/backoff controller: drives a step's per-attempt timing (§4.7).
//!
//! A sequential driver, not a spawner -- it never starts a thread or task of
//! its own, it just loops the caller's attempt closure and sleeps through
//! the injected `Clock` between attempts so tests can fast-forward.

use std::time::Duration;

use waypoint_types::workflow::RetryConfig;

use crate::clock::Clock;
use crate::dispatcher::DispatchError;

/// The outcome of driving a step's attempts to completion: the final
/// result (success or the last error) and how many attempts were made.
pub struct RetryOutcome {
    pub result: Result<serde_json::Value, DispatchError>,
    pub attempts: u32,
}

/// Drive `attempt` up to `retry.max_attempts` times.
///
/// 1. Attempt counter starts at 1.
/// 2. On success, return immediately.
/// 3. On an error whose code is not in `retry.retryable_errors`, or when the
///    counter equals `max_attempts`, return the error.
/// 4. Otherwise sleep `initial_delay * multiplier^(attempt-1)` via `clock`
///    and increment.
pub async fn drive<C, F, Fut>(retry: &RetryConfig, clock: &C, mut attempt: F) -> RetryOutcome
where
    C: Clock,
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<serde_json::Value, DispatchError>>,
{
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        let outcome = attempt(attempts).await;

        let error = match outcome {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts,
                };
            }
            Err(error) => error,
        };

        let retryable = retry.retryable_errors.iter().any(|code| code == &error.code);
        if !retryable || attempts >= retry.max_attempts {
            return RetryOutcome {
                result: Err(error),
                attempts,
            };
        }

        let delay = backoff_delay(retry, attempts);
        tracing::debug!(attempt = attempts, delay_ms = delay.as_millis() as u64, "retrying after transient error");
        clock.sleep(delay).await;
    }
}

/// `initial_delay * multiplier^(attempt - 1)`, `attempt` being the 1-based
/// attempt that just failed.
fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let factor = retry.multiplier.powi((attempt - 1) as i32);
    Duration::from_secs_f64((retry.initial_delay.as_secs_f64() * factor).max(0.0))
}
