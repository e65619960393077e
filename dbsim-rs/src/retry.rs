//! Bounded-retry driver shared by every polled assertion in the harness.
//!
//! Log-polling, HTTP-polling, and cluster-state polling all go through
//! [`poll_until`]; the content check itself is the only thing that varies.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::errors::{HarnessError, Result};

/// Total budget and fixed poll interval, immutable for one `poll_until` call.
///
/// If `interval >= timeout`, at most one retry sleep occurs before the
/// budget is declared exhausted.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl RetryPolicy {
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        RetryPolicy { timeout, interval }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(Duration::from_secs(180), Duration::from_secs(5))
    }
}

/// Repeatedly invokes `action` until it succeeds or the wall-clock budget
/// elapses, sleeping `policy.interval` between failed attempts.
///
/// The computed deadline is passed to the action so it can propagate the
/// remaining budget into whatever it drives. Once the deadline has passed,
/// the most recent failure is wrapped in [`HarnessError::Timeout`] — never
/// an earlier one. No backoff: convergence here is roughly uniform, and the
/// interval is already short relative to the budget.
pub async fn poll_until<T, F, Fut>(policy: RetryPolicy, mut action: F) -> Result<T>
where
    F: FnMut(Instant) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = Instant::now() + policy.timeout;
    loop {
        match action(deadline).await {
            Ok(value) => return Ok(value),
            Err(last) => {
                if Instant::now() >= deadline {
                    return Err(HarnessError::timeout(policy.timeout, last));
                }
                sleep(policy.interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick(timeout_ms: u64, interval_ms: u64) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(interval_ms),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn returns_on_first_success_without_sleeping() {
        let start = Instant::now();
        let result = poll_until(quick(1000, 100), |_| async { Ok(7) }).await;
        assert_eq!(result.ok(), Some(7));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_k_failed_attempts() {
        let mut calls = 0u32;
        let start = Instant::now();
        let result = poll_until(quick(1000, 100), |_| {
            calls += 1;
            let done = calls > 3;
            async move {
                if done {
                    Ok(())
                } else {
                    Err(HarnessError::assertion("not yet", "ready", "pending"))
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls, 4);
        // three failures, three interval sleeps
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_surfaces_the_final_failure() {
        let mut calls = 0u32;
        let start = Instant::now();
        let result: Result<()> = poll_until(quick(1000, 300), |_| {
            calls += 1;
            let attempt = calls;
            async move { Err(HarnessError::assertion("attempt", "ok", attempt)) }
        })
        .await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1000));
        assert!(elapsed < Duration::from_millis(1300));

        match result {
            Err(HarnessError::Timeout { budget, last }) => {
                assert_eq!(budget, Duration::from_millis(1000));
                // the final attempt's failure, not an earlier one
                assert!(last.to_string().contains(&calls.to_string()));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn action_receives_the_deadline() {
        let start = Instant::now();
        let policy = quick(2000, 100);
        let seen = poll_until(policy, |deadline| async move { Ok(deadline) })
            .await
            .expect("single successful attempt");
        assert_eq!(seen - start, policy.timeout);
    }
}
