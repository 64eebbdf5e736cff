//! Bounded exponential-backoff retry loop with cancellation.
//!
//! Classifies errors as retryable vs terminal and gives up once either a
//! total deadline elapses or a cancellation token fires, whichever comes
//! first. Also carries a log sanitiser used everywhere a connection string
//! or driver error might otherwise leak a secret into `tracing` output.

mod sanitize;

pub use sanitize::sanitize;

use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Outcome of a retry loop.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation never succeeded before the deadline elapsed or the
    /// retry budget (attempt count) was exhausted. Carries the last
    /// observed error.
    Exhausted(E),
    /// The operation returned a terminal error (per the classifier) and was
    /// not retried.
    Terminal(E),
    /// The cancellation token fired before the operation succeeded.
    Cancelled,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryError::Exhausted(e) => write!(f, "retries exhausted: {e}"),
            RetryError::Terminal(e) => write!(f, "terminal error: {e}"),
            RetryError::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Policy governing a single retry loop.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Interval before the first retry (doubles after each failed attempt).
    pub base_interval: Duration,
    /// Ceiling the doubling interval never exceeds.
    pub max_interval: Duration,
    /// Wall-clock budget for the whole loop, including the initial attempt.
    pub deadline: Duration,
    /// Hard cap on the number of attempts regardless of remaining deadline.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// A policy bounded only by a total deadline — used for health probes,
    /// which impose a fixed 5s ceiling independent of any caller-supplied
    /// timeout.
    pub fn bounded(deadline: Duration) -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(2),
            deadline,
            max_attempts: 8,
        }
    }

    /// Default policy for native pool construction: longer ceiling, more
    /// attempts than a probe gets.
    pub fn for_pool_build() -> Self {
        Self {
            base_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(5),
            deadline: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

/// Run `op` under `policy`, retrying while `is_retryable` returns `true` for
/// the error it produced, until success, a terminal error, exhaustion, or
/// cancellation via `token`.
pub async fn retry<T, E, Op, Fut, Classify>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    is_retryable: Classify,
    mut op: Op,
) -> Result<T, RetryError<E>>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Classify: Fn(&E) -> bool,
{
    let start = Instant::now();
    let mut interval = policy.base_interval;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        if token.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(RetryError::Cancelled),
            outcome = op() => outcome,
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retryable(&err) {
                    return Err(RetryError::Terminal(err));
                }
                if attempt >= policy.max_attempts || start.elapsed() >= policy.deadline {
                    return Err(RetryError::Exhausted(err));
                }

                debug!(attempt, ?interval, "retrying after failure");

                let remaining = policy.deadline.saturating_sub(start.elapsed());
                let wait = interval.min(remaining);

                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }

                interval = (interval * 2).min(policy.max_interval);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn always_retryable(_: &&'static str) -> bool {
        true
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let policy = RetryPolicy::bounded(Duration::from_secs(1));
        let token = CancellationToken::new();
        let result: Result<u32, RetryError<&'static str>> =
            retry(&policy, &token, always_retryable, || async { Ok(42) }).await;
        assert!(matches!(result, Ok(42)));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let policy = RetryPolicy {
            base_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            deadline: Duration::from_secs(1),
            max_attempts: 5,
        };
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = retry(&policy, &token, always_retryable, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("transient")
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert!(matches!(result, Ok("ok")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_error_is_not_retried() {
        let policy = RetryPolicy::bounded(Duration::from_secs(1));
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), RetryError<&'static str>> = retry(
            &policy,
            &token,
            |_: &&'static str| false,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal") }
            },
        )
        .await;

        assert!(matches!(result, Err(RetryError::Terminal("fatal"))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let policy = RetryPolicy {
            base_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
            deadline: Duration::from_secs(5),
            max_attempts: 3,
        };
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), RetryError<&'static str>> =
            retry(&policy, &token, always_retryable, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("down") }
            })
            .await;

        assert!(matches!(result, Err(RetryError::Exhausted("down"))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancellation_short_circuits() {
        let policy = RetryPolicy {
            base_interval: Duration::from_millis(50),
            max_interval: Duration::from_millis(50),
            deadline: Duration::from_secs(5),
            max_attempts: 100,
        };
        let token = CancellationToken::new();
        token.cancel();

        let result: Result<(), RetryError<&'static str>> =
            retry(&policy, &token, always_retryable, || async { Err("down") }).await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
    }
}
