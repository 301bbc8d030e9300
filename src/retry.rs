use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::shutdown::Shutdown;

/// Errors that the retry loop can classify.
pub trait Retryable {
    /// Transient errors are retried; permanent errors surface immediately.
    fn is_transient(&self) -> bool;

    /// Destination-provided delay hint (e.g. a 429 retry-after). When present
    /// it replaces the computed backoff delay for the next attempt.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Exponential backoff policy: `delay(k) = min(max_delay, base * multiplier^k)`.
///
/// One policy value (from config) is shared by the source-fetch and
/// webhook-delivery paths.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Backoff delay after the `failure_index`-th consecutive failure (0-based).
    pub fn delay(&self, failure_index: u32) -> Duration {
        let scaled = self.base_delay.as_secs_f64() * self.multiplier.powi(failure_index as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }
}

/// Run `op` until it succeeds, fails permanently, or exhausts the attempt
/// bound. The shutdown flag is checked before every backoff sleep; a
/// triggered shutdown surfaces the last error without further attempts.
pub async fn retry_async<T, E, F, Fut>(
    policy: &RetryPolicy,
    shutdown: &Shutdown,
    what: &str,
    mut op: F,
) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut failures = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                failures += 1;
                if !err.is_transient() || failures >= policy.max_attempts {
                    return Err(err);
                }
                let delay = err.retry_after().unwrap_or_else(|| policy.delay(failures - 1));
                warn!(
                    "{what} failed (attempt {failures}/{}): {err}; retrying in {:.1}s",
                    policy.max_attempts,
                    delay.as_secs_f64(),
                );
                if !shutdown.sleep(delay).await {
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct TestError {
        transient: bool,
        retry_after: Option<Duration>,
    }

    impl TestError {
        fn transient() -> Self {
            Self { transient: true, retry_after: None }
        }

        fn permanent() -> Self {
            Self { transient: false, retry_after: None }
        }
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (transient: {})", self.transient)
        }
    }

    impl Retryable for TestError {
        fn is_transient(&self) -> bool {
            self.transient
        }

        fn retry_after(&self) -> Option<Duration> {
            self.retry_after
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 4,
        }
    }

    // ── delay sequence ─────────────────────────────────────────────

    #[test]
    fn delay_sequence_exponential() {
        let p = policy();
        assert_eq!(p.delay(0), Duration::from_millis(500));
        assert_eq!(p.delay(1), Duration::from_secs(1));
        assert_eq!(p.delay(2), Duration::from_secs(2));
        assert_eq!(p.delay(3), Duration::from_secs(4));
    }

    #[test]
    fn delay_capped_at_max() {
        let p = policy();
        // 500ms * 2^10 = 512s, well past the 30s cap
        assert_eq!(p.delay(10), Duration::from_secs(30));
        assert_eq!(p.delay(31), Duration::from_secs(30));
    }

    #[test]
    fn delay_multiplier_one_is_constant() {
        let p = RetryPolicy {
            base_delay: Duration::from_secs(1),
            multiplier: 1.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 3,
        };
        assert_eq!(p.delay(0), Duration::from_secs(1));
        assert_eq!(p.delay(5), Duration::from_secs(1));
    }

    // ── retry_async ────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_attempt_bound() {
        let calls = Cell::new(0u32);
        let result: Result<(), TestError> =
            retry_async(&policy(), &Shutdown::new(), "op", || {
                calls.set(calls.get() + 1);
                async { Err(TestError::transient()) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 4); // exactly max_attempts calls
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_not_retried() {
        let calls = Cell::new(0u32);
        let result: Result<(), TestError> =
            retry_async(&policy(), &Shutdown::new(), "op", || {
                calls.set(calls.get() + 1);
                async { Err(TestError::permanent()) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Cell::new(0u32);
        let result: Result<u32, TestError> =
            retry_async(&policy(), &Shutdown::new(), "op", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(TestError::transient())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_sleeps_follow_policy() {
        let start = tokio::time::Instant::now();
        let _: Result<(), TestError> = retry_async(&policy(), &Shutdown::new(), "op", || async {
            Err(TestError::transient())
        })
        .await;
        // 3 sleeps between 4 attempts: 0.5s + 1s + 2s
        assert_eq!(start.elapsed(), Duration::from_millis(3500));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_hint_overrides_backoff() {
        let calls = Cell::new(0u32);
        let start = tokio::time::Instant::now();
        let _: Result<(), TestError> =
            retry_async(&policy(), &Shutdown::new(), "op", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n == 1 {
                        Err(TestError {
                            transient: true,
                            retry_after: Some(Duration::from_secs(7)),
                        })
                    } else {
                        Ok(())
                    }
                }
            })
            .await;
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_backoff_sleep() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let calls = Cell::new(0u32);
        let result: Result<(), TestError> = retry_async(&policy(), &shutdown, "op", || {
            calls.set(calls.get() + 1);
            async { Err(TestError::transient()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 1); // no retry once shutdown is set
    }
}
