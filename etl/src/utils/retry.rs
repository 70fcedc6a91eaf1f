use crate::utils::time::{Sleeper, with_jitter};
use common::config::StageRetryConfig;
use common::Error;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How often and how patiently a stage is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one; at least 1.
    pub max_attempts: u32,
    pub delay: Duration,
    /// Growth factor per failed attempt. 1.0 keeps the delay fixed.
    pub backoff_multiplier: f64,
    pub max_delay: Option<Duration>,
    pub jitter: Duration,
    pub retry_on: fn(&Error) -> bool,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff_multiplier: 1.0,
            max_delay: None,
            jitter: Duration::ZERO,
            retry_on: Error::is_retryable,
        }
    }

    pub fn no_retry() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    pub fn from_config(config: &StageRetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_secs(config.delay_secs),
            backoff_multiplier: config.backoff_multiplier.max(1.0),
            max_delay: config.max_delay_secs.map(Duration::from_secs),
            jitter: Duration::from_millis(config.jitter_ms),
            retry_on: Error::is_retryable,
        }
    }

    pub fn with_predicate(mut self, retry_on: fn(&Error) -> bool) -> Self {
        self.retry_on = retry_on;
        self
    }

    /// Delay after the `failed_attempts`-th failure (1-based), without jitter.
    /// Saturates at `max_delay`, or `Duration::MAX` when uncapped.
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let ceiling = self.max_delay.unwrap_or(Duration::MAX);
        let secs = self.delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs.min(ceiling.as_secs_f64()))
            .map(|delay| delay.min(ceiling))
            .unwrap_or(ceiling)
    }

    pub fn should_retry(&self, failed_attempts: u32, error: &Error) -> bool {
        failed_attempts < self.max_attempts && (self.retry_on)(error)
    }
}

/// Outcome of a retried operation along with how many attempts it took.
#[derive(Debug)]
pub struct Retried<T> {
    pub result: common::Result<T>,
    pub attempts: u32,
}

/// Runs `operation` until it succeeds, the error is not retryable, or the
/// policy's attempts are exhausted. `operation` receives the 1-based attempt.
pub async fn retry_with_policy<T, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> Retried<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = common::Result<T>>,
{
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                return Retried {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) => {
                if !policy.should_retry(attempt, &e) {
                    return Retried {
                        result: Err(e),
                        attempts: attempt,
                    };
                }

                let delay = with_jitter(policy.delay_for(attempt), policy.jitter);
                warn!(
                    stage = label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );
                sleeper.sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(3, Duration::from_secs(60));

        let retried = retry_with_policy("extract", &policy, &sleeper, |_| async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::upstream("503"))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(retried.result.unwrap(), "done");
        assert_eq!(retried.attempts, 3);
        assert_eq!(
            *sleeper.sleeps.lock().unwrap(),
            vec![Duration::from_secs(60), Duration::from_secs(60)]
        );
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(2, Duration::from_secs(1));

        let retried: Retried<()> = retry_with_policy("load", &policy, &sleeper, |_| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Connection("refused".into()))
        })
        .await;

        assert!(matches!(retried.result, Err(Error::Connection(_))));
        assert_eq!(retried.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(sleeper.sleeps.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy::fixed(3, Duration::from_secs(1));

        let retried: Retried<()> = retry_with_policy("transform", &policy, &sleeper, |_| async {
            Err(Error::Transformation {
                procedure: "silver.load_silver".into(),
                detail: "syntax error".into(),
            })
        })
        .await;

        assert_eq!(retried.attempts, 1);
        assert!(sleeper.sleeps.lock().unwrap().is_empty());
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::from_config(&StageRetryConfig {
            max_attempts: 5,
            delay_secs: 10,
            backoff_multiplier: 2.0,
            max_delay_secs: Some(30),
            jitter_ms: 0,
        });

        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for(3), Duration::from_secs(30));
        assert_eq!(policy.delay_for(4), Duration::from_secs(30));
    }

    #[test]
    fn test_steep_backoff_saturates_instead_of_overflowing() {
        let capped = RetryPolicy::from_config(&StageRetryConfig {
            max_attempts: 30,
            delay_secs: 60,
            backoff_multiplier: 10.0,
            max_delay_secs: Some(300),
            jitter_ms: 0,
        });
        for attempt in 1..30 {
            assert!(capped.delay_for(attempt) <= Duration::from_secs(300));
        }
        assert_eq!(capped.delay_for(29), Duration::from_secs(300));

        let uncapped = RetryPolicy {
            max_delay: None,
            ..capped.clone()
        };
        assert_eq!(uncapped.delay_for(29), Duration::MAX);
        assert_eq!(uncapped.delay_for(u32::MAX), Duration::MAX);
        assert_eq!(with_jitter(Duration::MAX, Duration::from_millis(5)), Duration::MAX);
    }

    #[test]
    fn test_custom_predicate_overrides_classification() {
        let policy = RetryPolicy::fixed(3, Duration::ZERO).with_predicate(|_| false);
        assert!(!policy.should_retry(1, &Error::upstream("timeout")));
        assert!(RetryPolicy::fixed(3, Duration::ZERO).should_retry(2, &Error::upstream("timeout")));
        assert!(!RetryPolicy::no_retry().should_retry(1, &Error::upstream("timeout")));
    }
}
