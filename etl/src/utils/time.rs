use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, SubsecRound, Utc};
use rand::Rng;
use std::time::Duration;

/// Blocking wait between retry attempts, injectable so tests run instantly.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// `base` plus a uniformly random extra of at most `jitter`.
pub fn with_jitter(base: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return base;
    }
    let extra_ms = rand::rng().random_range(0..=jitter.as_millis() as u64);
    base.saturating_add(Duration::from_millis(extra_ms))
}

/// Current UTC time rounded up to the whole second, so it never precedes an
/// earlier `Utc::now()` reading.
pub fn now_utc_whole_secs() -> DateTime<Utc> {
    ceil_to_second(Utc::now())
}

fn ceil_to_second(at: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = at.trunc_subsecs(0);
    if truncated < at {
        truncated + ChronoDuration::seconds(1)
    } else {
        truncated
    }
}

/// The default target date: the UTC day before today.
pub fn yesterday_utc() -> NaiveDate {
    (Utc::now() - ChronoDuration::days(1)).date_naive()
}
