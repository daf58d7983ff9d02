//! Quota-aware retry for rate limited remote operations

use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Classifies an error as a rate-limit / quota condition
pub trait QuotaClassify {
    fn is_quota_exceeded(&self) -> bool;
}

/// Waits out a cooldown. Injected so retries can be tested without real delays.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Fixed cooldown between attempts, optionally capped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait between a quota failure and the next attempt
    pub cooldown: Duration,

    /// Maximum number of cooldowns; `None` retries forever
    pub max_retries: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded(cooldown: Duration) -> Self {
        Self {
            cooldown,
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    fn allows(&self, waits_so_far: u32) -> bool {
        self.max_retries.map_or(true, |max| waits_so_far < max)
    }
}

impl Default for RetryPolicy {
    /// Quota windows reset on an hourly-or-slower schedule
    fn default() -> Self {
        Self::unbounded(Duration::from_secs(3600))
    }
}

/// Runs remote operations, waiting and retrying while they fail on quota.
///
/// Non-quota failures are returned immediately. Holds no per-call state,
/// so one instance can wrap any number of independent call sites.
#[derive(Debug, Clone, Default)]
pub struct QuotaRetry<S = TokioSleeper> {
    policy: RetryPolicy,
    sleeper: S,
}

impl QuotaRetry<TokioSleeper> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: TokioSleeper,
        }
    }
}

impl<S: Sleeper> QuotaRetry<S> {
    pub fn with_sleeper(policy: RetryPolicy, sleeper: S) -> Self {
        Self { policy, sleeper }
    }

    /// Invokes `operation` until it succeeds, fails without a quota
    /// condition, or the policy runs out of retries.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: QuotaClassify + Display,
    {
        let mut waits = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_quota_exceeded() && self.policy.allows(waits) => {
                    waits += 1;
                    warn!(
                        attempt = waits,
                        wait = ?self.policy.cooldown,
                        operation = label,
                        error = %err,
                        "⏳ Waiting for API quota"
                    );
                    self.sleeper.sleep(self.policy.cooldown).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
