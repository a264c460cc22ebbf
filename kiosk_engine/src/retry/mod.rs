//! Bounded exponential-backoff retries for outbound requests.
//!
//! [`retry_with_backoff`] re-invokes an operation while it keeps failing with a [`Retryable`] error, up to
//! [`RetryPolicy::max_attempts`] invocations in total. The delay before retry *n* (1-indexed) is
//! `base_delay * 2^(n-1)`, capped at `max_delay` when one is set, plus a uniformly random jitter of at most
//! `max_jitter`.
//!
//! Each invocation receives the current [`RequestAttempt`]. Attempts are immutable values; every retry produces a new
//! one, so nothing is tracked on shared request objects.
//!
//! The operation must be safe to repeat. For non-idempotent verbs that is the caller's problem.
mod errors;

use std::{future::Future, sync::Arc, time::Duration};

pub use errors::{NetworkErrorCode, RequestError, Retryable};
use log::*;
use rand::Rng;

pub const DEFAULT_API_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_API_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_FETCH_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_FETCH_BASE_DELAY: Duration = Duration::from_millis(2000);
pub const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of invocations, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound on the exponential part of the delay.
    pub max_delay: Option<Duration>,
    /// Random extra delay, drawn uniformly from `[0, max_jitter]`.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::api_default()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay, max_delay: None, max_jitter: Duration::ZERO }
    }

    /// Policy for the JSON API client: 3 attempts, starting at 1s.
    pub fn api_default() -> Self {
        Self::new(DEFAULT_API_MAX_ATTEMPTS, DEFAULT_API_BASE_DELAY).with_jitter(Duration::from_millis(250))
    }

    /// Policy for plain fetches (menu images, static content): 4 attempts, starting at 2s.
    pub fn fetch_default() -> Self {
        Self::new(DEFAULT_FETCH_MAX_ATTEMPTS, DEFAULT_FETCH_BASE_DELAY).with_jitter(Duration::from_millis(500))
    }

    /// Policy for stream reconnection. `max_attempts` is not consulted by the stream client, which keeps trying for as
    /// long as it is enabled.
    pub fn reconnect_default() -> Self {
        Self::new(u32::MAX, DEFAULT_API_BASE_DELAY)
            .with_max_delay(DEFAULT_RECONNECT_MAX_DELAY)
            .with_jitter(Duration::from_millis(500))
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    pub fn without_jitter(self) -> Self {
        self.with_jitter(Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// The deterministic part of the delay before retry `retry` (1-indexed): `base * 2^(retry-1)`, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = retry.saturating_sub(1);
        let delay = 2u32
            .checked_pow(exponent)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// The full delay before retry `retry`, including jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay = self.backoff(retry);
        if self.max_jitter.is_zero() {
            return delay;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=self.max_jitter.as_millis() as u64);
        delay.saturating_add(Duration::from_millis(jitter_ms))
    }
}

/// One invocation of a logical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestAttempt {
    operation: Arc<str>,
    attempt: u32,
    last_failure: Option<String>,
    delay: Duration,
}

impl RequestAttempt {
    pub fn first(operation: &str) -> Self {
        Self { operation: Arc::from(operation), attempt: 0, last_failure: None, delay: Duration::ZERO }
    }

    /// The attempt that follows this one, after `failure` and a wait of `delay`.
    pub fn next(&self, failure: String, delay: Duration) -> Self {
        Self {
            operation: Arc::clone(&self.operation),
            attempt: self.attempt + 1,
            last_failure: Some(failure),
            delay,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Number of retries that preceded this attempt. The first invocation is attempt 0.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// 1-indexed invocation number, for humans.
    pub fn invocation(&self) -> u32 {
        self.attempt + 1
    }

    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    /// The delay that was scheduled before this attempt ran.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_retry(&self) -> bool {
        self.attempt > 0
    }
}

/// Runs `operation` until it succeeds, fails with an error that is not retryable, or has been invoked
/// `policy.max_attempts()` times. The last error is returned unchanged.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: &RetryPolicy, operation: &str, mut f: F) -> Result<T, E>
where
    F: FnMut(RequestAttempt) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = RequestAttempt::first(operation);
    loop {
        let err = match f(attempt.clone()).await {
            Ok(value) => {
                if attempt.is_retry() {
                    debug!("🔁️ {operation} succeeded on attempt {}/{max_attempts}", attempt.invocation());
                }
                return Ok(value);
            },
            Err(e) => e,
        };
        if !err.is_retryable() {
            debug!("🔁️ {operation} failed with a non-retryable error. {err}");
            return Err(err);
        }
        if attempt.invocation() >= max_attempts {
            warn!("🔁️ {operation} failed after {max_attempts} attempts. Giving up. {err}");
            return Err(err);
        }
        let delay = policy.delay_for(attempt.invocation());
        warn!(
            "🔁️ {operation} failed on attempt {}/{max_attempts}. Retrying in {}ms. {err}",
            attempt.invocation(),
            delay.as_millis()
        );
        attempt = attempt.next(err.to_string(), delay);
        tokio::time::sleep(delay).await;
    }
}
