//! Retry logic with pluggable backoff for chunk attempts.
//!
//! Each attempt runs under a timeout. Transient failures are retried after a
//! delay computed by a pure [`BackoffPolicy`]; permanent failures and
//! exhausted budgets return immediately with the last error.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ChunkError;

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffPolicy {
    /// Constant delay: base, base, base, ...
    Fixed,
    /// Grows by base each retry: base, 2·base, 3·base, ...
    Linear,
    /// Doubles each retry: base, 2·base, 4·base, ...
    #[default]
    Exponential,
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (1 = the wait after the first
    /// failed attempt). Saturates instead of overflowing.
    pub fn delay(self, base: Duration, retry: u32) -> Duration {
        let retry = retry.max(1);
        match self {
            BackoffPolicy::Fixed => base,
            BackoffPolicy::Linear => base.saturating_mul(retry),
            BackoffPolicy::Exponential => {
                let factor = 2u32.checked_pow(retry - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
        }
    }
}

impl fmt::Display for BackoffPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackoffPolicy::Fixed => "fixed",
            BackoffPolicy::Linear => "linear",
            BackoffPolicy::Exponential => "exponential",
        })
    }
}

impl FromStr for BackoffPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(BackoffPolicy::Fixed),
            "linear" => Ok(BackoffPolicy::Linear),
            "exponential" => Ok(BackoffPolicy::Exponential),
            other => Err(format!("unknown backoff policy {other:?}")),
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first. Zero behaves like one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound applied before jitter.
    pub max_delay: Duration,
    pub backoff: BackoffPolicy,
    /// Add 0–50% random jitter to every delay.
    pub jitter: bool,
    /// `None` lets every attempt run to completion.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff: BackoffPolicy::Exponential,
            jitter: false,
            attempt_timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Attempts are never abandoned; for side effects that cannot be
    /// recalled once started.
    pub fn without_timeout(mut self) -> Self {
        self.attempt_timeout = None;
        self
    }

    /// Capped, optionally jittered delay before retry number `retry`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay = self.backoff.delay(self.base_delay, retry).min(self.max_delay);
        if self.jitter {
            let millis = delay.as_millis() as u64;
            let jitter = fastrand::u64(0..=millis / 2);
            delay + Duration::from_millis(jitter)
        } else {
            delay
        }
    }
}

/// Cooperative cancellation flag handed to each attempt.
///
/// A timed-out attempt's future is dropped, but blocking work it started
/// keeps running until it checks this token.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Context passed to the operation on every attempt.
#[derive(Debug, Clone)]
pub struct Attempt {
    /// 1-based attempt number.
    pub number: u32,
    pub cancel: CancelToken,
}

/// Errors the controller can classify and synthesize on timeout.
pub trait RetryableError: fmt::Display {
    fn is_transient(&self) -> bool;
    fn timed_out(after: Duration) -> Self;
}

impl RetryableError for ChunkError {
    fn is_transient(&self) -> bool {
        ChunkError::is_transient(self)
    }

    fn timed_out(after: Duration) -> Self {
        ChunkError::Timeout(after)
    }
}

/// Lifecycle notifications emitted while retrying.
#[derive(Debug)]
pub enum RetryEvent<'a, E> {
    AttemptStarted { attempt: u32 },
    Retrying { attempt: u32, delay: Duration, error: &'a E },
    GaveUp { attempts: u32, error: &'a E },
}

/// Result of a retried operation.
#[derive(Debug, Clone)]
pub struct RetryOutcome<T, E> {
    /// Final result (the last error when every attempt failed).
    pub result: Result<T, E>,
    /// Attempts made (1 = no retries needed).
    pub attempts: u32,
    /// Delays slept between attempts, in order.
    pub delays: Vec<Duration>,
    pub total_duration: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetryController {
    config: RetryConfig,
}

impl RetryController {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub async fn run<T, E, F, Fut>(&self, operation: F) -> RetryOutcome<T, E>
    where
        E: RetryableError,
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_observed(operation, |_| {}).await
    }

    /// Like [`RetryController::run`], reporting each lifecycle step to
    /// `observe`.
    pub async fn run_observed<T, E, F, Fut, O>(
        &self,
        mut operation: F,
        mut observe: O,
    ) -> RetryOutcome<T, E>
    where
        E: RetryableError,
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        O: FnMut(RetryEvent<'_, E>),
    {
        let start = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let mut delays = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            observe(RetryEvent::AttemptStarted { attempt });

            let cancel = CancelToken::new();
            let fut = operation(Attempt {
                number: attempt,
                cancel: cancel.clone(),
            });
            let result = match self.config.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result,
                    Err(_) => {
                        cancel.cancel();
                        Err(E::timed_out(limit))
                    }
                },
                None => fut.await,
            };

            let error = match result {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                        delays,
                        total_duration: start.elapsed(),
                    };
                }
                Err(error) => error,
            };

            if !error.is_transient() || attempt >= max_attempts {
                debug!(
                    event = "retry_gave_up",
                    attempts = attempt,
                    transient = error.is_transient(),
                    error = %error,
                    "giving up on operation"
                );
                observe(RetryEvent::GaveUp {
                    attempts: attempt,
                    error: &error,
                });
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                    delays,
                    total_duration: start.elapsed(),
                };
            }

            let delay = self.config.delay_for(attempt);
            warn!(
                event = "attempt_failed_retrying",
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying after transient failure"
            );
            observe(RetryEvent::Retrying {
                attempt,
                delay,
                error: &error,
            });
            delays.push(delay);
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn policy_delays() {
        let seq = |p: BackoffPolicy| (1..=4).map(|n| p.delay(SEC, n).as_secs()).collect::<Vec<_>>();
        assert_eq!(seq(BackoffPolicy::Fixed), vec![1, 1, 1, 1]);
        assert_eq!(seq(BackoffPolicy::Linear), vec![1, 2, 3, 4]);
        assert_eq!(seq(BackoffPolicy::Exponential), vec![1, 2, 4, 8]);
    }

    #[test]
    fn exponential_saturates() {
        let d = BackoffPolicy::Exponential.delay(SEC, 200);
        assert!(d >= Duration::from_secs(u32::MAX as u64));
    }

    #[test]
    fn max_delay_caps() {
        let cfg = RetryConfig::default().with_max_delay(Duration::from_secs(3));
        assert_eq!(cfg.delay_for(1), SEC);
        assert_eq!(cfg.delay_for(2), Duration::from_secs(2));
        assert_eq!(cfg.delay_for(3), Duration::from_secs(3));
        assert_eq!(cfg.delay_for(10), Duration::from_secs(3));
    }

    #[test]
    fn jitter_stays_within_half() {
        let cfg = RetryConfig::default()
            .with_backoff(BackoffPolicy::Fixed)
            .with_jitter(true);
        for _ in 0..100 {
            let d = cfg.delay_for(1);
            assert!(d >= SEC && d <= Duration::from_millis(1500), "{d:?}");
        }
    }

    #[test]
    fn parse_policy() {
        assert_eq!("Linear".parse::<BackoffPolicy>(), Ok(BackoffPolicy::Linear));
        assert!("random".parse::<BackoffPolicy>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let controller = RetryController::new(RetryConfig::default().with_max_attempts(4));
        let calls = AtomicU32::new(0);
        let outcome = controller
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt.number < 3 {
                        Err(ChunkError::Transient("not yet".into()))
                    } else {
                        Ok(attempt.number)
                    }
                }
            })
            .await;
        assert_eq!(outcome.result, Ok(3));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.delays, vec![SEC, Duration::from_secs(2)]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_is_not_retried() {
        let controller = RetryController::new(RetryConfig::default());
        let outcome: RetryOutcome<(), _> = controller
            .run(|_| async { Err(ChunkError::Worker("boom".into())) })
            .await;
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.delays.is_empty());
        assert!(!outcome.succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_use_fixed_spacing_and_cancel() {
        let cfg = RetryConfig::default()
            .with_backoff(BackoffPolicy::Fixed)
            .with_base_delay(Duration::from_secs(2))
            .with_attempt_timeout(Duration::from_secs(5));
        let controller = RetryController::new(cfg);
        let mut tokens = Vec::new();
        let mut retried_at = Vec::new();

        let outcome: RetryOutcome<(), ChunkError> = controller
            .run_observed(
                |attempt| {
                    tokens.push(attempt.cancel.clone());
                    async {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok(())
                    }
                },
                |event| {
                    if let RetryEvent::Retrying { attempt, delay, .. } = event {
                        retried_at.push((attempt, delay));
                    }
                },
            )
            .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result, Err(ChunkError::Timeout(Duration::from_secs(5))));
        assert_eq!(outcome.delays, vec![Duration::from_secs(2); 2]);
        assert_eq!(retried_at, vec![(1, Duration::from_secs(2)), (2, Duration::from_secs(2))]);
        // 3 × 5s timeouts + 2 × 2s delays on the paused clock
        assert!(outcome.total_duration >= Duration::from_secs(19));
        assert!(outcome.total_duration < Duration::from_secs(20));
        assert!(tokens.iter().all(CancelToken::is_cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn untimed_attempts_run_to_completion() {
        let controller = RetryController::new(
            RetryConfig::default()
                .with_attempt_timeout(Duration::from_secs(1))
                .without_timeout(),
        );
        let outcome = controller
            .run(|attempt| async move {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok::<_, ChunkError>(attempt.number)
            })
            .await;
        assert_eq!(outcome.result, Ok(1));
        assert!(outcome.total_duration >= Duration::from_secs(600));
    }
}
