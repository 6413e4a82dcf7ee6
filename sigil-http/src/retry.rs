//! Retry policies.
//!
//! A [`RetryPolicy`] pairs a retry budget with a list of conditions. After
//! every attempt the client asks the policy whether to go again; any
//! condition returning true triggers a retry while budget remains.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sigil_core::{QueryResult, TransportFailure};

/// Predicate over a transport failure.
pub type ErrorPredicate = Arc<dyn Fn(&TransportFailure) -> bool + Send + Sync>;

/// Predicate over an attempt's result.
pub type ResultPredicate = Arc<dyn Fn(&QueryResult) -> bool + Send + Sync>;

/// Type-erased custom check.
pub type CustomCheck = Arc<dyn Fn() -> bool + Send + Sync>;

// ============================================================================
// Retry Condition
// ============================================================================

/// A reason to retry.
#[derive(Clone)]
pub enum RetryCondition {
    /// Retries when the attempt failed at the transport level and the
    /// predicate accepts the failure.
    Error(ErrorPredicate),
    /// Retries when the predicate accepts the attempt's result.
    Result(ResultPredicate),
    /// Retries when an application-supplied value satisfies a predicate.
    Custom(CustomCheck),
}

impl RetryCondition {
    /// Builds a custom condition from a value source and a predicate over it.
    pub fn custom<T, S, P>(source: S, predicate: P) -> Self
    where
        S: Fn() -> T + Send + Sync + 'static,
        P: Fn(T) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(move || predicate(source())))
    }

    /// Evaluates the condition against an attempt.
    pub fn matches(&self, result: &QueryResult) -> bool {
        match self {
            Self::Error(predicate) => result.exception.as_ref().is_some_and(|e| predicate(e)),
            Self::Result(predicate) => predicate(result),
            Self::Custom(check) => check(),
        }
    }
}

impl fmt::Debug for RetryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Error(_) => "Error",
            Self::Result(_) => "Result",
            Self::Custom(_) => "Custom",
        };
        write!(f, "RetryCondition::{kind}")
    }
}

// ============================================================================
// Backoff
// ============================================================================

/// Delay between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Double the delay on every further retry.
    pub exponential: bool,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Backoff {
    /// Constant delay.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            exponential: false,
            max_delay: delay,
        }
    }

    /// Doubling delay, capped at `max_delay`.
    pub fn exponential(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            exponential: true,
            max_delay,
        }
    }

    /// Calculates the delay before retry number `retry` (1-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let delay = if self.exponential {
            let factor = 2u32.saturating_pow(retry.saturating_sub(1));
            self.base_delay.saturating_mul(factor)
        } else {
            self.base_delay
        };
        delay.min(self.max_delay)
    }
}

// ============================================================================
// Retry Policy
// ============================================================================

/// Retry budget plus the conditions that spend it.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub retry_count: u32,
    /// Conditions; any match triggers a retry.
    pub conditions: Vec<RetryCondition>,
    /// Optional delay between attempts.
    pub backoff: Option<Backoff>,
}

impl RetryPolicy {
    /// Creates a policy with `retry_count` retries and no conditions.
    pub fn new(retry_count: u32) -> Self {
        Self {
            retry_count,
            ..Self::default()
        }
    }

    /// Adds a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: RetryCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Retries on transport failures accepted by `predicate`.
    #[must_use]
    pub fn on_error<F>(self, predicate: F) -> Self
    where
        F: Fn(&TransportFailure) -> bool + Send + Sync + 'static,
    {
        self.with_condition(RetryCondition::Error(Arc::new(predicate)))
    }

    /// Retries on results accepted by `predicate`.
    #[must_use]
    pub fn on_result<F>(self, predicate: F) -> Self
    where
        F: Fn(&QueryResult) -> bool + Send + Sync + 'static,
    {
        self.with_condition(RetryCondition::Result(Arc::new(predicate)))
    }

    /// Retries when `predicate(source())` is true.
    #[must_use]
    pub fn on_custom<T, S, P>(self, source: S, predicate: P) -> Self
    where
        S: Fn() -> T + Send + Sync + 'static,
        P: Fn(T) -> bool + Send + Sync + 'static,
    {
        self.with_condition(RetryCondition::custom(source, predicate))
    }

    /// Retries on any transport failure.
    #[must_use]
    pub fn on_any_error(self) -> Self {
        self.on_error(|_| true)
    }

    /// Retries when the watchdog fired.
    #[must_use]
    pub fn on_timeout(self) -> Self {
        self.on_result(|r| r.timed_out)
    }

    /// Retries on any of the given status codes.
    #[must_use]
    pub fn on_status(self, codes: &[u16]) -> Self {
        let codes = codes.to_vec();
        self.on_result(move |r| codes.contains(&r.status_code))
    }

    /// Retries on 5xx responses.
    #[must_use]
    pub fn on_server_error(self) -> Self {
        self.on_result(|r| r.status_code >= 500)
    }

    /// Sets the delay between attempts.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Returns true if any condition asks for a retry.
    pub fn should_retry(&self, result: &QueryResult) -> bool {
        self.conditions.iter().any(|c| c.matches(result))
    }

    /// Returns the delay before retry number `retry` (1-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.backoff
            .as_ref()
            .map_or(Duration::ZERO, |b| b.delay_for_retry(retry))
    }
}

// ============================================================================
// Retry State
// ============================================================================

/// Attempt bookkeeping for one request, shared across its clones.
#[derive(Debug, Default)]
pub struct RetryState {
    iterations: AtomicU32,
    last_attempt: Mutex<Option<DateTime<Utc>>>,
}

impl RetryState {
    /// Creates empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an attempt and returns the new count.
    pub fn record_attempt(&self) -> u32 {
        *self
            .last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        self.iterations.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the number of attempts so far.
    pub fn iterations(&self) -> u32 {
        self.iterations.load(Ordering::SeqCst)
    }

    /// Returns when the last attempt started.
    pub fn last_attempt(&self) -> Option<DateTime<Utc>> {
        *self
            .last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Clears the count at the start of a logical call.
    pub fn reset(&self) {
        self.iterations.store(0, Ordering::SeqCst);
    }
}
