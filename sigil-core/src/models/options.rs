//! Per-call behavior options.
//!
//! - [`CacheOptions`] / [`CacheMode`] / [`Expiration`] - Response caching policy
//! - [`TaskOptions`] / [`RateLimitRule`] - Periodic re-execution
//! - [`StreamOptions`] - Long-lived line streaming

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ============================================================================
// Cache Options
// ============================================================================

/// Expiration policy for cached responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Entries never expire.
    #[default]
    NoExpiration,
    /// Entries expire a fixed duration after insertion.
    AbsoluteExpiration,
    /// Entries expire a fixed duration after their last read.
    SlidingExpiration,
}

impl CacheMode {
    /// Returns the settings name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoExpiration => "none",
            Self::AbsoluteExpiration => "absolute",
            Self::SlidingExpiration => "sliding",
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "no_expiration" | "never" => Ok(Self::NoExpiration),
            "absolute" | "absolute_expiration" => Ok(Self::AbsoluteExpiration),
            "sliding" | "sliding_expiration" => Ok(Self::SlidingExpiration),
            _ => Err(CoreError::UnsupportedCacheMode(s.to_string())),
        }
    }
}

/// When a cache entry stops being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// Never expires.
    Never,
    /// Expires at a fixed instant.
    At(DateTime<Utc>),
    /// Expires after this much idle time.
    Sliding(Duration),
}

/// Caching policy for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheOptions {
    /// Expiration mode.
    pub mode: CacheMode,
    /// Duration used by absolute and sliding modes.
    pub duration: Duration,
}

impl CacheOptions {
    /// Entries never expire.
    pub fn no_expiration() -> Self {
        Self::default()
    }

    /// Entries expire `duration` after insertion.
    pub fn absolute(duration: Duration) -> Self {
        Self {
            mode: CacheMode::AbsoluteExpiration,
            duration,
        }
    }

    /// Entries expire after `duration` without a read.
    pub fn sliding(duration: Duration) -> Self {
        Self {
            mode: CacheMode::SlidingExpiration,
            duration,
        }
    }

    /// Resolves the expiration for an entry inserted at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] when a timed mode has a zero
    /// duration or the deadline overflows.
    pub fn expiration(&self, now: DateTime<Utc>) -> Result<Expiration, CoreError> {
        if self.mode != CacheMode::NoExpiration && self.duration.is_zero() {
            return Err(CoreError::InvalidConfig(format!(
                "cache mode '{}' requires a non-zero duration",
                self.mode
            )));
        }
        match self.mode {
            CacheMode::NoExpiration => Ok(Expiration::Never),
            CacheMode::AbsoluteExpiration => chrono::Duration::from_std(self.duration)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .map(Expiration::At)
                .ok_or_else(|| CoreError::InvalidConfig("cache duration overflows".to_string())),
            CacheMode::SlidingExpiration => Ok(Expiration::Sliding(self.duration)),
        }
    }
}

// ============================================================================
// Task Options
// ============================================================================

/// Rate-limit counters reported by a status accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    /// Calls left in the current window.
    pub remaining_hits: u64,
    /// Calls allowed per window.
    pub hourly_limit: u64,
    /// When the window resets.
    pub reset_time: Option<DateTime<Utc>>,
}

impl RateLimitStatus {
    /// Returns the remaining share of the limit as a percentage.
    #[allow(clippy::cast_precision_loss)]
    pub fn remaining_percent(&self) -> f64 {
        if self.hourly_limit == 0 {
            return 100.0;
        }
        self.remaining_hits as f64 / self.hourly_limit as f64 * 100.0
    }
}

/// Supplies the current rate-limit status.
pub type RateLimitStatusFn = Arc<dyn Fn() -> Option<RateLimitStatus> + Send + Sync>;

/// Decides whether a tick should be skipped given the current status.
pub type RateLimitPredicate = Arc<dyn Fn(Option<&RateLimitStatus>) -> bool + Send + Sync>;

/// Gate evaluated before every periodic tick.
#[derive(Clone)]
pub enum RateLimitRule {
    /// Skip while the remaining share of the limit is below `percent`.
    ByPercent {
        /// Threshold in percent.
        percent: f64,
        /// Status accessor; without one the rule never skips.
        status: Option<RateLimitStatusFn>,
    },
    /// Skip whenever the predicate returns true.
    ByPredicate {
        /// Skip predicate.
        predicate: RateLimitPredicate,
        /// Optional status accessor passed to the predicate.
        status: Option<RateLimitStatusFn>,
    },
}

impl RateLimitRule {
    /// Creates a percentage rule.
    pub fn by_percent(percent: f64) -> Self {
        Self::ByPercent {
            percent,
            status: None,
        }
    }

    /// Creates a predicate rule.
    pub fn by_predicate<F>(predicate: F) -> Self
    where
        F: Fn(Option<&RateLimitStatus>) -> bool + Send + Sync + 'static,
    {
        Self::ByPredicate {
            predicate: Arc::new(predicate),
            status: None,
        }
    }

    /// Attaches a status accessor.
    #[must_use]
    pub fn with_status<F>(self, accessor: F) -> Self
    where
        F: Fn() -> Option<RateLimitStatus> + Send + Sync + 'static,
    {
        let accessor: RateLimitStatusFn = Arc::new(accessor);
        match self {
            Self::ByPercent { percent, .. } => Self::ByPercent {
                percent,
                status: Some(accessor),
            },
            Self::ByPredicate { predicate, .. } => Self::ByPredicate {
                predicate,
                status: Some(accessor),
            },
        }
    }

    /// Returns true if the next tick should be suppressed.
    pub fn should_skip(&self) -> bool {
        match self {
            Self::ByPercent { percent, status } => status
                .as_ref()
                .and_then(|get| get())
                .is_some_and(|s| s.remaining_percent() < *percent),
            Self::ByPredicate { predicate, status } => {
                let current = status.as_ref().and_then(|get| get());
                predicate(current.as_ref())
            }
        }
    }
}

impl fmt::Debug for RateLimitRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByPercent { percent, status } => f
                .debug_struct("ByPercent")
                .field("percent", percent)
                .field("has_status", &status.is_some())
                .finish(),
            Self::ByPredicate { status, .. } => f
                .debug_struct("ByPredicate")
                .field("has_status", &status.is_some())
                .finish_non_exhaustive(),
        }
    }
}

/// Periodic re-execution settings.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    /// Delay before the first tick.
    pub due_time: Duration,
    /// Delay between ticks; zero disables periodic behavior.
    pub repeat_interval: Duration,
    /// Number of ticks, unlimited when `None`.
    pub repeat_times: Option<u32>,
    /// Keep ticking after a failed tick.
    pub continue_on_error: bool,
    /// Optional gate evaluated before each tick.
    pub rate_limit: Option<RateLimitRule>,
}

impl TaskOptions {
    /// Ticks every `interval`, forever.
    pub fn every(interval: Duration) -> Self {
        Self {
            repeat_interval: interval,
            ..Self::default()
        }
    }

    /// Sets the delay before the first tick.
    #[must_use]
    pub fn with_due_time(mut self, due_time: Duration) -> Self {
        self.due_time = due_time;
        self
    }

    /// Limits the number of ticks.
    #[must_use]
    pub fn with_repeat_times(mut self, times: u32) -> Self {
        self.repeat_times = Some(times);
        self
    }

    /// Keeps ticking after failures.
    #[must_use]
    pub fn continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }

    /// Gates ticks with a rate-limit rule.
    #[must_use]
    pub fn with_rate_limit(mut self, rule: RateLimitRule) -> Self {
        self.rate_limit = Some(rule);
        self
    }

    /// Returns true if these options describe a recurring task.
    pub fn is_periodic(&self) -> bool {
        !self.repeat_interval.is_zero()
    }
}

// ============================================================================
// Stream Options
// ============================================================================

/// Lines per batch when not configured.
pub const DEFAULT_RESULTS_PER_CALLBACK: usize = 10;

/// Returns true for a line that signals the stream is not carrying data.
pub type NonDataDetector = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Default detector: an HTML document in place of the data stream.
pub fn html_detector(line: &str) -> bool {
    line.trim_start()
        .get(..5)
        .is_some_and(|head| head.eq_ignore_ascii_case("<html"))
}

/// Streaming read settings.
#[derive(Clone)]
pub struct StreamOptions {
    /// Stop after this much wall time, unlimited when `None`.
    pub duration: Option<Duration>,
    /// Lines per emitted batch.
    pub results_per_callback: usize,
    /// Line check that ends the stream.
    pub non_data_detector: NonDataDetector,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            duration: None,
            results_per_callback: DEFAULT_RESULTS_PER_CALLBACK,
            non_data_detector: Arc::new(html_detector),
        }
    }
}

impl StreamOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits the stream's wall time.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Sets the batch size; values below one are treated as one.
    #[must_use]
    pub fn with_results_per_callback(mut self, count: usize) -> Self {
        self.results_per_callback = count.max(1);
        self
    }

    /// Replaces the non-data detector.
    #[must_use]
    pub fn with_non_data_detector<F>(mut self, detector: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.non_data_detector = Arc::new(detector);
        self
    }
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("duration", &self.duration)
            .field("results_per_callback", &self.results_per_callback)
            .finish_non_exhaustive()
    }
}
