//! Reconnect policy for channel supervisors.
//!
//! Exponential backoff with jitter, bounded by a retry ceiling. The loop that
//! applies it lives with the channel it supervises.

use std::time::Duration;

/// Exponential backoff configuration for channel reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Consecutive failures tolerated before the channel is marked unavailable.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: Some(5),
        }
    }
}

/// What a supervisor should do after a failed or lost session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep this long, then reconnect
    Retry(Duration),
    /// The ceiling is exceeded; mark the channel unavailable
    GiveUp,
}

/// Per-channel retry bookkeeping
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    failures: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Consecutive failures since the last successful session
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// A session reached the connected state
    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    /// A connection attempt failed or an established session dropped
    pub fn record_failure(&mut self) -> RetryDecision {
        self.failures += 1;
        if let Some(max) = self.config.max_retries {
            if self.failures > max {
                return RetryDecision::GiveUp;
            }
        }
        RetryDecision::Retry(calculate_backoff(self.failures - 1, &self.config))
    }
}

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 +- 0.25)`
///
/// Jitter is deterministic per attempt so delays stay reproducible in tests.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(attempt.min(30) as i32);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * ((attempt as f64 * 7.3).sin());
    let with_jitter = (capped * jitter_factor).max(0.0);

    // Jitter above a cap near Duration::MAX would overflow
    Duration::try_from_secs_f64(with_jitter).unwrap_or(Duration::MAX)
}
