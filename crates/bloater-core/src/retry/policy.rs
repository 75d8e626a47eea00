use std::time::Duration;

/// Fraction of the exponential wait that jitter may add on top.
const JITTER: f64 = 0.5;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// Attempt budget exhausted; no further attempt is issued.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Jittered exponential backoff with a cap.
///
/// `max_attempts` counts retries after the first failure, so a chain sends at
/// most `max_attempts + 1` attempts with indices `0..=max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Number of retries allowed after the first attempt.
    pub max_attempts: u32,
    /// Multiplier applied per attempt (>= 1).
    pub factor: u32,
    /// Wait before the first retry, before jitter.
    pub base: Duration,
    /// Upper bound on any single wait.
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            factor: 2,
            base: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Decide what follows a failed attempt with index `attempt` (0 = first send).
    ///
    /// Draws jitter from the thread-local RNG.
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        self.decide_with(attempt, rand::random::<f64>())
    }

    /// Like [`decide`](Self::decide) with an explicit jitter sample in `[0, 1)`.
    pub fn decide_with(&self, attempt: u32, unit: f64) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.backoff(attempt, unit))
    }

    /// Wait before attempt `attempt + 1`: `base * factor^attempt`, plus
    /// `unit * 0.5` of that, clamped to `max_interval`.
    pub fn backoff(&self, attempt: u32, unit: f64) -> Duration {
        let raw = self
            .factor
            .max(1)
            .checked_pow(attempt)
            .and_then(|growth| self.base.checked_mul(growth));
        let Some(raw) = raw else {
            return self.max_interval;
        };
        let jitter = raw.mul_f64(unit.clamp(0.0, 1.0) * JITTER);
        raw.saturating_add(jitter).min(self.max_interval)
    }
}
