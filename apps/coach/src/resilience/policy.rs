use std::time::Duration;

/// Tuning for one resilient call site.
///
/// Every call site goes through the same primitive; only these numbers differ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Hard deadline for each attempt.
    pub per_attempt_timeout: Duration,
    /// Delay before the first retry.
    pub backoff: Duration,
    /// Growth factor applied to `backoff` for each further retry.
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Quiz/content fetches: upstream generation is often slow, so fail fast
    /// and retry often.
    pub fn content_fetch() -> Self {
        Self {
            max_attempts: 4,
            per_attempt_timeout: Duration::from_secs(8),
            backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(4),
        }
    }

    /// Plan fetches: occasionally very slow but rarely wrong, so one long attempt.
    pub fn plan_fetch() -> Self {
        Self {
            max_attempts: 1,
            per_attempt_timeout: Duration::from_secs(90),
            backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            max_backoff: Duration::ZERO,
        }
    }

    /// Replaying one queued action during a flush.
    pub fn sync_replay() -> Self {
        Self {
            max_attempts: 1,
            per_attempt_timeout: Duration::from_secs(5),
            backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            max_backoff: Duration::ZERO,
        }
    }

    /// Constant backoff between attempts.
    pub fn fixed(max_attempts: u32, per_attempt_timeout: Duration, backoff: Duration) -> Self {
        Self {
            max_attempts,
            per_attempt_timeout,
            backoff,
            backoff_multiplier: 1.0,
            max_backoff: backoff,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_timeout(mut self, per_attempt_timeout: Duration) -> Self {
        self.per_attempt_timeout = per_attempt_timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self.max_backoff = self.max_backoff.max(backoff);
        self
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before retry number `retry` (1-based): `backoff * multiplier^(retry-1)`,
    /// capped at `max_backoff`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let multiplier = if self.backoff_multiplier.is_finite() {
            self.backoff_multiplier.max(1.0)
        } else {
            1.0
        };
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.backoff.as_secs_f64() * multiplier.powi(exponent);
        let cap = self.max_backoff.max(self.backoff);

        if !secs.is_finite() || secs >= cap.as_secs_f64() {
            cap
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}
