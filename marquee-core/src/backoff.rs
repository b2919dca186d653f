//! Retry delays for reconnect loops.
//!
//! One policy type covers every transport: the event feed retries
//! exponentially forever, the line feed retries immediately. Both are
//! parameterisations of [`BackoffPolicy`].

use tokio::time::{Duration, Instant};

/// Attempt counter plus the delay formula `base * multiplier^attempt`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    multiplier: f64,
    cap: Option<Duration>,
    max_elapsed: Option<Duration>,
    attempt: u32,
    started: Option<Instant>,
}

impl BackoffPolicy {
    /// Create a policy with an explicit delay formula.
    pub fn new(base: Duration, multiplier: f64, cap: Option<Duration>) -> Self {
        Self {
            base,
            multiplier: multiplier.max(1.0),
            cap,
            max_elapsed: None,
            attempt: 0,
            started: None,
        }
    }

    /// 500 ms, growing by 1.5× up to one minute, never giving up.
    pub fn exponential() -> Self {
        Self::new(Duration::from_millis(500), 1.5, Some(Duration::from_secs(60)))
    }

    /// Retry straight away, every time.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, 1.0, None)
    }

    /// Bound the total time spent retrying within one cycle.
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }

    /// Delay before the next attempt, or `None` once the elapsed-time
    /// budget is spent. Unbounded policies always return a delay.
    pub fn next_attempt(&mut self) -> Option<Duration> {
        let started = *self.started.get_or_insert_with(Instant::now);
        if let Some(max) = self.max_elapsed {
            if started.elapsed() >= max {
                return None;
            }
        }

        let factor = self.multiplier.powi(self.attempt.min(i32::MAX as u32) as i32);
        let mut delay = self.base.mul_f64(factor.min(u32::MAX as f64));
        if let Some(cap) = self.cap {
            delay = delay.min(cap);
        }

        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }

    /// Forget previous failures after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.started = None;
    }

    /// Attempts made since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}
