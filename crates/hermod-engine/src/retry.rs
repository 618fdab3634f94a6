//! Retry delay policies for failed jobs.
//!
//! The queue contract is a fixed delay between attempts; exponential
//! backoff and jitter are available for operators who want them but stay
//! off by default.

use std::time::Duration;

use rand::Rng;

/// Strategy for calculating the delay before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed,
    /// Delay doubles with each attempt, capped at `max_delay`.
    Exponential,
}

/// Retry delay policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Base delay between attempts.
    pub base_delay: Duration,

    /// Upper bound on the computed delay.
    pub max_delay: Duration,

    /// Backoff strategy.
    pub strategy: BackoffStrategy,

    /// Jitter percentage (0.0 to 1.0) added to spread retries. Zero keeps
    /// delays deterministic.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(crate::DEFAULT_RETRY_DELAY_MINUTES * 60),
            max_delay: Duration::from_secs(6 * 60 * 60),
            strategy: BackoffStrategy::Fixed,
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    /// A fixed-delay policy.
    pub fn fixed(delay: Duration) -> Self {
        Self { base_delay: delay, ..Self::default() }
    }

    /// Delay before the given attempt (1-based).
    pub fn delay_for(&self, attempt: i32) -> Duration {
        let attempt = attempt.max(1) as u32;

        let base = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let exponent = attempt.saturating_sub(1).min(20);
                self.base_delay * 2_u32.saturating_pow(exponent)
            },
        };

        let capped = base.min(self.max_delay);
        apply_jitter(capped, self.jitter_factor).min(self.max_delay)
    }
}

/// Randomizes a delay by ±`jitter_factor` to avoid retry stampedes.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let clamped = jitter_factor.clamp(0.0, 1.0);
    let mut rng = rand::rng();
    let range = duration.as_secs_f64() * clamped;
    let offset = rng.random_range(-range..=range);

    Duration::from_secs_f64((duration.as_secs_f64() + offset).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delay_is_constant_across_attempts() {
        let policy = RetryPolicy::fixed(Duration::from_secs(300));

        for attempt in 1..=5 {
            assert_eq!(policy.delay_for(attempt), Duration::from_secs(300));
        }
    }

    #[test]
    fn exponential_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(480),
            strategy: BackoffStrategy::Exponential,
            jitter_factor: 0.0,
        };

        assert_eq!(policy.delay_for(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for(2), Duration::from_secs(120));
        assert_eq!(policy.delay_for(3), Duration::from_secs(240));
        assert_eq!(policy.delay_for(4), Duration::from_secs(480));
        assert_eq!(policy.delay_for(5), Duration::from_secs(480));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_secs(100);
        for _ in 0..50 {
            let jittered = apply_jitter(base, 0.25);
            assert!(jittered >= Duration::from_secs(75), "too small: {jittered:?}");
            assert!(jittered <= Duration::from_secs(125), "too large: {jittered:?}");
        }
    }
}
