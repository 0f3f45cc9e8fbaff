//! Provider Reconnect Backoff
//!
//! Exponential backoff with jitter for automatic provider reconnects.
//! One `ReconnectBackoff` is kept per provider and reset when the
//! provider reports `Connected` again.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnect backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first reconnect request.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Growth factor applied after each attempt.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Attempts allowed before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
        }
    }
}

/// Backoff state for one provider.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    config: BackoffConfig,
    next_base: Duration,
    attempts: u32,
}

impl ReconnectBackoff {
    /// Create a fresh backoff.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        let next_base = config.initial_delay;
        Self {
            config,
            next_base,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        self.attempts += 1;
        let delay = self.jittered(self.next_base);

        self.next_base = self.scaled(self.next_base, self.config.multiplier.max(1.0));

        Some(delay)
    }

    /// Forget previous attempts.
    pub const fn reset(&mut self) {
        self.next_base = self.config.initial_delay;
        self.attempts = 0;
    }

    /// Attempts handed out since the last reset.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the attempt budget is used up.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.config.max_attempts > 0 && self.attempts >= self.config.max_attempts
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return base;
        }

        let spread = self.config.jitter_factor.min(1.0);
        let factor = rand::rng().random_range((1.0 - spread)..=(1.0 + spread));
        self.scaled(base, factor).max(Duration::from_millis(1))
    }

    /// `base * factor`, capped at `max_delay`. Overflow and NaN saturate.
    fn scaled(&self, base: Duration, factor: f64) -> Duration {
        Duration::try_from_secs_f64(base.as_secs_f64() * factor)
            .map_or(self.config.max_delay, |delay| delay.min(self.config.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(initial_ms: u64, max_ms: u64, max_attempts: u32) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts,
        }
    }

    #[test]
    fn delays_grow_exponentially() {
        let mut backoff = ReconnectBackoff::new(no_jitter(100, 10_000, 0));

        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(400)));
    }

    #[test]
    fn delays_are_capped() {
        let mut backoff = ReconnectBackoff::new(no_jitter(1_000, 1_500, 0));

        let _ = backoff.next_delay();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(1_500)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(1_500)));
    }

    #[test]
    fn attempts_are_bounded() {
        let mut backoff = ReconnectBackoff::new(no_jitter(10, 100, 2));

        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.is_exhausted());
        assert!(backoff.next_delay().is_none());
        assert_eq!(backoff.attempts(), 2);
    }

    #[test]
    fn reset_restarts_from_initial_delay() {
        let mut backoff = ReconnectBackoff::new(no_jitter(100, 10_000, 2));
        let _ = backoff.next_delay();
        let _ = backoff.next_delay();

        backoff.reset();

        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn oversized_multiplier_saturates_at_max_delay() {
        for multiplier in [1e300, f64::INFINITY, f64::NAN] {
            let mut backoff = ReconnectBackoff::new(BackoffConfig {
                multiplier,
                ..no_jitter(1_000, 30_000, 0)
            });

            assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
            let second = backoff.next_delay().unwrap();
            assert!(second <= Duration::from_secs(30), "multiplier {multiplier}");
            assert!(backoff.next_delay().unwrap() <= Duration::from_secs(30));
        }
    }

    #[test]
    fn huge_max_delay_with_jitter_does_not_overflow() {
        let mut backoff = ReconnectBackoff::new(BackoffConfig {
            initial_delay: Duration::from_secs(u64::MAX),
            max_delay: Duration::from_secs(u64::MAX),
            ..BackoffConfig::default()
        });

        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
    }

    #[test]
    fn jitter_stays_in_bounds() {
        for _ in 0..100 {
            let mut backoff = ReconnectBackoff::new(BackoffConfig {
                initial_delay: Duration::from_millis(1_000),
                ..BackoffConfig::default()
            });
            let millis = backoff.next_delay().unwrap().as_millis();
            assert!((900..=1_100).contains(&millis), "delay {millis}ms out of range");
        }
    }
}
