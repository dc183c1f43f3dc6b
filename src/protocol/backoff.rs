//! Reconnect delay schedule.

use std::time::Duration;

use rand::Rng;

use crate::config::ClientConfig;

/// Exponential backoff with additive jitter.
///
/// Delays double from `initial` up to `max`. Each delay gets up to
/// `jitter * base` added at random, and the sequence never decreases until
/// [`Backoff::reset`] is called.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    jitter: f64,
    attempt: u32,
    last: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            initial,
            max: max.max(initial),
            jitter: jitter.clamp(0.0, 1.0),
            attempt: 0,
            last: Duration::ZERO,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.backoff_initial, config.backoff_max, config.backoff_jitter)
    }

    /// Delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempt.min(31));
        let base = self.initial.saturating_mul(factor).min(self.max);
        let fraction = self.jitter * rand::thread_rng().gen::<f64>();
        let spread = Duration::try_from_secs_f64(base.as_secs_f64() * fraction).unwrap_or(self.max);

        let delay = base.saturating_add(spread).min(self.max).max(self.last);
        self.attempt = self.attempt.saturating_add(1);
        self.last = delay;
        delay
    }

    /// Number of delays handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Start over after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last = Duration::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_non_decreasing_and_capped() {
        let max = Duration::from_secs(30);
        let mut backoff = Backoff::new(Duration::from_millis(500), max, 0.5);

        let delays: Vec<_> = (0..40).map(|_| backoff.next_delay()).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= max));
        assert_eq!(*delays.last().unwrap(), max);
    }

    #[test]
    fn test_without_jitter_doubles() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(10), 0.0);
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10]);
    }

    #[test]
    fn test_huge_bounds_saturate() {
        let max = Duration::MAX;
        let mut backoff = Backoff::new(Duration::from_secs(u64::MAX / 2), max, 1.0);
        for _ in 0..4 {
            assert!(backoff.next_delay() <= max);
        }
    }

    #[test]
    fn test_reset_starts_over() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), 0.0);
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempts(), 2);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
