//! Redial delay bookkeeping.
//!
//! Consecutive dial failures double the delay up to the maximum. When a
//! connection that was alive drops, the delay is reset to the minimum and
//! the manager waits exactly once for it before redialing; if that dial
//! fails too, doubling resumes from the minimum.

use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
    failures: u32,
}

impl Backoff {
    pub(crate) fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            current: min,
            failures: 0,
        }
    }

    /// Delay to sleep after a failed dial. Advances the ramp.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Delay to sleep after a live connection was lost. Restarts the ramp.
    pub(crate) fn reset(&mut self) -> Duration {
        self.current = self.min;
        self.failures = 0;
        self.min
    }

    /// Number of consecutive dial failures since the last reset.
    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_doubles_and_clamps() {
        let mut backoff = Backoff::new(ms(100), ms(800));
        let delays: Vec<_> = (0..7).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![ms(100), ms(200), ms(400), ms(800), ms(800), ms(800), ms(800)]
        );
        assert_eq!(backoff.failures(), 7);
    }

    #[test]
    fn test_clamps_when_max_not_power_of_two_multiple() {
        let mut backoff = Backoff::new(ms(100), ms(300));
        assert_eq!(backoff.next_delay(), ms(100));
        assert_eq!(backoff.next_delay(), ms(200));
        assert_eq!(backoff.next_delay(), ms(300));
        assert_eq!(backoff.next_delay(), ms(300));
    }

    #[test]
    fn test_reset_restarts_ramp_from_min() {
        let mut backoff = Backoff::new(ms(10), ms(1000));
        for _ in 0..5 {
            backoff.next_delay();
        }

        assert_eq!(backoff.reset(), ms(10));
        assert_eq!(backoff.failures(), 0);
        // A failed dial after a drop waits min again, then doubles.
        assert_eq!(backoff.next_delay(), ms(10));
        assert_eq!(backoff.next_delay(), ms(20));
    }

    #[test]
    fn test_min_equals_max() {
        let mut backoff = Backoff::new(ms(50), ms(50));
        assert_eq!(backoff.next_delay(), ms(50));
        assert_eq!(backoff.next_delay(), ms(50));
    }

    #[test]
    fn test_huge_max_does_not_overflow() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::MAX);
        for _ in 0..200 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::MAX);
    }
}
