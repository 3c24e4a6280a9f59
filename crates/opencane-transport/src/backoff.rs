//! Exponential backoff with full jitter, within `[reconnect_min, reconnect_max]`
//! (spec §4.3). No direct teacher analog; this is the standard
//! full-jitter retry idiom (`sleep = random(0, min(cap, base * 2^attempt))`),
//! using `rand` the way the rest of the pack's network-retry code does.

use std::time::Duration;

use rand::Rng;

pub struct FullJitterBackoff {
    min: Duration,
    max: Duration,
    attempt: u32,
}

impl FullJitterBackoff {
    #[must_use]
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max, attempt: 0 }
    }

    /// The delay before the next reconnect attempt, then advances the
    /// attempt counter. Saturates at `max` rather than overflowing on a long
    /// run of failures.
    pub fn next_delay(&mut self) -> Duration {
        let capped_millis = self.max.as_millis().min(
            self.min
                .as_millis()
                .saturating_mul(1u128 << self.attempt.min(20)),
        );
        self.attempt = self.attempt.saturating_add(1);
        let millis = rand::thread_rng().gen_range(0..=capped_millis.max(1)) as u64;
        Duration::from_millis(millis).max(self.min.min(self.max))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_never_exceeds_max() {
        let mut backoff = FullJitterBackoff::new(Duration::from_millis(500), Duration::from_secs(30));
        for _ in 0..50 {
            let delay = backoff.next_delay();
            assert!(delay <= Duration::from_secs(30));
        }
    }

    #[test]
    fn reset_restarts_the_growth_curve() {
        let mut backoff = FullJitterBackoff::new(Duration::from_millis(100), Duration::from_secs(10));
        for _ in 0..10 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.attempt, 0);
    }
}
