use std::time::Duration;

use tinyrand::{Rand, StdRand};

/// Reconnect policy for subscriber connections: exponential growth from
/// `base` up to `cap`, at most `max_attempts` tries before giving up.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(30),
            max_attempts: 8,
        }
    }
}

pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
    rand: StdRand,
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backoff")
            .field("policy", &self.policy)
            .field("attempt", &self.attempt)
            .finish()
    }
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            rand: StdRand::default(),
        }
    }

    /// Delay before the next attempt, or `None` once the budget is
    /// spent. Jitter lands each delay in the upper half of its window so
    /// a herd of disconnected clients does not reconnect in lockstep.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.policy.max_attempts {
            return None;
        }

        let exp = self
            .policy
            .base
            .saturating_mul(1u32 << self.attempt.min(16));
        let window = exp.min(self.policy.cap).as_millis() as u64;
        self.attempt += 1;

        let jittered = window / 2 + self.rand.next_u64() % (window / 2 + 1);
        Some(Duration::from_millis(jittered))
    }

    /// Called after a successful connect so the next drop starts cheap
    /// again.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(100),
            cap: Duration::from_millis(2_000),
            max_attempts: 5,
        }
    }

    #[test]
    fn test_delays_stay_inside_their_window() {
        let mut backoff = Backoff::new(policy());

        for attempt in 0..5u32 {
            let window = Duration::from_millis(100)
                .saturating_mul(1 << attempt)
                .min(Duration::from_millis(2_000));

            let delay = backoff.next_delay().unwrap();
            assert!(delay >= window / 2, "attempt {attempt}: {delay:?} too short");
            assert!(delay <= window, "attempt {attempt}: {delay:?} too long");
        }
    }

    #[test]
    fn test_attempt_budget_is_bounded() {
        let mut backoff = Backoff::new(policy());

        for _ in 0..5 {
            assert!(backoff.next_delay().is_some());
        }
        assert!(backoff.next_delay().is_none());
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn test_reset_restores_the_budget() {
        let mut backoff = Backoff::new(policy());

        while backoff.next_delay().is_some() {}
        backoff.reset();

        assert_eq!(backoff.attempt(), 0);
        assert!(backoff.next_delay().is_some());
    }

    #[test]
    fn test_growth_is_capped() {
        let mut backoff = Backoff::new(BackoffPolicy {
            base: Duration::from_millis(100),
            cap: Duration::from_millis(300),
            max_attempts: 10,
        });

        let mut last = Duration::ZERO;
        for _ in 0..10 {
            last = backoff.next_delay().unwrap();
        }

        assert!(last <= Duration::from_millis(300));
    }
}
