use std::time::Duration;

/// Delay before reconnect attempt `attempt` (1-based): `base * 2^(attempt-1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor)
}

/// Counts reconnect attempts and hands out their delays until the ceiling.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_attempts,
            attempts: 0,
        }
    }

    /// Schedules the next attempt. Returns `None` once `max_attempts` have
    /// been handed out; the counter does not move past the ceiling.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(backoff_delay(self.base, self.attempts))
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_per_attempt() {
        let base = Duration::from_millis(1000);
        for n in 1..=8 {
            assert_eq!(
                backoff_delay(base, n),
                Duration::from_millis(1000 * 2u64.pow(n - 1)),
                "attempt {n}"
            );
        }
    }

    #[test]
    fn delay_saturates_instead_of_overflowing() {
        let delay = backoff_delay(Duration::from_secs(1), 200);
        assert!(delay >= Duration::from_secs(1 << 31));
    }

    #[test]
    fn policy_stops_at_ceiling() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(100), 3);
        let delays: Vec<_> = std::iter::from_fn(|| policy.next_delay()).collect();
        assert_eq!(
            delays,
            [
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
        assert!(policy.is_exhausted());
        assert_eq!(policy.next_delay(), None);
        assert_eq!(policy.attempts(), 3);
    }

    #[test]
    fn reset_starts_over() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(100), 2);
        policy.next_delay();
        policy.next_delay();
        policy.reset();
        assert_eq!(policy.attempts(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn zero_ceiling_never_retries() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(100), 0);
        assert_eq!(policy.next_delay(), None);
    }
}
