use std::time::Duration;

/// Exponential retry delay: `base * 2^(attempts - 1)`, capped at `max`.
/// An entry that has never been attempted is due immediately.
pub fn next_retry_delay(attempts: i32, base: Duration, max: Duration) -> Duration {
    if attempts <= 0 {
        return Duration::ZERO;
    }
    let exponent = (attempts - 1) as u32;
    if exponent >= u32::BITS {
        return max;
    }
    base.checked_mul(1u32 << exponent)
        .map_or(max, |delay| delay.min(max))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    pub fn delay_for(&self, attempts: i32) -> Duration {
        next_retry_delay(attempts, self.base_delay, self.max_delay)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_attempts_is_immediate() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::ZERO);
    }

    #[test]
    fn doubles_from_base() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(30));
        assert_eq!(policy.delay_for(2), Duration::from_secs(60));
        assert_eq!(policy.delay_for(4), Duration::from_secs(240));
    }

    #[test]
    fn caps_at_max_delay() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(8), Duration::from_secs(3600));
        assert_eq!(policy.delay_for(40), Duration::from_secs(3600));
        assert_eq!(policy.delay_for(i32::MAX), Duration::from_secs(3600));
    }

    #[test]
    fn monotonic_and_bounded() {
        let bases = [1, 7, 30, 900].map(Duration::from_millis);
        let maxes = [1, 500, 60_000, u64::MAX / 2].map(Duration::from_millis);
        for base in bases {
            for max in maxes {
                let mut previous = Duration::ZERO;
                for attempts in 0..80 {
                    let delay = next_retry_delay(attempts, base, max);
                    assert!(delay >= previous, "delay shrank at attempt {attempts}");
                    assert!(delay <= max, "delay exceeded cap at attempt {attempts}");
                    previous = delay;
                }
            }
        }
    }
}
