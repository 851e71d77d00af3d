use std::time::Duration;

use crate::types::config::BackoffConfig;

/// Bounded exponential reconnect delay: `min(max_delay, base_delay * 2^attempt)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// True once `attempts` scheduled reconnects have been used up.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(BackoffConfig::default())
    }
}

impl From<BackoffConfig> for BackoffPolicy {
    fn from(cfg: BackoffConfig) -> Self {
        Self::new(
            Duration::from_millis(cfg.base_delay_ms),
            Duration::from_millis(cfg.max_delay_ms),
            cfg.max_attempts,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_delay_is_base() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(15));
    }

    #[test]
    fn delay_doubles_until_ceiling() {
        let policy = BackoffPolicy::default();
        let secs: Vec<u64> = (0..7).map(|a| policy.delay(a).as_secs()).collect();
        assert_eq!(secs, vec![15, 30, 60, 120, 240, 300, 300]);
    }

    #[test]
    fn delay_is_non_decreasing_and_bounded() {
        let policy = BackoffPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 0..=128 {
            let delay = policy.delay(attempt);
            assert!(delay >= previous, "attempt {} went backwards", attempt);
            assert!(delay <= Duration::from_secs(300));
            previous = delay;
        }
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn exhausted_at_max_attempts() {
        let policy = BackoffPolicy::default();
        assert!(!policy.is_exhausted(4));
        assert!(policy.is_exhausted(5));
        assert!(policy.is_exhausted(6));
    }

    #[test]
    fn custom_config_is_honoured() {
        let policy = BackoffPolicy::from(BackoffConfig {
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            max_attempts: 2,
        });
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
        assert_eq!(policy.delay(4), Duration::from_millis(1_000));
        assert_eq!(policy.max_attempts(), 2);
    }
}
