//! Sampling rules that keep a persistently failing feed from flooding logs
//! and from triggering reconnect storms.

/// Whether the `occurrence`-th event (1-based) of a kind should be surfaced
/// to observers: the 1st, 2nd, 10th, 50th, then every 200th.
pub const fn should_surface(occurrence: u64) -> bool {
    matches!(occurrence, 1 | 2 | 10 | 50) || (occurrence != 0 && occurrence % 200 == 0)
}

/// Whether the `error_count`-th transport error earns an active repair
/// attempt: the first two, then every 200th.
pub const fn warrants_repair(error_count: u64) -> bool {
    error_count != 0 && (error_count <= 2 || error_count % 200 == 0)
}

/// Randomly admits a fraction of failed-repair log lines.
#[derive(Debug, Clone, Copy)]
pub struct FailureSampler {
    rate: f64,
}

impl FailureSampler {
    pub fn new(rate: f64) -> Self {
        Self {
            rate: rate.clamp(0.0, 1.0),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn admit(&self) -> bool {
        if self.rate <= 0.0 {
            return false;
        }
        if self.rate >= 1.0 {
            return true;
        }
        rand::random::<f64>() < self.rate
    }
}
