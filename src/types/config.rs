use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffPolicy;
use crate::types::endpoint::{default_endpoints, Endpoint};

/// Upper bound accepted for `repairLogCapacity`.
pub const MAX_REPAIR_LOG_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 15_000,
            max_delay_ms: 300_000,
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerConfig {
    pub endpoints: Vec<Endpoint>,
    pub backoff: BackoffConfig,
    pub health_interval_ms: u64,
    pub stale_sweep_interval_ms: u64,
    pub stale_after_ms: u64,
    pub auto_repair_interval_ms: u64,
    pub optimize_interval_ms: u64,
    pub optimize_cooldown_ms: u64,
    pub connect_timeout_ms: u64,
    pub repair_log_capacity: usize,
    pub auto_repair: bool,
    pub failure_log_sample_rate: f64,
    pub latency_floor_ms: f64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            backoff: BackoffConfig::default(),
            health_interval_ms: 15_000,
            stale_sweep_interval_ms: 15_000,
            stale_after_ms: 60_000,
            auto_repair_interval_ms: 30_000,
            optimize_interval_ms: 30_000,
            optimize_cooldown_ms: 5_000,
            connect_timeout_ms: 30_000,
            repair_log_capacity: 100,
            auto_repair: true,
            failure_log_sample_rate: 0.05,
            latency_floor_ms: 5.0,
        }
    }
}

impl ManagerConfig {
    pub fn with_endpoints(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            ..Self::default()
        }
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::from(self.backoff)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }

    pub fn stale_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.stale_sweep_interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    pub fn auto_repair_interval(&self) -> Duration {
        Duration::from_millis(self.auto_repair_interval_ms)
    }

    pub fn optimize_interval(&self) -> Duration {
        Duration::from_millis(self.optimize_interval_ms)
    }

    pub fn optimize_cooldown(&self) -> Duration {
        Duration::from_millis(self.optimize_cooldown_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
