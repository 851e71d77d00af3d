use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

use crate::backoff::BackoffPolicy;
use crate::types::connection::{ConnectionSnapshot, ConnectionStatus};
use crate::types::endpoint::Endpoint;

const LATENCY_SMOOTHING: f64 = 0.2;
const LATENCY_SAMPLE_CAP_MS: f64 = 1_000.0;
const OPTIMIZE_DECAY: f64 = 0.9;

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// What a supervisor should do after its connection ended or failed to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPlan {
    /// Wait, then connect again.
    After(Duration),
    /// Auto-repair is off; stay disconnected.
    Hold,
    /// Attempts are used up; stay failed until forced.
    GiveUp { attempts: u32 },
}

/// Mutable connection record for one endpoint. Only its supervisor mutates
/// it; everyone else reads published snapshots.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    status: ConnectionStatus,
    last_activity: Option<Instant>,
    last_activity_at: Option<u64>,
    reconnect_attempts: u32,
    error_count: u64,
    disconnect_count: u64,
    data_flow_count: u64,
    latency_estimate_ms: f64,
    reconnect_pending: bool,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            last_activity: None,
            last_activity_at: None,
            reconnect_attempts: 0,
            error_count: 0,
            disconnect_count: 0,
            data_flow_count: 0,
            latency_estimate_ms: 0.0,
            reconnect_pending: false,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn disconnect_count(&self) -> u64 {
        self.disconnect_count
    }

    pub fn data_flow_count(&self) -> u64 {
        self.data_flow_count
    }

    pub fn latency_estimate_ms(&self) -> f64 {
        self.latency_estimate_ms
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    pub fn begin_connect(&mut self) {
        self.status = ConnectionStatus::Connecting;
        self.reconnect_pending = false;
    }

    pub fn mark_open(&mut self, now: Instant, handshake: Duration) {
        self.status = ConnectionStatus::Connected;
        self.reconnect_attempts = 0;
        self.reconnect_pending = false;
        self.touch(now);
        self.latency_estimate_ms = handshake.as_secs_f64() * 1_000.0;
    }

    /// Count an inbound message. Ignored unless connected.
    pub fn record_message(&mut self, now: Instant) {
        if self.status != ConnectionStatus::Connected {
            return;
        }
        if let Some(previous) = self.last_activity {
            let gap_ms = now.saturating_duration_since(previous).as_secs_f64() * 1_000.0;
            let sample = gap_ms.min(LATENCY_SAMPLE_CAP_MS);
            self.latency_estimate_ms += LATENCY_SMOOTHING * (sample - self.latency_estimate_ms);
        }
        self.data_flow_count += 1;
        self.touch(now);
    }

    /// Count a transport error and return the running total.
    pub fn record_error(&mut self) -> u64 {
        self.error_count += 1;
        self.error_count
    }

    /// Count the loss of a live connection and return the running total.
    pub fn record_disconnect(&mut self) -> u64 {
        self.disconnect_count += 1;
        self.status = ConnectionStatus::Disconnected;
        self.reconnect_pending = false;
        self.disconnect_count
    }

    /// Decide the next step after a failure and move to the matching status.
    pub fn plan_retry(&mut self, policy: &BackoffPolicy, auto_repair: bool) -> RetryPlan {
        if !auto_repair {
            self.status = ConnectionStatus::Disconnected;
            self.reconnect_pending = false;
            return RetryPlan::Hold;
        }
        if policy.is_exhausted(self.reconnect_attempts) {
            self.reconnect_attempts += 1;
            self.status = ConnectionStatus::Failed;
            self.reconnect_pending = false;
            return RetryPlan::GiveUp {
                attempts: self.reconnect_attempts,
            };
        }
        let delay = policy.delay(self.reconnect_attempts);
        self.reconnect_attempts += 1;
        self.status = ConnectionStatus::Reconnecting;
        self.reconnect_pending = true;
        RetryPlan::After(delay)
    }

    /// The backoff timer fired while auto-repair was off: keep the status,
    /// drop the timer.
    pub fn freeze(&mut self) {
        self.reconnect_pending = false;
    }

    pub fn reset_attempts(&mut self) {
        self.reconnect_attempts = 0;
    }

    /// Connected, but silent for longer than `window`.
    pub fn is_stale(&self, now: Instant, window: Duration) -> bool {
        is_stale(self.status, self.last_activity, now, window)
    }

    /// Idle and still within its attempt budget.
    pub fn is_repairable(&self, policy: &BackoffPolicy) -> bool {
        is_idle(self.status, self.reconnect_pending)
            && self.reconnect_attempts <= policy.max_attempts()
    }

    pub fn decay_latency(&mut self, floor_ms: f64) {
        if self.status == ConnectionStatus::Connected {
            self.latency_estimate_ms = (self.latency_estimate_ms * OPTIMIZE_DECAY).max(floor_ms);
        }
    }

    pub fn snapshot(&self, endpoint: &Endpoint) -> ConnectionSnapshot {
        ConnectionSnapshot {
            endpoint_id: endpoint.id.clone(),
            address: endpoint.address.clone(),
            status: self.status,
            last_activity_at: self.last_activity_at,
            reconnect_attempts: self.reconnect_attempts,
            error_count: self.error_count,
            disconnect_count: self.disconnect_count,
            data_flow_count: self.data_flow_count,
            latency_ms: self.latency_estimate_ms,
            reconnect_pending: self.reconnect_pending,
            last_activity: self.last_activity,
        }
    }

    fn touch(&mut self, now: Instant) {
        self.last_activity = Some(now);
        self.last_activity_at = Some(unix_millis());
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Connected, with no activity within `window` of `now`. Exactly at the
/// window is still fresh.
pub(crate) fn is_stale(
    status: ConnectionStatus,
    last_activity: Option<Instant>,
    now: Instant,
    window: Duration,
) -> bool {
    status == ConnectionStatus::Connected
        && last_activity.map_or(true, |at| now.saturating_duration_since(at) > window)
}

/// Not connected, not connecting, and no reconnect timer armed.
pub(crate) fn is_idle(status: ConnectionStatus, reconnect_pending: bool) -> bool {
    match status {
        ConnectionStatus::Disconnected | ConnectionStatus::Failed => true,
        ConnectionStatus::Reconnecting => !reconnect_pending,
        ConnectionStatus::Connecting | ConnectionStatus::Connected => false,
    }
}
