use serde::{Deserialize, Serialize};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only copy of one endpoint's connection state, as published by its
/// supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub endpoint_id: String,
    pub address: String,
    pub status: ConnectionStatus,
    /// Unix millis of the last observed message or successful open.
    pub last_activity_at: Option<u64>,
    pub reconnect_attempts: u32,
    pub error_count: u64,
    pub disconnect_count: u64,
    pub data_flow_count: u64,
    pub latency_ms: f64,
    /// A backoff timer is armed and will fire a reconnect.
    pub reconnect_pending: bool,
    /// Monotonic twin of `last_activity_at`, used by the stale sweep.
    #[serde(skip)]
    pub last_activity: Option<Instant>,
}

impl ConnectionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}
