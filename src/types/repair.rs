use serde::{Deserialize, Serialize};

/// What a repair log entry records. Endpoint-scoped actions carry the
/// endpoint id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "endpoint", rename_all = "snake_case")]
pub enum RepairAction {
    AutoReconnect(String),
    HandleError(String),
    AutoRepairReconnect(String),
    StaleReconnect(String),
    ReconnectExhausted(String),
    Optimization,
    ForceReconnectAll,
}

impl RepairAction {
    pub fn endpoint_id(&self) -> Option<&str> {
        match self {
            Self::AutoReconnect(id)
            | Self::HandleError(id)
            | Self::AutoRepairReconnect(id)
            | Self::StaleReconnect(id)
            | Self::ReconnectExhausted(id) => Some(id),
            Self::Optimization | Self::ForceReconnectAll => None,
        }
    }
}

impl std::fmt::Display for RepairAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AutoReconnect(id) => write!(f, "Auto-reconnect {}", id),
            Self::HandleError(id) => write!(f, "Handle error for {}", id),
            Self::AutoRepairReconnect(id) => write!(f, "Auto-repair reconnect {}", id),
            Self::StaleReconnect(id) => write!(f, "Stale connection reconnect {}", id),
            Self::ReconnectExhausted(id) => write!(f, "Reconnection paused for {}", id),
            Self::Optimization => f.write_str("Connection optimization"),
            Self::ForceReconnectAll => f.write_str("Force reconnect all feeds"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairLogEntry {
    /// Position in the global append order, starting at 1.
    pub seq: u64,
    pub action: RepairAction,
    pub timestamp: u64,
    pub success: bool,
}
