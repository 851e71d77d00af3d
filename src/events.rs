use serde::Serialize;

use crate::types::connection::ConnectionStatus;
use crate::types::repair::RepairLogEntry;

/// Event names as constants; dashboards subscribe by these names.
pub mod event_names {
    pub const STATUS_CHANGE: &str = "feed:status-change";
    pub const HEALTH_UPDATED: &str = "feed:health";
    pub const REPAIR_LOGGED: &str = "feed:repair";
    pub const NOTICE: &str = "feed:notice";
}

/// Notifications published by the connection manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ManagerEvent {
    StatusChanged {
        endpoint_id: String,
        status: ConnectionStatus,
    },
    HealthUpdated {
        score: u8,
    },
    RepairLogged(RepairLogEntry),
    /// Operator-facing notice, e.g. after a force command.
    Notice {
        title: String,
        description: String,
    },
}

impl ManagerEvent {
    pub fn notice(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Notice {
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::StatusChanged { .. } => event_names::STATUS_CHANGE,
            Self::HealthUpdated { .. } => event_names::HEALTH_UPDATED,
            Self::RepairLogged(_) => event_names::REPAIR_LOGGED,
            Self::Notice { .. } => event_names::NOTICE,
        }
    }
}

#[cfg(feature = "desktop")]
pub use desktop::{emit_event, forward_events};

#[cfg(feature = "desktop")]
mod desktop {
    use serde::Serialize;
    use tauri::{AppHandle, Emitter, Runtime};
    use tokio::sync::broadcast;
    use tracing::{debug, warn};

    use super::ManagerEvent;

    pub fn emit_event<R: Runtime, T: Serialize + Clone>(
        app: &AppHandle<R>,
        event: &str,
        payload: T,
    ) -> Result<(), String> {
        app.emit(event, payload).map_err(|e| e.to_string())
    }

    /// Re-emit manager notifications as Tauri events until the manager goes
    /// away.
    pub fn forward_events<R: Runtime>(
        app: AppHandle<R>,
        mut rx: broadcast::Receiver<ManagerEvent>,
    ) -> tauri::async_runtime::JoinHandle<()> {
        tauri::async_runtime::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Err(e) = emit_event(&app, event.name(), event.clone()) {
                            warn!(event = event.name(), error = %e, "Failed to emit Tauri event");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Event forwarder lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
