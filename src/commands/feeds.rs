use serde::Serialize;

use crate::manager::ConnectionManager;
use crate::types::connection::ConnectionSnapshot;
use crate::types::repair::RepairLogEntry;

/// How many repairs the dashboard overview shows.
pub const OVERVIEW_REPAIRS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedsOverview {
    pub connections: Vec<ConnectionSnapshot>,
    pub health_score: u8,
    pub auto_repair: bool,
    pub recent_repairs: Vec<RepairLogEntry>,
}

/// Everything the dashboard polls for in one call.
pub fn overview(manager: &ConnectionManager) -> FeedsOverview {
    FeedsOverview {
        connections: manager.statuses(),
        health_score: manager.health_score(),
        auto_repair: manager.auto_repair_enabled(),
        recent_repairs: manager.repair_log(OVERVIEW_REPAIRS),
    }
}

pub fn statuses(manager: &ConnectionManager) -> Vec<ConnectionSnapshot> {
    manager.statuses()
}

pub fn health_score(manager: &ConnectionManager) -> u8 {
    manager.health_score()
}

pub fn repair_log(manager: &ConnectionManager, limit: Option<usize>) -> Vec<RepairLogEntry> {
    manager.repair_log(limit.unwrap_or(manager.config().repair_log_capacity))
}

pub fn force_reconnect_all(manager: &ConnectionManager) {
    manager.force_reconnect_all();
}

pub fn set_auto_repair(manager: &ConnectionManager, enabled: bool) -> bool {
    manager.set_auto_repair(enabled);
    manager.auto_repair_enabled()
}

/// Returns an error when an optimization is already running, so the caller
/// can tell the operator to wait.
pub fn force_optimization(manager: &ConnectionManager) -> Result<(), String> {
    if manager.force_optimization() {
        Ok(())
    } else {
        Err("Optimization already in progress".to_string())
    }
}

// Tauri command wrappers, these take the manager from managed state
#[cfg(feature = "desktop")]
#[tauri::command]
pub fn feeds_overview(manager: tauri::State<'_, ConnectionManager>) -> FeedsOverview {
    overview(&manager)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub fn feeds_statuses(manager: tauri::State<'_, ConnectionManager>) -> Vec<ConnectionSnapshot> {
    statuses(&manager)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub fn feeds_health_score(manager: tauri::State<'_, ConnectionManager>) -> u8 {
    health_score(&manager)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub fn feeds_repair_log(
    manager: tauri::State<'_, ConnectionManager>,
    limit: Option<usize>,
) -> Vec<RepairLogEntry> {
    repair_log(&manager, limit)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub fn feeds_force_reconnect(manager: tauri::State<'_, ConnectionManager>) {
    force_reconnect_all(&manager);
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub fn feeds_set_auto_repair(manager: tauri::State<'_, ConnectionManager>, enabled: bool) -> bool {
    set_auto_repair(&manager, enabled)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub fn feeds_optimize(manager: tauri::State<'_, ConnectionManager>) -> Result<(), String> {
    force_optimization(&manager)
}
