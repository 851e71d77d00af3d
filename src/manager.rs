use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::aggregator::{self, HealthAggregator};
use crate::config;
use crate::error::{FeedError, FeedResult};
use crate::events::ManagerEvent;
use crate::fleet::{Fleet, SharedState};
use crate::supervisor::{supervisor_channel, ReconnectReason, SupervisorCommand, SupervisorSeed};
use crate::transport::{Connector, WsConnector};
use crate::types::config::ManagerConfig;
use crate::types::connection::ConnectionSnapshot;
use crate::types::endpoint::Endpoint;
use crate::types::repair::{RepairAction, RepairLogEntry};

/// Supervises a fixed set of feed endpoints and exposes their health.
///
/// Construction validates the configuration and prepares one supervisor per
/// endpoint; nothing connects until [`ConnectionManager::start`] is called
/// from inside a tokio runtime. All methods take `&self`, so the manager can
/// be shared behind an `Arc` or managed as Tauri state.
pub struct ConnectionManager {
    fleet: Arc<Fleet>,
    connector: Arc<dyn Connector>,
    seeds: Mutex<Option<Vec<SupervisorSeed>>>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(config: ManagerConfig, connector: Arc<dyn Connector>) -> FeedResult<Self> {
        config::validate(&config)?;
        let shared = Arc::new(SharedState::new(&config));
        let (seeds, links): (Vec<_>, Vec<_>) = config
            .endpoints
            .iter()
            .cloned()
            .map(supervisor_channel)
            .unzip();
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            fleet: Arc::new(Fleet {
                config,
                shared,
                links,
            }),
            connector,
            seeds: Mutex::new(Some(seeds)),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Manager that dials real websocket endpoints.
    pub fn with_websockets(config: ManagerConfig) -> FeedResult<Self> {
        Self::new(config, Arc::new(WsConnector))
    }

    /// Spawn every supervisor and the health aggregator on the current runtime.
    pub fn start(&self) -> FeedResult<()> {
        let runtime = Handle::try_current().map_err(|_| FeedError::NoRuntime)?;
        let seeds = self
            .seeds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(FeedError::AlreadyStarted)?;

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for seed in seeds {
            tasks.push(seed.spawn(
                &runtime,
                &self.fleet.config,
                Arc::clone(&self.connector),
                Arc::clone(&self.fleet.shared),
                self.shutdown.subscribe(),
            ));
        }
        let aggregator = HealthAggregator::new(Arc::clone(&self.fleet), self.shutdown.subscribe());
        tasks.push(runtime.spawn(aggregator.run()));

        info!(
            endpoints = self.fleet.links.len(),
            auto_repair = self.fleet.shared.auto_repair(),
            "Connection manager started"
        );
        Ok(())
    }

    /// Stop every task, closing open connections and cancelling pending
    /// reconnects. The manager cannot be restarted afterwards.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.seeds.lock().unwrap_or_else(|e| e.into_inner()).take();

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Manager task ended abnormally");
            }
        }
        info!("Connection manager stopped");
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.fleet.config
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.fleet.config.endpoints
    }

    /// Latest published snapshot of every endpoint, in configuration order.
    pub fn statuses(&self) -> Vec<ConnectionSnapshot> {
        self.fleet.snapshots()
    }

    pub fn status(&self, endpoint_id: &str) -> Option<ConnectionSnapshot> {
        self.fleet.link(endpoint_id).map(|link| link.snapshot())
    }

    pub fn health_score(&self) -> u8 {
        self.fleet.shared.health_score()
    }

    /// Up to `limit` most recent repair-log entries, oldest first.
    pub fn repair_log(&self, limit: usize) -> Vec<RepairLogEntry> {
        self.fleet.shared.repair_log(limit)
    }

    fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Drop every connection, cancel pending timers and reconnect with a
    /// fresh attempt budget, including endpoints that have failed. A no-op
    /// after shutdown.
    pub fn force_reconnect_all(&self) {
        if self.is_shut_down() {
            debug!("Force reconnect ignored after shutdown");
            return;
        }
        self.fleet
            .broadcast(SupervisorCommand::Reconnect(ReconnectReason::Forced));
        self.fleet
            .shared
            .record_repair(RepairAction::ForceReconnectAll, true);
        self.fleet.shared.emit(ManagerEvent::notice(
            "Force reconnect",
            "Re-establishing every feed connection",
        ));
    }

    /// Takes effect on the next backoff expiry or sweep; pending timers are
    /// not cancelled.
    pub fn set_auto_repair(&self, enabled: bool) {
        self.fleet.shared.set_auto_repair(enabled);
        info!(enabled, "Auto-repair toggled");
        let description = if enabled {
            "Failed feeds will be reconnected automatically"
        } else {
            "Automatic reconnection paused"
        };
        self.fleet
            .shared
            .emit(ManagerEvent::notice("Auto-repair", description));
    }

    pub fn auto_repair_enabled(&self) -> bool {
        self.fleet.shared.auto_repair()
    }

    /// Run an optimization sweep now. Returns false if one is still in flight
    /// or the manager has shut down.
    pub fn force_optimization(&self) -> bool {
        if self.is_shut_down() {
            debug!("Optimization ignored after shutdown");
            return false;
        }
        let ran = aggregator::optimize(&self.fleet, Instant::now());
        if ran {
            self.fleet.shared.emit(ManagerEvent::notice(
                "Connection optimization",
                "Latency estimates refreshed for connected feeds",
            ));
        }
        ran
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.fleet.shared.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::transport::mock::MockConnector;
    use crate::transport::StreamEvent;
    use crate::types::connection::ConnectionStatus;

    fn endpoints(ids: &[&str]) -> ManagerConfig {
        let mut config = ManagerConfig::with_endpoints(
            ids.iter()
                .map(|id| Endpoint::new(*id, format!("wss://{id}.example/ws")))
                .collect(),
        );
        config.failure_log_sample_rate = 0.0;
        config
    }

    fn manager(config: ManagerConfig, connector: &MockConnector) -> ConnectionManager {
        ConnectionManager::new(config, Arc::new(connector.clone())).unwrap()
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn new_rejects_invalid_config() {
        let result = ConnectionManager::new(endpoints(&[]), Arc::new(MockConnector::new()));
        assert!(matches!(result, Err(FeedError::Config(_))));

        let result = ConnectionManager::new(endpoints(&["a", "a"]), Arc::new(MockConnector::new()));
        assert!(matches!(result, Err(FeedError::DuplicateEndpoint(id)) if id == "a"));
    }

    #[test]
    fn start_outside_runtime_fails() {
        let manager = manager(endpoints(&["a"]), &MockConnector::new());
        assert!(matches!(manager.start(), Err(FeedError::NoRuntime)));
    }

    #[test]
    fn statuses_before_start_are_disconnected() {
        let manager = manager(endpoints(&["a", "b"]), &MockConnector::new());
        let statuses = manager.statuses();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].endpoint_id, "a");
        assert!(statuses
            .iter()
            .all(|s| s.status == ConnectionStatus::Disconnected && s.reconnect_attempts == 0));
        assert!(manager.status("missing").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_fails() {
        let manager = manager(endpoints(&["a"]), &MockConnector::new());
        manager.start().unwrap();
        assert!(matches!(manager.start(), Err(FeedError::AlreadyStarted)));
        manager.shutdown().await;
        assert!(matches!(manager.start(), Err(FeedError::AlreadyStarted)));
    }

    #[test]
    fn force_reconnect_all_logs_and_notifies() {
        let manager = manager(endpoints(&["a"]), &MockConnector::new());
        let mut rx = manager.subscribe();
        manager.force_reconnect_all();

        let log = manager.repair_log(10);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, RepairAction::ForceReconnectAll);
        assert!(matches!(rx.try_recv().unwrap(), ManagerEvent::RepairLogged(_)));
        assert!(matches!(rx.try_recv().unwrap(), ManagerEvent::Notice { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn operator_commands_after_shutdown_are_ignored() {
        let manager = manager(endpoints(&["a"]), &MockConnector::new());
        manager.start().unwrap();
        manager.shutdown().await;

        let mut rx = manager.subscribe();
        let logged_before = manager.repair_log(usize::MAX).len();
        manager.force_reconnect_all();
        assert!(!manager.force_optimization());

        let log = manager.repair_log(usize::MAX);
        assert_eq!(log.len(), logged_before);
        assert!(log
            .iter()
            .all(|e| e.action != RepairAction::ForceReconnectAll
                && e.action != RepairAction::Optimization));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn oversized_repair_log_is_rejected() {
        let mut config = endpoints(&["a"]);
        config.repair_log_capacity = usize::MAX;
        let result = ConnectionManager::new(config, Arc::new(MockConnector::new()));
        assert!(matches!(result, Err(FeedError::Config(_))));
    }

    #[test]
    fn repair_log_limit_keeps_most_recent() {
        let manager = manager(endpoints(&["a"]), &MockConnector::new());
        assert!(manager.force_optimization());
        manager.force_reconnect_all();

        let recent = manager.repair_log(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].action, RepairAction::ForceReconnectAll);
        assert_eq!(manager.repair_log(10).len(), 2);
    }

    #[test]
    fn auto_repair_toggle_is_visible() {
        let manager = manager(endpoints(&["a"]), &MockConnector::new());
        assert!(manager.auto_repair_enabled());
        manager.set_auto_repair(false);
        assert!(!manager.auto_repair_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn force_reconnect_all_resets_failed_endpoints() {
        let connector = MockConnector::new();
        let manager = manager(endpoints(&["a", "b"]), &connector);
        manager.start().unwrap();

        tokio::time::sleep(Duration::from_secs(600)).await;
        for snapshot in manager.statuses() {
            assert_eq!(snapshot.status, ConnectionStatus::Failed);
            assert_eq!(snapshot.reconnect_attempts, 6);
        }

        connector.hang("a");
        connector.hang("b");
        manager.force_reconnect_all();
        settle().await;

        for snapshot in manager.statuses() {
            assert_eq!(snapshot.status, ConnectionStatus::Connecting);
            assert_eq!(snapshot.reconnect_attempts, 0);
        }
        assert_eq!(connector.calls("a"), 7);
        assert_eq!(connector.calls("b"), 7);
        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn optimization_is_single_flight_and_decays_latency() {
        let connector = MockConnector::new();
        let feed = connector.accept("a");
        let manager = manager(endpoints(&["a"]), &connector);
        manager.start().unwrap();
        settle().await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        feed.send(StreamEvent::Message).unwrap();
        settle().await;
        let before = manager.status("a").unwrap().latency_ms;
        assert!(before > 5.0);

        assert!(manager.force_optimization());
        assert!(!manager.force_optimization());
        settle().await;
        let after = manager.status("a").unwrap().latency_ms;
        assert!((after - (before * 0.9).max(5.0)).abs() < 1e-9);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(manager.force_optimization());
        let optimizations = manager
            .repair_log(usize::MAX)
            .into_iter()
            .filter(|e| e.action == RepairAction::Optimization)
            .count();
        assert_eq!(optimizations, 2);
        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_status_changes() {
        let connector = MockConnector::new();
        let _feed = connector.accept("a");
        let manager = manager(endpoints(&["a"]), &connector);
        let mut rx = manager.subscribe();
        manager.start().unwrap();
        settle().await;

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ManagerEvent::StatusChanged { status, .. } = event {
                seen.push(status);
            }
        }
        assert_eq!(
            seen,
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );
        manager.shutdown().await;
    }
}
