use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::fleet::Fleet;
use crate::state::{is_idle, is_stale};
use crate::supervisor::{ReconnectReason, SupervisorCommand};
use crate::types::connection::ConnectionSnapshot;
use crate::types::repair::RepairAction;

/// Share of endpoints currently connected, 0-100. An empty fleet is healthy.
pub fn health_score(snapshots: &[ConnectionSnapshot]) -> u8 {
    if snapshots.is_empty() {
        return 100;
    }
    let connected = snapshots.iter().filter(|s| s.is_connected()).count();
    (connected as f64 * 100.0 / snapshots.len() as f64).round() as u8
}

/// Connected endpoints that have been silent for longer than `window`.
pub fn stale_endpoints(
    snapshots: &[ConnectionSnapshot],
    now: Instant,
    window: Duration,
) -> Vec<String> {
    snapshots
        .iter()
        .filter(|s| is_stale(s.status, s.last_activity, now, window))
        .map(|s| s.endpoint_id.clone())
        .collect()
}

/// Idle endpoints that have not used up their attempt budget.
pub fn repairable_endpoints(snapshots: &[ConnectionSnapshot], max_attempts: u32) -> Vec<String> {
    snapshots
        .iter()
        .filter(|s| is_idle(s.status, s.reconnect_pending) && s.reconnect_attempts <= max_attempts)
        .map(|s| s.endpoint_id.clone())
        .collect()
}

pub(crate) fn refresh_health(fleet: &Fleet) -> u8 {
    let score = health_score(&fleet.snapshots());
    if fleet.shared.publish_health(score) {
        debug!(score, "Health score updated");
    }
    score
}

pub(crate) fn sweep_stale(fleet: &Fleet, now: Instant) -> Vec<String> {
    let stale = stale_endpoints(&fleet.snapshots(), now, fleet.config.stale_after());
    for id in &stale {
        if let Some(link) = fleet.link(id) {
            link.send(SupervisorCommand::Reconnect(ReconnectReason::Stale));
        }
    }
    stale
}

pub(crate) fn sweep_auto_repair(fleet: &Fleet) -> Vec<String> {
    if !fleet.shared.auto_repair() {
        return Vec::new();
    }
    let max_attempts = fleet.config.backoff.max_attempts;
    let candidates = repairable_endpoints(&fleet.snapshots(), max_attempts);
    if !candidates.is_empty() {
        info!(count = candidates.len(), "Auto-repair: reconnecting idle feeds");
    }
    for id in &candidates {
        if let Some(link) = fleet.link(id) {
            link.send(SupervisorCommand::Reconnect(ReconnectReason::AutoRepair));
        }
    }
    candidates
}

/// Decay latency estimates on every connected endpoint. Returns false when
/// an earlier optimization is still in flight.
pub(crate) fn optimize(fleet: &Fleet, now: Instant) -> bool {
    if !fleet
        .shared
        .try_begin_optimization(now, fleet.config.optimize_cooldown())
    {
        debug!("Optimization already in flight, skipping");
        return false;
    }
    for link in &fleet.links {
        if link.snapshot.borrow().is_connected() {
            link.send(SupervisorCommand::Optimize);
        }
    }
    fleet.shared.record_repair(RepairAction::Optimization, true);
    true
}

fn every(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Periodic health scoring and maintenance sweeps.
pub(crate) struct HealthAggregator {
    fleet: Arc<Fleet>,
    shutdown: watch::Receiver<bool>,
}

impl HealthAggregator {
    pub(crate) fn new(fleet: Arc<Fleet>, shutdown: watch::Receiver<bool>) -> Self {
        Self { fleet, shutdown }
    }

    pub(crate) async fn run(mut self) {
        let config = &self.fleet.config;
        let mut health = every(config.health_interval());
        let mut stale = every(config.stale_sweep_interval());
        let mut repair = every(config.auto_repair_interval());
        let mut optimization = every(config.optimize_interval());

        refresh_health(&self.fleet);
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => break,
                _ = self.fleet.shared.status_changed() => {
                    refresh_health(&self.fleet);
                }
                _ = health.tick() => {
                    refresh_health(&self.fleet);
                }
                _ = stale.tick() => {
                    sweep_stale(&self.fleet, Instant::now());
                }
                _ = repair.tick() => {
                    sweep_auto_repair(&self.fleet);
                }
                _ = optimization.tick() => {
                    optimize(&self.fleet, Instant::now());
                }
            }
        }
        debug!("Health aggregator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::ConnectionManager;
    use crate::transport::mock::MockConnector;
    use crate::types::config::ManagerConfig;
    use crate::types::connection::ConnectionStatus;
    use crate::types::endpoint::Endpoint;

    fn snapshot(id: &str, status: ConnectionStatus) -> ConnectionSnapshot {
        ConnectionSnapshot {
            endpoint_id: id.to_string(),
            address: format!("wss://{id}.example/ws"),
            status,
            last_activity_at: None,
            reconnect_attempts: 0,
            error_count: 0,
            disconnect_count: 0,
            data_flow_count: 0,
            latency_ms: 0.0,
            reconnect_pending: false,
            last_activity: None,
        }
    }

    fn connected_since(id: &str, at: Instant) -> ConnectionSnapshot {
        ConnectionSnapshot {
            last_activity: Some(at),
            ..snapshot(id, ConnectionStatus::Connected)
        }
    }

    #[test]
    fn health_score_rounds_connected_share() {
        let fleet = vec![
            snapshot("a", ConnectionStatus::Connected),
            snapshot("b", ConnectionStatus::Connected),
            snapshot("c", ConnectionStatus::Connected),
            snapshot("d", ConnectionStatus::Disconnected),
        ];
        assert_eq!(health_score(&fleet), 75);

        let thirds = vec![
            snapshot("a", ConnectionStatus::Connected),
            snapshot("b", ConnectionStatus::Reconnecting),
            snapshot("c", ConnectionStatus::Failed),
        ];
        assert_eq!(health_score(&thirds), 33);
        assert_eq!(health_score(&thirds[..2]), 50);
    }

    #[test]
    fn health_score_of_empty_fleet_is_full() {
        assert_eq!(health_score(&[]), 100);
    }

    #[test]
    fn stale_selection_uses_exclusive_window() {
        let start = Instant::now();
        let now = start + Duration::from_secs(61);
        let window = Duration::from_secs(60);
        let fleet = vec![
            connected_since("old", start),
            connected_since("fresh", start + Duration::from_secs(2)),
            connected_since("edge", start + Duration::from_secs(1)),
            snapshot("down", ConnectionStatus::Disconnected),
        ];
        assert_eq!(stale_endpoints(&fleet, now, window), vec!["old".to_string()]);
    }

    #[test]
    fn repair_selection_skips_busy_and_exhausted() {
        let mut frozen = snapshot("frozen", ConnectionStatus::Reconnecting);
        frozen.reconnect_attempts = 2;
        let mut waiting = snapshot("waiting", ConnectionStatus::Reconnecting);
        waiting.reconnect_pending = true;
        let mut exhausted = snapshot("exhausted", ConnectionStatus::Failed);
        exhausted.reconnect_attempts = 6;
        let fleet = vec![
            snapshot("idle", ConnectionStatus::Disconnected),
            frozen,
            waiting,
            exhausted,
            snapshot("live", ConnectionStatus::Connected),
            snapshot("dialing", ConnectionStatus::Connecting),
        ];
        assert_eq!(
            repairable_endpoints(&fleet, 5),
            vec!["idle".to_string(), "frozen".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn health_tracks_live_connections() {
        let ids = ["a", "b", "c", "d"];
        let mut config = ManagerConfig::with_endpoints(
            ids.iter()
                .map(|id| Endpoint::new(*id, format!("wss://{id}.example/ws")))
                .collect(),
        );
        config.auto_repair = false;
        let connector = MockConnector::new();
        let _feeds: Vec<_> = ids[..3].iter().map(|id| connector.accept(id)).collect();

        let manager = ConnectionManager::new(config, Arc::new(connector.clone())).unwrap();
        manager.start().unwrap();
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert_eq!(manager.health_score(), 75);

        let statuses = manager.statuses();
        assert_eq!(statuses[3].status, ConnectionStatus::Disconnected);
        manager.shutdown().await;
    }
}
