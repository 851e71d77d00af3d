use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc, watch, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::events::ManagerEvent;
use crate::repair_log::RepairLog;
use crate::state::unix_millis;
use crate::supervisor::SupervisorCommand;
use crate::throttle::FailureSampler;
use crate::types::config::ManagerConfig;
use crate::types::connection::ConnectionSnapshot;
use crate::types::repair::{RepairAction, RepairLogEntry};

const EVENT_CAPACITY: usize = 256;

/// State every supervisor, the aggregator and the facade may touch. Each
/// field is either replace-only or append-only.
pub(crate) struct SharedState {
    auto_repair: AtomicBool,
    health_score: AtomicU8,
    repair_log: Mutex<RepairLog>,
    sampler: FailureSampler,
    optimizing_until: Mutex<Option<Instant>>,
    events: broadcast::Sender<ManagerEvent>,
    status_changed: Notify,
}

impl SharedState {
    pub(crate) fn new(config: &ManagerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            auto_repair: AtomicBool::new(config.auto_repair),
            health_score: AtomicU8::new(0),
            repair_log: Mutex::new(RepairLog::new(config.repair_log_capacity)),
            sampler: FailureSampler::new(config.failure_log_sample_rate),
            optimizing_until: Mutex::new(None),
            events,
            status_changed: Notify::new(),
        }
    }

    pub(crate) fn auto_repair(&self) -> bool {
        self.auto_repair.load(Ordering::SeqCst)
    }

    pub(crate) fn set_auto_repair(&self, enabled: bool) {
        self.auto_repair.store(enabled, Ordering::SeqCst);
    }

    pub(crate) fn health_score(&self) -> u8 {
        self.health_score.load(Ordering::SeqCst)
    }

    /// Replace the published score; returns true when it changed.
    pub(crate) fn publish_health(&self, score: u8) -> bool {
        let previous = self.health_score.swap(score, Ordering::SeqCst);
        if previous != score {
            self.emit(ManagerEvent::HealthUpdated { score });
            true
        } else {
            false
        }
    }

    /// Append to the repair log and surface it: successes always, failures
    /// only when sampled.
    pub(crate) fn record_repair(&self, action: RepairAction, success: bool) -> RepairLogEntry {
        let entry = {
            let mut log = self.repair_log.lock().unwrap_or_else(|e| e.into_inner());
            log.push(action, success, unix_millis())
        };
        if success {
            info!(seq = entry.seq, "Repair: {}", entry.action);
        } else if self.sampler.admit() {
            warn!(seq = entry.seq, "Repair failed: {}", entry.action);
        } else {
            debug!(seq = entry.seq, "Repair failed: {}", entry.action);
        }
        self.emit(ManagerEvent::RepairLogged(entry.clone()));
        entry
    }

    pub(crate) fn repair_log(&self, limit: usize) -> Vec<RepairLogEntry> {
        self.repair_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .recent(limit)
    }

    /// Claim the optimization slot unless one is still in flight.
    pub(crate) fn try_begin_optimization(&self, now: Instant, cooldown: std::time::Duration) -> bool {
        let mut until = self.optimizing_until.lock().unwrap_or_else(|e| e.into_inner());
        match *until {
            Some(busy_until) if now < busy_until => false,
            _ => {
                *until = Some(now + cooldown);
                true
            }
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: ManagerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn notify_status_changed(&self) {
        self.status_changed.notify_one();
    }

    pub(crate) async fn status_changed(&self) {
        self.status_changed.notified().await;
    }
}

/// The facade's and aggregator's handle on one supervisor.
pub(crate) struct SupervisorLink {
    pub(crate) endpoint_id: String,
    pub(crate) commands: mpsc::UnboundedSender<SupervisorCommand>,
    pub(crate) snapshot: watch::Receiver<ConnectionSnapshot>,
}

impl SupervisorLink {
    /// Deliver a command. A supervisor that already exited drops it.
    pub(crate) fn send(&self, command: SupervisorCommand) {
        if self.commands.send(command).is_err() {
            debug!(endpoint = %self.endpoint_id, "Supervisor gone, command dropped");
        }
    }

    pub(crate) fn snapshot(&self) -> ConnectionSnapshot {
        self.snapshot.borrow().clone()
    }
}

/// Everything the aggregator and facade share about the running endpoints.
pub(crate) struct Fleet {
    pub(crate) config: ManagerConfig,
    pub(crate) shared: Arc<SharedState>,
    pub(crate) links: Vec<SupervisorLink>,
}

impl Fleet {
    pub(crate) fn snapshots(&self) -> Vec<ConnectionSnapshot> {
        self.links.iter().map(SupervisorLink::snapshot).collect()
    }

    pub(crate) fn link(&self, endpoint_id: &str) -> Option<&SupervisorLink> {
        self.links.iter().find(|l| l.endpoint_id == endpoint_id)
    }

    pub(crate) fn broadcast(&self, command: SupervisorCommand) {
        for link in &self.links {
            link.send(command);
        }
    }
}
