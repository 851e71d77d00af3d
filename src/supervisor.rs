use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant, Sleep};
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::error::FeedError;
use crate::events::ManagerEvent;
use crate::fleet::{SharedState, SupervisorLink};
use crate::state::{ConnectionState, RetryPlan};
use crate::throttle;
use crate::transport::{Connector, FeedStream, StreamEvent};
use crate::types::config::ManagerConfig;
use crate::types::connection::{ConnectionSnapshot, ConnectionStatus};
use crate::types::endpoint::Endpoint;
use crate::types::repair::RepairAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectReason {
    /// Operator command; also resets the attempt budget.
    Forced,
    /// Connected but silent past the stale window.
    Stale,
    /// Idle endpoint picked up by the auto-repair sweep.
    AutoRepair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorCommand {
    Reconnect(ReconnectReason),
    Optimize,
}

const FORCED: SupervisorCommand = SupervisorCommand::Reconnect(ReconnectReason::Forced);

enum Phase {
    Connect,
    Wait(Pin<Box<Sleep>>),
    Parked,
}

/// Channel ends a supervisor takes ownership of when it is spawned.
pub(crate) struct SupervisorSeed {
    endpoint: Endpoint,
    published: watch::Sender<ConnectionSnapshot>,
    commands: mpsc::UnboundedReceiver<SupervisorCommand>,
}

/// Create the channels for one endpoint. The link is usable (and readable)
/// before the supervisor is spawned.
pub(crate) fn supervisor_channel(endpoint: Endpoint) -> (SupervisorSeed, SupervisorLink) {
    let (published, snapshot) = watch::channel(ConnectionState::new().snapshot(&endpoint));
    let (tx, rx) = mpsc::unbounded_channel();
    let link = SupervisorLink {
        endpoint_id: endpoint.id.clone(),
        commands: tx,
        snapshot,
    };
    let seed = SupervisorSeed {
        endpoint,
        published,
        commands: rx,
    };
    (seed, link)
}

impl SupervisorSeed {
    pub(crate) fn spawn(
        self,
        runtime: &Handle,
        config: &ManagerConfig,
        connector: Arc<dyn Connector>,
        shared: Arc<SharedState>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let supervisor = Supervisor {
            endpoint: self.endpoint,
            state: ConnectionState::new(),
            connector,
            policy: config.backoff_policy(),
            stale_after: config.stale_after(),
            connect_timeout: config.connect_timeout(),
            latency_floor_ms: config.latency_floor_ms,
            shared,
            published: self.published,
            last_status: ConnectionStatus::Disconnected,
            repair_in_flight: false,
            commands: self.commands,
            shutdown,
        };
        runtime.spawn(supervisor.run())
    }
}

/// Owns the lifecycle of one endpoint's connection. Every transition for the
/// endpoint happens on this task, in order.
struct Supervisor {
    endpoint: Endpoint,
    state: ConnectionState,
    connector: Arc<dyn Connector>,
    policy: BackoffPolicy,
    stale_after: Duration,
    connect_timeout: Duration,
    latency_floor_ms: f64,
    shared: Arc<SharedState>,
    published: watch::Sender<ConnectionSnapshot>,
    last_status: ConnectionStatus,
    /// The next connect is an active repair of a transport error; its outcome
    /// is logged as `HandleError`.
    repair_in_flight: bool,
    commands: mpsc::UnboundedReceiver<SupervisorCommand>,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    async fn run(mut self) {
        debug!(endpoint = %self.endpoint.id, address = %self.endpoint.address, "Supervisor started");
        let mut phase = Phase::Connect;
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            let next = match phase {
                Phase::Connect => self.connect().await,
                Phase::Wait(timer) => self.wait(timer).await,
                Phase::Parked => self.park().await,
            };
            match next {
                Some(p) => phase = p,
                None => break,
            }
        }
        debug!(endpoint = %self.endpoint.id, "Supervisor stopped");
    }

    async fn connect(&mut self) -> Option<Phase> {
        self.state.begin_connect();
        self.publish();

        let connector = Arc::clone(&self.connector);
        let endpoint = self.endpoint.clone();
        let limit = self.connect_timeout;
        let started = Instant::now();
        let attempt = async move { timeout(limit, connector.connect(&endpoint)).await };
        tokio::pin!(attempt);

        let outcome = loop {
            tokio::select! {
                _ = self.shutdown.changed() => return None,
                result = &mut attempt => break result,
                Some(command) = self.commands.recv() => {
                    // Dropping `attempt` abandons the in-flight handshake.
                    if command == FORCED {
                        self.state.reset_attempts();
                        self.repair_in_flight = false;
                        return Some(Phase::Connect);
                    }
                }
            }
        };

        let repairing = std::mem::take(&mut self.repair_in_flight);
        match outcome {
            Ok(Ok(stream)) => {
                self.state.mark_open(Instant::now(), started.elapsed());
                self.publish();
                info!(endpoint = %self.endpoint.id, "Feed connected");
                if repairing {
                    self.shared
                        .record_repair(RepairAction::HandleError(self.endpoint.id.clone()), true);
                }
                self.stream(stream).await
            }
            Ok(Err(e)) => {
                self.finish_failed_repair(repairing);
                let repair = self.on_transport_error(&e.to_string());
                Some(self.retry(repair))
            }
            Err(_) => {
                self.finish_failed_repair(repairing);
                let repair = self.on_transport_error(&FeedError::Timeout(limit).to_string());
                Some(self.retry(repair))
            }
        }
    }

    async fn stream(&mut self, mut stream: Box<dyn FeedStream>) -> Option<Phase> {
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    stream.close().await;
                    return None;
                }
                event = stream.next_event() => match event {
                    StreamEvent::Message => {
                        self.state.record_message(Instant::now());
                        self.publish();
                    }
                    StreamEvent::Closed { reason } => {
                        self.on_disconnect(reason.as_deref());
                        return Some(self.retry(false));
                    }
                    StreamEvent::Error(e) => {
                        let repair = self.on_transport_error(&e);
                        self.on_disconnect(None);
                        return Some(self.retry(repair));
                    }
                },
                Some(command) = self.commands.recv() => match command {
                    SupervisorCommand::Optimize => {
                        self.state.decay_latency(self.latency_floor_ms);
                        self.publish();
                    }
                    SupervisorCommand::Reconnect(ReconnectReason::AutoRepair) => {}
                    SupervisorCommand::Reconnect(ReconnectReason::Stale)
                        if !self.state.is_stale(Instant::now(), self.stale_after) => {}
                    SupervisorCommand::Reconnect(reason) => {
                        stream.close().await;
                        self.drop_live_connection(reason);
                        return Some(Phase::Connect);
                    }
                }
            }
        }
    }

    async fn wait(&mut self, mut timer: Pin<Box<Sleep>>) -> Option<Phase> {
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => return None,
                _ = &mut timer => {
                    if self.shared.auto_repair() {
                        self.shared
                            .record_repair(RepairAction::AutoReconnect(self.endpoint.id.clone()), true);
                        return Some(Phase::Connect);
                    }
                    self.state.freeze();
                    self.publish();
                    debug!(endpoint = %self.endpoint.id, "Backoff elapsed with auto-repair off; holding");
                    return Some(Phase::Parked);
                }
                Some(command) = self.commands.recv() => {
                    // Dropping `timer` cancels the scheduled reconnect.
                    if command == FORCED {
                        self.state.reset_attempts();
                        return Some(Phase::Connect);
                    }
                }
            }
        }
    }

    async fn park(&mut self) -> Option<Phase> {
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => return None,
                command = self.commands.recv() => match command {
                    None => return None,
                    Some(FORCED) => {
                        self.state.reset_attempts();
                        return Some(Phase::Connect);
                    }
                    Some(SupervisorCommand::Reconnect(ReconnectReason::AutoRepair))
                        if self.state.is_repairable(&self.policy) =>
                    {
                        self.shared.record_repair(
                            RepairAction::AutoRepairReconnect(self.endpoint.id.clone()),
                            true,
                        );
                        return Some(Phase::Connect);
                    }
                    Some(_) => {}
                }
            }
        }
    }

    /// Apply the retry plan. With `repair` set, a scheduled reconnect runs
    /// immediately instead of after its backoff delay.
    fn retry(&mut self, repair: bool) -> Phase {
        let plan = self.state.plan_retry(&self.policy, self.shared.auto_repair());
        self.publish();
        match plan {
            RetryPlan::After(_) if repair => {
                info!(
                    endpoint = %self.endpoint.id,
                    attempt = self.state.reconnect_attempts(),
                    "Repairing transport error with immediate reconnect"
                );
                self.repair_in_flight = true;
                Phase::Connect
            }
            RetryPlan::After(delay) => {
                debug!(
                    endpoint = %self.endpoint.id,
                    attempt = self.state.reconnect_attempts(),
                    delay_secs = delay.as_secs(),
                    "Reconnect scheduled"
                );
                Phase::Wait(Box::pin(sleep(delay)))
            }
            RetryPlan::Hold => {
                debug!(endpoint = %self.endpoint.id, "Auto-repair off; staying disconnected");
                Phase::Parked
            }
            RetryPlan::GiveUp { attempts } => {
                warn!(
                    endpoint = %self.endpoint.id,
                    attempts,
                    "Reconnection paused after repeated failures"
                );
                self.shared
                    .record_repair(RepairAction::ReconnectExhausted(self.endpoint.id.clone()), false);
                Phase::Parked
            }
        }
    }

    fn drop_live_connection(&mut self, reason: ReconnectReason) {
        let count = self.state.record_disconnect();
        if reason == ReconnectReason::Forced {
            self.state.reset_attempts();
        }
        self.publish();
        if throttle::should_surface(count) {
            info!(
                endpoint = %self.endpoint.id,
                disconnect_count = count,
                ?reason,
                "Dropping live connection for reconnect (similar events suppressed)"
            );
        } else {
            debug!(endpoint = %self.endpoint.id, disconnect_count = count, ?reason, "Dropping live connection");
        }
        if reason == ReconnectReason::Stale {
            self.shared
                .record_repair(RepairAction::StaleReconnect(self.endpoint.id.clone()), true);
        }
    }

    fn finish_failed_repair(&mut self, repairing: bool) {
        if repairing {
            self.shared
                .record_repair(RepairAction::HandleError(self.endpoint.id.clone()), false);
        }
    }

    /// Count and surface a transport error. Returns whether it earns an
    /// active repair.
    fn on_transport_error(&mut self, error: &str) -> bool {
        let count = self.state.record_error();
        if throttle::should_surface(count) {
            warn!(
                endpoint = %self.endpoint.id,
                error_count = count,
                error,
                "Feed transport error (further similar errors suppressed)"
            );
        } else {
            debug!(endpoint = %self.endpoint.id, error_count = count, error, "Feed transport error");
        }
        throttle::warrants_repair(count)
    }

    fn on_disconnect(&mut self, reason: Option<&str>) {
        let count = self.state.record_disconnect();
        let reason = reason.unwrap_or("none");
        if throttle::should_surface(count) {
            info!(
                endpoint = %self.endpoint.id,
                disconnect_count = count,
                reason,
                "Feed disconnected (similar events suppressed)"
            );
        } else {
            debug!(endpoint = %self.endpoint.id, disconnect_count = count, reason, "Feed disconnected");
        }
    }

    fn publish(&mut self) {
        let snapshot = self.state.snapshot(&self.endpoint);
        let status = snapshot.status;
        self.published.send_replace(snapshot);
        if status != self.last_status {
            self.last_status = status;
            self.shared.emit(ManagerEvent::StatusChanged {
                endpoint_id: self.endpoint.id.clone(),
                status,
            });
            self.shared.notify_status_changed();
        }
    }
}
