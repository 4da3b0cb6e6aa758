//! The supervisor: forks the fleet, waits for readiness, broadcasts control
//! messages and reforks workers that die after initialization.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::control::ControlMessage;
use crate::observability::metrics;
use crate::supervisor::fleet::{FleetPhase, FleetSnapshot, FleetState, WorkerId, WorkerState};
use crate::supervisor::launcher::{
    ExitReason, FleetEvent, LaunchError, WorkerEvent, WorkerEvents, WorkerHandle, WorkerLauncher,
};
use crate::supervisor::policy::{AlwaysRestart, RestartDecision, RestartPolicy};
use crate::worker::WorkerEnv;

/// Delay before retrying a replacement fork that failed to launch.
const RELAUNCH_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("worker {id} {reason} before it was ready")]
    BootFailure { id: WorkerId, reason: ExitReason },

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("supervisor is no longer running")]
    Closed,
}

/// Requests from handles to the supervisor loop.
#[derive(Debug)]
pub enum SupervisorCommand {
    Broadcast(ControlMessage),
    /// Point future forks at a new bundle, then broadcast `Reload`.
    UpdateBundle(WorkerEnv),
    /// Kill one worker without its cooperation.
    Kill(WorkerId),
}

pub struct Supervisor {
    worker_count: usize,
    env: WorkerEnv,
    launcher: Box<dyn WorkerLauncher>,
    policy: Box<dyn RestartPolicy>,
}

impl Supervisor {
    pub fn new(worker_count: usize, env: WorkerEnv, launcher: impl WorkerLauncher + 'static) -> Self {
        Self {
            worker_count,
            env,
            launcher: Box::new(launcher),
            policy: Box::new(AlwaysRestart),
        }
    }

    pub fn with_policy(mut self, policy: Box<dyn RestartPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Fork every worker and resolve once all of them are ready.
    ///
    /// Any exit before that is a boot failure: nothing is reforked and the
    /// workers already forked are killed.
    pub async fn start(mut self) -> Result<SupervisorHandle, SupervisorError> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut fleet = FleetState::new(self.worker_count);
        let mut workers = BTreeMap::new();

        tracing::info!(workers = self.worker_count, "Forking workers");
        for _ in 0..self.worker_count {
            let id = fleet.next_id();
            let handle = self
                .launcher
                .launch(&self.env, WorkerEvents::new(id, events_tx.clone()))?;
            tracing::debug!(worker = id, pid = ?handle.pid, "Worker forked");
            fleet.insert(id, handle.pid);
            workers.insert(id, handle);
        }
        metrics::set_workers_live(fleet.live_count());

        while !fleet.try_initialize() {
            let Some(FleetEvent { id, event }) = events_rx.recv().await else {
                return Err(SupervisorError::Closed);
            };
            match event {
                WorkerEvent::Online => {
                    fleet.transition(id, WorkerState::Online);
                }
                WorkerEvent::Ready => {
                    if fleet.transition(id, WorkerState::Ready) {
                        tracing::info!(worker = id, "Worker ready");
                        self.policy.on_ready();
                    }
                }
                WorkerEvent::Exited(reason) => {
                    metrics::record_worker_exit(reason.cause());
                    tracing::error!(worker = id, reason = %reason, "Worker exited during boot");
                    return Err(SupervisorError::BootFailure { id, reason });
                }
            }
        }
        tracing::info!(workers = fleet.ready_count(), "Fleet initialized");

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(fleet.snapshot());
        let (respawn_tx, respawn_rx) = mpsc::unbounded_channel();

        let supervisor_loop = SupervisorLoop {
            fleet,
            workers,
            env: self.env,
            launcher: self.launcher,
            policy: self.policy,
            events_tx,
            events_rx,
            commands_rx,
            snapshot_tx,
            respawn_tx,
            respawn_rx,
        };
        tokio::spawn(supervisor_loop.run());

        Ok(SupervisorHandle {
            commands: commands_tx,
            snapshot: snapshot_rx,
        })
    }
}

/// Owner of the fleet after initialization. Nothing else mutates it.
struct SupervisorLoop {
    fleet: FleetState,
    workers: BTreeMap<WorkerId, WorkerHandle>,
    env: WorkerEnv,
    launcher: Box<dyn WorkerLauncher>,
    policy: Box<dyn RestartPolicy>,
    events_tx: mpsc::UnboundedSender<FleetEvent>,
    events_rx: mpsc::UnboundedReceiver<FleetEvent>,
    commands_rx: mpsc::UnboundedReceiver<SupervisorCommand>,
    snapshot_tx: watch::Sender<FleetSnapshot>,
    respawn_tx: mpsc::UnboundedSender<()>,
    respawn_rx: mpsc::UnboundedReceiver<()>,
}

impl SupervisorLoop {
    async fn run(mut self) {
        let mut commands_open = true;

        loop {
            if self.fleet.phase() == FleetPhase::Stopping && self.fleet.live_count() == 0 {
                self.fleet.mark_stopped();
                self.publish();
                tracing::info!("All workers stopped");
                break;
            }

            tokio::select! {
                Some(event) = self.events_rx.recv() => self.on_event(event),
                command = self.commands_rx.recv(), if commands_open => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        // Every handle is gone; nobody can stop the fleet later.
                        commands_open = false;
                        self.broadcast(ControlMessage::Shutdown);
                    }
                },
                Some(()) = self.respawn_rx.recv() => self.respawn(),
            }

            self.publish();
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.fleet.snapshot());
    }

    fn on_event(&mut self, FleetEvent { id, event }: FleetEvent) {
        match event {
            WorkerEvent::Online => {
                self.fleet.transition(id, WorkerState::Online);
            }
            WorkerEvent::Ready => {
                if self.fleet.transition(id, WorkerState::Ready) {
                    tracing::info!(worker = id, "Worker ready");
                    self.policy.on_ready();
                }
            }
            WorkerEvent::Exited(reason) => self.on_exit(id, reason),
        }
    }

    fn on_exit(&mut self, id: WorkerId, reason: ExitReason) {
        let record = self.fleet.remove(id);
        self.workers.remove(&id);
        metrics::record_worker_exit(reason.cause());
        metrics::set_workers_live(self.fleet.live_count());

        let pid = record.and_then(|r| r.pid);
        if self.fleet.phase() != FleetPhase::Running {
            tracing::info!(worker = id, pid = ?pid, reason = %reason, "Worker stopped");
            return;
        }

        match &reason {
            ExitReason::Signal(signal) => {
                tracing::warn!(worker = id, pid = ?pid, signal = %signal, "Worker killed by signal")
            }
            ExitReason::Code(code) => {
                tracing::warn!(worker = id, pid = ?pid, code = code, "Worker exited with an error code")
            }
            ExitReason::Graceful => {
                tracing::warn!(worker = id, pid = ?pid, "Worker exited gracefully")
            }
        }

        match self.policy.on_exit(&reason) {
            RestartDecision::Now => self.respawn(),
            RestartDecision::After(delay) => self.schedule_respawn(delay),
        }
    }

    fn schedule_respawn(&self, delay: Duration) {
        tracing::info!(delay_ms = delay.as_millis() as u64, "Scheduling replacement worker");
        let respawn = self.respawn_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = respawn.send(());
        });
    }

    fn respawn(&mut self) {
        if self.fleet.phase() != FleetPhase::Running {
            return;
        }

        let id = self.fleet.next_id();
        match self
            .launcher
            .launch(&self.env, WorkerEvents::new(id, self.events_tx.clone()))
        {
            Ok(handle) => {
                tracing::info!(worker = id, pid = ?handle.pid, "Forked replacement worker");
                self.fleet.insert(id, handle.pid);
                self.fleet.record_restart();
                self.workers.insert(id, handle);
                metrics::record_worker_restart();
                metrics::set_workers_live(self.fleet.live_count());
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to fork replacement worker");
                self.schedule_respawn(RELAUNCH_DELAY);
            }
        }
    }

    fn on_command(&mut self, command: SupervisorCommand) {
        match command {
            SupervisorCommand::Broadcast(message) => self.broadcast(message),
            SupervisorCommand::UpdateBundle(env) => {
                tracing::info!(dist_path = ?env.dist_path, "Bundle location updated");
                self.env = env;
                self.broadcast(ControlMessage::Reload);
            }
            SupervisorCommand::Kill(id) => match self.workers.get_mut(&id) {
                Some(handle) => {
                    tracing::info!(worker = id, "Killing worker");
                    handle.kill();
                }
                None => tracing::debug!(worker = id, "Kill requested for unknown worker"),
            },
        }
    }

    fn broadcast(&mut self, message: ControlMessage) {
        if message == ControlMessage::Shutdown {
            self.fleet.begin_stopping();
        }

        tracing::info!(event = message.event(), workers = self.workers.len(), "Broadcasting");
        for (id, handle) in &self.workers {
            if !handle.send(message.clone()) {
                tracing::debug!(worker = id, "Worker gone, message dropped");
            }
        }
    }
}

/// Cloneable handle to a running supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::UnboundedSender<SupervisorCommand>,
    snapshot: watch::Receiver<FleetSnapshot>,
}

impl SupervisorHandle {
    fn send(&self, command: SupervisorCommand) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Supervisor stopped, command dropped");
        }
    }

    /// Send a message to every live worker. Best effort, no acknowledgment.
    pub fn broadcast(&self, message: ControlMessage) {
        self.send(SupervisorCommand::Broadcast(message));
    }

    /// Broadcast `Shutdown`.
    pub fn stop(&self) {
        self.broadcast(ControlMessage::Shutdown);
    }

    /// Broadcast `Reload`.
    pub fn reload(&self) {
        self.broadcast(ControlMessage::Reload);
    }

    /// Broadcast `Error`.
    pub fn report_error(&self, detail: impl Into<String>) {
        self.broadcast(ControlMessage::error(detail));
    }

    /// Hand a new bundle location to future forks and reload live workers.
    pub fn update_bundle(&self, dist_path: Option<PathBuf>) {
        self.send(SupervisorCommand::UpdateBundle(WorkerEnv::new(dist_path)));
    }

    pub fn kill(&self, id: WorkerId) {
        self.send(SupervisorCommand::Kill(id));
    }

    pub fn snapshot(&self) -> FleetSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Wait until a published snapshot satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&FleetSnapshot) -> bool,
    ) -> Result<FleetSnapshot, SupervisorError> {
        let mut snapshot = self.snapshot.clone();
        let result = snapshot
            .wait_for(predicate)
            .await
            .map(|s| s.clone())
            .map_err(|_| SupervisorError::Closed);
        result
    }

    /// Wait until every worker has exited after a shutdown.
    pub async fn wait(&self) -> Result<(), SupervisorError> {
        self.wait_for(|s| s.phase == FleetPhase::Stopped).await.map(|_| ())
    }
}
