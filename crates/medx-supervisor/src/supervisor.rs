//! # Service Supervisor
//!
//! Keeps exactly one live backend (and optionally one license server).
//!
//! ## Per-Role State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  NotRunning ──start──► check port ──open──► Running{pid: None}          │
//! │                            │                (served externally)         │
//! │                          closed                                         │
//! │                            ▼                                            │
//! │                        Spawning ──launch ok──► Running{pid}             │
//! │                            │                      │                     │
//! │                      launch error               exit                    │
//! │                            ▼                      ▼                     │
//! │                  NotRunning + fatal       Exited{code}                  │
//! │                                                   │                     │
//! │                    update markers present? ──yes──► UpdateWatcher       │
//! │                                                   │ no                  │
//! │                                             wait 800 ms, check again    │
//! │                                                   │ still closed        │
//! │                                            RestartBudget                │
//! │                                   allowed ◄───────┴───────► exhausted   │
//! │                                  (respawn)                 CrashLooped  │
//! │                                                         (notify once)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency Model
//! One [`Supervisor`] task owns [`SupervisorState`]. Callers talk to it
//! through a cloneable [`SupervisorHandle`]; each child is watched by its
//! own task that reports back with a [`ChildEvent`]. Concurrent
//! `start_services` calls share one in-flight future.
//!
//! ## Restart Budget
//! The budget guards every spawn of a role that has exited: automatic
//! restarts, `start_services` from the UI, after a config save and after
//! an update. Only the first spawn of a session (or after
//! `stop_services`) is free.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use medx_core::restart::{BudgetDecision, RestartBudget};
use medx_core::{ProcessState, ServiceRole, ServiceStatus};

use crate::config::{ShellConfig, ShellPaths};
use crate::env_store::{ensure_env_file, is_env_configured, load_connection_config};
use crate::error::{SupervisorError, SupervisorResult};
use crate::events::{ShellEvent, ShellEvents};
use crate::launcher::{LaunchSpec, Launcher, ManagedChild};
use crate::ports::is_port_open;
use crate::updates::{ServiceRestarter, UpdateMarkers, UpdateWatcher};

/// Longest wait for a killed child to be reaped on stop.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// What a `start_services` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StartOutcome {
    /// Every enabled role is running or served externally.
    Started,
    /// `MEDX_DISABLE_SERVICES=1`; nothing was touched.
    Disabled,
    /// The env file is not usable; the setup wizard was requested.
    SetupRequired,
}

// =============================================================================
// Messages
// =============================================================================

enum Command {
    Start {
        reply: oneshot::Sender<SupervisorResult<StartOutcome>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<Vec<ServiceStatus>>,
    },
    WatchUpdates,
}

/// Report from a child watcher task or a restart timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEvent {
    /// The child of `generation` exited on its own.
    Exited {
        role: ServiceRole,
        generation: u64,
        code: Option<i32>,
    },
    /// The post-exit delay for `generation` elapsed.
    RestartDue { role: ServiceRole, generation: u64 },
}

// =============================================================================
// State
// =============================================================================

/// Managed process handle of one role.
struct RoleSlot {
    state: ProcessState,
    /// Bumped on every spawn; events of older children are ignored.
    generation: u64,
    /// False while an exit must not be treated as a crash.
    watched: bool,
    kill_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    spec: Option<LaunchSpec>,
    budget: RestartBudget,
}

impl RoleSlot {
    fn new(budget: RestartBudget) -> Self {
        RoleSlot {
            state: ProcessState::NotRunning,
            generation: 0,
            watched: false,
            kill_tx: None,
            task: None,
            spec: None,
            budget,
        }
    }

    /// True while a child we spawned has not been reaped.
    fn is_alive(&self) -> bool {
        self.kill_tx.is_some()
    }

    /// True once a child of this session has died.
    fn has_exited(&self) -> bool {
        matches!(
            self.state,
            ProcessState::Exited { .. } | ProcessState::CrashLooped
        )
    }
}

/// Everything the supervisor loop mutates.
pub struct SupervisorState {
    roles: HashMap<ServiceRole, RoleSlot>,
}

impl SupervisorState {
    fn new(config: &ShellConfig) -> Self {
        let roles = ServiceRole::ALL
            .into_iter()
            .map(|role| {
                let budget = RestartBudget::new(
                    config.services.restart_window(),
                    config.services.max_restarts,
                );
                (role, RoleSlot::new(budget))
            })
            .collect();
        SupervisorState { roles }
    }

    fn slot(&mut self, role: ServiceRole) -> &mut RoleSlot {
        self.roles
            .entry(role)
            .or_insert_with(|| RoleSlot::new(RestartBudget::default()))
    }
}

// =============================================================================
// Supervisor Handle
// =============================================================================

type StartFuture = Shared<BoxFuture<'static, SupervisorResult<StartOutcome>>>;

/// Cloneable handle to the supervisor task.
#[derive(Clone)]
pub struct SupervisorHandle {
    cmd_tx: mpsc::Sender<Command>,
    inflight: Arc<Mutex<Option<StartFuture>>>,
}

impl SupervisorHandle {
    /// Starts every enabled role that is not already up.
    ///
    /// Callers arriving while a start is in flight await the same result.
    pub async fn start_services(&self) -> SupervisorResult<StartOutcome> {
        let fut = {
            let mut slot = self.inflight.lock().await;
            match slot.as_ref() {
                Some(fut) => {
                    debug!("Joining in-flight service start");
                    fut.clone()
                }
                None => {
                    let cmd_tx = self.cmd_tx.clone();
                    let inflight = self.inflight.clone();
                    let fut = async move {
                        let result = request_start(cmd_tx).await;
                        inflight.lock().await.take();
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };
        fut.await
    }

    /// Kills every child and stops supervising them.
    pub async fn stop_services(&self) -> SupervisorResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { reply }).await?;
        rx.await.map_err(|_| SupervisorError::ShuttingDown)
    }

    /// Snapshot of every role.
    pub async fn status(&self) -> SupervisorResult<Vec<ServiceStatus>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { reply }).await?;
        rx.await.map_err(|_| SupervisorError::ShuttingDown)
    }

    /// Starts the update-marker watcher unless it is already running.
    pub async fn watch_updates(&self) -> SupervisorResult<()> {
        self.send(Command::WatchUpdates).await
    }

    /// A handle that does not keep the supervisor alive.
    pub fn downgrade(&self) -> WeakSupervisorHandle {
        WeakSupervisorHandle {
            cmd_tx: self.cmd_tx.downgrade(),
            inflight: self.inflight.clone(),
        }
    }

    async fn send(&self, cmd: Command) -> SupervisorResult<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SupervisorError::ShuttingDown)
    }
}

async fn request_start(cmd_tx: mpsc::Sender<Command>) -> SupervisorResult<StartOutcome> {
    let (reply, rx) = oneshot::channel();
    cmd_tx
        .send(Command::Start { reply })
        .await
        .map_err(|_| SupervisorError::ShuttingDown)?;
    rx.await.map_err(|_| SupervisorError::ShuttingDown)?
}

/// Weak counterpart of [`SupervisorHandle`], held by the update watcher.
#[derive(Clone)]
pub struct WeakSupervisorHandle {
    cmd_tx: mpsc::WeakSender<Command>,
    inflight: Arc<Mutex<Option<StartFuture>>>,
}

impl WeakSupervisorHandle {
    pub fn upgrade(&self) -> Option<SupervisorHandle> {
        self.cmd_tx.upgrade().map(|cmd_tx| SupervisorHandle {
            cmd_tx,
            inflight: self.inflight.clone(),
        })
    }
}

#[async_trait]
impl ServiceRestarter for WeakSupervisorHandle {
    async fn restart_services(&self) -> SupervisorResult<()> {
        let handle = self.upgrade().ok_or(SupervisorError::ShuttingDown)?;
        handle.start_services().await.map(|_| ())
    }
}

// =============================================================================
// Supervisor
// =============================================================================

/// The supervisor task.
pub struct Supervisor {
    config: Arc<ShellConfig>,
    paths: ShellPaths,
    launcher: Arc<dyn Launcher>,
    events: Arc<dyn ShellEvents>,
    state: SupervisorState,
    updates: UpdateWatcher,
    cmd_rx: mpsc::Receiver<Command>,
    child_tx: mpsc::Sender<ChildEvent>,
    child_rx: mpsc::Receiver<ChildEvent>,
}

impl Supervisor {
    /// Creates the supervisor and spawns its task.
    pub fn spawn(
        config: ShellConfig,
        launcher: Arc<dyn Launcher>,
        events: Arc<dyn ShellEvents>,
    ) -> SupervisorHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (child_tx, child_rx) = mpsc::channel(32);

        let handle = SupervisorHandle {
            cmd_tx,
            inflight: Arc::new(Mutex::new(None)),
        };

        let paths = config.resolve_paths();
        let updates = UpdateWatcher::new(
            paths.resources_dir.clone(),
            config.updates.clone(),
            Arc::new(handle.downgrade()),
            events.clone(),
        );

        let supervisor = Supervisor {
            state: SupervisorState::new(&config),
            config: Arc::new(config),
            paths,
            launcher,
            events,
            updates,
            cmd_rx,
            child_tx,
            child_rx,
        };

        tokio::spawn(supervisor.run());
        handle
    }

    /// Main supervisor loop.
    async fn run(mut self) {
        info!(resources = ?self.paths.resources_dir, "Supervisor starting");

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Start { reply }) => {
                        let result = self.handle_start().await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Stop { reply }) => {
                        self.handle_stop().await;
                        let _ = reply.send(());
                    }
                    Some(Command::Status { reply }) => {
                        let _ = reply.send(self.snapshot());
                    }
                    Some(Command::WatchUpdates) => {
                        self.updates.ensure_running();
                    }
                    None => {
                        debug!("All supervisor handles dropped");
                        self.handle_stop().await;
                        break;
                    }
                },
                Some(event) = self.child_rx.recv() => {
                    self.handle_child_event(event).await;
                }
            }
        }

        info!("Supervisor stopped");
    }

    // =========================================================================
    // Commands
    // =========================================================================

    async fn handle_start(&mut self) -> SupervisorResult<StartOutcome> {
        if self.config.services.disabled {
            info!("Services disabled, not starting");
            return Ok(StartOutcome::Disabled);
        }

        let paths = self.paths.clone();
        let (env_path, issue) = off_loop(move || {
            let env_path = ensure_env_file(&paths);
            let issue = load_connection_config(&env_path).issue();
            (env_path, issue)
        })
        .await?;
        if let Some(issue) = issue {
            warn!(?env_path, %issue, "Connection not configured, opening setup");
            self.events.emit(ShellEvent::SetupRequired {
                env_path,
                reason: Some(issue.to_string()),
            });
            return Ok(StartOutcome::SetupRequired);
        }

        for role in ServiceRole::ALL {
            if !self.config.services.is_enabled(role) {
                debug!(role = %role, "Role disabled");
                continue;
            }
            self.state.slot(role).watched = true;
            self.ensure_running(role).await;
        }

        Ok(StartOutcome::Started)
    }

    async fn handle_stop(&mut self) {
        let mut tasks = Vec::new();
        for role in ServiceRole::ALL {
            let slot = self.state.slot(role);
            slot.watched = false;
            if let Some(kill_tx) = slot.kill_tx.take() {
                info!(role = %role, "Stopping service");
                let _ = kill_tx.send(());
            }
            if let Some(task) = slot.task.take() {
                tasks.push((role, task));
            }
            slot.state = ProcessState::NotRunning;
            self.emit_status(role);
        }

        for (role, task) in tasks {
            if tokio::time::timeout(STOP_TIMEOUT, task).await.is_err() {
                warn!(role = %role, "Service did not stop in time");
            }
        }
    }

    fn snapshot(&mut self) -> Vec<ServiceStatus> {
        ServiceRole::ALL
            .into_iter()
            .map(|role| self.status_of(role))
            .collect()
    }

    fn status_of(&mut self, role: ServiceRole) -> ServiceStatus {
        let port = self.config.services.port(role);
        let slot = self.state.slot(role);
        ServiceStatus {
            role,
            state: slot.state,
            port,
            restarts_in_window: slot.budget.attempts_in_window(Instant::now()) as u32,
            watched: slot.watched,
            log_path: slot
                .spec
                .as_ref()
                .and_then(|s| s.log_path.as_ref())
                .map(|p| p.display().to_string()),
        }
    }

    // =========================================================================
    // Spawning
    // =========================================================================

    /// Spawns `role` unless its child is alive or its port already answers.
    async fn ensure_running(&mut self, role: ServiceRole) {
        if self.state.slot(role).is_alive() {
            debug!(role = %role, "Service already running");
            return;
        }

        let port = self.config.services.port(role);
        if is_port_open(port, self.config.services.connect_timeout()).await {
            info!(role = %role, port, "Port already answering, not spawning");
            self.set_state(role, ProcessState::Running { pid: None });
            return;
        }

        if !self.admit(role).await {
            return;
        }

        let paths = self.paths.clone();
        let settings = self.config.services.clone();
        let plan = off_loop(move || LaunchSpec::for_role(role, &paths, &settings))
            .await
            .and_then(|plan| plan);
        match plan {
            Ok(spec) => self.spawn_child(spec).await,
            Err(e) => {
                error!(role = %role, error = %e, "Cannot build launch plan");
                self.raise_fatal(role, &e);
                self.set_state(role, ProcessState::NotRunning);
            }
        }
    }

    /// Charges a respawn of an exited role to its restart budget.
    ///
    /// Returns false, and parks the role in `CrashLooped`, while the
    /// window is full. The crash-loop dialog is raised once per exceed
    /// event however many callers are refused.
    async fn admit(&mut self, role: ServiceRole) -> bool {
        let slot = self.state.slot(role);
        if !slot.has_exited() {
            return true;
        }

        match slot.budget.try_acquire(Instant::now()) {
            BudgetDecision::Allowed { attempts } => {
                info!(role = %role, attempts, "Restarting service");
                true
            }
            BudgetDecision::Exhausted { notify } => {
                error!(role = %role, "Service is crash-looping, restarts suspended");
                self.set_state(role, ProcessState::CrashLooped);
                if notify {
                    self.raise_crash_loop(role).await;
                }
                false
            }
        }
    }

    async fn spawn_child(&mut self, spec: LaunchSpec) {
        let role = spec.role;
        self.set_state(role, ProcessState::Spawning);

        match self.launcher.launch(&spec).await {
            Ok(child) => {
                let pid = child.id();
                let (kill_tx, kill_rx) = oneshot::channel();
                let slot = self.state.slot(role);
                slot.generation += 1;
                let generation = slot.generation;
                let task = tokio::spawn(watch_child(
                    role,
                    generation,
                    child,
                    kill_rx,
                    self.child_tx.clone(),
                ));
                slot.kill_tx = Some(kill_tx);
                slot.task = Some(task);
                slot.spec = Some(spec);
                debug!(role = %role, generation, ?pid, "Service spawned");
                self.set_state(role, ProcessState::Running { pid });
            }
            Err(e) => {
                error!(role = %role, error = %e, "Failed to spawn service");
                self.state.slot(role).spec = Some(spec);
                self.raise_fatal(role, &e);
                self.set_state(role, ProcessState::NotRunning);
            }
        }
    }

    // =========================================================================
    // Exit Handling
    // =========================================================================

    async fn handle_child_event(&mut self, event: ChildEvent) {
        match event {
            ChildEvent::Exited {
                role,
                generation,
                code,
            } => self.handle_exit(role, generation, code).await,
            ChildEvent::RestartDue { role, generation } => {
                self.handle_restart_due(role, generation).await
            }
        }
    }

    async fn handle_exit(&mut self, role: ServiceRole, generation: u64, code: Option<i32>) {
        let slot = self.state.slot(role);
        if slot.generation != generation {
            debug!(role = %role, generation, "Ignoring exit of a replaced child");
            return;
        }
        slot.kill_tx = None;
        slot.task = None;
        let watched = slot.watched;
        self.set_state(role, ProcessState::Exited { code });

        if !watched {
            debug!(role = %role, ?code, "Unwatched service exited");
            return;
        }
        warn!(role = %role, ?code, "Service exited");

        if UpdateMarkers::scan(&self.paths.resources_dir).await.any() {
            info!(role = %role, "Update markers present, deferring to update watcher");
            self.updates.ensure_running();
            return;
        }

        let child_tx = self.child_tx.clone();
        let delay = self.config.services.restart_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = child_tx
                .send(ChildEvent::RestartDue { role, generation })
                .await;
        });
    }

    async fn handle_restart_due(&mut self, role: ServiceRole, generation: u64) {
        let slot = self.state.slot(role);
        if slot.generation != generation || !slot.watched || slot.is_alive() {
            debug!(role = %role, generation, "Restart no longer needed");
            return;
        }

        let port = self.config.services.port(role);
        if is_port_open(port, self.config.services.connect_timeout()).await {
            info!(role = %role, port, "Port answering after exit, not restarting");
            self.set_state(role, ProcessState::Running { pid: None });
            return;
        }

        if !self.admit(role).await {
            return;
        }
        match self.state.slot(role).spec.clone() {
            Some(spec) => self.spawn_child(spec).await,
            None => self.ensure_running(role).await,
        }
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    fn set_state(&mut self, role: ServiceRole, state: ProcessState) {
        self.state.slot(role).state = state;
        self.emit_status(role);
    }

    fn emit_status(&mut self, role: ServiceRole) {
        let status = self.status_of(role);
        self.events.emit(ShellEvent::ServiceStatus(status));
    }

    fn raise_fatal(&self, role: ServiceRole, err: &SupervisorError) {
        let message = match err {
            SupervisorError::BackendMissing { path } => format!(
                "The backend executable was not found at {}. Reinstall the application.",
                path.display()
            ),
            other => other.to_string(),
        };
        self.events.emit(ShellEvent::FatalError {
            title: format!("Failed to start {}", role),
            message,
        });
    }

    async fn raise_crash_loop(&self, role: ServiceRole) {
        let env_path = self.paths.env_path();
        self.events.emit(ShellEvent::CrashLoop {
            role,
            log_dir: self.paths.logs_dir(),
            config_dir: config_dir_of(&env_path),
        });

        if role != ServiceRole::Backend {
            return;
        }
        let path = env_path.clone();
        let unconfigured = off_loop(move || {
            (!is_env_configured(&path)).then(|| {
                load_connection_config(&path)
                    .issue()
                    .map(|issue| issue.to_string())
            })
        })
        .await;
        match unconfigured {
            Ok(Some(reason)) => self.events.emit(ShellEvent::SetupRequired { env_path, reason }),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Could not check the env file"),
        }
    }
}

/// Runs file-system work on the blocking pool.
async fn off_loop<T, F>(work: F) -> SupervisorResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SupervisorError::ChannelError(e.to_string()))
}

fn config_dir_of(env_path: &std::path::Path) -> PathBuf {
    env_path
        .parent()
        .map(std::path::Path::to_path_buf)
        .unwrap_or_default()
}

/// Waits on one child; kills it when asked.
async fn watch_child(
    role: ServiceRole,
    generation: u64,
    mut child: Box<dyn ManagedChild>,
    kill_rx: oneshot::Receiver<()>,
    child_tx: mpsc::Sender<ChildEvent>,
) {
    let code = tokio::select! {
        result = child.wait() => match result {
            Ok(code) => code,
            Err(e) => {
                warn!(role = %role, error = %e, "Waiting on service failed");
                None
            }
        },
        _ = kill_rx => {
            if let Err(e) = child.kill().await {
                warn!(role = %role, error = %e, "Failed to kill service");
            }
            return;
        }
    };

    let _ = child_tx
        .send(ChildEvent::Exited {
            role,
            generation,
            code,
        })
        .await;
}

// =============================================================================
// Unit Tests
// =============================================================================
