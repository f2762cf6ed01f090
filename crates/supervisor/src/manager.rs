// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervisor task and its cloneable handle.
//!
//! The task exclusively owns every [`ManagedProcess`]. Tool calls arrive as
//! commands with oneshot replies; pane output, poll results, health flips,
//! and restart timers arrive as messages on the same loop. Snapshots of
//! observable state are published into a shared map so `list`/`get` reads
//! never touch the task.
//!
//! Dependency-ordered startup runs on the handle side: it subscribes to the
//! event bus, waits for each dependency's ready signal, and only then sends
//! the start command — the task itself never blocks on a dependency.

use crate::events::ProcessEvent;
use crate::order::{topo_order, OrderError};
use crate::ports;
use crate::probe::{spawn_probe, HealthEvent, ProbeTarget};
use crate::process::{ExitDisposition, ManagedProcess, OutputSignal};
use indexmap::IndexMap;
use parking_lot::Mutex;
use sc_core::{
    epoch_ms, EnvContext, EventLog, LogStream, ProcessState, ProcessStatus, ResolveError,
    ResolvedProcessConfig, SessionEvent, Settings, StartOptions,
};
use sc_manifest::{diff, Manifest, ReloadDiff};
use sc_panes::{PaneError, PaneHost, PaneOutput, PaneStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Fast poll cadence while any process is starting up.
const POLL_FAST: Duration = Duration::from_millis(500);
/// Slow poll cadence once everything settled.
const POLL_SLOW: Duration = Duration::from_secs(3);
/// Command channel depth.
const CMD_BUFFER: usize = 256;
/// Default `tail` for log reads.
const DEFAULT_TAIL: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("no such process: {0}")]
    NotFound(String),

    #[error("process already running: {0}")]
    AlreadyRunning(String),

    #[error("dependency {dependency} of {process} is not ready")]
    DependencyNotReady { process: String, dependency: String },

    #[error("dependency {dependency} of {process} did not become ready in time")]
    DependencyTimeout { process: String, dependency: String },

    #[error(transparent)]
    Unresolved(#[from] ResolveError),

    #[error("spawn failed for {process}: {message}")]
    Spawn { process: String, message: String },

    #[error("port {port} is still bound after reclaim attempt for {process}")]
    PortBusy { process: String, port: u16 },

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("supervisor is shut down")]
    Closed,
}

impl SupervisorError {
    fn from_pane(process: &str, e: PaneError) -> Self {
        SupervisorError::Spawn { process: process.to_string(), message: e.to_string() }
    }
}

enum Cmd {
    Start {
        name: String,
        opts: StartOptions,
        check_deps: bool,
        reply: oneshot::Sender<Result<ProcessState, SupervisorError>>,
    },
    Stop {
        name: String,
        reply: oneshot::Sender<Result<ProcessState, SupervisorError>>,
    },
    Restart {
        name: String,
        reply: oneshot::Sender<Result<ProcessState, SupervisorError>>,
    },
    RestartIfRunning {
        name: String,
        reply: oneshot::Sender<Result<bool, SupervisorError>>,
    },
    StopAll {
        reply: oneshot::Sender<()>,
    },
    GetLogs {
        name: String,
        stream: LogStream,
        tail: Option<usize>,
        reply: oneshot::Sender<Result<Vec<String>, SupervisorError>>,
    },
    Plan {
        reply: oneshot::Sender<Vec<PlanEntry>>,
    },
    ReloadApply {
        configs: IndexMap<String, ResolvedProcessConfig>,
        settings: Settings,
        reply: oneshot::Sender<(ReloadDiff, Vec<String>)>,
    },
    EmitReload {
        reload: ReloadDiff,
    },
    EnvFilesChanged {
        names: Vec<String>,
    },
    MarkDependencyFailed {
        name: String,
        dependency: String,
    },
    RestartDue {
        name: String,
        generation: u64,
    },
    PollResult(Vec<PaneStatus>),
}

/// Dependency info the handle needs to orchestrate `start_all`.
#[derive(Debug, Clone)]
struct PlanEntry {
    name: String,
    depends_on: Vec<String>,
    auto_start: bool,
}

/// Cloneable handle to one session's supervisor.
#[derive(Clone)]
pub struct Supervisor {
    cmd_tx: mpsc::Sender<Cmd>,
    states: Arc<Mutex<IndexMap<String, ProcessState>>>,
    events_tx: broadcast::Sender<ProcessEvent>,
    settings: Arc<Mutex<Settings>>,
}

impl Supervisor {
    /// Spawn the supervisor task for `configs` on `host`.
    pub fn spawn(
        host: Arc<dyn PaneHost>,
        configs: IndexMap<String, ResolvedProcessConfig>,
        settings: Settings,
        event_log: EventLog,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_BUFFER);
        let (output_tx, output_rx) = mpsc::channel(CMD_BUFFER);
        let (health_tx, health_rx) = mpsc::channel(CMD_BUFFER);
        let (poll_fast_tx, poll_fast_rx) = watch::channel(true);
        let (events_tx, _) = broadcast::channel(256);
        let states = Arc::new(Mutex::new(IndexMap::new()));
        let shared_settings = Arc::new(Mutex::new(settings.clone()));

        let mut task = SupervisorTask {
            host: Arc::clone(&host),
            procs: IndexMap::new(),
            aux: HashMap::new(),
            ctx: EnvContext::from_system(),
            settings,
            states: Arc::clone(&states),
            shared_settings: Arc::clone(&shared_settings),
            events_tx: events_tx.clone(),
            event_log,
            cmd_tx: cmd_tx.clone(),
            output_tx,
            health_tx,
            poll_fast: poll_fast_tx,
        };
        task.register_all(configs);

        tokio::spawn(task.run(cmd_rx, output_rx, health_rx));
        spawn_poll_loop(host, cmd_tx.clone(), poll_fast_rx);

        Self { cmd_tx, states, events_tx, settings: shared_settings }
    }

    /// Subscribe to observable process transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.events_tx.subscribe()
    }

    pub fn settings(&self) -> Settings {
        self.settings.lock().clone()
    }

    /// Non-blocking snapshot of every process, in registration order.
    pub fn list_processes(&self) -> Vec<ProcessState> {
        self.states.lock().values().cloned().collect()
    }

    /// Non-blocking snapshot of one process.
    pub fn get_process(&self, name: &str) -> Option<ProcessState> {
        self.states.lock().get(name).cloned()
    }

    pub fn get_status(&self, name: &str) -> Result<ProcessState, SupervisorError> {
        self.get_process(name).ok_or_else(|| SupervisorError::NotFound(name.to_string()))
    }

    pub fn get_url(&self, name: &str) -> Result<Option<String>, SupervisorError> {
        Ok(self.get_status(name)?.url)
    }

    pub async fn get_logs(
        &self,
        name: &str,
        stream: LogStream,
        tail: Option<usize>,
    ) -> Result<Vec<String>, SupervisorError> {
        self.call(|reply| Cmd::GetLogs { name: name.to_string(), stream, tail, reply }).await?
    }

    pub async fn start_process(
        &self,
        name: &str,
        opts: StartOptions,
    ) -> Result<ProcessState, SupervisorError> {
        self.call(|reply| Cmd::Start { name: name.to_string(), opts, check_deps: true, reply })
            .await?
    }

    pub async fn stop_process(&self, name: &str) -> Result<ProcessState, SupervisorError> {
        self.call(|reply| Cmd::Stop { name: name.to_string(), reply }).await?
    }

    pub async fn restart_process(&self, name: &str) -> Result<ProcessState, SupervisorError> {
        self.call(|reply| Cmd::Restart { name: name.to_string(), reply }).await?
    }

    /// Restart `name` iff it is currently active; returns whether it was.
    pub async fn restart_if_running(&self, name: &str) -> Result<bool, SupervisorError> {
        self.call(|reply| Cmd::RestartIfRunning { name: name.to_string(), reply }).await?
    }

    pub async fn stop_all(&self) -> Result<(), SupervisorError> {
        self.call(|reply| Cmd::StopAll { reply }).await
    }

    /// Restart every named process that is currently running (env-file
    /// change notification).
    pub async fn env_files_changed(&self, names: Vec<String>) -> Result<(), SupervisorError> {
        self.cmd_tx
            .send(Cmd::EnvFilesChanged { names })
            .await
            .map_err(|_| SupervisorError::Closed)
    }

    /// Wait until `name` is ready (or completed), bounded by `timeout`.
    pub async fn wait_ready(&self, name: &str, timeout: Duration) -> Result<(), SupervisorError> {
        let mut rx = self.subscribe();
        let ready_now = |state: &ProcessState| {
            matches!(state.status, ProcessStatus::Ready | ProcessStatus::Completed)
        };
        match self.get_process(name) {
            None => return Err(SupervisorError::NotFound(name.to_string())),
            Some(state) if ready_now(&state) => return Ok(()),
            Some(_) => {}
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let event = tokio::select! {
                event = rx.recv() => event,
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(SupervisorError::DependencyTimeout {
                        process: String::new(),
                        dependency: name.to_string(),
                    });
                }
            };
            match event {
                Ok(ProcessEvent::Ready { name: n }) if n == name => return Ok(()),
                Ok(ProcessEvent::Failed { name: n, error }) if n == name => {
                    return Err(SupervisorError::Spawn { process: n, message: error })
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    // Missed events; fall back to the snapshot.
                    if self.get_process(name).as_ref().is_some_and(ready_now) {
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return Err(SupervisorError::Closed),
            }
        }
    }

    /// Start every `auto_start` process in dependency order, awaiting each
    /// dependency's ready signal before starting dependents.
    ///
    /// Keeps going after per-process failures so independent branches still
    /// come up; the first error is returned at the end.
    pub async fn start_all(&self) -> Result<(), SupervisorError> {
        let plan = self.call(|reply| Cmd::Plan { reply }).await?;
        let timeout = self.settings().dependency_timeout();
        let by_name: HashMap<String, PlanEntry> =
            plan.iter().map(|e| (e.name.clone(), e.clone())).collect();

        let mut first_error: Option<SupervisorError> = None;
        'processes: for entry in &plan {
            if !entry.auto_start {
                continue;
            }
            for dep in &entry.depends_on {
                // A manual-start dependency that is not ready is a hard
                // configuration surface: refuse instead of waiting forever.
                let dep_auto = by_name.get(dep).map(|d| d.auto_start).unwrap_or(false);
                let dep_ready = self.get_process(dep).map(|s| {
                    matches!(s.status, ProcessStatus::Ready | ProcessStatus::Completed)
                });
                if !dep_auto && dep_ready == Some(false) {
                    let err = SupervisorError::DependencyNotReady {
                        process: entry.name.clone(),
                        dependency: dep.clone(),
                    };
                    self.mark_dependency_failed(&entry.name, dep).await;
                    first_error.get_or_insert(err);
                    continue 'processes;
                }
                if let Err(e) = self.wait_ready(dep, timeout).await {
                    tracing::warn!(
                        process = %entry.name,
                        dependency = %dep,
                        error = %e,
                        "dependency wait failed"
                    );
                    self.mark_dependency_failed(&entry.name, dep).await;
                    first_error.get_or_insert(SupervisorError::DependencyTimeout {
                        process: entry.name.clone(),
                        dependency: dep.clone(),
                    });
                    continue 'processes;
                }
            }
            let result = self
                .call(|reply| Cmd::Start {
                    name: entry.name.clone(),
                    opts: StartOptions::default(),
                    check_deps: true,
                    reply,
                })
                .await?;
            if let Err(e) = result {
                tracing::error!(process = %entry.name, error = %e, "start failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Apply a new manifest: diff, stop/re-register, start, emit the
    /// `reload` event. An empty diff changes nothing and emits nothing.
    pub async fn reload(&self, manifest: &Manifest) -> Result<ReloadDiff, SupervisorError> {
        let configs = manifest.resolved();
        let settings = manifest.settings.clone();
        let (reload, to_start) =
            self.call(|reply| Cmd::ReloadApply { configs, settings, reply }).await?;
        if reload.is_empty() {
            return Ok(reload);
        }

        let timeout = self.settings().dependency_timeout();
        for name in &to_start {
            let plan = self.call(|reply| Cmd::Plan { reply }).await?;
            let deps = plan
                .iter()
                .find(|e| &e.name == name)
                .map(|e| e.depends_on.clone())
                .unwrap_or_default();
            for dep in deps {
                if let Err(e) = self.wait_ready(&dep, timeout).await {
                    tracing::warn!(process = %name, dependency = %dep, error = %e, "reload start blocked");
                    self.mark_dependency_failed(name, &dep).await;
                }
            }
            let _ = self
                .call(|reply| Cmd::Start {
                    name: name.clone(),
                    opts: StartOptions::default(),
                    check_deps: true,
                    reply,
                })
                .await?;
        }

        self.cmd_tx
            .send(Cmd::EmitReload { reload: reload.clone() })
            .await
            .map_err(|_| SupervisorError::Closed)?;
        Ok(reload)
    }

    async fn mark_dependency_failed(&self, name: &str, dependency: &str) {
        let _ = self
            .cmd_tx
            .send(Cmd::MarkDependencyFailed {
                name: name.to_string(),
                dependency: dependency.to_string(),
            })
            .await;
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Cmd,
    ) -> Result<T, SupervisorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx.send(make(reply_tx)).await.map_err(|_| SupervisorError::Closed)?;
        reply_rx.await.map_err(|_| SupervisorError::Closed)
    }
}

/// Background poll loop reconciling pane status with the supervisor.
fn spawn_poll_loop(
    host: Arc<dyn PaneHost>,
    cmd_tx: mpsc::Sender<Cmd>,
    fast: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        loop {
            let cadence = if *fast.borrow() { POLL_FAST } else { POLL_SLOW };
            tokio::time::sleep(cadence).await;
            match host.poll().await {
                Ok(statuses) => {
                    if cmd_tx.send(Cmd::PollResult(statuses)).await.is_err() {
                        return;
                    }
                }
                Err(e) => tracing::debug!(error = %e, "pane poll failed"),
            }
        }
    });
}

/// Per-process background task handles, owned by the supervisor task.
#[derive(Default)]
struct ProcAux {
    probe: Option<JoinHandle<()>>,
    restart_timer: Option<JoinHandle<()>>,
    stop_kill: Option<JoinHandle<()>>,
}

impl ProcAux {
    fn cancel_restart(&mut self) {
        if let Some(timer) = self.restart_timer.take() {
            timer.abort();
        }
    }

    fn cancel_all(&mut self) {
        self.cancel_restart();
        if let Some(probe) = self.probe.take() {
            probe.abort();
        }
        if let Some(kill) = self.stop_kill.take() {
            kill.abort();
        }
    }
}

struct SupervisorTask {
    host: Arc<dyn PaneHost>,
    procs: IndexMap<String, ManagedProcess>,
    aux: HashMap<String, ProcAux>,
    ctx: EnvContext,
    settings: Settings,
    states: Arc<Mutex<IndexMap<String, ProcessState>>>,
    shared_settings: Arc<Mutex<Settings>>,
    events_tx: broadcast::Sender<ProcessEvent>,
    event_log: EventLog,
    cmd_tx: mpsc::Sender<Cmd>,
    output_tx: mpsc::Sender<PaneOutput>,
    health_tx: mpsc::Sender<HealthEvent>,
    poll_fast: watch::Sender<bool>,
}

impl SupervisorTask {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Cmd>,
        mut output_rx: mpsc::Receiver<PaneOutput>,
        mut health_rx: mpsc::Receiver<HealthEvent>,
    ) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_cmd(cmd).await,
                    None => break,
                },
                Some(output) = output_rx.recv() => self.handle_output(output),
                Some(event) = health_rx.recv() => self.handle_health(event),
            }
        }
        tracing::debug!("supervisor task exiting");
        for (_, mut aux) in self.aux.drain() {
            aux.cancel_all();
        }
    }

    async fn handle_cmd(&mut self, cmd: Cmd) {
        match cmd {
            Cmd::Start { name, opts, check_deps, reply } => {
                let result = self.start(&name, opts, check_deps, false).await;
                let _ = reply.send(result);
            }
            Cmd::Stop { name, reply } => {
                let _ = reply.send(self.stop(&name).await);
            }
            Cmd::Restart { name, reply } => {
                let result = match self.stop(&name).await {
                    Ok(_) => self.start(&name, StartOptions::default(), true, false).await,
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Cmd::RestartIfRunning { name, reply } => {
                let result = match self.procs.get(&name) {
                    None => Err(SupervisorError::NotFound(name.clone())),
                    Some(proc) if !proc.state.status.is_active() => Ok(false),
                    Some(_) => match self.stop(&name).await {
                        Ok(_) => self
                            .start(&name, StartOptions::default(), true, false)
                            .await
                            .map(|_| true),
                        Err(e) => Err(e),
                    },
                };
                let _ = reply.send(result);
            }
            Cmd::StopAll { reply } => {
                let names: Vec<String> = self.procs.keys().cloned().collect();
                for name in names {
                    let _ = self.stop(&name).await;
                }
                let _ = reply.send(());
            }
            Cmd::GetLogs { name, stream, tail, reply } => {
                let result = match self.procs.get(&name) {
                    None => Err(SupervisorError::NotFound(name)),
                    Some(proc) => {
                        Ok(proc.logs.tail(stream, tail.unwrap_or(DEFAULT_TAIL)))
                    }
                };
                let _ = reply.send(result);
            }
            Cmd::Plan { reply } => {
                let plan = self.plan();
                let _ = reply.send(plan);
            }
            Cmd::ReloadApply { configs, settings, reply } => {
                let result = self.apply_reload(configs, settings).await;
                let _ = reply.send(result);
            }
            Cmd::EmitReload { reload } => {
                let event = SessionEvent::Reload {
                    ts: epoch_ms(),
                    added: reload.added.clone(),
                    removed: reload.removed.clone(),
                    changed: reload.changed.clone(),
                };
                if let Err(e) = self.event_log.append(&event) {
                    tracing::warn!(error = %e, "failed to append reload event");
                }
                self.emit(ProcessEvent::Reloaded { diff: reload });
            }
            Cmd::EnvFilesChanged { names } => {
                for name in names {
                    let restarted = match self.procs.get(&name) {
                        Some(proc) if proc.state.status.is_active() => {
                            match self.stop(&name).await {
                                Ok(_) => self
                                    .start(&name, StartOptions::default(), true, false)
                                    .await
                                    .is_ok(),
                                Err(_) => false,
                            }
                        }
                        _ => false,
                    };
                    tracing::info!(process = %name, restarted, "env file change handled");
                }
            }
            Cmd::MarkDependencyFailed { name, dependency } => {
                if let Some(proc) = self.procs.get_mut(&name) {
                    let error = format!("dependency {dependency} not ready");
                    proc.note_crashed(None, Some(error.clone()));
                    proc.note_restart_attempt(epoch_ms());
                    self.emit(ProcessEvent::Failed { name: name.clone(), error });
                    self.publish();
                }
            }
            Cmd::RestartDue { name, generation } => {
                self.handle_restart_due(&name, generation).await;
            }
            Cmd::PollResult(statuses) => self.handle_poll(statuses).await,
        }
    }

    fn plan(&self) -> Vec<PlanEntry> {
        let configs: IndexMap<String, ResolvedProcessConfig> =
            self.procs.iter().map(|(n, p)| (n.clone(), p.config.clone())).collect();
        let order = match topo_order(&configs) {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(error = %e, "config graph invalid; using declaration order");
                configs.keys().cloned().collect()
            }
        };
        order
            .into_iter()
            .filter_map(|name| {
                self.procs.get(&name).map(|p| PlanEntry {
                    name: name.clone(),
                    depends_on: p.config.depends_on.clone(),
                    auto_start: p.config.auto_start,
                })
            })
            .collect()
    }

    fn register_all(&mut self, configs: IndexMap<String, ResolvedProcessConfig>) {
        for (name, config) in configs {
            self.register(name, config);
        }
        self.publish();
    }

    fn register(&mut self, name: String, config: ResolvedProcessConfig) {
        if let Some(port) = config.port {
            self.ctx.set_port(&name, port);
        }
        let mut proc = ManagedProcess::new(config, self.settings.log_buffer_size);
        if let Some(port) = proc.state.port {
            proc.set_port(port);
            self.ctx.set_exports(&name, proc.state.exports.clone());
        }
        proc.set_env_context(self.ctx.clone());
        self.procs.insert(name, proc);
    }

    /// Start (or respawn after a crash) one process.
    async fn start(
        &mut self,
        name: &str,
        opts: StartOptions,
        check_deps: bool,
        is_restart: bool,
    ) -> Result<ProcessState, SupervisorError> {
        let proc = self
            .procs
            .get(name)
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;
        if proc.state.status.is_active() {
            return Err(SupervisorError::AlreadyRunning(name.to_string()));
        }

        if check_deps {
            for dep in proc.config.depends_on.clone() {
                let ready = self.procs.get(&dep).map(|d| {
                    matches!(d.state.status, ProcessStatus::Ready | ProcessStatus::Completed)
                });
                if ready != Some(true) {
                    return Err(SupervisorError::DependencyNotReady {
                        process: name.to_string(),
                        dependency: dep,
                    });
                }
            }
        }

        let force = opts.force || self.procs[name].config.force;
        if force {
            if let Some(port) = self.procs[name].config.port {
                if !ports::free_port(port).await {
                    let err = SupervisorError::PortBusy { process: name.to_string(), port };
                    if let Some(proc) = self.procs.get_mut(name) {
                        proc.state.error = Some(err.to_string());
                    }
                    self.publish();
                    return Err(err);
                }
            }
        }

        self.aux.entry(name.to_string()).or_default().cancel_all();

        // Resolve command and env against the live context.
        let plan = {
            let proc = self
                .procs
                .get_mut(name)
                .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;
            proc.set_env_context(self.ctx.clone());
            match proc.build_spawn(&opts) {
                Ok(plan) => plan,
                Err(e) => {
                    // Unresolved reference: stay pending, surface the error.
                    proc.state.status = ProcessStatus::Pending;
                    proc.state.error = Some(e.to_string());
                    self.publish();
                    return Err(e.into());
                }
            }
        };

        {
            let proc = self
                .procs
                .get_mut(name)
                .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;
            proc.state.status = ProcessStatus::Starting;
            proc.state.error = None;
            proc.restart_generation += 1;
        }
        self.publish();
        self.emit(ProcessEvent::Starting { name: name.to_string() });
        let _ = self.poll_fast.send(true);

        let existing_pane = self.procs[name].pane.clone();
        let spawned = match existing_pane {
            Some(pane) if is_restart => {
                self.host
                    .respawn_pane(&pane, &plan.command, &plan.cwd, &plan.env, self.output_tx.clone())
                    .await
            }
            _ => {
                self.host
                    .create_pane(name, &plan.command, &plan.cwd, &plan.env, self.output_tx.clone())
                    .await
            }
        };

        let pane = match spawned {
            Ok(pane) => pane,
            Err(e) => {
                tracing::error!(process = %name, error = %e, "spawn failed");
                // Restart policy applies as if the child exited non-zero.
                self.handle_exit(name, None, Some(e.to_string())).await;
                return Err(SupervisorError::from_pane(name, e));
            }
        };

        if let Some(proc) = self.procs.get_mut(name) {
            proc.note_spawned(pane.id.clone(), pane.pid);
        }
        tracing::info!(process = %name, pane = %pane.id, pid = ?pane.pid, "process started");

        // Fixed ports are known immediately; announce and probe.
        if let Some(port) = self.procs[name].state.port {
            self.ctx.set_port(name, port);
            self.ctx
                .set_exports(name, self.procs[name].state.exports.clone());
            self.reinject_ctx();
            self.emit(ProcessEvent::PortDetected { name: name.to_string(), port });
        }
        self.ensure_probe(name);
        self.try_ready(name);
        self.publish();

        Ok(self.procs[name].state.clone())
    }

    /// Graceful stop: interrupt now, kill the pane after the grace window.
    async fn stop(&mut self, name: &str) -> Result<ProcessState, SupervisorError> {
        let proc = self
            .procs
            .get_mut(name)
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;

        let pane = proc.pane.clone();
        let was_active = proc.state.status.is_active();
        proc.note_stopped();

        if let Some(aux) = self.aux.get_mut(name) {
            aux.cancel_all();
        }

        if let (Some(pane), true) = (pane, was_active) {
            let _ = self.host.send_interrupt(&pane).await;
            let host = Arc::clone(&self.host);
            let grace = self.settings.process_stop_timeout();
            let kill = tokio::spawn(async move {
                let deadline = tokio::time::Instant::now() + grace;
                loop {
                    tokio::time::sleep(Duration::from_millis(250)).await;
                    let done = match host.poll().await {
                        Ok(statuses) => statuses
                            .iter()
                            .find(|s| s.id == pane)
                            .map(|s| s.dead || s.gone)
                            .unwrap_or(true),
                        Err(_) => false,
                    };
                    if done || tokio::time::Instant::now() >= deadline {
                        let _ = host.kill_pane(&pane).await;
                        return;
                    }
                }
            });
            self.aux.entry(name.to_string()).or_default().stop_kill = Some(kill);
        }

        self.emit(ProcessEvent::Stopped { name: name.to_string() });
        self.publish();
        self.update_poll_cadence();
        Ok(self.procs[name].state.clone())
    }

    /// Child exit (or spawn failure) disposition and follow-up.
    async fn handle_exit(&mut self, name: &str, exit_code: Option<i32>, error: Option<String>) {
        let Some(proc) = self.procs.get_mut(name) else { return };
        let disposition = proc.exit_disposition(exit_code, &self.settings, Instant::now());
        self.emit(ProcessEvent::Exited { name: name.to_string(), exit_code });

        if let Some(aux) = self.aux.get_mut(name) {
            if let Some(probe) = aux.probe.take() {
                probe.abort();
            }
        }

        match disposition {
            ExitDisposition::Completed => {
                if let Some(proc) = self.procs.get_mut(name) {
                    proc.note_completed(exit_code);
                }
                tracing::info!(process = %name, "completed");
                // A completed one-shot satisfies its dependents.
                self.emit(ProcessEvent::Ready { name: name.to_string() });
            }
            ExitDisposition::CrashNoRestart => {
                if let Some(proc) = self.procs.get_mut(name) {
                    proc.note_crashed(exit_code, error.clone());
                }
                let message =
                    error.unwrap_or_else(|| format!("exited with code {exit_code:?}"));
                self.emit(ProcessEvent::Failed { name: name.to_string(), error: message });
            }
            ExitDisposition::CrashGiveUp => {
                if let Some(proc) = self.procs.get_mut(name) {
                    proc.note_crashed(exit_code, Some("max restarts exceeded".to_string()));
                }
                tracing::warn!(process = %name, "giving up after max restarts");
                self.emit(ProcessEvent::Failed {
                    name: name.to_string(),
                    error: "max restarts exceeded".to_string(),
                });
            }
            ExitDisposition::CrashRestart { backoff } => {
                let generation = {
                    let proc = match self.procs.get_mut(name) {
                        Some(p) => p,
                        None => return,
                    };
                    proc.note_crashed(exit_code, error);
                    proc.restart_generation
                };
                tracing::info!(process = %name, backoff_ms = backoff.as_millis() as u64, "scheduling restart");
                let cmd_tx = self.cmd_tx.clone();
                let restart_name = name.to_string();
                let timer = tokio::spawn(async move {
                    tokio::time::sleep(backoff).await;
                    let _ = cmd_tx
                        .send(Cmd::RestartDue { name: restart_name, generation })
                        .await;
                });
                let aux = self.aux.entry(name.to_string()).or_default();
                aux.cancel_restart();
                aux.restart_timer = Some(timer);
            }
        }
        self.publish();
        self.update_poll_cadence();
    }

    async fn handle_restart_due(&mut self, name: &str, generation: u64) {
        let due = self.procs.get(name).is_some_and(|proc| {
            proc.state.status == ProcessStatus::Crashed
                && proc.restart_generation == generation
        });
        if !due {
            tracing::debug!(process = %name, "stale restart timer ignored");
            return;
        }
        if let Some(proc) = self.procs.get_mut(name) {
            proc.note_restart_attempt(epoch_ms());
        }
        if let Some(aux) = self.aux.get_mut(name) {
            aux.cancel_restart();
        }
        // Restarts bypass the dependency gate: the graph was satisfied when
        // the process first started.
        if let Err(e) = self.start(name, StartOptions::default(), false, true).await {
            tracing::error!(process = %name, error = %e, "scheduled restart failed");
        }
    }

    fn handle_output(&mut self, output: PaneOutput) {
        let Some((name, signals)) = self.procs.iter_mut().find_map(|(n, p)| {
            (p.pane.as_ref() == Some(&output.pane))
                .then(|| (n.clone(), p.apply_chunk(output.stream, &output.chunk)))
        }) else {
            return;
        };

        for signal in signals {
            match signal {
                OutputSignal::PortDetected(port) => {
                    tracing::info!(process = %name, port, "port detected");
                    self.ctx.set_port(&name, port);
                    self.ctx.set_exports(&name, self.procs[&name].state.exports.clone());
                    self.reinject_ctx();
                    self.ensure_probe(&name);
                    self.emit(ProcessEvent::PortDetected { name: name.clone(), port });
                }
                OutputSignal::ExportsChanged => {
                    self.ctx.set_exports(&name, self.procs[&name].state.exports.clone());
                    self.reinject_ctx();
                    self.emit(ProcessEvent::ExportsChanged { name: name.clone() });
                }
            }
        }
        self.try_ready(&name);
        self.publish();
    }

    fn handle_health(&mut self, event: HealthEvent) {
        let Some(proc) = self.procs.get_mut(&event.name) else { return };
        if !proc.state.status.is_active() {
            return;
        }
        proc.state.healthy = Some(event.healthy);
        if !event.healthy && proc.state.status == ProcessStatus::Ready {
            // ready implies healthy != false; degrade until the probe
            // recovers.
            proc.state.status = ProcessStatus::Running;
        }
        self.emit(ProcessEvent::HealthChanged {
            name: event.name.clone(),
            healthy: event.healthy,
        });
        self.try_ready(&event.name);
        self.publish();
    }

    async fn handle_poll(&mut self, statuses: Vec<PaneStatus>) {
        let mut exits: Vec<(String, Option<i32>, bool)> = Vec::new();
        for status in statuses {
            let Some((name, proc)) =
                self.procs.iter().find(|(_, p)| p.pane.as_ref() == Some(&status.id))
            else {
                continue;
            };
            if !proc.state.status.is_active() {
                continue;
            }
            if status.gone {
                exits.push((name.clone(), status.exit_code, true));
            } else if status.dead {
                exits.push((name.clone(), status.exit_code, false));
            }
        }
        for (name, exit_code, gone) in exits {
            if gone {
                tracing::warn!(process = %name, "pane disappeared externally");
                if let Some(proc) = self.procs.get_mut(&name) {
                    proc.pane = None;
                }
            }
            self.handle_exit(&name, exit_code, None).await;
        }
        self.update_poll_cadence();
    }

    fn try_ready(&mut self, name: &str) {
        let became_ready = self
            .procs
            .get_mut(name)
            .map(|p| p.try_ready(Instant::now()))
            .unwrap_or(false);
        if became_ready {
            tracing::info!(process = %name, "ready");
            self.emit(ProcessEvent::Ready { name: name.to_string() });
            self.update_poll_cadence();
        }
    }

    fn ensure_probe(&mut self, name: &str) {
        let Some(proc) = self.procs.get(name) else { return };
        let Some(health_check) = proc.config.health_check.clone() else { return };
        if self.aux.get(name).and_then(|a| a.probe.as_ref()).is_some() {
            return;
        }
        let Some(target) = ProbeTarget::from_config(&health_check, proc.state.port) else {
            // Path-style check with no port yet; retried on detection.
            return;
        };
        let handle = spawn_probe(
            name.to_string(),
            target,
            self.settings.health_check_interval(),
            self.health_tx.clone(),
        );
        self.aux.entry(name.to_string()).or_default().probe = Some(handle);
    }

    async fn apply_reload(
        &mut self,
        configs: IndexMap<String, ResolvedProcessConfig>,
        settings: Settings,
    ) -> (ReloadDiff, Vec<String>) {
        let old: IndexMap<String, ResolvedProcessConfig> =
            self.procs.iter().map(|(n, p)| (n.clone(), p.config.clone())).collect();
        let reload = diff(&old, &configs);

        self.settings = settings.clone();
        *self.shared_settings.lock() = settings;

        if reload.is_empty() {
            return (reload, Vec::new());
        }
        tracing::info!(
            added = ?reload.added,
            removed = ?reload.removed,
            changed = ?reload.changed,
            "applying manifest reload"
        );

        for name in reload.removed.iter().chain(reload.changed.iter()) {
            let _ = self.stop(name).await;
        }
        for name in &reload.removed {
            self.procs.shift_remove(name);
            self.aux.remove(name);
            self.ctx.remove_process(name);
            self.states.lock().shift_remove(name);
        }

        // Rebuild in new declaration order, keeping unchanged records (and
        // with them their exports, ports, and logs).
        let mut rebuilt: IndexMap<String, ManagedProcess> = IndexMap::new();
        for (name, config) in configs {
            let unchanged = !reload.added.contains(&name) && !reload.changed.contains(&name);
            match self.procs.shift_remove(&name) {
                Some(existing) if unchanged => {
                    rebuilt.insert(name, existing);
                }
                _ => {
                    self.ctx.remove_process(&name);
                    if let Some(port) = config.port {
                        self.ctx.set_port(&name, port);
                    }
                    let mut proc = ManagedProcess::new(config, self.settings.log_buffer_size);
                    if let Some(port) = proc.state.port {
                        proc.set_port(port);
                        self.ctx.set_exports(&name, proc.state.exports.clone());
                    }
                    rebuilt.insert(name, proc);
                }
            }
        }
        self.procs = rebuilt;
        self.reinject_ctx();
        self.publish();

        let to_start: Vec<String> = self
            .plan()
            .into_iter()
            .filter(|e| {
                e.auto_start
                    && (reload.added.contains(&e.name) || reload.changed.contains(&e.name))
            })
            .map(|e| e.name)
            .collect();
        (reload, to_start)
    }

    fn reinject_ctx(&mut self) {
        for proc in self.procs.values_mut() {
            proc.set_env_context(self.ctx.clone());
        }
    }

    fn emit(&self, event: ProcessEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Publish the canonical state map for non-blocking readers.
    fn publish(&self) {
        let snapshot: IndexMap<String, ProcessState> =
            self.procs.iter().map(|(n, p)| (n.clone(), p.state.clone())).collect();
        *self.states.lock() = snapshot;
    }

    fn update_poll_cadence(&self) {
        let busy = self.procs.values().any(|p| {
            matches!(p.state.status, ProcessStatus::Starting | ProcessStatus::Running)
        });
        let _ = self.poll_fast.send(busy);
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
