// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted pane host for tests.
//!
//! Panes are in-memory records. Tests inject output lines, script exits and
//! spawn failures, and inspect every call the supervisor made. Used across
//! the supervisor and broker test suites and the workspace scenario tests.

use crate::{FloatingOpts, Pane, PaneError, PaneHost, PaneId, PaneOutput, PaneStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use sc_core::LogStream;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One spawn observed by the fake.
#[derive(Debug, Clone)]
pub struct SpawnRecord {
    pub name: String,
    pub command: String,
    pub cwd: std::path::PathBuf,
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct FakePane {
    name: String,
    dead: bool,
    exit_code: Option<i32>,
    gone: bool,
    screen: String,
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    next_pid: u32,
    panes: HashMap<PaneId, FakePane>,
    senders: HashMap<PaneId, mpsc::Sender<PaneOutput>>,
    floats: HashMap<String, PaneId>,
    spawns: Vec<SpawnRecord>,
    floating_spawns: Vec<SpawnRecord>,
    interrupts: Vec<PaneId>,
    kills: Vec<PaneId>,
    closed_floats: Vec<String>,
    fail_next_spawn: Option<String>,
    exit_on_interrupt: bool,
    supports_geometry: bool,
}

/// In-memory pane host with scripted behavior.
#[derive(Clone)]
pub struct FakePaneHost {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakePaneHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePaneHost {
    pub fn new() -> Self {
        let state = FakeState {
            next_pid: 41000,
            exit_on_interrupt: true,
            supports_geometry: true,
            ..Default::default()
        };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Make the next spawn fail with `message`.
    pub fn fail_next_spawn(&self, message: impl Into<String>) {
        self.state.lock().fail_next_spawn = Some(message.into());
    }

    /// Whether an interrupt marks the child exited (code 130). Defaults on.
    pub fn set_exit_on_interrupt(&self, value: bool) {
        self.state.lock().exit_on_interrupt = value;
    }

    pub fn set_supports_geometry(&self, value: bool) {
        self.state.lock().supports_geometry = value;
    }

    /// Pane id for a process name, when it exists.
    pub fn pane_for(&self, name: &str) -> Option<PaneId> {
        let state = self.state.lock();
        state
            .panes
            .iter()
            .find(|(_, p)| p.name == name && !p.gone)
            .map(|(id, _)| id.clone())
    }

    /// Inject output as if the child wrote it.
    pub async fn emit(&self, id: &PaneId, stream: LogStream, chunk: &str) {
        let sender = self.state.lock().senders.get(id).cloned();
        if let Some(sender) = sender {
            let _ = sender
                .send(PaneOutput { pane: id.clone(), stream, chunk: chunk.to_string() })
                .await;
        }
    }

    /// Inject a line (newline appended) on stdout.
    pub async fn emit_line(&self, id: &PaneId, line: &str) {
        self.emit(id, LogStream::Stdout, &format!("{line}\n")).await;
    }

    /// Script the child's exit.
    pub fn mark_exited(&self, id: &PaneId, exit_code: i32) {
        let mut state = self.state.lock();
        if let Some(pane) = state.panes.get_mut(id) {
            pane.dead = true;
            pane.exit_code = Some(exit_code);
        }
    }

    /// Script the pane disappearing entirely (user killed it).
    pub fn mark_gone(&self, id: &PaneId) {
        let mut state = self.state.lock();
        if let Some(pane) = state.panes.get_mut(id) {
            pane.gone = true;
        }
    }

    pub fn set_screen(&self, id: &PaneId, text: &str) {
        let mut state = self.state.lock();
        if let Some(pane) = state.panes.get_mut(id) {
            pane.screen = text.to_string();
        }
    }

    pub fn spawns(&self) -> Vec<SpawnRecord> {
        self.state.lock().spawns.clone()
    }

    pub fn floating_spawns(&self) -> Vec<SpawnRecord> {
        self.state.lock().floating_spawns.clone()
    }

    pub fn interrupts(&self) -> Vec<PaneId> {
        self.state.lock().interrupts.clone()
    }

    pub fn kills(&self) -> Vec<PaneId> {
        self.state.lock().kills.clone()
    }

    pub fn closed_floats(&self) -> Vec<String> {
        self.state.lock().closed_floats.clone()
    }

    pub fn open_float_names(&self) -> Vec<String> {
        self.state.lock().floats.keys().cloned().collect()
    }

    fn register(
        &self,
        name: &str,
        command: &str,
        cwd: &Path,
        env: &[(String, String)],
        output: Option<mpsc::Sender<PaneOutput>>,
        floating: bool,
    ) -> Result<Pane, PaneError> {
        let mut state = self.state.lock();
        if let Some(message) = state.fail_next_spawn.take() {
            return Err(PaneError::SpawnFailed(message));
        }
        state.next_id += 1;
        state.next_pid += 1;
        let id = PaneId::new(format!("fake:{}", state.next_id));
        let pid = state.next_pid;
        state.panes.insert(
            id.clone(),
            FakePane {
                name: name.to_string(),
                dead: false,
                exit_code: None,
                gone: false,
                screen: String::new(),
            },
        );
        if let Some(output) = output {
            state.senders.insert(id.clone(), output);
        }
        let record = SpawnRecord {
            name: name.to_string(),
            command: command.to_string(),
            cwd: cwd.to_path_buf(),
            env: env.to_vec(),
        };
        if floating {
            state.floats.insert(name.to_string(), id.clone());
            state.floating_spawns.push(record);
        } else {
            state.spawns.push(record);
        }
        Ok(Pane { id, pid: Some(pid) })
    }
}

#[async_trait]
impl PaneHost for FakePaneHost {
    async fn create_pane(
        &self,
        name: &str,
        command: &str,
        cwd: &Path,
        env: &[(String, String)],
        output: mpsc::Sender<PaneOutput>,
    ) -> Result<Pane, PaneError> {
        self.register(name, command, cwd, env, Some(output), false)
    }

    async fn respawn_pane(
        &self,
        id: &PaneId,
        command: &str,
        cwd: &Path,
        env: &[(String, String)],
        output: mpsc::Sender<PaneOutput>,
    ) -> Result<Pane, PaneError> {
        let name = {
            let state = self.state.lock();
            state
                .panes
                .get(id)
                .map(|p| p.name.clone())
                .ok_or_else(|| PaneError::NotFound(id.to_string()))?
        };
        {
            let mut state = self.state.lock();
            state.panes.remove(id);
            state.senders.remove(id);
        }
        self.register(&name, command, cwd, env, Some(output), false)
    }

    async fn kill_pane(&self, id: &PaneId) -> Result<(), PaneError> {
        let mut state = self.state.lock();
        state.kills.push(id.clone());
        if let Some(pane) = state.panes.get_mut(id) {
            // A killed pane is gone from the host, like a killed tmux window.
            pane.dead = true;
            pane.gone = true;
            pane.exit_code = pane.exit_code.or(Some(137));
        }
        state.senders.remove(id);
        Ok(())
    }

    async fn send_interrupt(&self, id: &PaneId) -> Result<(), PaneError> {
        let mut state = self.state.lock();
        state.interrupts.push(id.clone());
        if state.exit_on_interrupt {
            if let Some(pane) = state.panes.get_mut(id) {
                pane.dead = true;
                pane.exit_code = Some(130);
            }
        }
        Ok(())
    }

    async fn capture_pane(&self, id: &PaneId, _lines: u32) -> Result<String, PaneError> {
        let state = self.state.lock();
        state
            .panes
            .get(id)
            .map(|p| p.screen.clone())
            .ok_or_else(|| PaneError::NotFound(id.to_string()))
    }

    async fn open_floating(
        &self,
        command: &str,
        opts: &FloatingOpts,
        env: &[(String, String)],
    ) -> Result<Pane, PaneError> {
        let cwd = opts.cwd.clone().unwrap_or_else(|| std::path::PathBuf::from("/"));
        self.register(&opts.name, command, &cwd, env, None, true)
    }

    async fn close_floating(&self, name: &str) -> Result<(), PaneError> {
        let mut state = self.state.lock();
        state.closed_floats.push(name.to_string());
        match state.floats.remove(name) {
            Some(id) => {
                if let Some(pane) = state.panes.get_mut(&id) {
                    pane.gone = true;
                }
                Ok(())
            }
            None => Err(PaneError::NotFound(name.to_string())),
        }
    }

    async fn poll(&self) -> Result<Vec<PaneStatus>, PaneError> {
        let state = self.state.lock();
        Ok(state
            .panes
            .iter()
            .map(|(id, pane)| PaneStatus {
                id: id.clone(),
                dead: pane.dead,
                exit_code: pane.exit_code,
                gone: pane.gone,
            })
            .collect())
    }

    fn supports_geometry(&self) -> bool {
        self.state.lock().supports_geometry
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
