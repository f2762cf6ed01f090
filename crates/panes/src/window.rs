// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host-OS pane host for machines without tmux.
//!
//! Supervised children run as plain host processes with piped output, which
//! keeps stdout and stderr as distinct streams. There is no screen to
//! capture, so `capture_pane` is served from a small retained ring of the
//! most recent output. Floating panes open a real terminal window
//! (`Terminal.app` via osascript on macOS, `x-terminal-emulator`
//! elsewhere); geometry hints are ignored.

use crate::{FloatingOpts, Pane, PaneError, PaneHost, PaneId, PaneOutput, PaneStatus};
use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use sc_core::{LogBuffer, LogStream};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::mpsc;

/// Screen-substitute ring retained per pane for `capture_pane`.
const CAPTURE_LINES: usize = 200;

#[derive(Default)]
struct ChildRecord {
    pid: Option<u32>,
    dead: bool,
    exit_code: Option<i32>,
    screen: Option<LogBuffer>,
}

#[derive(Default)]
struct WindowState {
    next_id: u64,
    children: HashMap<PaneId, ChildRecord>,
    /// Floating name -> pid of the terminal launcher process.
    floats: HashMap<String, Option<u32>>,
}

/// Pane host running children directly on the host.
#[derive(Default)]
pub struct TerminalWindowHost {
    state: Arc<Mutex<WindowState>>,
}

impl TerminalWindowHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn_child(
        &self,
        id: &PaneId,
        command: &str,
        cwd: &Path,
        env: &[(String, String)],
        output: mpsc::Sender<PaneOutput>,
    ) -> Result<Option<u32>, PaneError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .envs(env.iter().map(|(k, v)| (k.clone(), v.clone())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PaneError::SpawnFailed(e.to_string()))?;

        let pid = child.id();
        {
            // Record the pid before the reaper can race us.
            let mut state = self.state.lock();
            if let Some(record) = state.children.get_mut(id) {
                record.pid = pid;
            }
        }
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, id.clone(), LogStream::Stdout, output.clone(), Arc::clone(&self.state));
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, id.clone(), LogStream::Stderr, output.clone(), Arc::clone(&self.state));
        }

        // Reap the child and record its exit status for poll(). The pid
        // guard keeps a stale reaper from marking a respawned child dead.
        let state = Arc::clone(&self.state);
        let pane = id.clone();
        tokio::spawn(async move {
            let exit = child.wait().await.ok();
            let mut state = state.lock();
            if let Some(record) = state.children.get_mut(&pane) {
                if record.pid == pid {
                    record.dead = true;
                    record.exit_code = exit.and_then(|s| s.code());
                }
            }
        });

        Ok(pid)
    }

    fn signal_pane(&self, id: &PaneId, signal: Signal) -> Result<(), PaneError> {
        let pid = {
            let state = self.state.lock();
            let record = state.children.get(id).ok_or_else(|| PaneError::NotFound(id.to_string()))?;
            record.pid
        };
        if let Some(pid) = pid {
            let _ = kill(Pid::from_raw(pid as i32), signal);
        }
        Ok(())
    }
}

/// Forward a child output pipe to the pane output channel, mirroring every
/// chunk into the pane's retained screen ring.
fn spawn_reader<R>(
    mut reader: R,
    pane: PaneId,
    stream: LogStream,
    output: mpsc::Sender<PaneOutput>,
    state: Arc<Mutex<WindowState>>,
) where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            let read = match reader.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            let chunk = String::from_utf8_lossy(&buf[..read]).into_owned();
            {
                let mut state = state.lock();
                if let Some(record) = state.children.get_mut(&pane) {
                    if let Some(screen) = record.screen.as_mut() {
                        screen.push_lines(&chunk);
                    }
                }
            }
            let out = PaneOutput { pane: pane.clone(), stream, chunk };
            if output.send(out).await.is_err() {
                return;
            }
        }
    });
}

#[async_trait]
impl PaneHost for TerminalWindowHost {
    async fn create_pane(
        &self,
        name: &str,
        command: &str,
        cwd: &Path,
        env: &[(String, String)],
        output: mpsc::Sender<PaneOutput>,
    ) -> Result<Pane, PaneError> {
        let id = {
            let mut state = self.state.lock();
            state.next_id += 1;
            let id = PaneId::new(format!("proc:{}:{}", name, state.next_id));
            state.children.insert(
                id.clone(),
                ChildRecord { screen: Some(LogBuffer::new(CAPTURE_LINES)), ..Default::default() },
            );
            id
        };
        let pid = self.spawn_child(&id, command, cwd, env, output)?;
        tracing::info!(pane = %id, name, ?pid, "spawned host process");
        Ok(Pane { id, pid })
    }

    async fn respawn_pane(
        &self,
        id: &PaneId,
        command: &str,
        cwd: &Path,
        env: &[(String, String)],
        output: mpsc::Sender<PaneOutput>,
    ) -> Result<Pane, PaneError> {
        let _ = self.signal_pane(id, Signal::SIGKILL);
        {
            let mut state = self.state.lock();
            let record = state
                .children
                .get_mut(id)
                .ok_or_else(|| PaneError::NotFound(id.to_string()))?;
            record.dead = false;
            record.exit_code = None;
            record.pid = None;
        }
        let pid = self.spawn_child(id, command, cwd, env, output)?;
        Ok(Pane { id: id.clone(), pid })
    }

    async fn kill_pane(&self, id: &PaneId) -> Result<(), PaneError> {
        let _ = self.signal_pane(id, Signal::SIGKILL);
        self.state.lock().children.remove(id);
        Ok(())
    }

    async fn send_interrupt(&self, id: &PaneId) -> Result<(), PaneError> {
        self.signal_pane(id, Signal::SIGINT)
    }

    async fn capture_pane(&self, id: &PaneId, lines: u32) -> Result<String, PaneError> {
        let state = self.state.lock();
        let record =
            state.children.get(id).ok_or_else(|| PaneError::NotFound(id.to_string()))?;
        let tail = record
            .screen
            .as_ref()
            .map(|s| s.tail(lines as usize))
            .unwrap_or_default();
        Ok(tail.join("\n"))
    }

    async fn open_floating(
        &self,
        command: &str,
        opts: &FloatingOpts,
        env: &[(String, String)],
    ) -> Result<Pane, PaneError> {
        let env_prefix: String =
            env.iter().map(|(k, v)| format!("{k}='{}' ", v.replace('\'', "'\\''"))).collect();
        let cwd = opts
            .cwd
            .as_ref()
            .map(|p| format!("cd '{}' && ", p.to_string_lossy()))
            .unwrap_or_default();
        let full = format!("{cwd}{env_prefix}{command}");

        let child = if cfg!(target_os = "macos") {
            Command::new("osascript")
                .arg("-e")
                .arg(format!(
                    "tell application \"Terminal\" to do script \"{}\"",
                    full.replace('\\', "\\\\").replace('"', "\\\"")
                ))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
        } else {
            Command::new("x-terminal-emulator")
                .arg("-e")
                .arg("sh")
                .arg("-c")
                .arg(&full)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
        };

        let child = child.map_err(|e| {
            PaneError::HostUnavailable(format!("cannot open terminal window: {e}"))
        })?;
        let pid = child.id();
        self.state.lock().floats.insert(opts.name.clone(), pid);
        Ok(Pane { id: PaneId::new(format!("window:{}", opts.name)), pid })
    }

    async fn close_floating(&self, name: &str) -> Result<(), PaneError> {
        match self.state.lock().floats.remove(name) {
            Some(Some(pid)) => {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
                Ok(())
            }
            Some(None) => Ok(()),
            None => Err(PaneError::NotFound(name.to_string())),
        }
    }

    async fn poll(&self) -> Result<Vec<PaneStatus>, PaneError> {
        let state = self.state.lock();
        Ok(state
            .children
            .iter()
            .map(|(id, record)| PaneStatus {
                id: id.clone(),
                dead: record.dead,
                exit_code: record.exit_code,
                gone: false,
            })
            .collect())
    }

    fn supports_geometry(&self) -> bool {
        false
    }
}

#[cfg(test)]
#[path = "window_tests.rs"]
mod tests;
