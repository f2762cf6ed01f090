// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tmux pane host.
//!
//! One private tmux session per supervisor session, one window per
//! supervised process. Every window is remain-on-exit so a dead child
//! leaves its exit status pollable. Output capture goes through
//! `pipe-pane` into `tty-<name>.txt` files under the runtime directory,
//! followed by a tailer task; tmux merges stdout and stderr into one tty
//! stream, so captured chunks arrive stream-tagged as stdout.
//!
//! Floating panes use `display-popup` when a client is attached (geometry
//! honoured) and fall back to a `float-<name>` window otherwise.

use crate::tailer::spawn_file_tailer;
use crate::{FloatingOpts, Pane, PaneError, PaneHost, PaneId, PaneOutput, PaneStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use sc_core::LogStream;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Escape a string for a single-quoted shell context.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[derive(Debug)]
struct TrackedPane {
    /// Output file fed by `pipe-pane`, when capture is wired.
    tty_path: Option<PathBuf>,
    tailer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct TmuxState {
    /// Placeholder pane of a freshly created session, consumed by the
    /// first `create_pane`.
    placeholder: Option<PaneId>,
    panes: HashMap<PaneId, TrackedPane>,
    /// Floating name -> window pane (window fallback only; popups close
    /// through the client).
    floats: HashMap<String, Option<PaneId>>,
}

/// Pane host backed by a private tmux session.
pub struct TmuxHost {
    session: String,
    runtime_dir: PathBuf,
    state: Mutex<TmuxState>,
}

impl TmuxHost {
    /// Host for the given session name (usually `sc-<hash>`); tty capture
    /// files land in `runtime_dir`.
    pub fn new(session: impl Into<String>, runtime_dir: impl Into<PathBuf>) -> Self {
        Self {
            session: session.into(),
            runtime_dir: runtime_dir.into(),
            state: Mutex::new(TmuxState::default()),
        }
    }

    pub fn session_name(&self) -> &str {
        &self.session
    }

    async fn tmux(&self, args: &[&str]) -> Result<Output, PaneError> {
        let output = Command::new("tmux")
            .args(args)
            .output()
            .await
            .map_err(|e| PaneError::HostUnavailable(format!("failed to run tmux: {e}")))?;
        Ok(output)
    }

    async fn tmux_ok(&self, args: &[&str]) -> Result<String, PaneError> {
        let output = self.tmux(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PaneError::CommandFailed(format!(
                "tmux {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Create the session with a placeholder window if it does not exist.
    async fn ensure_session(&self) -> Result<(), PaneError> {
        let exists = self
            .tmux(&["has-session", "-t", &format!("={}", self.session)])
            .await?
            .status
            .success();
        if exists {
            return Ok(());
        }

        self.tmux_ok(&["new-session", "-d", "-s", &self.session, "-n", "sidecar"]).await?;
        // Dead children must stay pollable until the supervisor reconciles.
        self.tmux_ok(&["set-option", "-t", &self.session, "remain-on-exit", "on"]).await?;

        let pane = self
            .tmux_ok(&[
                "list-panes",
                "-t",
                &format!("{}:0", self.session),
                "-F",
                "#{pane_id}",
            ])
            .await?;
        let pane = pane.trim();
        if !pane.is_empty() {
            self.state.lock().placeholder = Some(PaneId::new(pane));
        }
        Ok(())
    }

    async fn pane_pid(&self, id: &PaneId) -> Option<u32> {
        let out = self
            .tmux(&["display-message", "-p", "-t", id.as_str(), "#{pane_pid}"])
            .await
            .ok()?;
        if !out.status.success() {
            return None;
        }
        String::from_utf8_lossy(&out.stdout).trim().parse().ok()
    }

    /// Wire `pipe-pane` capture for `id` into a tty file plus tailer.
    async fn attach_capture(
        &self,
        id: &PaneId,
        name: &str,
        output: mpsc::Sender<PaneOutput>,
    ) -> Result<(), PaneError> {
        let tty_path = self.runtime_dir.join(format!("tty-{name}.txt"));
        let pipe_cmd = format!("cat >> {}", shell_quote(&tty_path.to_string_lossy()));
        self.tmux_ok(&["pipe-pane", "-t", id.as_str(), &pipe_cmd]).await?;

        let tailer =
            spawn_file_tailer(id.clone(), tty_path.clone(), LogStream::Stdout, output);
        let mut state = self.state.lock();
        if let Some(old) = state
            .panes
            .insert(id.clone(), TrackedPane { tty_path: Some(tty_path), tailer: Some(tailer) })
        {
            if let Some(handle) = old.tailer {
                handle.abort();
            }
        }
        Ok(())
    }

    fn env_args(env: &[(String, String)]) -> Vec<String> {
        let mut args = Vec::with_capacity(env.len() * 2);
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args
    }

    async fn has_attached_client(&self) -> bool {
        match self.tmux(&["list-clients", "-t", &self.session, "-F", "#{client_name}"]).await {
            Ok(out) if out.status.success() => {
                !String::from_utf8_lossy(&out.stdout).trim().is_empty()
            }
            _ => false,
        }
    }
}

#[async_trait]
impl PaneHost for TmuxHost {
    async fn create_pane(
        &self,
        name: &str,
        command: &str,
        cwd: &Path,
        env: &[(String, String)],
        output: mpsc::Sender<PaneOutput>,
    ) -> Result<Pane, PaneError> {
        self.ensure_session().await?;

        let placeholder = self.state.lock().placeholder.take();
        let id = match placeholder {
            // First pane of a fresh session: reuse the placeholder window.
            Some(pane) => {
                self.tmux_ok(&["rename-window", "-t", pane.as_str(), name]).await?;
                let cwd_str = cwd.to_string_lossy().into_owned();
                let mut args: Vec<String> = vec![
                    "respawn-pane".into(),
                    "-k".into(),
                    "-t".into(),
                    pane.as_str().to_string(),
                    "-c".into(),
                    cwd_str,
                ];
                args.extend(Self::env_args(env));
                args.push(command.to_string());
                let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
                self.tmux_ok(&arg_refs).await?;
                pane
            }
            None => {
                let cwd_str = cwd.to_string_lossy().into_owned();
                let mut args: Vec<String> = vec![
                    "new-window".into(),
                    "-d".into(),
                    "-P".into(),
                    "-F".into(),
                    "#{pane_id}".into(),
                    "-t".into(),
                    format!("{}:", self.session),
                    "-n".into(),
                    name.to_string(),
                    "-c".into(),
                    cwd_str,
                ];
                args.extend(Self::env_args(env));
                args.push(command.to_string());
                let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
                let out = self.tmux_ok(&arg_refs).await?;
                let pane = out.trim();
                if pane.is_empty() {
                    return Err(PaneError::SpawnFailed("tmux returned no pane id".into()));
                }
                PaneId::new(pane)
            }
        };

        self.attach_capture(&id, name, output).await?;
        let pid = self.pane_pid(&id).await;
        tracing::info!(pane = %id, name, ?pid, "created tmux pane");
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
        let cwd_str = cwd.to_string_lossy().into_owned();
        let mut args: Vec<String> = vec![
            "respawn-pane".into(),
            "-k".into(),
            "-t".into(),
            id.as_str().to_string(),
            "-c".into(),
            cwd_str,
        ];
        args.extend(Self::env_args(env));
        args.push(command.to_string());
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.tmux_ok(&arg_refs).await?;

        // Re-wire capture onto the existing tty file.
        let tty_path = {
            let state = self.state.lock();
            state.panes.get(id).and_then(|p| p.tty_path.clone())
        };
        if let Some(tty_path) = tty_path {
            let tailer =
                spawn_file_tailer(id.clone(), tty_path.clone(), LogStream::Stdout, output);
            let mut state = self.state.lock();
            if let Some(tracked) = state.panes.get_mut(id) {
                if let Some(old) = tracked.tailer.replace(tailer) {
                    old.abort();
                }
            }
        }

        let pid = self.pane_pid(id).await;
        Ok(Pane { id: id.clone(), pid })
    }

    async fn kill_pane(&self, id: &PaneId) -> Result<(), PaneError> {
        if let Some(tracked) = self.state.lock().panes.remove(id) {
            if let Some(tailer) = tracked.tailer {
                tailer.abort();
            }
        }
        // The window may already be gone; that is fine.
        let _ = self.tmux(&["kill-window", "-t", id.as_str()]).await?;
        Ok(())
    }

    async fn send_interrupt(&self, id: &PaneId) -> Result<(), PaneError> {
        self.tmux_ok(&["send-keys", "-t", id.as_str(), "C-c"]).await.map(|_| ())
    }

    async fn capture_pane(&self, id: &PaneId, lines: u32) -> Result<String, PaneError> {
        let start = format!("-{lines}");
        self.tmux_ok(&["capture-pane", "-p", "-t", id.as_str(), "-S", &start])
            .await
            .map_err(|_| PaneError::NotFound(id.to_string()))
    }

    async fn open_floating(
        &self,
        command: &str,
        opts: &FloatingOpts,
        env: &[(String, String)],
    ) -> Result<Pane, PaneError> {
        self.ensure_session().await?;

        if self.has_attached_client().await {
            // Popup path: env goes inline since display-popup has no -e.
            let env_prefix: String = env
                .iter()
                .map(|(k, v)| format!("{k}={} ", shell_quote(v)))
                .collect();
            let full = format!("{env_prefix}{command}");
            let mut args: Vec<String> =
                vec!["display-popup".into(), "-t".into(), format!("{}:", self.session)];
            if opts.close_on_exit {
                args.push("-E".into());
            }
            if let Some(cwd) = &opts.cwd {
                args.push("-d".into());
                args.push(cwd.to_string_lossy().into_owned());
            }
            for (flag, value) in
                [("-w", opts.width), ("-h", opts.height), ("-x", opts.x), ("-y", opts.y)]
            {
                if let Some(v) = value {
                    args.push(flag.into());
                    args.push(v.to_string());
                }
            }
            args.push(full);
            // display-popup holds its client while the popup is open; fire
            // and forget so create_interaction stays non-blocking.
            tokio::spawn(async move {
                let _ = Command::new("tmux").args(&args).output().await;
            });
            self.state.lock().floats.insert(opts.name.clone(), None);
            return Ok(Pane { id: PaneId::new(format!("popup:{}", opts.name)), pid: None });
        }

        // No client: fall back to a window the user can select.
        let window = format!("float-{}", opts.name);
        let mut args: Vec<String> = vec![
            "new-window".into(),
            "-d".into(),
            "-P".into(),
            "-F".into(),
            "#{pane_id}".into(),
            "-t".into(),
            format!("{}:", self.session),
            "-n".into(),
            window,
        ];
        if let Some(cwd) = &opts.cwd {
            args.push("-c".into());
            args.push(cwd.to_string_lossy().into_owned());
        }
        args.extend(Self::env_args(env));
        args.push(command.to_string());
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.tmux_ok(&arg_refs).await?;
        let id = PaneId::new(out.trim());
        if opts.close_on_exit {
            // Floats should not leave corpses behind.
            let _ = self
                .tmux(&["set-option", "-t", id.as_str(), "remain-on-exit", "off"])
                .await;
        }
        let pid = self.pane_pid(&id).await;
        self.state.lock().floats.insert(opts.name.clone(), Some(id.clone()));
        Ok(Pane { id, pid })
    }

    async fn close_floating(&self, name: &str) -> Result<(), PaneError> {
        let float = self.state.lock().floats.remove(name);
        match float {
            Some(Some(id)) => {
                let _ = self.tmux(&["kill-window", "-t", id.as_str()]).await?;
                Ok(())
            }
            Some(None) => {
                // Popup: closing goes through the attached client.
                let _ = self
                    .tmux(&["display-popup", "-C", "-t", &format!("{}:", self.session)])
                    .await?;
                Ok(())
            }
            None => Err(PaneError::NotFound(name.to_string())),
        }
    }

    async fn poll(&self) -> Result<Vec<PaneStatus>, PaneError> {
        let out = self
            .tmux(&[
                "list-panes",
                "-s",
                "-t",
                &self.session,
                "-F",
                "#{pane_id} #{pane_dead} #{pane_dead_status}",
            ])
            .await?;
        if !out.status.success() {
            // Session gone entirely: every tracked pane is gone.
            let state = self.state.lock();
            return Ok(state
                .panes
                .keys()
                .map(|id| PaneStatus {
                    id: id.clone(),
                    dead: false,
                    exit_code: None,
                    gone: true,
                })
                .collect());
        }

        let mut listed: HashMap<PaneId, (bool, Option<i32>)> = HashMap::new();
        for line in String::from_utf8_lossy(&out.stdout).lines() {
            if let Some((id, dead, exit_code)) = parse_pane_line(line) {
                listed.insert(id, (dead, exit_code));
            }
        }

        let state = self.state.lock();
        let mut statuses = Vec::with_capacity(state.panes.len());
        for id in state.panes.keys() {
            let status = match listed.get(id) {
                Some((dead, exit_code)) => PaneStatus {
                    id: id.clone(),
                    dead: *dead,
                    exit_code: *exit_code,
                    gone: false,
                },
                None => PaneStatus { id: id.clone(), dead: false, exit_code: None, gone: true },
            };
            statuses.push(status);
        }
        Ok(statuses)
    }

    fn supports_geometry(&self) -> bool {
        true
    }
}

/// Parse one `list-panes` line: `#{pane_id} #{pane_dead} #{pane_dead_status}`.
fn parse_pane_line(line: &str) -> Option<(PaneId, bool, Option<i32>)> {
    let mut parts = line.split_whitespace();
    let id = parts.next()?;
    let dead = parts.next() == Some("1");
    let exit_code = parts.next().and_then(|s| s.parse().ok());
    Some((PaneId::new(id), dead, exit_code))
}

impl Drop for TmuxHost {
    fn drop(&mut self) {
        for (_, tracked) in self.state.lock().panes.drain() {
            if let Some(tailer) = tracked.tailer {
                tailer.abort();
            }
        }
    }
}

#[cfg(test)]
#[path = "tmux_tests.rs"]
mod tests;
