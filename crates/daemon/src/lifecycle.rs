// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon session lifecycle: claim the socket, build the supervisor stack,
//! serve until a signal or an IPC shutdown, then tear everything down.

use crate::env;
use crate::listener::IpcServer;
use crate::reuse::{claim_session, SessionRole};
use sc_core::{epoch_ms, EventLog, SessionEvent, SessionIdentity};
use sc_manifest::{Manifest, ManifestError};
use sc_panes::{PaneHost, TerminalWindowHost, TmuxHost};
use sc_supervisor::{
    spawn_config_watcher, EnvFileWatcher, InteractionBroker, Supervisor, ToolDispatcher,
    WatchEvent,
};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("a daemon is already running for this workspace")]
    AlreadyRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How to run one session.
pub struct SessionOptions {
    /// Manifest path, re-read on hot reload.
    pub manifest_path: PathBuf,
    /// Watch the manifest and env files for changes.
    pub watch: bool,
    /// Skip tmux even when available (children run as host processes).
    pub no_tmux: bool,
}

fn tmux_available() -> bool {
    std::process::Command::new("tmux")
        .arg("-V")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Run a full supervisor session in the foreground.
///
/// Returns after a signal or an IPC `shutdown`, with every process stopped
/// and the socket removed.
pub async fn run_session(manifest: Manifest, opts: SessionOptions) -> Result<(), LifecycleError> {
    let identity = SessionIdentity::derive(&manifest.config_dir, manifest.reuse.key())?;
    let runtime_dir = identity.runtime_dir(&env::runtime_root());
    std::fs::create_dir_all(&runtime_dir)?;

    let listener = match claim_session(&identity).await? {
        SessionRole::Daemon(listener) => listener,
        SessionRole::Proxy => return Err(LifecycleError::AlreadyRunning),
    };
    let socket_path = identity.socket_path();

    let host: Arc<dyn PaneHost> = if !opts.no_tmux && tmux_available() {
        Arc::new(TmuxHost::new(format!("sc-{identity}"), runtime_dir.clone()))
    } else {
        info!("tmux unavailable; running children as host processes");
        Arc::new(TerminalWindowHost::new())
    };

    let event_log = EventLog::in_dir(&runtime_dir);
    let supervisor = Supervisor::spawn(
        Arc::clone(&host),
        manifest.resolved(),
        manifest.settings.clone(),
        event_log.clone(),
    );
    let broker = InteractionBroker::new(Arc::clone(&host), event_log.clone(), env::ui_runner());
    let dispatcher = ToolDispatcher::new(supervisor.clone(), broker);

    if let Err(e) = event_log.append(&SessionEvent::Status {
        ts: epoch_ms(),
        message: Some(format!("session {identity} started")),
        prompts: Vec::new(),
    }) {
        warn!(error = %e, "could not write session start event");
    }

    // Watchers feed reloads and env-file changes into the supervisor.
    let (watch_tx, mut watch_rx) = mpsc::channel::<WatchEvent>(16);
    let env_watcher = match EnvFileWatcher::new(watch_tx.clone()) {
        Ok(watcher) => {
            watcher.update(&manifest);
            Some(watcher)
        }
        Err(e) => {
            warn!(error = %e, "env file watching disabled");
            None
        }
    };
    let _config_watcher = if opts.watch {
        match spawn_config_watcher(opts.manifest_path.clone(), watch_tx) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(error = %e, "manifest watching disabled");
                None
            }
        }
    } else {
        None
    };

    let shutdown = CancellationToken::new();
    let server = IpcServer::new(listener, dispatcher.clone(), shutdown.clone());
    let server_task = tokio::spawn(server.run());

    info!(session = %identity, socket = %socket_path.display(), "session up");
    if let Err(e) = supervisor.start_all().await {
        // Partial startup is visible through process states; the session
        // itself keeps running.
        error!(error = %e, "startup incomplete");
    }

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("SIGINT received");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received");
                break;
            }
            _ = shutdown.cancelled() => {
                info!("shutdown requested");
                break;
            }
            Some(event) = watch_rx.recv() => {
                handle_watch_event(event, &supervisor, env_watcher.as_ref()).await;
            }
        }
    }

    shutdown.cancel();
    if let Err(e) = supervisor.stop_all().await {
        warn!(error = %e, "stop_all failed during shutdown");
    }
    server_task.abort();
    let _ = std::fs::remove_file(&socket_path);
    info!(session = %identity, "session down");
    Ok(())
}

async fn handle_watch_event(
    event: WatchEvent,
    supervisor: &Supervisor,
    env_watcher: Option<&EnvFileWatcher>,
) {
    match event {
        WatchEvent::ManifestChanged(manifest) => {
            match supervisor.reload(&manifest).await {
                Ok(reload) if reload.is_empty() => {
                    info!("manifest unchanged after reload");
                }
                Ok(reload) => {
                    info!(
                        added = ?reload.added,
                        removed = ?reload.removed,
                        changed = ?reload.changed,
                        "manifest reloaded"
                    );
                }
                Err(e) => error!(error = %e, "reload failed"),
            }
            if let Some(watcher) = env_watcher {
                watcher.update(&manifest);
            }
        }
        WatchEvent::ManifestError(message) => {
            // Keep the previous manifest in force.
            error!(error = %message, "manifest change rejected");
        }
        WatchEvent::EnvFilesChanged { processes } => {
            info!(?processes, "env files changed");
            if let Err(e) = supervisor.env_files_changed(processes).await {
                warn!(error = %e, "env file restart failed");
            }
        }
    }
}
