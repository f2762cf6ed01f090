// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Debounced filesystem watchers for the manifest and env files.
//!
//! notify callbacks run on the watcher's own thread and only bridge raw
//! paths into a tokio channel; a debounce task holds a deadline per path
//! (restarted on every new event, so bursts and slow writes collapse) and
//! fires once the path goes quiet. A manifest that fails to parse after a
//! change surfaces as an error event; the previous manifest stays in force.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use sc_manifest::Manifest;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Quiet window before a change fires.
const DEBOUNCE: Duration = Duration::from_millis(300);

/// What a watcher observed, post-debounce.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// The manifest changed and parsed cleanly.
    ManifestChanged(Manifest),
    /// The manifest changed but failed to load; keep the previous one.
    ManifestError(String),
    /// Env files changed; these processes should restart if running.
    EnvFilesChanged { processes: Vec<String> },
}

/// Debounce loop: collapse bursts of raw path events into single firings.
///
/// `fire` maps a quiet path to the event to emit, if any.
fn spawn_debounce<F>(
    mut raw_rx: mpsc::Receiver<PathBuf>,
    events: mpsc::Sender<WatchEvent>,
    fire: F,
) -> JoinHandle<()>
where
    F: Fn(&Path) -> Option<WatchEvent> + Send + 'static,
{
    tokio::spawn(async move {
        let mut pending: HashMap<PathBuf, tokio::time::Instant> = HashMap::new();
        loop {
            let next_deadline = pending.values().min().copied();
            tokio::select! {
                raw = raw_rx.recv() => match raw {
                    Some(path) => {
                        // Restart the window: still being written.
                        pending.insert(path, tokio::time::Instant::now() + DEBOUNCE);
                    }
                    None => return,
                },
                _ = sleep_until_or_forever(next_deadline) => {
                    let now = tokio::time::Instant::now();
                    let due: Vec<PathBuf> = pending
                        .iter()
                        .filter(|(_, deadline)| **deadline <= now)
                        .map(|(path, _)| path.clone())
                        .collect();
                    for path in due {
                        pending.remove(&path);
                        if let Some(event) = fire(&path) {
                            if events.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }
    })
}

async fn sleep_until_or_forever(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Bridge notify's callback thread into a tokio channel.
fn path_bridge(
    raw_tx: mpsc::Sender<PathBuf>,
) -> impl Fn(notify::Result<notify::Event>) + Send + 'static {
    move |result| {
        let Ok(event) = result else { return };
        for path in event.paths {
            let _ = raw_tx.blocking_send(path);
        }
    }
}

/// Watches one manifest file and emits parsed reloads.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Watch `manifest_path` and push debounced reloads into `events`.
pub fn spawn_config_watcher(
    manifest_path: PathBuf,
    events: mpsc::Sender<WatchEvent>,
) -> notify::Result<ConfigWatcher> {
    let (raw_tx, raw_rx) = mpsc::channel(64);
    let mut watcher = notify::recommended_watcher(path_bridge(raw_tx))?;
    // Watch the parent directory: editors replace files instead of
    // rewriting them, which would drop a file-level watch.
    let dir = manifest_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;

    let file_name = manifest_path.file_name().map(|n| n.to_os_string());
    let task = spawn_debounce(raw_rx, events, move |path| {
        if path.file_name().map(|n| n.to_os_string()) != file_name {
            return None;
        }
        match Manifest::load(path) {
            Ok(manifest) => Some(WatchEvent::ManifestChanged(manifest)),
            Err(e) => {
                tracing::warn!(error = %e, "manifest reload rejected");
                Some(WatchEvent::ManifestError(e.to_string()))
            }
        }
    });
    Ok(ConfigWatcher { _watcher: watcher, task })
}

/// Watches the env files referenced by the current manifest.
pub struct EnvFileWatcher {
    watcher: Mutex<RecommendedWatcher>,
    /// env file path -> processes declaring it.
    users: std::sync::Arc<Mutex<HashMap<PathBuf, Vec<String>>>>,
    watched: Mutex<HashSet<PathBuf>>,
    task: JoinHandle<()>,
}

impl Drop for EnvFileWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl EnvFileWatcher {
    pub fn new(events: mpsc::Sender<WatchEvent>) -> notify::Result<Self> {
        let (raw_tx, raw_rx) = mpsc::channel(64);
        let watcher = notify::recommended_watcher(path_bridge(raw_tx))?;
        let users = std::sync::Arc::new(Mutex::new(HashMap::<PathBuf, Vec<String>>::new()));

        let fire_users = std::sync::Arc::clone(&users);
        let task = spawn_debounce(raw_rx, events, move |path| {
            let processes = fire_users.lock().get(path).cloned()?;
            if processes.is_empty() {
                return None;
            }
            Some(WatchEvent::EnvFilesChanged { processes })
        });

        Ok(Self {
            watcher: Mutex::new(watcher),
            users,
            watched: Mutex::new(HashSet::new()),
            task,
        })
    }

    /// Rebuild the watch set from a (re)loaded manifest.
    pub fn update(&self, manifest: &Manifest) {
        let mut map: HashMap<PathBuf, Vec<String>> = HashMap::new();
        for (name, config) in manifest.resolved() {
            if let Some(env_file) = config.env_file {
                map.entry(env_file).or_default().push(name);
            }
        }

        let mut watcher = self.watcher.lock();
        let mut watched = self.watched.lock();
        for stale in watched.iter().filter(|p| !map.contains_key(*p)).cloned().collect::<Vec<_>>()
        {
            let _ = watcher.unwatch(&stale);
            watched.remove(&stale);
        }
        for path in map.keys() {
            if watched.insert(path.clone()) {
                if let Err(e) = watcher.watch(path, RecursiveMode::NonRecursive) {
                    tracing::debug!(path = %path.display(), error = %e, "env file watch failed");
                    watched.remove(path);
                }
            }
        }
        *self.users.lock() = map;
    }

    /// Processes currently mapped to `path` (test hook).
    pub fn users_of(&self, path: &Path) -> Vec<String> {
        self.users.lock().get(path).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
