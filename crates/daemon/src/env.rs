// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

/// Resolve the runtime root: `SC_RUNTIME_DIR` > `XDG_STATE_HOME/sidecar` >
/// `~/.local/state/sidecar` > a tmpdir fallback.
pub fn runtime_root() -> PathBuf {
    if let Ok(dir) = std::env::var("SC_RUNTIME_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("sidecar");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/sidecar");
    }
    std::env::temp_dir().join("sidecar")
}

/// Client-side IPC call timeout.
pub fn ipc_timeout() -> Duration {
    std::env::var("SC_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Command used to render schema/file interactions.
pub fn ui_runner() -> String {
    std::env::var("SC_UI_RUNNER").unwrap_or_else(|_| "sc-ui".to_string())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
