// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observable process state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle status of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// Registered but never started, or waiting on an unresolved reference.
    Pending,
    /// Spawn requested, child not confirmed running yet.
    Starting,
    /// Child alive, readiness criterion not met yet.
    Running,
    /// Child alive and past its readiness criterion.
    Ready,
    /// Child exited unexpectedly (or spawn failed).
    Crashed,
    /// Explicitly stopped; no automatic restart until an explicit start.
    Stopped,
    /// Clean exit under `restart_policy = never`.
    Completed,
}

impl ProcessStatus {
    /// True while a child process is attached (pid must be set).
    pub fn is_active(&self) -> bool {
        matches!(self, ProcessStatus::Starting | ProcessStatus::Running | ProcessStatus::Ready)
    }

    /// True once no further transition happens without an explicit command.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            ProcessStatus::Ready
                | ProcessStatus::Stopped
                | ProcessStatus::Crashed
                | ProcessStatus::Completed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Pending => "pending",
            ProcessStatus::Starting => "starting",
            ProcessStatus::Running => "running",
            ProcessStatus::Ready => "ready",
            ProcessStatus::Crashed => "crashed",
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one process as reported to tool clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessState {
    pub name: String,
    pub status: ProcessStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthy: Option<bool>,
    #[serde(default)]
    pub restart_count: u32,
    /// Epoch ms of the most recent restart attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_restart_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exports: BTreeMap<String, String>,
}

impl ProcessState {
    /// Fresh `pending` state for a registered process.
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ProcessStatus::Pending,
            pid: None,
            port: None,
            url: None,
            healthy: None,
            restart_count: 0,
            last_restart_time: None,
            exit_code: None,
            error: None,
            exports: BTreeMap::new(),
        }
    }

    /// Recompute `url` from `port`.
    pub fn refresh_url(&mut self) {
        self.url = self.port.map(|p| format!("http://localhost:{p}"));
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
