// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pane hosts: where supervised children actually run.
//!
//! A pane is an abstract container that runs one child with stdout/stderr
//! visible to the user. The supervisor and the interaction broker only ever
//! talk to the [`PaneHost`] trait; the variants are a tmux session
//! ([`TmuxHost`]), plain host processes with terminal windows for floating
//! panes ([`TerminalWindowHost`]), and a scripted fake for tests
//! ([`FakePaneHost`]).
//!
//! Every pane is remain-on-exit: a dead child leaves a pollable corpse with
//! an exit status until the supervisor reconciles it.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod fake;
mod tailer;
mod tmux;
mod window;

pub use fake::FakePaneHost;
pub use tmux::TmuxHost;
pub use window::TerminalWindowHost;

use async_trait::async_trait;
use sc_core::LogStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;

/// Identifier of one pane within a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaneId(pub String);

impl PaneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A live pane as returned by spawn operations.
#[derive(Debug, Clone)]
pub struct Pane {
    pub id: PaneId,
    /// Pid of the child inside the pane, when the host can tell.
    pub pid: Option<u32>,
}

/// Result of one host poll for one pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneStatus {
    pub id: PaneId,
    /// The child inside the pane has exited (the pane itself remains).
    pub dead: bool,
    pub exit_code: Option<i32>,
    /// The pane is gone entirely (user closed it).
    pub gone: bool,
}

/// One chunk of captured output from a pane.
#[derive(Debug, Clone)]
pub struct PaneOutput {
    pub pane: PaneId,
    pub stream: LogStream,
    pub chunk: String,
}

/// Geometry and lifetime hints for a floating pane.
///
/// Hosts without geometry support ignore the hints; callers can check
/// [`PaneHost::supports_geometry`].
#[derive(Debug, Clone, Default)]
pub struct FloatingOpts {
    /// Stable name used later by `close_floating`.
    pub name: String,
    pub cwd: Option<PathBuf>,
    pub width: Option<u16>,
    pub height: Option<u16>,
    pub x: Option<u16>,
    pub y: Option<u16>,
    /// Close the pane as soon as the child exits.
    pub close_on_exit: bool,
}

#[derive(Debug, Error)]
pub enum PaneError {
    #[error("pane host unavailable: {0}")]
    HostUnavailable(String),

    #[error("pane not found: {0}")]
    NotFound(String),

    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("host command failed: {0}")]
    CommandFailed(String),
}

/// Abstraction over the terminal multiplexer.
///
/// All operations may suspend. Implementations are shared by reference and
/// immutable after construction; interior state lives behind locks.
#[async_trait]
pub trait PaneHost: Send + Sync {
    /// Spawn `command` in a new pane named `name`, wiring captured output
    /// chunks into `output`. Re-creating the first pane of a fresh session
    /// reuses the session's placeholder pane.
    async fn create_pane(
        &self,
        name: &str,
        command: &str,
        cwd: &Path,
        env: &[(String, String)],
        output: mpsc::Sender<PaneOutput>,
    ) -> Result<Pane, PaneError>;

    /// Kill whatever runs in the pane and start a new child in its place.
    async fn respawn_pane(
        &self,
        id: &PaneId,
        command: &str,
        cwd: &Path,
        env: &[(String, String)],
        output: mpsc::Sender<PaneOutput>,
    ) -> Result<Pane, PaneError>;

    async fn kill_pane(&self, id: &PaneId) -> Result<(), PaneError>;

    async fn send_interrupt(&self, id: &PaneId) -> Result<(), PaneError>;

    /// The last `lines` lines of the pane's screen.
    async fn capture_pane(&self, id: &PaneId, lines: u32) -> Result<String, PaneError>;

    /// Open a floating pane for an interaction UI. Non-blocking: returns as
    /// soon as the child is launched.
    async fn open_floating(
        &self,
        command: &str,
        opts: &FloatingOpts,
        env: &[(String, String)],
    ) -> Result<Pane, PaneError>;

    /// Close a floating pane by its `FloatingOpts::name`.
    async fn close_floating(&self, name: &str) -> Result<(), PaneError>;

    /// Status of every pane this host knows about.
    async fn poll(&self) -> Result<Vec<PaneStatus>, PaneError>;

    /// Whether `open_floating` honours geometry hints.
    fn supports_geometry(&self) -> bool;
}
