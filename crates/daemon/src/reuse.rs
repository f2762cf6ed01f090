// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The reuse handshake: who owns a workspace session.
//!
//! A client probes the session socket with a short connect timeout. If
//! something answers, the client proxies. Otherwise it binds; losing the
//! bind race (`EADDRINUSE`) means someone else just became the daemon, so
//! probe again — a dead socket file that still refuses connections gets
//! unlinked and rebound.

use sc_core::SessionIdentity;
use std::path::Path;
use std::time::Duration;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info};

/// Connect timeout for the liveness probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

/// Outcome of the handshake.
pub enum SessionRole {
    /// This invocation bound the socket and must run the supervisor.
    Daemon(UnixListener),
    /// A live daemon answered; forward tool calls to it.
    Proxy,
}

impl SessionRole {
    pub fn is_daemon(&self) -> bool {
        matches!(self, SessionRole::Daemon(_))
    }
}

/// Whether a live daemon answers on the session socket.
pub async fn probe_daemon(identity: &SessionIdentity) -> bool {
    probe_path(&identity.socket_path()).await
}

async fn probe_path(path: &Path) -> bool {
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, UnixStream::connect(path)).await,
        Ok(Ok(_))
    )
}

/// Run the handshake for `identity`.
pub async fn claim_session(identity: &SessionIdentity) -> std::io::Result<SessionRole> {
    let path = identity.socket_path();
    if probe_path(&path).await {
        debug!(socket = %path.display(), "live daemon found; proxying");
        return Ok(SessionRole::Proxy);
    }

    match UnixListener::bind(&path) {
        Ok(listener) => {
            info!(socket = %path.display(), "bound session socket; acting as daemon");
            Ok(SessionRole::Daemon(listener))
        }
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            // Raced another invocation, or the socket file is stale.
            if probe_path(&path).await {
                debug!(socket = %path.display(), "lost bind race; proxying");
                return Ok(SessionRole::Proxy);
            }
            debug!(socket = %path.display(), "stale socket; unlinking");
            std::fs::remove_file(&path)?;
            let listener = UnixListener::bind(&path)?;
            info!(socket = %path.display(), "rebound stale session socket");
            Ok(SessionRole::Daemon(listener))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "reuse_tests.rs"]
mod tests;
