// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Port detection from log output, and forced port reclamation.

use regex::Regex;
use std::sync::LazyLock;

// Allow expect here as the regexes are compile-time verified to be valid
#[allow(clippy::expect_used)]
static PORT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // "http://localhost:5173" and "Local: http://localhost:5173/"
        r"https?://localhost:(\d{2,5})",
        r"https?://127\.0\.0\.1:(\d{2,5})",
        // "listening on port 3000"
        r"(?i)listening on port (\d{2,5})",
        // "Server running at :8080" and friends
        r"(?i)server[^\n]*?:(\d{2,5})",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("constant regex pattern is valid"))
    .collect()
});

/// Scan one log line for a listen-port announcement.
pub fn detect_port(line: &str) -> Option<u16> {
    for pattern in PORT_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(line) {
            if let Ok(port) = caps[1].parse::<u16>() {
                if port > 0 {
                    return Some(port);
                }
            }
        }
    }
    None
}

/// Whether something is currently bound to `port` on localhost.
pub fn port_is_bound(port: u16) -> bool {
    std::net::TcpListener::bind(("127.0.0.1", port)).is_err()
}

/// Best-effort reclamation of `port` from a foreign holder.
///
/// Kills whatever `lsof` reports listening on the port, then re-checks with
/// a bind probe. Returns whether the port is free afterwards.
pub async fn free_port(port: u16) -> bool {
    if !port_is_bound(port) {
        return true;
    }
    tracing::warn!(port, "port is bound; attempting to reclaim");

    let output = tokio::process::Command::new("lsof")
        .args(["-ti", &format!(":{port}")])
        .output()
        .await;
    if let Ok(output) = output {
        for pid in String::from_utf8_lossy(&output.stdout).split_whitespace() {
            let _ = tokio::process::Command::new("kill")
                .args(["-9", pid])
                .output()
                .await;
        }
    }

    // Give the OS a moment to release the socket.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    !port_is_bound(port)
}

#[cfg(test)]
#[path = "ports_tests.rs"]
mod tests;
