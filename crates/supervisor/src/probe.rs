// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic HTTP health probing.
//!
//! One task per probed process issues a bare HTTP/1.1 GET over a TCP
//! stream on a fixed cadence and reports health flips to the supervisor.
//! Only the status line matters: 2xx/3xx is healthy, anything else —
//! including connect failures and timeouts — is not. The first observation
//! counts as a flip so the supervisor learns the initial verdict.

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default per-request timeout.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimum probe cadence.
pub const MIN_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// A health flip observed by a probe task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthEvent {
    pub name: String,
    pub healthy: bool,
}

/// Endpoint of one probe: host, port, and request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl ProbeTarget {
    /// Build a target from a `health_check` manifest value.
    ///
    /// A bare path (`/healthz`) probes localhost on the process port; a
    /// full URL overrides host and port. `None` when the value is a path
    /// but no port is known yet.
    pub fn from_config(health_check: &str, port: Option<u16>) -> Option<Self> {
        if let Some(rest) = health_check
            .strip_prefix("http://")
            .or_else(|| health_check.strip_prefix("https://"))
        {
            let (authority, path) = match rest.find('/') {
                Some(idx) => (&rest[..idx], rest[idx..].to_string()),
                None => (rest, "/".to_string()),
            };
            let (host, explicit_port) = match authority.rsplit_once(':') {
                Some((host, port_str)) => (host.to_string(), port_str.parse::<u16>().ok()),
                None => (authority.to_string(), None),
            };
            let port = explicit_port.or(port).unwrap_or(80);
            return Some(Self { host, port, path });
        }

        let port = port?;
        let path =
            if health_check.starts_with('/') { health_check.to_string() } else { format!("/{health_check}") };
        Some(Self { host: "127.0.0.1".to_string(), port, path })
    }
}

/// One GET against the target. Healthy iff the status code is in [200, 400).
pub async fn check_once(target: &ProbeTarget, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, request_status(target)).await {
        Ok(Ok(status)) => (200..400).contains(&status),
        _ => false,
    }
}

async fn request_status(target: &ProbeTarget) -> std::io::Result<u16> {
    let mut stream = TcpStream::connect((target.host.as_str(), target.port)).await?;
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        target.path, target.host
    );
    stream.write_all(request.as_bytes()).await?;

    let mut reader = BufReader::new(stream);
    let mut status_line = String::new();
    reader.read_line(&mut status_line).await?;
    status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "bad status line"))
}

/// Spawn the probe loop for one process.
///
/// Emits on `events` whenever health flips; unknown -> first verdict counts.
/// The task runs until aborted or the receiver closes.
pub fn spawn_probe(
    name: String,
    target: ProbeTarget,
    interval: Duration,
    events: mpsc::Sender<HealthEvent>,
) -> JoinHandle<()> {
    let interval = interval.max(MIN_PROBE_INTERVAL);
    tokio::spawn(async move {
        let mut last: Option<bool> = None;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let healthy = check_once(&target, PROBE_TIMEOUT).await;
            if last != Some(healthy) {
                last = Some(healthy);
                tracing::debug!(process = %name, healthy, "health flip");
                if events.send(HealthEvent { name: name.clone(), healthy }).await.is_err() {
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
