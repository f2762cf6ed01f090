// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC client for the session daemon.
//!
//! One connection per call, newline-delimited JSON envelopes. The socket
//! path is derived from the workspace manifest the same way the daemon
//! derives it, so client and daemon always agree.

use sc_core::SessionIdentity;
use sc_daemon::{RpcRequest, RpcResponse};
use sc_manifest::Manifest;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::UnixStream;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no session is running for this workspace (start one with `sc up`)")]
    NotRunning,

    #[error("IPC error: {0}")]
    Protocol(#[from] sc_daemon::ProtocolError),

    #[error("{0}")]
    Tool(String),

    #[error("cannot resolve workspace: {0}")]
    Workspace(std::io::Error),
}

pub struct DaemonClient {
    socket: PathBuf,
    identity: SessionIdentity,
}

impl DaemonClient {
    /// Client for the session owning `manifest`'s workspace.
    pub fn for_manifest(manifest: &Manifest) -> Result<Self, ClientError> {
        let identity = SessionIdentity::derive(&manifest.config_dir, manifest.reuse.key())
            .map_err(ClientError::Workspace)?;
        Ok(Self { socket: identity.socket_path(), identity })
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// The session's events file, for client-side tailing.
    pub fn events_file(&self) -> PathBuf {
        self.identity
            .runtime_dir(&sc_daemon::env::runtime_root())
            .join(sc_core::EVENTS_FILE_NAME)
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket
    }

    /// Issue one tool call and unwrap the response envelope.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let stream = match UnixStream::connect(&self.socket).await {
            Ok(stream) => stream,
            Err(_) => return Err(ClientError::NotRunning),
        };
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let request = RpcRequest::new(uuid::Uuid::new_v4().to_string(), method, params);
        sc_daemon::write_request(&mut writer, &request).await?;
        let response: RpcResponse =
            sc_daemon::read_response(&mut reader, sc_daemon::env::ipc_timeout()).await?;

        if response.ok {
            Ok(response.result.unwrap_or(Value::Null))
        } else {
            Err(ClientError::Tool(
                response.error.unwrap_or_else(|| "unknown daemon error".to_string()),
            ))
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
