// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC listener: accepts connections and serves tool calls.
//!
//! One task per connection, bounded by a semaphore at [`MAX_CONNECTIONS`].
//! A connection serves any number of requests until it goes idle for
//! [`IDLE_TIMEOUT`], closes, or violates a protocol limit. `ping` and
//! `shutdown` are transport-level methods; everything else goes to the
//! tool dispatcher.

use crate::protocol::{RpcRequest, RpcResponse};
use crate::wire::{self, ProtocolError, IDLE_TIMEOUT, MAX_CONNECTIONS};
use sc_supervisor::ToolDispatcher;
use serde_json::json;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Serves one session's socket until shutdown.
pub struct IpcServer {
    listener: UnixListener,
    dispatcher: ToolDispatcher,
    shutdown: CancellationToken,
}

impl IpcServer {
    pub fn new(
        listener: UnixListener,
        dispatcher: ToolDispatcher,
        shutdown: CancellationToken,
    ) -> Self {
        Self { listener, dispatcher, shutdown }
    }

    /// Accept loop; returns when the shutdown token fires.
    pub async fn run(self) {
        let connections = Arc::new(Semaphore::new(MAX_CONNECTIONS));
        loop {
            let stream = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                },
                _ = self.shutdown.cancelled() => {
                    info!("IPC server shutting down");
                    return;
                }
            };

            let Ok(permit) = Arc::clone(&connections).try_acquire_owned() else {
                // Over the connection cap: refuse and destroy the socket.
                warn!("connection limit reached; refusing client");
                let mut stream = stream;
                let refuse = RpcResponse::failure("", "connection limit reached");
                let _ = wire::write_response(&mut stream, &refuse).await;
                continue;
            };

            let dispatcher = self.dispatcher.clone();
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = handle_connection(stream, dispatcher, shutdown).await {
                    match e {
                        ProtocolError::ConnectionClosed => debug!("client disconnected"),
                        ProtocolError::Timeout => debug!("idle connection closed"),
                        other => warn!("connection error: {other}"),
                    }
                }
            });
        }
    }
}

/// Serve requests on one connection until it closes, idles out, or breaks
/// protocol.
async fn handle_connection(
    stream: UnixStream,
    dispatcher: ToolDispatcher,
    shutdown: CancellationToken,
) -> Result<(), ProtocolError> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let request = match wire::read_request(&mut reader, IDLE_TIMEOUT).await {
            Ok(request) => request,
            Err(e @ (ProtocolError::MessageTooLarge { .. } | ProtocolError::BadRequest(_))) => {
                // Answer when possible, then destroy the connection.
                let _ = wire::write_response(
                    &mut writer,
                    &RpcResponse::failure("", e.to_string()),
                )
                .await;
                return Err(e);
            }
            Err(e @ ProtocolError::Json(_)) => {
                let _ = wire::write_response(
                    &mut writer,
                    &RpcResponse::failure("", e.to_string()),
                )
                .await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        debug!(id = %request.id, method = %request.method, "request");
        let response = handle_request(request, &dispatcher, &shutdown).await;
        wire::write_response(&mut writer, &response).await?;
    }
}

async fn handle_request(
    request: RpcRequest,
    dispatcher: &ToolDispatcher,
    shutdown: &CancellationToken,
) -> RpcResponse {
    match request.method.as_str() {
        "ping" => RpcResponse::success(request.id, json!("pong")),
        "shutdown" => {
            info!("shutdown requested over IPC");
            shutdown.cancel();
            RpcResponse::success(request.id, json!("shutting-down"))
        }
        method => match dispatcher.dispatch(method, request.params).await {
            Ok(result) => RpcResponse::success(request.id, result),
            Err(e) => RpcResponse::failure(request.id, e.to_string()),
        },
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
