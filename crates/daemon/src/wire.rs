// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire framing for the IPC protocol.
//!
//! Wire format: one JSON object per `\n`-terminated line. A request larger
//! than [`MAX_REQUEST_SIZE`] poisons its connection; the server answers
//! with a failure envelope when it can and destroys the socket either way.

use crate::protocol::{RpcRequest, RpcResponse};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt};

/// Maximum size of one request line (1 MiB).
pub const MAX_REQUEST_SIZE: usize = 1024 * 1024;

/// Idle timeout before a connection is closed.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum concurrent connections served.
pub const MAX_CONNECTIONS: usize = 50;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("timeout")]
    Timeout,

    #[error("bad request: {0}")]
    BadRequest(String),
}

/// Read one `\n`-terminated JSON message, bounded by size and `timeout`.
pub async fn read_message<R, T>(reader: &mut R, timeout: Duration) -> Result<T, ProtocolError>
where
    R: AsyncBufReadExt + Unpin,
    T: DeserializeOwned,
{
    let mut line = Vec::with_capacity(256);
    let read = tokio::time::timeout(timeout, read_bounded_line(reader, &mut line))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    if read == 0 {
        return Err(ProtocolError::ConnectionClosed);
    }
    Ok(serde_json::from_slice(&line)?)
}

/// `read_until('\n')` that refuses to buffer more than the size cap.
async fn read_bounded_line<R: AsyncBufReadExt + Unpin>(
    reader: &mut R,
    line: &mut Vec<u8>,
) -> Result<usize, ProtocolError> {
    let mut limited = reader.take((MAX_REQUEST_SIZE + 1) as u64);
    let read = limited.read_until(b'\n', line).await?;
    if line.len() > MAX_REQUEST_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: line.len(),
            max: MAX_REQUEST_SIZE,
        });
    }
    Ok(read)
}

/// Write one message as a single JSON line.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), ProtocolError>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and validate a request.
pub async fn read_request<R: AsyncBufReadExt + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<RpcRequest, ProtocolError> {
    let request: RpcRequest = read_message(reader, timeout).await?;
    request.validate()?;
    Ok(request)
}

/// Write a request line (client side).
pub async fn write_request<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    request: &RpcRequest,
) -> Result<(), ProtocolError> {
    write_message(writer, request).await
}

/// Write a response line.
pub async fn write_response<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &RpcResponse,
) -> Result<(), ProtocolError> {
    write_message(writer, response).await
}

/// Read a response line (client side).
pub async fn read_response<R: AsyncBufReadExt + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<RpcResponse, ProtocolError> {
    read_message(reader, timeout).await
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
