// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC request/response envelopes.
//!
//! Requests: `{id, method, params?}`, one JSON object per line. Responses
//! echo the id with `ok` and either `result` or `error`. Field limits are
//! enforced before dispatch; a violating request gets a failure response
//! and its connection destroyed.

use crate::wire::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum length of `id` and `method`.
pub const MAX_FIELD_LEN: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self { id: id.into(), method: method.into(), params }
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.id.is_empty() || self.id.len() > MAX_FIELD_LEN {
            return Err(ProtocolError::BadRequest(format!(
                "id must be 1..={MAX_FIELD_LEN} bytes"
            )));
        }
        if self.method.is_empty() || self.method.len() > MAX_FIELD_LEN {
            return Err(ProtocolError::BadRequest(format!(
                "method must be 1..={MAX_FIELD_LEN} bytes"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RpcResponse {
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self { id: id.into(), ok: true, result: Some(result), error: None }
    }

    pub fn failure(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self { id: id.into(), ok: false, result: None, error: Some(error.into()) }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
