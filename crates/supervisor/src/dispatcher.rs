// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport-agnostic tool dispatch.
//!
//! Every externally invokable operation goes through here, whether the
//! caller sits in-process (CLI running as the daemon) or behind the IPC
//! socket (proxy mode). Typed accessors serve Rust callers; `dispatch`
//! serves wire callers with JSON params and maps every failure into a
//! [`ToolError`] the transport renders as `{ok:false,error}`.

use crate::broker::{BrokerError, InteractionBroker, InteractionRequest};
use crate::manager::{Supervisor, SupervisorError};
use sc_core::{InteractionId, LogStream, ProcessState, StartOptions};
use sc_panes::PaneError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already running: {0}")]
    AlreadyRunning(String),

    #[error("dependency not ready: {0}")]
    DependencyNotReady(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("pane host unavailable: {0}")]
    HostUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl From<SupervisorError> for ToolError {
    fn from(e: SupervisorError) -> Self {
        match e {
            SupervisorError::NotFound(name) => ToolError::NotFound(name),
            SupervisorError::AlreadyRunning(name) => ToolError::AlreadyRunning(name),
            SupervisorError::DependencyNotReady { dependency, .. }
            | SupervisorError::DependencyTimeout { dependency, .. } => {
                ToolError::DependencyNotReady(dependency)
            }
            other => ToolError::Internal(other.to_string()),
        }
    }
}

impl From<BrokerError> for ToolError {
    fn from(e: BrokerError) -> Self {
        match e {
            BrokerError::InvalidRequest(message) => ToolError::InvalidRequest(message),
            BrokerError::NotFound(id) => ToolError::NotFound(id.to_string()),
            BrokerError::Host(PaneError::HostUnavailable(message)) => {
                ToolError::HostUnavailable(message)
            }
            other => ToolError::Internal(other.to_string()),
        }
    }
}

/// The single entry point for tool calls.
#[derive(Clone)]
pub struct ToolDispatcher {
    supervisor: Supervisor,
    broker: InteractionBroker,
}

#[derive(Deserialize)]
struct NameParams {
    name: String,
}

#[derive(Deserialize)]
struct LogsParams {
    name: String,
    #[serde(default)]
    stream: Option<String>,
    #[serde(default)]
    tail: Option<usize>,
}

#[derive(Deserialize)]
struct StartParams {
    name: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    force: bool,
}

#[derive(Deserialize)]
struct CreateInteractionParams {
    #[serde(default)]
    schema: Option<Value>,
    #[serde(default)]
    file: Option<std::path::PathBuf>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
    #[serde(default)]
    args: Option<Value>,
}

#[derive(Deserialize)]
struct CancelInteractionParams {
    id: String,
}

impl ToolDispatcher {
    pub fn new(supervisor: Supervisor, broker: InteractionBroker) -> Self {
        Self { supervisor, broker }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn broker(&self) -> &InteractionBroker {
        &self.broker
    }

    pub fn list_processes(&self) -> Vec<ProcessState> {
        self.supervisor.list_processes()
    }

    pub fn get_status(&self, name: &str) -> Result<ProcessState, ToolError> {
        Ok(self.supervisor.get_status(name)?)
    }

    pub async fn get_logs(
        &self,
        name: &str,
        stream: LogStream,
        tail: Option<usize>,
    ) -> Result<Vec<String>, ToolError> {
        Ok(self.supervisor.get_logs(name, stream, tail).await?)
    }

    pub fn get_url(&self, name: &str) -> Result<Option<String>, ToolError> {
        Ok(self.supervisor.get_url(name)?)
    }

    pub async fn start_process(
        &self,
        name: &str,
        opts: StartOptions,
    ) -> Result<ProcessState, ToolError> {
        Ok(self.supervisor.start_process(name, opts).await?)
    }

    pub async fn stop_process(&self, name: &str) -> Result<ProcessState, ToolError> {
        Ok(self.supervisor.stop_process(name).await?)
    }

    pub async fn restart_process(&self, name: &str) -> Result<ProcessState, ToolError> {
        Ok(self.supervisor.restart_process(name).await?)
    }

    pub async fn create_interaction(
        &self,
        request: InteractionRequest,
    ) -> Result<InteractionId, ToolError> {
        Ok(self.broker.create(request).await?)
    }

    pub async fn cancel_interaction(&self, id: &InteractionId) -> Result<(), ToolError> {
        Ok(self.broker.cancel(id).await?)
    }

    /// Wire entry: dispatch a named method with JSON params.
    pub async fn dispatch(&self, method: &str, params: Value) -> Result<Value, ToolError> {
        match method {
            "list_processes" => Ok(json!(self.list_processes())),
            "get_status" => {
                let p: NameParams = parse(params)?;
                Ok(json!(self.get_status(&p.name)?))
            }
            "get_logs" => {
                let p: LogsParams = parse(params)?;
                let stream = match p.stream.as_deref() {
                    None => LogStream::Combined,
                    Some(s) => LogStream::parse(s).ok_or_else(|| {
                        ToolError::InvalidRequest(format!("unknown stream {s:?}"))
                    })?,
                };
                Ok(json!(self.get_logs(&p.name, stream, p.tail).await?))
            }
            "get_url" => {
                let p: NameParams = parse(params)?;
                Ok(json!({ "url": self.get_url(&p.name)? }))
            }
            "start_process" => {
                let p: StartParams = parse(params)?;
                let opts = StartOptions { args: p.args, env: p.env, force: p.force };
                Ok(json!(self.start_process(&p.name, opts).await?))
            }
            "stop_process" => {
                let p: NameParams = parse(params)?;
                Ok(json!(self.stop_process(&p.name).await?))
            }
            "restart_process" => {
                let p: NameParams = parse(params)?;
                Ok(json!(self.restart_process(&p.name).await?))
            }
            "create_interaction" => {
                let p: CreateInteractionParams = parse(params)?;
                let request = InteractionRequest {
                    schema: p.schema,
                    ink_file: p.file,
                    command: p.command,
                    title: p.title,
                    timeout_ms: p.timeout_ms,
                    args: p.args,
                };
                let id = self.create_interaction(request).await?;
                Ok(json!({ "id": id, "status": "started" }))
            }
            "cancel_interaction" => {
                let p: CancelInteractionParams = parse(params)?;
                self.cancel_interaction(&InteractionId::new(p.id)).await?;
                Ok(Value::Null)
            }
            other => Err(ToolError::InvalidRequest(format!("unknown method {other:?}"))),
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ToolError> {
    serde_json::from_value(params).map_err(|e| ToolError::InvalidRequest(e.to_string()))
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
