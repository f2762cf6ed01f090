// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interaction broker: floating UI panes that answer through the event log.
//!
//! `create` is non-blocking by contract: it launches the UI pane with
//! `INTERACTION_ID` and `EVENTS_FILE` injected and returns the fresh id
//! immediately. The child's stdout is never read; the only completion
//! channel is a `result` line in the session event log. A tailer task
//! correlates results, releases waiters, and auto-closes panes whose
//! interaction was accepted.

use parking_lot::Mutex;
use sc_core::{
    epoch_ms, EventLog, EventLogError, EventLogTailer, InteractionId, ResultAction, SessionEvent,
};
use sc_panes::{FloatingOpts, PaneError, PaneHost};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Event-log poll cadence for result correlation.
const RESULT_POLL: Duration = Duration::from_millis(500);

/// Lifecycle of one interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionStatus {
    Started,
    Completed,
    Cancelled,
    TimedOut,
}

/// What a client asked to show.
#[derive(Debug, Clone, Default)]
pub struct InteractionRequest {
    /// Question-form schema passed to the UI runner.
    pub schema: Option<Value>,
    /// A UI source file for the runner to execute.
    pub ink_file: Option<PathBuf>,
    /// A raw shell command hosting its own UI.
    pub command: Option<String>,
    pub title: Option<String>,
    pub timeout_ms: Option<u64>,
    /// Extra JSON arguments for the runner.
    pub args: Option<Value>,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("invalid interaction request: {0}")]
    InvalidRequest(String),

    #[error("no such interaction: {0}")]
    NotFound(InteractionId),

    #[error(transparent)]
    Host(#[from] PaneError),

    #[error(transparent)]
    EventLog(#[from] EventLogError),
}

/// Result of waiting on an interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// The matching `result` event.
    Result(SessionEvent),
    /// The wait deadline fired; a timeout result was emitted and the pane
    /// killed.
    TimedOut,
}

struct Pending {
    float_name: String,
    status: InteractionStatus,
    timeout: Option<JoinHandle<()>>,
}

struct BrokerInner {
    host: Arc<dyn PaneHost>,
    event_log: EventLog,
    /// UI runner command for schema/file interactions.
    runner: String,
    pending: Mutex<HashMap<InteractionId, Pending>>,
    results_tx: broadcast::Sender<SessionEvent>,
}

/// Handle to the session's interaction broker.
#[derive(Clone)]
pub struct InteractionBroker {
    inner: Arc<BrokerInner>,
}

/// Escape a string for a single-quoted shell context.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

impl InteractionBroker {
    /// Create the broker and start its result tailer.
    pub fn new(host: Arc<dyn PaneHost>, event_log: EventLog, runner: impl Into<String>) -> Self {
        let (results_tx, _) = broadcast::channel(64);
        let inner = Arc::new(BrokerInner {
            host,
            event_log,
            runner: runner.into(),
            pending: Mutex::new(HashMap::new()),
            results_tx,
        });
        let broker = Self { inner: Arc::clone(&inner) };
        tokio::spawn(broker.clone().tail_results());
        broker
    }

    /// Launch an interaction pane and return its id without waiting.
    pub async fn create(&self, request: InteractionRequest) -> Result<InteractionId, BrokerError> {
        let command = self.build_command(&request)?;
        let id = InteractionId::fresh();
        let float_name = format!("interaction-{}", &id.as_str()[..8]);

        let env = vec![
            ("INTERACTION_ID".to_string(), id.to_string()),
            (
                "EVENTS_FILE".to_string(),
                self.inner.event_log.path().to_string_lossy().into_owned(),
            ),
        ];
        let opts = FloatingOpts {
            name: float_name.clone(),
            close_on_exit: true,
            width: Some(80),
            height: Some(24),
            ..Default::default()
        };

        self.inner.host.open_floating(&command, &opts, &env).await?;
        tracing::info!(interaction = %id, pane = %float_name, "interaction started");

        let timeout = request.timeout_ms.map(|ms| {
            let broker = self.clone();
            let timeout_id = id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                broker.fire_timeout(&timeout_id).await;
            })
        });
        self.inner.pending.lock().insert(
            id.clone(),
            Pending { float_name, status: InteractionStatus::Started, timeout },
        );
        Ok(id)
    }

    /// Kill the pane and record a `cancel` result.
    pub async fn cancel(&self, id: &InteractionId) -> Result<(), BrokerError> {
        let float_name = {
            let mut pending = self.inner.pending.lock();
            let entry =
                pending.get_mut(id).ok_or_else(|| BrokerError::NotFound(id.clone()))?;
            if let Some(timer) = entry.timeout.take() {
                timer.abort();
            }
            entry.status = InteractionStatus::Cancelled;
            entry.float_name.clone()
        };
        let _ = self.inner.host.close_floating(&float_name).await;
        self.inner
            .event_log
            .append_result(epoch_ms(), id, ResultAction::Cancel, None, None)?;
        Ok(())
    }

    /// Wait until the `result` for `id` lands, bounded by `timeout`.
    ///
    /// A deadline hit emits `result{action=timeout}` and kills the pane,
    /// exactly like a configured `timeout_ms` firing.
    pub async fn wait(
        &self,
        id: &InteractionId,
        timeout: Option<Duration>,
    ) -> Result<WaitOutcome, BrokerError> {
        let mut rx = self.inner.results_tx.subscribe();

        // The result may have landed before this call.
        if let Some(event) = self.find_result(id)? {
            return Ok(WaitOutcome::Result(event));
        }

        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        loop {
            let event = match deadline {
                Some(deadline) => {
                    tokio::select! {
                        event = rx.recv() => event,
                        _ = tokio::time::sleep_until(deadline) => {
                            self.fire_timeout(id).await;
                            return Ok(WaitOutcome::TimedOut);
                        }
                    }
                }
                None => rx.recv().await,
            };
            match event {
                Ok(event) if event.result_id() == Some(id) => {
                    return Ok(WaitOutcome::Result(event))
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    if let Some(event) = self.find_result(id)? {
                        return Ok(WaitOutcome::Result(event));
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(BrokerError::InvalidRequest("broker shut down".into()))
                }
            }
        }
    }

    /// Current status of an interaction, if known.
    pub fn status(&self, id: &InteractionId) -> Option<InteractionStatus> {
        self.inner.pending.lock().get(id).map(|p| p.status)
    }

    fn find_result(&self, id: &InteractionId) -> Result<Option<SessionEvent>, BrokerError> {
        Ok(self
            .inner
            .event_log
            .read_all()?
            .into_iter()
            .find(|e| e.result_id() == Some(id)))
    }

    /// Timeout path: record the result (idempotently) and kill the pane.
    async fn fire_timeout(&self, id: &InteractionId) {
        let float_name = {
            let mut pending = self.inner.pending.lock();
            match pending.get_mut(id) {
                Some(entry) if entry.status == InteractionStatus::Started => {
                    entry.status = InteractionStatus::TimedOut;
                    // Detach rather than abort: this may BE the timer task,
                    // and aborting ourselves would cancel the cleanup below.
                    // A detached timer that fires later finds the status
                    // settled and does nothing.
                    drop(entry.timeout.take());
                    Some(entry.float_name.clone())
                }
                _ => None,
            }
        };
        let Some(float_name) = float_name else { return };

        match self
            .inner
            .event_log
            .append_result(epoch_ms(), id, ResultAction::Timeout, None, None)
        {
            Ok(true) => {
                tracing::info!(interaction = %id, "interaction timed out");
                let _ = self.inner.host.close_floating(&float_name).await;
            }
            Ok(false) => {
                // A real result raced us; the tailer will handle it.
            }
            Err(e) => tracing::warn!(interaction = %id, error = %e, "timeout emit failed"),
        }
    }

    /// Tail the event log and correlate `result` events.
    async fn tail_results(self) {
        let mut tailer = EventLogTailer::from_start(&self.inner.event_log);
        let mut ticker = tokio::time::interval(RESULT_POLL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let events = match tailer.poll() {
                Ok(events) => events,
                Err(e) => {
                    tracing::debug!(error = %e, "event log poll failed");
                    continue;
                }
            };
            for event in events {
                let SessionEvent::Result { id, action, .. } = &event else { continue };
                self.note_result(id, *action).await;
                let _ = self.inner.results_tx.send(event);
            }
        }
    }

    async fn note_result(&self, id: &InteractionId, action: ResultAction) {
        let float_name = {
            let mut pending = self.inner.pending.lock();
            let Some(entry) = pending.get_mut(id) else { return };
            if let Some(timer) = entry.timeout.take() {
                timer.abort();
            }
            entry.status = match action {
                ResultAction::Accept | ResultAction::Decline => InteractionStatus::Completed,
                ResultAction::Cancel => InteractionStatus::Cancelled,
                ResultAction::Timeout => InteractionStatus::TimedOut,
            };
            entry.float_name.clone()
        };
        // Successful interactions clean their pane up automatically.
        if action == ResultAction::Accept {
            let _ = self.inner.host.close_floating(&float_name).await;
        }
    }

    /// Build the UI child command for a request.
    fn build_command(&self, request: &InteractionRequest) -> Result<String, BrokerError> {
        if let Some(command) = &request.command {
            if request.schema.is_some() || request.ink_file.is_some() {
                return Err(BrokerError::InvalidRequest(
                    "command excludes schema and file".into(),
                ));
            }
            return Ok(command.clone());
        }

        let mut parts = vec![self.inner.runner.clone()];
        match (&request.schema, &request.ink_file) {
            (Some(schema), None) => {
                parts.push("--schema".into());
                parts.push(shell_quote(&schema.to_string()));
            }
            (None, Some(file)) => {
                parts.push("--file".into());
                parts.push(shell_quote(&file.to_string_lossy()));
            }
            (Some(_), Some(_)) => {
                return Err(BrokerError::InvalidRequest(
                    "schema and file are mutually exclusive".into(),
                ))
            }
            (None, None) => {
                return Err(BrokerError::InvalidRequest(
                    "one of schema, file, or command is required".into(),
                ))
            }
        }
        if let Some(title) = &request.title {
            parts.push("--title".into());
            parts.push(shell_quote(title));
        }
        if let Some(args) = &request.args {
            parts.push("--args".into());
            parts.push(shell_quote(&args.to_string()));
        }
        Ok(parts.join(" "))
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
