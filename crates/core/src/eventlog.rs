// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only JSON-lines event log, one file per session.
//!
//! The file is the session's completion/notification bus: any process that
//! knows the path may append (children, interaction UIs, the supervisor),
//! and any number of readers may tail it. There is no in-memory custodian;
//! the filesystem is the ground truth.
//!
//! Writers append each event as one line in a single `write` on an
//! `O_APPEND` handle, which POSIX keeps atomic at these sizes. Readers poll
//! the file length and buffer partial trailing lines until the newline
//! arrives.

use crate::{InteractionId, ResultAction, SessionEvent};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name inside the session runtime directory.
pub const EVENTS_FILE_NAME: &str = "events.jsonl";

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("event log IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("event encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Handle to a session's `events.jsonl`.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    /// The event log inside `session_dir`.
    pub fn in_dir(session_dir: &Path) -> Self {
        Self { path: session_dir.join(EVENTS_FILE_NAME) }
    }

    /// A log at an explicit path (children receive it via `EVENTS_FILE`).
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a single line.
    pub fn append(&self, event: &SessionEvent) -> Result<(), EventLogError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        // One write call per event keeps the append atomic under POSIX.
        file.write_all(line.as_bytes()).map_err(|e| self.io_err(e))?;
        Ok(())
    }

    /// Append a `result` event unless one with this id already exists.
    ///
    /// Returns `true` when the event was written, `false` when a result for
    /// the id was already present and the new event was dropped. This is
    /// what keeps at-most-one `result` per interaction even if a UI writes
    /// twice on exit.
    pub fn append_result(
        &self,
        ts: u64,
        id: &InteractionId,
        action: ResultAction,
        answers: Option<Value>,
        result: Option<Value>,
    ) -> Result<bool, EventLogError> {
        if self.has_result(id)? {
            return Ok(false);
        }
        self.append(&SessionEvent::Result {
            ts,
            id: id.clone(),
            action,
            answers,
            result,
        })?;
        Ok(true)
    }

    /// Whether a `result` event with this id exists.
    pub fn has_result(&self, id: &InteractionId) -> Result<bool, EventLogError> {
        Ok(self.read_all()?.iter().rev().any(|e| e.result_id() == Some(id)))
    }

    /// Every parseable event currently in the file.
    ///
    /// Malformed and partial trailing lines are skipped.
    pub fn read_all(&self) -> Result<Vec<SessionEvent>, EventLogError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        Ok(parse_lines(&text))
    }

    fn io_err(&self, source: std::io::Error) -> EventLogError {
        EventLogError::Io { path: self.path.clone(), source }
    }
}

fn parse_lines(text: &str) -> Vec<SessionEvent> {
    text.split('\n')
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| match serde_json::from_str(l) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable event line");
                None
            }
        })
        .collect()
}

/// Incremental reader over an event log.
///
/// Remembers a byte offset and a partial trailing line between polls, so a
/// writer mid-append never corrupts a read.
#[derive(Debug)]
pub struct EventLogTailer {
    path: PathBuf,
    offset: u64,
    partial: String,
}

impl EventLogTailer {
    /// Tail from the beginning of the file.
    pub fn from_start(log: &EventLog) -> Self {
        Self { path: log.path().to_path_buf(), offset: 0, partial: String::new() }
    }

    /// Tail only events appended after this call.
    pub fn from_end(log: &EventLog) -> Result<Self, EventLogError> {
        let offset = match std::fs::metadata(log.path()) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(EventLogError::Io { path: log.path().to_path_buf(), source: e }),
        };
        Ok(Self { path: log.path().to_path_buf(), offset, partial: String::new() })
    }

    /// Read any complete events appended since the last poll.
    pub fn poll(&mut self) -> Result<Vec<SessionEvent>, EventLogError> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        let len = file.metadata().map_err(|e| self.io_err(e))?.len();
        if len < self.offset {
            // File was truncated or replaced; start over.
            self.offset = 0;
            self.partial.clear();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset)).map_err(|e| self.io_err(e))?;
        let mut chunk = String::new();
        file.take(len - self.offset).read_to_string(&mut chunk).map_err(|e| self.io_err(e))?;
        self.offset = len;

        self.partial.push_str(&chunk);
        let complete = match self.partial.rfind('\n') {
            Some(pos) => {
                let rest = self.partial.split_off(pos + 1);
                std::mem::replace(&mut self.partial, rest)
            }
            None => return Ok(Vec::new()),
        };
        Ok(parse_lines(&complete))
    }

    fn io_err(&self, source: std::io::Error) -> EventLogError {
        EventLogError::Io { path: self.path.clone(), source }
    }
}

#[cfg(test)]
#[path = "eventlog_tests.rs"]
mod tests;
