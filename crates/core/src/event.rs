// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events written to the per-session event log.
//!
//! One JSON object per line, tagged by `type`. The `result` kind is the
//! completion channel for interactions; `reload` announces manifest diffs;
//! `status` is free-form narration from children. Unknown kinds deserialize
//! to `Unknown` so old readers tolerate new writers.

use crate::InteractionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How an interaction finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultAction {
    Accept,
    Decline,
    Cancel,
    Timeout,
}

/// One line of the session event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionEvent {
    /// Terminal outcome of one interaction. At most one per id.
    Result {
        ts: u64,
        id: InteractionId,
        action: ResultAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        answers: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },

    /// Manifest reload applied by the supervisor.
    Reload {
        ts: u64,
        #[serde(default)]
        added: Vec<String>,
        #[serde(default)]
        removed: Vec<String>,
        #[serde(default)]
        changed: Vec<String>,
    },

    /// Free-form status narration from a child.
    Status {
        ts: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        prompts: Vec<String>,
    },

    /// Any event kind this reader does not know.
    #[serde(other)]
    Unknown,
}

impl SessionEvent {
    /// The interaction id, for `result` events.
    pub fn result_id(&self) -> Option<&InteractionId> {
        match self {
            SessionEvent::Result { id, .. } => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
