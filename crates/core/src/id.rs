// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interaction identifier type.
//!
//! An InteractionId names one floating-pane interaction for the lifetime of
//! the session. It is minted by the broker and travels to the UI child via
//! the `INTERACTION_ID` environment variable; the child echoes it back in
//! the `result` event it appends to the event log.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an interaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InteractionId(pub String);

impl InteractionId {
    /// Mint a fresh id. Two calls never return the same id.
    pub fn fresh() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Create an InteractionId from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InteractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for InteractionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InteractionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for InteractionId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
