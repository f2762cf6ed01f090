// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structural diff between two resolved process sets.
//!
//! The supervisor applies a reload as: stop removed, stop changed,
//! re-register added and changed, start added and changed. A process counts
//! as changed only when some declared field actually differs, so a reload
//! of an untouched manifest is a no-op.

use indexmap::IndexMap;
use sc_core::ResolvedProcessConfig;
use serde::{Deserialize, Serialize};

/// Name sets produced by comparing an old and a new manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl ReloadDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Compare two resolved config sets by structural equality.
pub fn diff(
    old: &IndexMap<String, ResolvedProcessConfig>,
    new: &IndexMap<String, ResolvedProcessConfig>,
) -> ReloadDiff {
    let mut out = ReloadDiff::default();
    for (name, new_config) in new {
        match old.get(name) {
            None => out.added.push(name.clone()),
            Some(old_config) if old_config != new_config => out.changed.push(name.clone()),
            Some(_) => {}
        }
    }
    for name in old.keys() {
        if !new.contains_key(name) {
            out.removed.push(name.clone());
        }
    }
    out
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod tests;
