// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared environment context for command and env-map resolution.
//!
//! The supervisor maintains one context for the whole session and re-injects
//! it into each managed process whenever a relevant input changes (a port is
//! detected, an export is produced, the manifest reloads). Resolution itself
//! lives in [`crate::resolver`].

use std::collections::{BTreeMap, HashMap};

/// Live inputs for `$processes.*`, `$PORT`, and `$VAR` resolution.
#[derive(Debug, Clone, Default)]
pub struct EnvContext {
    /// Known port per process, fixed or detected.
    pub process_ports: HashMap<String, u16>,
    /// Exported variables per process.
    pub process_exports: HashMap<String, BTreeMap<String, String>>,
    /// Snapshot of the system environment.
    pub system_env: HashMap<String, String>,
    /// Port of the process currently being resolved, when known.
    pub current_port: Option<u16>,
}

impl EnvContext {
    /// Context seeded from the real system environment.
    pub fn from_system() -> Self {
        Self { system_env: std::env::vars().collect(), ..Self::default() }
    }

    /// The same context scoped to one process's own port.
    pub fn with_current_port(&self, port: Option<u16>) -> Self {
        Self { current_port: port, ..self.clone() }
    }

    /// Look up `$processes.<name>.<var>`; `port` falls back to the
    /// port table when not exported explicitly.
    pub fn process_var(&self, name: &str, var: &str) -> Option<String> {
        if let Some(value) = self.process_exports.get(name).and_then(|m| m.get(var)) {
            return Some(value.clone());
        }
        if var == "port" {
            return self.process_ports.get(name).map(|p| p.to_string());
        }
        None
    }

    pub fn set_port(&mut self, name: &str, port: u16) {
        self.process_ports.insert(name.to_string(), port);
    }

    pub fn set_exports(&mut self, name: &str, exports: BTreeMap<String, String>) {
        self.process_exports.insert(name.to_string(), exports);
    }

    pub fn remove_process(&mut self, name: &str) {
        self.process_ports.remove(name);
        self.process_exports.remove(name);
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
