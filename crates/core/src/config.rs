// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declared and resolved process configuration.
//!
//! `ProcessConfig` is what a manifest declares for one process.
//! `ResolvedProcessConfig` is the same data after resolution against the
//! config directory: absolute paths, normalized dependency list, and a name.
//! Reload diffing compares resolved configs by structural equality, so every
//! declared field lives on the resolved struct too.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// What to do when a supervised child exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Restart on any exit, clean or not.
    Always,
    /// Restart only on a non-zero exit.
    #[default]
    OnFailure,
    /// Never restart; a clean exit marks the process `completed`.
    Never,
}

fn default_true() -> bool {
    true
}

fn default_max_restarts() -> u32 {
    5
}

/// One process as declared in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessConfig {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default = "default_true")]
    pub auto_start: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<PathBuf>,
    /// Named regexes applied to every captured log line; capture group 1
    /// becomes the export value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stdout_pattern_vars: BTreeMap<String, String>,
    /// Export names that must all be present before the process is ready.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ready_vars: Vec<String>,
    /// Health endpoint: a full URL, or a path served on the process port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    /// Reclaim the configured port from a foreign holder before starting.
    #[serde(default)]
    pub force: bool,
}

impl ProcessConfig {
    /// Minimal config for a shell command, used heavily in tests.
    pub fn from_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            port: None,
            auto_start: true,
            env: BTreeMap::new(),
            env_file: None,
            stdout_pattern_vars: BTreeMap::new(),
            ready_vars: Vec::new(),
            health_check: None,
            depends_on: Vec::new(),
            restart_policy: RestartPolicy::default(),
            max_restarts: default_max_restarts(),
            force: false,
        }
    }

    /// Resolve against the manifest's directory: absolutize paths and
    /// normalize the dependency list.
    pub fn resolve(&self, name: &str, config_dir: &Path) -> ResolvedProcessConfig {
        let cwd = match &self.cwd {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => config_dir.join(p),
            None => config_dir.to_path_buf(),
        };
        let env_file = self.env_file.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                config_dir.join(p)
            }
        });
        let mut depends_on: Vec<String> =
            self.depends_on.iter().map(|d| d.trim().to_string()).filter(|d| !d.is_empty()).collect();
        depends_on.dedup();

        ResolvedProcessConfig {
            name: name.to_string(),
            command: self.command.clone(),
            cwd,
            port: self.port,
            auto_start: self.auto_start,
            env: self.env.clone(),
            env_file,
            stdout_pattern_vars: self.stdout_pattern_vars.clone(),
            ready_vars: self.ready_vars.clone(),
            health_check: self.health_check.clone(),
            depends_on,
            restart_policy: self.restart_policy,
            max_restarts: self.max_restarts,
            force: self.force,
        }
    }
}

/// A process config after resolution against the config directory.
///
/// Structural equality over these fields is what decides whether a reload
/// counts a process as `changed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedProcessConfig {
    pub name: String,
    pub command: String,
    /// Absolute working directory.
    pub cwd: PathBuf,
    pub port: Option<u16>,
    pub auto_start: bool,
    pub env: BTreeMap<String, String>,
    /// Absolute env-file path, when declared.
    pub env_file: Option<PathBuf>,
    pub stdout_pattern_vars: BTreeMap<String, String>,
    pub ready_vars: Vec<String>,
    pub health_check: Option<String>,
    pub depends_on: Vec<String>,
    pub restart_policy: RestartPolicy,
    pub max_restarts: u32,
    pub force: bool,
}

/// Options for one explicit start request.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Extra arguments appended to the configured command.
    pub args: Vec<String>,
    /// Env overrides layered on top of config env and env-file.
    pub env: BTreeMap<String, String>,
    /// Reclaim the port even when the config does not say `force`.
    pub force: bool,
}

/// Settings value out of its permitted range.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("settings.{field} = {value} out of range [{min}, {max}]")]
pub struct SettingsError {
    pub field: &'static str,
    pub value: u64,
    pub min: u64,
    pub max: u64,
}

macro_rules! settings_default {
    ($name:ident, $value:expr, $ty:ty) => {
        fn $name() -> $ty {
            $value
        }
    };
}

settings_default!(default_log_buffer_size, 1000, usize);
settings_default!(default_health_check_interval, 10_000, u64);
settings_default!(default_dependency_timeout, 60_000, u64);
settings_default!(default_restart_backoff_max, 30_000, u64);
settings_default!(default_process_stop_timeout, 5_000, u64);

/// Session-wide tunables from the manifest `[settings]` table.
///
/// All intervals are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Settings {
    #[serde(default = "default_log_buffer_size")]
    pub log_buffer_size: usize,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: u64,
    #[serde(default = "default_dependency_timeout")]
    pub dependency_timeout: u64,
    #[serde(default = "default_restart_backoff_max")]
    pub restart_backoff_max: u64,
    #[serde(default = "default_process_stop_timeout")]
    pub process_stop_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_buffer_size: default_log_buffer_size(),
            health_check_interval: default_health_check_interval(),
            dependency_timeout: default_dependency_timeout(),
            restart_backoff_max: default_restart_backoff_max(),
            process_stop_timeout: default_process_stop_timeout(),
        }
    }
}

impl Settings {
    /// Check every field against its permitted range.
    pub fn validate(&self) -> Result<(), SettingsError> {
        fn check(
            field: &'static str,
            value: u64,
            min: u64,
            max: u64,
        ) -> Result<(), SettingsError> {
            if (min..=max).contains(&value) {
                Ok(())
            } else {
                Err(SettingsError { field, value, min, max })
            }
        }
        check("log_buffer_size", self.log_buffer_size as u64, 100, 100_000)?;
        check("health_check_interval", self.health_check_interval, 1_000, 300_000)?;
        check("dependency_timeout", self.dependency_timeout, 1_000, 600_000)?;
        check("restart_backoff_max", self.restart_backoff_max, 1_000, 300_000)?;
        check("process_stop_timeout", self.process_stop_timeout, 1_000, 60_000)?;
        Ok(())
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval)
    }

    pub fn dependency_timeout(&self) -> Duration {
        Duration::from_millis(self.dependency_timeout)
    }

    pub fn restart_backoff_max(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_max)
    }

    pub fn process_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.process_stop_timeout)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
