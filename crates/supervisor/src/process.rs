// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One managed process: config, observable state, logs, and the pure parts
//! of the lifecycle (readiness rules, exit dispositions, export capture).
//!
//! The supervisor task drives these records; nothing here spawns tasks or
//! touches the pane host, which keeps the state machine unit-testable.

use crate::ports::detect_port;
use regex::Regex;
use sc_core::{
    resolve, EnvContext, LogStream, ProcessLogs, ProcessState, ProcessStatus, ResolveError,
    ResolvedProcessConfig, RestartPolicy, Settings, StartOptions,
};
use sc_panes::PaneId;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Base backoff unit for restart scheduling.
const BACKOFF_UNIT: Duration = Duration::from_millis(1000);

/// Everything the pane host needs to spawn one child.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SpawnPlan {
    pub command: String,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

/// Side effects of one captured output chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OutputSignal {
    PortDetected(u16),
    ExportsChanged,
}

/// What to do after a child exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExitDisposition {
    /// Clean exit under `never`: terminal success.
    Completed,
    /// Policy forbids a restart.
    CrashNoRestart,
    /// Restart budget exhausted.
    CrashGiveUp,
    /// Schedule a restart after the backoff.
    CrashRestart { backoff: Duration },
}

pub(crate) struct ManagedProcess {
    pub config: ResolvedProcessConfig,
    pub state: ProcessState,
    pub logs: ProcessLogs,
    pub pane: Option<PaneId>,
    env_ctx: EnvContext,
    patterns: Vec<(String, Regex)>,
    /// Backoff used for the most recent restart schedule.
    pub last_backoff: Duration,
    /// When the process last became ready, for restart-count recovery.
    pub last_ready_at: Option<Instant>,
    /// Bumped on stop/start so stale restart timers can be ignored.
    pub restart_generation: u64,
}

impl ManagedProcess {
    pub fn new(config: ResolvedProcessConfig, log_capacity: usize) -> Self {
        // The manifest validated these patterns; an invalid one here came
        // from a hand-built config and is skipped with a warning.
        let patterns = config
            .stdout_pattern_vars
            .iter()
            .filter_map(|(name, pattern)| match Regex::new(pattern) {
                Ok(re) => Some((name.clone(), re)),
                Err(e) => {
                    tracing::warn!(var = %name, error = %e, "skipping invalid stdout pattern");
                    None
                }
            })
            .collect();

        let mut state = ProcessState::pending(&config.name);
        state.port = config.port;
        state.refresh_url();

        Self {
            state,
            logs: ProcessLogs::new(log_capacity),
            pane: None,
            env_ctx: EnvContext::default(),
            patterns,
            last_backoff: Duration::ZERO,
            last_ready_at: None,
            restart_generation: 0,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn set_env_context(&mut self, ctx: EnvContext) {
        self.env_ctx = ctx;
    }

    /// Resolve command and merged environment for a spawn.
    ///
    /// Env precedence: `env_file` over `config.env`, `options.env` over
    /// both. `PORT` is injected iff a port is known.
    pub fn build_spawn(&self, options: &StartOptions) -> Result<SpawnPlan, ResolveError> {
        let ctx = self.env_ctx.with_current_port(self.state.port);

        let mut merged: BTreeMap<String, String> = self.config.env.clone();
        if let Some(env_file) = &self.config.env_file {
            match sc_manifest::load_env_file(env_file) {
                Ok(vars) => merged.extend(vars),
                Err(e) => {
                    tracing::warn!(
                        process = %self.config.name,
                        env_file = %env_file.display(),
                        error = %e,
                        "env file unreadable; continuing without it"
                    );
                }
            }
        }
        merged.extend(options.env.clone());

        let mut env = Vec::with_capacity(merged.len() + 1);
        for (key, value) in &merged {
            env.push((key.clone(), resolve(value, &ctx)?));
        }
        if let Some(port) = self.state.port {
            if !merged.contains_key("PORT") {
                env.push(("PORT".to_string(), port.to_string()));
            }
        }

        let mut command = resolve(&self.config.command, &ctx)?;
        if !options.args.is_empty() {
            command.push(' ');
            command.push_str(&options.args.join(" "));
        }

        Ok(SpawnPlan { command, cwd: self.config.cwd.clone(), env })
    }

    /// Record a successful spawn: the child is running.
    pub fn note_spawned(&mut self, pane: PaneId, pid: Option<u32>) {
        self.pane = Some(pane);
        self.state.pid = pid;
        self.state.status = ProcessStatus::Running;
        self.state.exit_code = None;
        self.state.error = None;
        self.state.healthy = None;
    }

    /// Readiness rules, in order:
    /// health probe > ready vars > known port > immediate.
    ///
    /// (`never`-policy one-shots reach readiness through `completed`, which
    /// is handled by the exit path, not here.)
    pub fn readiness_met(&self) -> bool {
        if self.config.health_check.is_some() {
            return self.state.healthy == Some(true);
        }
        if !self.config.ready_vars.is_empty() {
            return self
                .config
                .ready_vars
                .iter()
                .all(|var| self.state.exports.contains_key(var));
        }
        if self.config.port.is_some() || self.state.port.is_some() {
            return self.state.port.is_some();
        }
        if self.config.restart_policy == RestartPolicy::Never {
            // Rule 4: a one-shot is ready only once completed.
            return false;
        }
        true
    }

    /// Promote running -> ready when the criterion holds.
    ///
    /// Returns true when the transition happened.
    pub fn try_ready(&mut self, now: Instant) -> bool {
        if self.state.status != ProcessStatus::Running || !self.readiness_met() {
            return false;
        }
        self.state.status = ProcessStatus::Ready;
        self.last_ready_at = Some(now);
        true
    }

    /// Feed one captured chunk through the log ring, port detection, and
    /// the export patterns.
    pub fn apply_chunk(&mut self, stream: LogStream, text: &str) -> Vec<OutputSignal> {
        self.logs.push_chunk(stream, text);

        let mut signals = Vec::new();
        for line in text.split('\n').filter(|l| !l.is_empty()) {
            if self.state.port.is_none() {
                if let Some(port) = detect_port(line) {
                    self.state.port = Some(port);
                    self.state.refresh_url();
                    self.export("port", port.to_string());
                    signals.push(OutputSignal::PortDetected(port));
                }
            }
            for (var, pattern) in &self.patterns {
                if let Some(caps) = pattern.captures(line) {
                    if let Some(value) = caps.get(1) {
                        let var = var.clone();
                        let value = value.as_str().to_string();
                        if self.state.exports.get(&var) != Some(&value) {
                            self.state.exports.insert(var, value);
                            if !signals.contains(&OutputSignal::ExportsChanged) {
                                signals.push(OutputSignal::ExportsChanged);
                            }
                        }
                    }
                }
            }
        }
        signals
    }

    fn export(&mut self, key: &str, value: String) {
        self.state.exports.insert(key.to_string(), value);
    }

    /// Record a known port (fixed at registration or detected elsewhere).
    pub fn set_port(&mut self, port: u16) {
        self.state.port = Some(port);
        self.state.refresh_url();
        self.export("port", port.to_string());
    }

    /// Decide what a child exit means, updating recovery bookkeeping.
    ///
    /// A crash after the process stayed ready longer than the last backoff
    /// counts as a recovered run and resets the restart counter first.
    pub fn exit_disposition(
        &mut self,
        exit_code: Option<i32>,
        settings: &Settings,
        now: Instant,
    ) -> ExitDisposition {
        if let Some(ready_at) = self.last_ready_at.take() {
            if now.duration_since(ready_at) > self.last_backoff {
                self.state.restart_count = 0;
            }
        }

        let restart = match self.config.restart_policy {
            RestartPolicy::Never => {
                return if exit_code == Some(0) {
                    ExitDisposition::Completed
                } else {
                    ExitDisposition::CrashNoRestart
                }
            }
            RestartPolicy::Always => true,
            RestartPolicy::OnFailure => exit_code != Some(0),
        };
        if !restart {
            return ExitDisposition::CrashNoRestart;
        }
        if self.state.restart_count >= self.config.max_restarts {
            return ExitDisposition::CrashGiveUp;
        }

        let exp = self.state.restart_count.min(20);
        let backoff = BACKOFF_UNIT
            .saturating_mul(1u32 << exp)
            .min(settings.restart_backoff_max());
        self.last_backoff = backoff;
        ExitDisposition::CrashRestart { backoff }
    }

    pub fn note_completed(&mut self, exit_code: Option<i32>) {
        self.state.status = ProcessStatus::Completed;
        self.state.exit_code = exit_code;
        self.state.pid = None;
    }

    pub fn note_crashed(&mut self, exit_code: Option<i32>, error: Option<String>) {
        self.state.status = ProcessStatus::Crashed;
        self.state.exit_code = exit_code;
        self.state.error = error;
        self.state.pid = None;
    }

    pub fn note_stopped(&mut self) {
        self.state.status = ProcessStatus::Stopped;
        self.state.pid = None;
        self.pane = None;
        self.restart_generation += 1;
    }

    /// Record one restart attempt.
    pub fn note_restart_attempt(&mut self, epoch_ms: u64) {
        self.state.restart_count += 1;
        self.state.last_restart_time = Some(epoch_ms);
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
