// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sc_core::ProcessConfig;
use std::path::Path;

fn managed(mutate: impl FnOnce(&mut ProcessConfig)) -> ManagedProcess {
    let mut config = ProcessConfig::from_command("npm run dev");
    mutate(&mut config);
    ManagedProcess::new(config.resolve("web", Path::new("/ws")), 100)
}

fn spawned(mutate: impl FnOnce(&mut ProcessConfig)) -> ManagedProcess {
    let mut proc = managed(mutate);
    proc.note_spawned(PaneId::new("fake:1"), Some(4242));
    proc
}

#[test]
fn fresh_process_is_pending_with_fixed_port() {
    let proc = managed(|c| c.port = Some(8080));
    assert_eq!(proc.state.status, ProcessStatus::Pending);
    assert_eq!(proc.state.port, Some(8080));
    assert_eq!(proc.state.url.as_deref(), Some("http://localhost:8080"));
}

#[test]
fn readiness_rule_health_check_dominates() {
    let mut proc = spawned(|c| {
        c.health_check = Some("/healthz".into());
        c.ready_vars = vec!["token".into()];
        c.port = Some(3000);
    });
    // Port and vars alone do not make it ready while a probe is configured.
    proc.state.exports.insert("token".into(), "x".into());
    assert!(!proc.readiness_met());
    proc.state.healthy = Some(false);
    assert!(!proc.readiness_met());
    proc.state.healthy = Some(true);
    assert!(proc.readiness_met());
}

#[test]
fn readiness_rule_ready_vars() {
    let mut proc = spawned(|c| c.ready_vars = vec!["db_url".into(), "token".into()]);
    assert!(!proc.readiness_met());
    proc.state.exports.insert("db_url".into(), "postgres://".into());
    assert!(!proc.readiness_met());
    proc.state.exports.insert("token".into(), "t".into());
    assert!(proc.readiness_met());
}

#[test]
fn readiness_rule_fixed_port_is_immediate() {
    let proc = spawned(|c| c.port = Some(3000));
    assert!(proc.readiness_met());
}

#[test]
fn readiness_rule_detected_port() {
    let mut proc = spawned(|_| {});
    // No criterion configured: ready immediately after spawn.
    assert!(proc.readiness_met());
    // With a detected port it stays ready.
    proc.apply_chunk(LogStream::Stdout, "Listening on port 5173\n");
    assert!(proc.readiness_met());
    assert_eq!(proc.state.port, Some(5173));
}

#[test]
fn one_shot_is_not_ready_until_completed() {
    let proc = spawned(|c| c.restart_policy = RestartPolicy::Never);
    assert!(!proc.readiness_met());
}

#[test]
fn try_ready_promotes_only_running() {
    let mut proc = spawned(|c| c.port = Some(3000));
    assert!(proc.try_ready(Instant::now()));
    assert_eq!(proc.state.status, ProcessStatus::Ready);
    // Second call is a no-op.
    assert!(!proc.try_ready(Instant::now()));
}

#[test]
fn apply_chunk_detects_port_once_and_exports_it() {
    let mut proc = spawned(|_| {});
    let signals = proc.apply_chunk(LogStream::Stdout, "Local: http://localhost:5173/\n");
    assert_eq!(signals, vec![OutputSignal::PortDetected(5173)]);
    assert_eq!(proc.state.exports.get("port").map(String::as_str), Some("5173"));
    assert_eq!(proc.state.url.as_deref(), Some("http://localhost:5173"));

    // Later announcements do not override.
    let signals = proc.apply_chunk(LogStream::Stdout, "http://localhost:9999\n");
    assert!(signals.is_empty());
    assert_eq!(proc.state.port, Some(5173));
}

#[test]
fn fixed_port_is_never_overridden_by_logs() {
    let mut proc = spawned(|c| c.port = Some(8080));
    let signals = proc.apply_chunk(LogStream::Stdout, "http://localhost:3000\n");
    assert!(signals.is_empty());
    assert_eq!(proc.state.port, Some(8080));
}

#[test]
fn pattern_vars_capture_group_one() {
    let mut proc = spawned(|c| {
        c.stdout_pattern_vars =
            [("token".to_string(), r"auth token: (\w+)".to_string())].into_iter().collect();
    });
    let signals = proc.apply_chunk(LogStream::Stdout, "auth token: abc123\n");
    assert_eq!(signals, vec![OutputSignal::ExportsChanged]);
    assert_eq!(proc.state.exports.get("token").map(String::as_str), Some("abc123"));

    // Overwrite on a new match; no signal when the value is unchanged.
    let signals = proc.apply_chunk(LogStream::Stdout, "auth token: abc123\n");
    assert!(signals.is_empty());
    let signals = proc.apply_chunk(LogStream::Stdout, "auth token: def456\n");
    assert_eq!(signals, vec![OutputSignal::ExportsChanged]);
    assert_eq!(proc.state.exports.get("token").map(String::as_str), Some("def456"));
}

#[test]
fn logs_are_captured_per_stream() {
    let mut proc = spawned(|_| {});
    proc.apply_chunk(LogStream::Stdout, "out\n");
    proc.apply_chunk(LogStream::Stderr, "err\n");
    assert_eq!(proc.logs.tail(LogStream::Stdout, 10), vec!["out"]);
    assert_eq!(proc.logs.tail(LogStream::Stderr, 10), vec!["err"]);
    assert_eq!(proc.logs.tail(LogStream::Combined, 10), vec!["out", "err"]);
}

#[test]
fn build_spawn_env_precedence_and_port_injection() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".env"), "FROM_FILE=file\nSHARED=file\n").unwrap();

    let mut config = ProcessConfig::from_command("serve --port $PORT");
    config.port = Some(4000);
    config.env =
        [("SHARED".to_string(), "config".to_string()), ("BASE".to_string(), "c".to_string())]
            .into_iter()
            .collect();
    config.env_file = Some(dir.path().join(".env"));
    let mut proc = ManagedProcess::new(config.resolve("web", dir.path()), 100);
    proc.set_port(4000);

    let mut opts = StartOptions::default();
    opts.env.insert("SHARED".to_string(), "options".to_string());
    let plan = proc.build_spawn(&opts).unwrap();

    assert_eq!(plan.command, "serve --port 4000");
    let get = |k: &str| plan.env.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
    assert_eq!(get("SHARED"), Some("options"));
    assert_eq!(get("FROM_FILE"), Some("file"));
    assert_eq!(get("BASE"), Some("c"));
    assert_eq!(get("PORT"), Some("4000"));
}

#[test]
fn build_spawn_appends_args() {
    let proc = managed(|_| {});
    let opts = StartOptions { args: vec!["--verbose".into(), "--tag=x".into()], ..Default::default() };
    let plan = proc.build_spawn(&opts).unwrap();
    assert_eq!(plan.command, "npm run dev --verbose --tag=x");
}

#[test]
fn build_spawn_unresolved_process_reference_fails() {
    let proc = managed(|c| c.command = "connect $processes.db.port".into());
    let err = proc.build_spawn(&StartOptions::default()).unwrap_err();
    assert!(matches!(err, ResolveError::UnresolvedReference { .. }));
}

#[test]
fn build_spawn_resolves_cross_process_reference() {
    let mut proc = managed(|c| c.command = "connect $processes.db.port".into());
    let mut ctx = EnvContext::default();
    ctx.set_port("db", 5432);
    proc.set_env_context(ctx);
    let plan = proc.build_spawn(&StartOptions::default()).unwrap();
    assert_eq!(plan.command, "connect 5432");
}

#[yare::parameterized(
    never_clean    = { RestartPolicy::Never, Some(0), ExitDisposition::Completed },
    never_failed   = { RestartPolicy::Never, Some(2), ExitDisposition::CrashNoRestart },
    never_signal   = { RestartPolicy::Never, None, ExitDisposition::CrashNoRestart },
    onfail_clean   = { RestartPolicy::OnFailure, Some(0), ExitDisposition::CrashNoRestart },
    onfail_failed  = { RestartPolicy::OnFailure, Some(1), ExitDisposition::CrashRestart { backoff: Duration::from_secs(1) } },
    always_clean   = { RestartPolicy::Always, Some(0), ExitDisposition::CrashRestart { backoff: Duration::from_secs(1) } },
    always_failed  = { RestartPolicy::Always, Some(9), ExitDisposition::CrashRestart { backoff: Duration::from_secs(1) } },
)]
fn restart_policy_table(policy: RestartPolicy, exit: Option<i32>, expected: ExitDisposition) {
    let mut proc = spawned(move |c| c.restart_policy = policy);
    let got = proc.exit_disposition(exit, &Settings::default(), Instant::now());
    assert_eq!(got, expected);
}

#[test]
fn backoff_doubles_and_caps() {
    let mut settings = Settings::default();
    settings.restart_backoff_max = 4_000;
    let mut proc = spawned(|c| {
        c.restart_policy = RestartPolicy::Always;
        c.max_restarts = 10;
    });

    let mut backoffs = Vec::new();
    for _ in 0..5 {
        match proc.exit_disposition(Some(1), &settings, Instant::now()) {
            ExitDisposition::CrashRestart { backoff } => {
                backoffs.push(backoff.as_millis() as u64);
                proc.note_restart_attempt(1);
            }
            other => panic!("unexpected disposition {other:?}"),
        }
    }
    assert_eq!(backoffs, vec![1000, 2000, 4000, 4000, 4000]);
}

#[test]
fn gives_up_at_max_restarts() {
    let mut proc = spawned(|c| {
        c.restart_policy = RestartPolicy::OnFailure;
        c.max_restarts = 2;
    });
    assert!(matches!(
        proc.exit_disposition(Some(1), &Settings::default(), Instant::now()),
        ExitDisposition::CrashRestart { .. }
    ));
    proc.note_restart_attempt(1);
    assert!(matches!(
        proc.exit_disposition(Some(1), &Settings::default(), Instant::now()),
        ExitDisposition::CrashRestart { .. }
    ));
    proc.note_restart_attempt(2);
    // restart_count == max_restarts: give up without incrementing further.
    assert_eq!(proc.state.restart_count, 2);
    assert_eq!(
        proc.exit_disposition(Some(1), &Settings::default(), Instant::now()),
        ExitDisposition::CrashGiveUp
    );
}

#[test]
fn restart_count_resets_after_stable_ready_window() {
    let mut proc = spawned(|c| c.restart_policy = RestartPolicy::Always);
    let t0 = Instant::now();

    // Two crash/restart rounds.
    proc.exit_disposition(Some(1), &Settings::default(), t0);
    proc.note_restart_attempt(1);
    proc.exit_disposition(Some(1), &Settings::default(), t0);
    proc.note_restart_attempt(2);
    assert_eq!(proc.state.restart_count, 2);
    let last_backoff = proc.last_backoff;

    // Ready, then crash *after* the backoff window: counter resets.
    proc.last_ready_at = Some(t0);
    let crash_at = t0 + last_backoff + Duration::from_millis(1);
    match proc.exit_disposition(Some(1), &Settings::default(), crash_at) {
        ExitDisposition::CrashRestart { backoff } => {
            assert_eq!(backoff, Duration::from_secs(1), "reset counter means base backoff");
        }
        other => panic!("unexpected disposition {other:?}"),
    }
    assert_eq!(proc.state.restart_count, 0);
}

#[test]
fn restart_count_kept_when_crash_inside_window() {
    let mut proc = spawned(|c| c.restart_policy = RestartPolicy::Always);
    let t0 = Instant::now();
    proc.exit_disposition(Some(1), &Settings::default(), t0);
    proc.note_restart_attempt(1);

    proc.last_ready_at = Some(t0);
    // Crash again within the last backoff window: no reset.
    let crash_at = t0 + proc.last_backoff / 2;
    match proc.exit_disposition(Some(1), &Settings::default(), crash_at) {
        ExitDisposition::CrashRestart { backoff } => {
            assert_eq!(backoff, Duration::from_secs(2));
        }
        other => panic!("unexpected disposition {other:?}"),
    }
    assert_eq!(proc.state.restart_count, 1);
}

#[test]
fn stop_preserves_restart_count() {
    let mut proc = spawned(|_| {});
    proc.note_restart_attempt(1);
    proc.note_restart_attempt(2);
    proc.note_stopped();
    assert_eq!(proc.state.status, ProcessStatus::Stopped);
    assert_eq!(proc.state.restart_count, 2);
    assert!(proc.state.pid.is_none());
}
