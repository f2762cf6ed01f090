// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace scenario specs.
//!
//! End-to-end flows across the crates: manifest from disk, supervisor over
//! a fake pane host, tool calls over a real session socket, interactions
//! completing through the events file, and the reuse-daemon election.

use sc_core::{
    EventLog, EventLogTailer, InteractionId, ProcessStatus, ResultAction, SessionEvent,
    SessionIdentity, Settings,
};
use sc_daemon::{claim_session, IpcServer, RpcRequest, RpcResponse, SessionRole};
use sc_manifest::Manifest;
use sc_panes::FakePaneHost;
use sc_supervisor::{InteractionBroker, Supervisor, ToolDispatcher};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(30);
const TICK: Duration = Duration::from_millis(20);

/// A full supervisor stack for a manifest, plus an IPC server on a socket.
struct Stack {
    supervisor: Supervisor,
    host: FakePaneHost,
    log: EventLog,
    socket: std::path::PathBuf,
    shutdown: CancellationToken,
    _dir: tempfile::TempDir,
}

impl Drop for Stack {
    fn drop(&mut self) {
        self.shutdown.cancel();
        let _ = std::fs::remove_file(&self.socket);
    }
}

fn stack(manifest_text: &str) -> Stack {
    let dir = tempfile::tempdir().unwrap();
    let manifest = Manifest::parse(manifest_text, dir.path()).unwrap();
    let host = FakePaneHost::new();
    let log = EventLog::in_dir(dir.path());
    let supervisor = Supervisor::spawn(
        Arc::new(host.clone()),
        manifest.resolved(),
        manifest.settings.clone(),
        log.clone(),
    );
    let broker = InteractionBroker::new(Arc::new(host.clone()), log.clone(), "sc-ui");
    let dispatcher = ToolDispatcher::new(supervisor.clone(), broker);

    let socket = dir.path().join("session.sock");
    let listener = tokio::net::UnixListener::bind(&socket).unwrap();
    let shutdown = CancellationToken::new();
    tokio::spawn(IpcServer::new(listener, dispatcher, shutdown.clone()).run());

    Stack { supervisor, host, log, socket, shutdown, _dir: dir }
}

async fn call(socket: &Path, method: &str, params: Value) -> RpcResponse {
    let stream = UnixStream::connect(socket).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let request = RpcRequest::new(format!("spec-{method}"), method, params);
    sc_daemon::write_request(&mut writer, &request).await.unwrap();
    sc_daemon::read_response(&mut reader, Duration::from_secs(10)).await.unwrap()
}

async fn wait_until(mut pred: impl FnMut() -> bool, what: &str) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !pred() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(TICK).await;
    }
}

// Scenario: one process announcing its port becomes ready with a URL, and
// every observation is available over the wire.
#[tokio::test]
async fn ready_on_port_over_the_wire() {
    let s = stack(
        r#"
[processes.web]
command = "echo Listening on port 5173; sleep 60"
"#,
    );

    let started = call(&s.socket, "start_process", json!({"name": "web"})).await;
    assert!(started.ok, "{:?}", started.error);

    let pane = s.host.pane_for("web").unwrap();
    s.host.emit_line(&pane, "Listening on port 5173").await;
    wait_until(
        || {
            s.supervisor
                .get_process("web")
                .is_some_and(|p| p.status == ProcessStatus::Ready && p.port == Some(5173))
        },
        "web ready on 5173",
    )
    .await;

    let url = call(&s.socket, "get_url", json!({"name": "web"})).await;
    assert_eq!(url.result.unwrap()["url"], "http://localhost:5173");

    let status = call(&s.socket, "get_status", json!({"name": "web"})).await;
    let state = status.result.unwrap();
    assert_eq!(state["status"], "ready");
    assert_eq!(state["port"], 5173);
    assert_eq!(state["exports"]["port"], "5173");

    wait_until(
        || s.supervisor.get_process("web").is_some_and(|p| p.pid.is_some()),
        "pid recorded",
    )
    .await;

    let logs = call(
        &s.socket,
        "get_logs",
        json!({"name": "web", "stream": "combined", "tail": 10}),
    )
    .await;
    let lines = logs.result.unwrap();
    assert_eq!(lines[0], "Listening on port 5173");
}

// Scenario: dependency chain from manifest text, with the dependent's
// command resolved against the dependency's exports.
#[tokio::test]
async fn dependency_chain_from_manifest() {
    let s = stack(
        r#"
[processes.db]
command = "run-db"
port = 5432
ready_vars = ["port"]

[processes.api]
command = "connect $processes.db.port"
depends_on = ["db"]
"#,
    );

    s.supervisor.start_all().await.unwrap();
    wait_until(
        || {
            s.supervisor
                .get_process("api")
                .is_some_and(|p| p.status == ProcessStatus::Ready)
        },
        "api ready",
    )
    .await;

    let api_spawn = s.host.spawns().into_iter().find(|sp| sp.name == "api").unwrap();
    assert_eq!(api_spawn.command, "connect 5432");
    let db_spawn = s.host.spawns().into_iter().find(|sp| sp.name == "db").unwrap();
    assert!(db_spawn.env.iter().any(|(k, v)| k == "PORT" && v == "5432"));
}

// Scenario: interaction happy path — create over the wire, child appends
// its result line, a client-side tail sees it exactly once.
#[tokio::test]
async fn interaction_happy_path() {
    let s = stack("");

    let created = call(
        &s.socket,
        "create_interaction",
        json!({"schema": {"questions": [{"question": "ok?"}]}}),
    )
    .await;
    assert!(created.ok);
    let created = created.result.unwrap();
    assert_eq!(created["status"], "started");
    let id = InteractionId::new(created["id"].as_str().unwrap());

    // The spawned pane carries the env contract.
    let spawn = &s.host.floating_spawns()[0];
    assert!(spawn.env.iter().any(|(k, v)| k == "INTERACTION_ID" && *v == id.to_string()));
    assert!(spawn
        .env
        .iter()
        .any(|(k, v)| k == "EVENTS_FILE" && Path::new(v) == s.log.path()));

    // A waiting client tails the log from the start.
    let mut tailer = EventLogTailer::from_start(&s.log);

    // The UI child writes its one result line.
    s.log
        .append_result(
            sc_core::epoch_ms(),
            &id,
            ResultAction::Accept,
            Some(json!({"ok?": "yes"})),
            None,
        )
        .unwrap();

    let mut seen = Vec::new();
    wait_until(
        || {
            seen.extend(tailer.poll().unwrap());
            seen.iter().any(|e| e.result_id() == Some(&id))
        },
        "result event",
    )
    .await;
    let matching: Vec<_> = seen.iter().filter(|e| e.result_id() == Some(&id)).collect();
    assert_eq!(matching.len(), 1);
    match matching[0] {
        SessionEvent::Result { action, answers, .. } => {
            assert_eq!(*action, ResultAction::Accept);
            assert_eq!(answers, &Some(json!({"ok?": "yes"})));
        }
        other => panic!("unexpected event {other:?}"),
    }

    // Accepted interactions auto-clean their pane.
    wait_until(|| !s.host.closed_floats().is_empty(), "pane cleanup").await;
}

// Scenario: cancel over the wire records exactly one result.
#[tokio::test]
async fn interaction_cancel_over_the_wire() {
    let s = stack("");
    let created =
        call(&s.socket, "create_interaction", json!({"command": "htop"})).await;
    let id = created.result.unwrap()["id"].as_str().unwrap().to_string();

    let cancelled = call(&s.socket, "cancel_interaction", json!({"id": id})).await;
    assert!(cancelled.ok);

    let results: Vec<_> = s
        .log
        .read_all()
        .unwrap()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::Result { .. }))
        .collect();
    assert_eq!(results.len(), 1);
    assert!(matches!(
        results[0],
        SessionEvent::Result { action: ResultAction::Cancel, .. }
    ));
}

// Scenario: hot reload through manifests on disk.
#[tokio::test]
async fn hot_reload_from_disk() {
    let s = stack(
        r#"
[processes.a]
command = "serve-a"

[processes.b]
command = "serve-b"
"#,
    );
    s.supervisor.start_all().await.unwrap();
    wait_until(
        || {
            s.supervisor
                .get_process("a")
                .is_some_and(|p| p.status == ProcessStatus::Ready)
        },
        "initial startup",
    )
    .await;

    let manifest_path = s._dir.path().join("sidecar.toml");
    std::fs::write(
        &manifest_path,
        "[processes.a]\ncommand = \"serve-a-v2\"\n\n[processes.c]\ncommand = \"serve-c\"\n",
    )
    .unwrap();
    let new_manifest = Manifest::load(&manifest_path).unwrap();

    let reload = s.supervisor.reload(&new_manifest).await.unwrap();
    assert_eq!(reload.added, vec!["c"]);
    assert_eq!(reload.removed, vec!["b"]);
    assert_eq!(reload.changed, vec!["a"]);

    wait_until(
        || {
            s.supervisor.get_process("b").is_none()
                && s.supervisor
                    .get_process("c")
                    .is_some_and(|p| p.status == ProcessStatus::Ready)
        },
        "reload applied",
    )
    .await;

    let reload_events: Vec<_> = s
        .log
        .read_all()
        .unwrap()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::Reload { .. }))
        .collect();
    assert_eq!(reload_events.len(), 1);
}

// Scenario: two concurrent invocations in one workspace elect exactly one
// daemon; the proxy's tool call is served by the daemon's supervisor.
#[tokio::test]
async fn reuse_race_elects_one_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let unique: String = format!("race{}x", std::process::id())
        .chars()
        .chain("abcdef012345".chars())
        .filter(|c| c.is_ascii_alphanumeric())
        .take(12)
        .collect();
    let identity = SessionIdentity::from_hash(unique);

    let (first, second) = tokio::join!(claim_session(&identity), claim_session(&identity));
    let roles = [first.unwrap(), second.unwrap()];
    assert_eq!(roles.iter().filter(|r| r.is_daemon()).count(), 1);

    // The winner serves; the loser proxies a call through the socket.
    let mut listener = None;
    for role in roles {
        if let SessionRole::Daemon(l) = role {
            listener = Some(l);
        }
    }
    let host = FakePaneHost::new();
    let log = EventLog::in_dir(dir.path());
    let supervisor = Supervisor::spawn(
        Arc::new(host.clone()),
        Manifest::parse("[processes.web]\ncommand = \"serve\"\n", dir.path())
            .unwrap()
            .resolved(),
        Settings::default(),
        log.clone(),
    );
    let broker = InteractionBroker::new(Arc::new(host), log, "sc-ui");
    let dispatcher = ToolDispatcher::new(supervisor, broker);
    let shutdown = CancellationToken::new();
    tokio::spawn(IpcServer::new(listener.unwrap(), dispatcher, shutdown.clone()).run());

    let response = call(&identity.socket_path(), "list_processes", Value::Null).await;
    assert!(response.ok);
    assert_eq!(response.result.unwrap()[0]["name"], "web");

    shutdown.cancel();
    let _ = std::fs::remove_file(identity.socket_path());
}

// Double-spawn guard through the wire.
#[tokio::test]
async fn wire_start_is_idempotent_per_run() {
    let s = stack("[processes.web]\ncommand = \"serve\"\n");
    assert!(call(&s.socket, "start_process", json!({"name": "web"})).await.ok);
    let second = call(&s.socket, "start_process", json!({"name": "web"})).await;
    assert!(!second.ok);
    assert!(second.error.unwrap().contains("already running"));
    assert_eq!(s.host.spawns().len(), 1);
}
