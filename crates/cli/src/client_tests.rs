// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sc_core::{EventLog, ProcessConfig, Settings};
use sc_panes::FakePaneHost;
use sc_supervisor::{InteractionBroker, Supervisor, ToolDispatcher};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Manifest on disk plus a live daemon bound at its session socket.
struct Harness {
    client: DaemonClient,
    shutdown: CancellationToken,
    _dir: tempfile::TempDir,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
        let _ = std::fs::remove_file(self.client.socket_path());
    }
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("sidecar.toml"),
        "reuse = true\n[processes.web]\ncommand = \"serve\"\n",
    )
    .unwrap();
    let manifest = Manifest::load(&dir.path().join("sidecar.toml")).unwrap();
    let client = DaemonClient::for_manifest(&manifest).unwrap();

    let host = FakePaneHost::new();
    let log = EventLog::in_dir(dir.path());
    let supervisor = Supervisor::spawn(
        Arc::new(host.clone()),
        manifest.resolved(),
        Settings::default(),
        log.clone(),
    );
    let broker = InteractionBroker::new(Arc::new(host), log, "sc-ui");
    let dispatcher = ToolDispatcher::new(supervisor, broker);

    let _ = std::fs::remove_file(client.socket_path());
    let listener = tokio::net::UnixListener::bind(client.socket_path()).unwrap();
    let shutdown = CancellationToken::new();
    tokio::spawn(sc_daemon::IpcServer::new(listener, dispatcher, shutdown.clone()).run());

    Harness { client, shutdown, _dir: dir }
}

#[tokio::test]
async fn call_unwraps_success_envelope() {
    let h = harness().await;
    let list = h.client.call("list_processes", serde_json::Value::Null).await.unwrap();
    assert_eq!(list[0]["name"], "web");
}

#[tokio::test]
async fn call_surfaces_tool_errors() {
    let h = harness().await;
    let err = h.client.call("get_status", json!({"name": "ghost"})).await.unwrap_err();
    match err {
        ClientError::Tool(message) => assert!(message.contains("not found")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn missing_daemon_is_not_running() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("sidecar.toml"), "[processes.a]\ncommand = \"x\"\n").unwrap();
    let manifest = Manifest::load(&dir.path().join("sidecar.toml")).unwrap();
    let client = DaemonClient::for_manifest(&manifest).unwrap();
    let _ = std::fs::remove_file(client.socket_path());

    let err = client.call("ping", serde_json::Value::Null).await.unwrap_err();
    assert!(matches!(err, ClientError::NotRunning));
}

#[test]
fn events_file_lives_in_session_runtime_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("sidecar.toml"), "[processes.a]\ncommand = \"x\"\n").unwrap();
    let manifest = Manifest::load(&dir.path().join("sidecar.toml")).unwrap();
    let client = DaemonClient::for_manifest(&manifest).unwrap();
    let path = client.events_file();
    assert!(path.ends_with(format!("{}/events.jsonl", client.identity())));
}
