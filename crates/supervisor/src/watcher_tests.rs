// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const SETTLE: Duration = Duration::from_secs(10);

async fn expect_event(rx: &mut mpsc::Receiver<WatchEvent>) -> WatchEvent {
    tokio::time::timeout(SETTLE, rx.recv()).await.expect("watcher timed out").expect("closed")
}

#[tokio::test]
async fn manifest_change_fires_parsed_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sidecar.toml");
    std::fs::write(&path, "[processes.a]\ncommand = \"one\"\n").unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let _watcher = spawn_config_watcher(path.clone(), tx).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    std::fs::write(&path, "[processes.a]\ncommand = \"two\"\n").unwrap();
    match expect_event(&mut rx).await {
        WatchEvent::ManifestChanged(manifest) => {
            assert_eq!(manifest.processes["a"].command, "two");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn broken_manifest_surfaces_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sidecar.toml");
    std::fs::write(&path, "[processes.a]\ncommand = \"one\"\n").unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let _watcher = spawn_config_watcher(path.clone(), tx).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    std::fs::write(&path, "processes = [broken").unwrap();
    assert!(matches!(expect_event(&mut rx).await, WatchEvent::ManifestError(_)));
}

#[tokio::test]
async fn unrelated_files_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sidecar.toml");
    std::fs::write(&path, "[processes.a]\ncommand = \"one\"\n").unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let _watcher = spawn_config_watcher(path.clone(), tx).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    std::fs::write(dir.path().join("notes.txt"), "irrelevant").unwrap();
    let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
    assert!(got.is_err(), "unexpected event {got:?}");
}

#[tokio::test]
async fn burst_of_writes_collapses_to_one_event() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sidecar.toml");
    std::fs::write(&path, "[processes.a]\ncommand = \"one\"\n").unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let _watcher = spawn_config_watcher(path.clone(), tx).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    for n in 0..5 {
        std::fs::write(&path, format!("[processes.a]\ncommand = \"v{n}\"\n")).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    let first = expect_event(&mut rx).await;
    assert!(matches!(first, WatchEvent::ManifestChanged(_)));
    // The burst collapsed: nothing else fires in the next second.
    let extra = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
    assert!(extra.is_err(), "burst produced a second event: {extra:?}");
}

#[tokio::test]
async fn env_file_watcher_maps_processes() {
    let dir = tempfile::tempdir().unwrap();
    let env_path = dir.path().join(".env");
    std::fs::write(&env_path, "A=1\n").unwrap();
    let manifest_text = r#"
[processes.api]
command = "serve"
env_file = ".env"

[processes.worker]
command = "work"
env_file = ".env"
"#;
    let manifest = Manifest::parse(manifest_text, dir.path()).unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let watcher = EnvFileWatcher::new(tx).unwrap();
    watcher.update(&manifest);
    assert_eq!(watcher.users_of(&env_path), vec!["api", "worker"]);
    tokio::time::sleep(Duration::from_millis(200)).await;

    std::fs::write(&env_path, "A=2\n").unwrap();
    match expect_event(&mut rx).await {
        WatchEvent::EnvFilesChanged { mut processes } => {
            processes.sort();
            assert_eq!(processes, vec!["api", "worker"]);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn env_file_watch_set_follows_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let old_env = dir.path().join("old.env");
    let new_env = dir.path().join("new.env");
    std::fs::write(&old_env, "A=1\n").unwrap();
    std::fs::write(&new_env, "B=1\n").unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let watcher = EnvFileWatcher::new(tx).unwrap();
    let old_manifest = Manifest::parse(
        "[processes.a]\ncommand = \"x\"\nenv_file = \"old.env\"\n",
        dir.path(),
    )
    .unwrap();
    watcher.update(&old_manifest);

    let new_manifest = Manifest::parse(
        "[processes.a]\ncommand = \"x\"\nenv_file = \"new.env\"\n",
        dir.path(),
    )
    .unwrap();
    watcher.update(&new_manifest);
    assert!(watcher.users_of(&old_env).is_empty());
    assert_eq!(watcher.users_of(&new_env), vec!["a"]);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Only the new file is live.
    std::fs::write(&old_env, "A=2\n").unwrap();
    std::fs::write(&new_env, "B=2\n").unwrap();
    match expect_event(&mut rx).await {
        WatchEvent::EnvFilesChanged { processes } => assert_eq!(processes, vec!["a"]),
        other => panic!("unexpected event {other:?}"),
    }
}
