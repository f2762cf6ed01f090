// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-process commands: status, logs, url, start, stop, restart.

use anyhow::{bail, Result};
use sc_core::LogStream;
use serde_json::{json, Value};
use std::path::Path;

pub async fn status(manifest_path: &Path, name: &str) -> Result<()> {
    let client = super::connect(manifest_path)?;
    let state = client.call("get_status", json!({"name": name})).await?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

pub async fn logs(
    manifest_path: &Path,
    name: &str,
    stream: LogStream,
    tail: Option<usize>,
) -> Result<()> {
    let client = super::connect(manifest_path)?;
    let mut params = json!({"name": name, "stream": stream.as_str()});
    if let Some(tail) = tail {
        params["tail"] = json!(tail);
    }
    let lines = client.call("get_logs", params).await?;
    for line in lines.as_array().cloned().unwrap_or_default() {
        if let Value::String(line) = line {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn url(manifest_path: &Path, name: &str) -> Result<()> {
    let client = super::connect(manifest_path)?;
    let result = client.call("get_url", json!({"name": name})).await?;
    match result.get("url").and_then(Value::as_str) {
        Some(url) => {
            println!("{url}");
            Ok(())
        }
        None => bail!("{name} has no URL yet (no port known)"),
    }
}

pub async fn start(
    manifest_path: &Path,
    name: &str,
    env: Vec<String>,
    force: bool,
    args: Vec<String>,
) -> Result<()> {
    let mut env_map = serde_json::Map::new();
    for pair in env {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("bad --env {pair:?}: expected KEY=VALUE");
        };
        env_map.insert(key.to_string(), Value::String(value.to_string()));
    }

    let client = super::connect(manifest_path)?;
    let state = client
        .call(
            "start_process",
            json!({"name": name, "args": args, "env": env_map, "force": force}),
        )
        .await?;
    print_transition(name, &state);
    Ok(())
}

pub async fn stop(manifest_path: &Path, name: &str) -> Result<()> {
    let client = super::connect(manifest_path)?;
    let state = client.call("stop_process", json!({"name": name})).await?;
    print_transition(name, &state);
    Ok(())
}

pub async fn restart(manifest_path: &Path, name: &str) -> Result<()> {
    let client = super::connect(manifest_path)?;
    let state = client.call("restart_process", json!({"name": name})).await?;
    print_transition(name, &state);
    Ok(())
}

fn print_transition(name: &str, state: &Value) {
    let status = state.get("status").and_then(Value::as_str).unwrap_or("unknown");
    match state.get("pid").and_then(Value::as_u64) {
        Some(pid) => println!("{name}: {status} (pid {pid})"),
        None => println!("{name}: {status}"),
    }
}
