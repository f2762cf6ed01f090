// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sc interact` - floating interaction panes.
//!
//! Creation is asynchronous: the daemon returns the interaction id as soon
//! as the pane is launched. Blocking is a client-side choice — `wait`
//! tails the session's events file until the matching `result` line lands,
//! which is the same channel the daemon's broker reads.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use sc_core::{EventLog, EventLogTailer, InteractionId, SessionEvent};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tail cadence while waiting on a result.
const WAIT_POLL: Duration = Duration::from_millis(500);

#[derive(Subcommand)]
pub enum InteractCommand {
    /// Launch an interaction pane and print its id
    New {
        /// Inline question schema (JSON)
        #[arg(long, conflicts_with_all = ["file", "command"])]
        schema: Option<String>,
        /// UI source file for the runner
        #[arg(long, conflicts_with = "command")]
        file: Option<PathBuf>,
        /// Raw shell command hosting its own UI
        #[arg(long)]
        command: Option<String>,
        #[arg(long)]
        title: Option<String>,
        /// Auto-cancel after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Extra JSON arguments for the runner
        #[arg(long)]
        args: Option<String>,
        /// Block until the result arrives
        #[arg(long)]
        wait: bool,
    },
    /// Wait for an interaction's result
    Wait {
        id: String,
        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Cancel an interaction
    Cancel { id: String },
}

pub async fn run(manifest_path: &Path, command: InteractCommand) -> Result<()> {
    match command {
        InteractCommand::New { schema, file, command, title, timeout_ms, args, wait } => {
            new(manifest_path, NewArgs { schema, file, command, title, timeout_ms, args, wait })
                .await
        }
        InteractCommand::Wait { id, timeout } => {
            wait_for(manifest_path, &InteractionId::new(id), timeout.map(Duration::from_secs))
                .await
        }
        InteractCommand::Cancel { id } => cancel(manifest_path, &id).await,
    }
}

struct NewArgs {
    schema: Option<String>,
    file: Option<PathBuf>,
    command: Option<String>,
    title: Option<String>,
    timeout_ms: Option<u64>,
    args: Option<String>,
    wait: bool,
}

async fn new(manifest_path: &Path, args: NewArgs) -> Result<()> {
    let schema: Option<Value> = args
        .schema
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .context("parsing --schema")?;
    let runner_args: Option<Value> = args
        .args
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .context("parsing --args")?;

    let mut params = serde_json::Map::new();
    if let Some(schema) = schema {
        params.insert("schema".into(), schema);
    }
    if let Some(file) = args.file {
        params.insert("file".into(), json!(file));
    }
    if let Some(command) = args.command {
        params.insert("command".into(), json!(command));
    }
    if let Some(title) = args.title {
        params.insert("title".into(), json!(title));
    }
    if let Some(timeout_ms) = args.timeout_ms {
        params.insert("timeout_ms".into(), json!(timeout_ms));
    }
    if let Some(runner_args) = runner_args {
        params.insert("args".into(), runner_args);
    }

    let client = super::connect(manifest_path)?;
    let created = client.call("create_interaction", Value::Object(params)).await?;
    let id = created
        .get("id")
        .and_then(Value::as_str)
        .context("daemon returned no interaction id")?
        .to_string();

    if !args.wait {
        println!("{id}");
        return Ok(());
    }
    wait_for(manifest_path, &InteractionId::new(id), None).await
}

/// Tail the events file until the result for `id` appears.
async fn wait_for(
    manifest_path: &Path,
    id: &InteractionId,
    timeout: Option<Duration>,
) -> Result<()> {
    let client = super::connect(manifest_path)?;
    let log = EventLog::at(client.events_file());

    // Tail from the beginning: a result that already landed is just the
    // first thing the tailer replays.
    let mut tailer = EventLogTailer::from_start(&log);
    let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
    loop {
        for event in tailer.poll()? {
            if event.result_id() == Some(id) {
                return print_result(&event);
            }
        }
        if let Some(deadline) = deadline {
            if tokio::time::Instant::now() >= deadline {
                bail!("timed out waiting for interaction {id}");
            }
        }
        tokio::time::sleep(WAIT_POLL).await;
    }
}

fn print_result(event: &SessionEvent) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(event)?);
    Ok(())
}

async fn cancel(manifest_path: &Path, id: &str) -> Result<()> {
    let client = super::connect(manifest_path)?;
    client.call("cancel_interaction", json!({"id": id})).await?;
    println!("cancelled {id}");
    Ok(())
}
