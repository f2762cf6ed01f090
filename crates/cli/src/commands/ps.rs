// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sc ps` - list processes.

use crate::output;
use anyhow::Result;
use serde_json::Value;
use std::path::Path;

pub async fn run(manifest_path: &Path, json: bool) -> Result<()> {
    let client = super::connect(manifest_path)?;
    let list = client.call("list_processes", Value::Null).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    let processes = list.as_array().cloned().unwrap_or_default();
    if processes.is_empty() {
        println!("no processes");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = processes.iter().map(output::process_row).collect();
    output::print_table(&["NAME", "STATUS", "PID", "PORT", "URL", "RESTARTS"], &rows);
    Ok(())
}
