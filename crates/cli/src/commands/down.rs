// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sc down` - stop the running session.

use anyhow::Result;
use serde_json::Value;
use std::path::Path;

pub async fn run(manifest_path: &Path) -> Result<()> {
    let client = super::connect(manifest_path)?;
    client.call("shutdown", Value::Null).await?;
    println!("session stopping");
    Ok(())
}
