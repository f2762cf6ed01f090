// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sc up` - run the workspace supervisor in the foreground.

use anyhow::{Context, Result};
use sc_daemon::{run_session, LifecycleError, SessionOptions};
use sc_manifest::Manifest;
use std::path::PathBuf;

pub async fn run(manifest_path: PathBuf, watch: bool, no_tmux: bool) -> Result<()> {
    let manifest = Manifest::load(&manifest_path)
        .with_context(|| format!("loading {}", manifest_path.display()))?;

    let process_count = manifest.processes.len();
    println!("sidecar: supervising {process_count} process(es) from {}", manifest_path.display());

    let opts = SessionOptions { manifest_path, watch, no_tmux };
    match run_session(manifest, opts).await {
        Ok(()) => Ok(()),
        Err(LifecycleError::AlreadyRunning) => {
            anyhow::bail!("a session is already running for this workspace (try `sc ps`)")
        }
        Err(e) => Err(e.into()),
    }
}
