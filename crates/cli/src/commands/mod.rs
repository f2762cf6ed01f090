// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations.

pub mod down;
pub mod interact;
pub mod process;
pub mod ps;
pub mod up;

use crate::client::DaemonClient;
use anyhow::{Context, Result};
use sc_manifest::Manifest;
use std::path::Path;

/// Load the manifest and build a client for its workspace session.
pub(crate) fn connect(manifest_path: &Path) -> Result<DaemonClient> {
    let manifest = Manifest::load(manifest_path)
        .with_context(|| format!("loading {}", manifest_path.display()))?;
    Ok(DaemonClient::for_manifest(&manifest)?)
}
