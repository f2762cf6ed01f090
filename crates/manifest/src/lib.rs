// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace manifest loading and validation.
//!
//! A manifest (`sidecar.toml`) declares the processes of one workspace,
//! session-wide settings, and the reuse policy. This crate owns the surface
//! syntax; the supervisor only ever sees validated
//! [`ResolvedProcessConfig`](sc_core::ResolvedProcessConfig) sets.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod diff;
mod envfile;
mod manifest;
mod validate;

pub use diff::{diff, ReloadDiff};
pub use envfile::{load_env_file, parse_env_str};
pub use manifest::{Manifest, Reuse, MANIFEST_FILE_NAME};
pub use validate::ManifestError;
