// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session identity: the per-workspace reuse key.
//!
//! A session is one live supervisor for one workspace. Its identity is a
//! stable 12-hex-digit hash of the canonical config directory (plus an
//! optional reuse key), which in turn names the IPC socket and the runtime
//! directory. Two invocations in the same workspace derive the same
//! identity and therefore collide on the same socket; that collision is the
//! reuse-daemon synchronization primitive.

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Socket/pipe name prefix.
const SOCKET_PREFIX: &str = "sc";

/// Stable identity of one workspace session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentity {
    hash: String,
}

impl SessionIdentity {
    /// Derive the identity for a workspace config directory.
    ///
    /// Canonicalizes the path so invocations from different relative paths
    /// agree. `reuse_key` distinguishes deliberately separate sessions in
    /// the same directory (`reuse = "name"` in the manifest).
    pub fn derive(config_dir: &Path, reuse_key: Option<&str>) -> std::io::Result<Self> {
        let canonical = std::fs::canonicalize(config_dir)?;
        let mut input = canonical.to_string_lossy().into_owned();
        if let Some(key) = reuse_key {
            input.push(':');
            input.push_str(key);
        }
        Ok(Self::from_input(&input))
    }

    fn from_input(input: &str) -> Self {
        let digest = Sha256::digest(input.as_bytes());
        let mut hash = String::with_capacity(12);
        for byte in digest.iter().take(6) {
            hash.push_str(&format!("{byte:02x}"));
        }
        Self { hash }
    }

    /// An identity from a known hash (tests, child processes).
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }

    /// Unix socket path for this session.
    pub fn socket_path(&self) -> PathBuf {
        std::env::temp_dir().join(format!("{SOCKET_PREFIX}-{}.sock", self.hash))
    }

    /// Windows named-pipe name for this session (naming only; the
    /// transport itself is Unix-socket on supported platforms).
    pub fn pipe_name(&self) -> String {
        format!(r"\\.\pipe\{SOCKET_PREFIX}-{}", self.hash)
    }

    /// Session directory under the runtime root.
    pub fn runtime_dir(&self, runtime_root: &Path) -> PathBuf {
        runtime_root.join(&self.hash)
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hash)
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
