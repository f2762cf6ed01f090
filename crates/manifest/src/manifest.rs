// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manifest document and loading.

use crate::validate::{self, ManifestError};
use indexmap::IndexMap;
use sc_core::{ProcessConfig, ResolvedProcessConfig, Settings};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default manifest file name inside a workspace.
pub const MANIFEST_FILE_NAME: &str = "sidecar.toml";

/// Session reuse policy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Reuse {
    /// Every invocation gets its own private session.
    #[default]
    Disabled,
    /// One daemon per workspace directory.
    Enabled,
    /// One daemon per (workspace directory, key) pair.
    Key(String),
}

impl Reuse {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Reuse::Disabled)
    }

    /// The extra identity component, for `Reuse::Key`.
    pub fn key(&self) -> Option<&str> {
        match self {
            Reuse::Key(key) => Some(key),
            _ => None,
        }
    }
}

/// `reuse = true | false | "name"` in TOML.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawReuse {
    Flag(bool),
    Key(String),
}

impl From<Option<RawReuse>> for Reuse {
    fn from(raw: Option<RawReuse>) -> Self {
        match raw {
            None | Some(RawReuse::Flag(false)) => Reuse::Disabled,
            Some(RawReuse::Flag(true)) => Reuse::Enabled,
            Some(RawReuse::Key(key)) => Reuse::Key(key),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
struct RawManifest {
    #[serde(default)]
    reuse: Option<RawReuse>,
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    processes: IndexMap<String, ProcessConfig>,
}

/// A validated workspace manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    /// Directory the manifest was loaded from; all relative paths resolve
    /// against it.
    pub config_dir: PathBuf,
    pub processes: IndexMap<String, ProcessConfig>,
    pub settings: Settings,
    pub reuse: Reuse,
}

impl Manifest {
    /// Load and validate the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::parse(&text, &config_dir)
    }

    /// Parse and validate manifest text against a config directory.
    pub fn parse(text: &str, config_dir: &Path) -> Result<Self, ManifestError> {
        let raw: RawManifest = toml::from_str(text)?;
        let manifest = Self {
            config_dir: config_dir.to_path_buf(),
            processes: raw.processes,
            settings: raw.settings,
            reuse: raw.reuse.into(),
        };
        validate::validate(&manifest)?;
        tracing::debug!(
            processes = manifest.processes.len(),
            reuse = manifest.reuse.is_enabled(),
            "manifest loaded"
        );
        Ok(manifest)
    }

    /// Resolve every process config against the config directory,
    /// preserving declaration order.
    pub fn resolved(&self) -> IndexMap<String, ResolvedProcessConfig> {
        self.processes
            .iter()
            .map(|(name, config)| (name.clone(), config.resolve(name, &self.config_dir)))
            .collect()
    }

    /// Processes whose declared env file is `path`.
    pub fn processes_using_env_file(&self, path: &Path) -> Vec<String> {
        self.resolved()
            .into_iter()
            .filter(|(_, c)| c.env_file.as_deref() == Some(path))
            .map(|(name, _)| name)
            .collect()
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
