// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manifest validation.
//!
//! Everything here is fatal at load time: a manifest that fails validation
//! never reaches the supervisor, and a reload that fails keeps the previous
//! manifest in force.

use crate::Manifest;
use sc_core::SettingsError;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("invalid process name {name:?}: use letters, digits, '-' and '_'")]
    InvalidName { name: String },

    #[error("process {process:?} has an empty command")]
    EmptyCommand { process: String },

    #[error("process {process:?} depends on unknown process {target:?}")]
    UnknownDependency { process: String, target: String },

    #[error("dependency cycle: {}", chain.join(" -> "))]
    DependencyCycle { chain: Vec<String> },

    #[error("process {process:?}: env_file {path} escapes the workspace directory")]
    EnvFileEscapes { process: String, path: PathBuf },

    #[error("process {process:?}: stdout_pattern_vars.{var} is not a valid regex: {error}")]
    BadPattern { process: String, var: String, error: String },
}

pub(crate) fn validate(manifest: &Manifest) -> Result<(), ManifestError> {
    manifest.settings.validate()?;

    for (name, config) in &manifest.processes {
        if name.is_empty()
            || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ManifestError::InvalidName { name: name.clone() });
        }
        if config.command.trim().is_empty() {
            return Err(ManifestError::EmptyCommand { process: name.clone() });
        }
        for target in &config.depends_on {
            let target = target.trim();
            if !target.is_empty() && !manifest.processes.contains_key(target) {
                return Err(ManifestError::UnknownDependency {
                    process: name.clone(),
                    target: target.to_string(),
                });
            }
        }
        if let Some(env_file) = &config.env_file {
            check_env_file_containment(name, env_file, &manifest.config_dir)?;
        }
        for (var, pattern) in &config.stdout_pattern_vars {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(ManifestError::BadPattern {
                    process: name.clone(),
                    var: var.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    check_cycles(manifest)?;
    Ok(())
}

/// Reject env files that lexically escape the config directory.
///
/// The file may not exist yet, so this is a component walk rather than a
/// canonicalize: each `..` must stay inside the workspace-relative part.
fn check_env_file_containment(
    process: &str,
    env_file: &Path,
    config_dir: &Path,
) -> Result<(), ManifestError> {
    let relative = if env_file.is_absolute() {
        match env_file.strip_prefix(config_dir) {
            Ok(rel) => rel,
            Err(_) => {
                return Err(ManifestError::EnvFileEscapes {
                    process: process.to_string(),
                    path: env_file.to_path_buf(),
                })
            }
        }
    } else {
        env_file
    };

    let mut depth: i32 = 0;
    for component in relative.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return Err(ManifestError::EnvFileEscapes {
                        process: process.to_string(),
                        path: env_file.to_path_buf(),
                    });
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(ManifestError::EnvFileEscapes {
                    process: process.to_string(),
                    path: env_file.to_path_buf(),
                })
            }
        }
    }
    Ok(())
}

/// DFS cycle detection over `depends_on` edges.
fn check_cycles(manifest: &Manifest) -> Result<(), ManifestError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        name: &str,
        manifest: &Manifest,
        marks: &mut HashMap<String, Mark>,
        stack: &mut Vec<String>,
    ) -> Result<(), ManifestError> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let mut chain: Vec<String> = stack
                    .iter()
                    .skip_while(|n| n.as_str() != name)
                    .cloned()
                    .collect();
                chain.push(name.to_string());
                return Err(ManifestError::DependencyCycle { chain });
            }
            None => {}
        }
        marks.insert(name.to_string(), Mark::Visiting);
        stack.push(name.to_string());
        if let Some(config) = manifest.processes.get(name) {
            for dep in &config.depends_on {
                let dep = dep.trim();
                if !dep.is_empty() {
                    visit(dep, manifest, marks, stack)?;
                }
            }
        }
        stack.pop();
        marks.insert(name.to_string(), Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    let mut stack = Vec::new();
    for name in manifest.processes.keys() {
        visit(name, manifest, &mut marks, &mut stack)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
