// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency-ordered startup.
//!
//! Topological DFS over `depends_on` edges. Ties keep manifest declaration
//! order, so startup is deterministic. The manifest layer already rejects
//! cycles and unknown targets at load time; the check here guards the
//! supervisor against hand-built config sets.

use indexmap::IndexMap;
use sc_core::ResolvedProcessConfig;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("dependency cycle involving {0:?}")]
    Cycle(String),

    #[error("unknown dependency {target:?} of {process:?}")]
    Unknown { process: String, target: String },
}

/// Dependencies-first order over `configs`.
pub fn topo_order(
    configs: &IndexMap<String, ResolvedProcessConfig>,
) -> Result<Vec<String>, OrderError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        name: &str,
        configs: &IndexMap<String, ResolvedProcessConfig>,
        marks: &mut IndexMap<String, Mark>,
        out: &mut Vec<String>,
    ) -> Result<(), OrderError> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(OrderError::Cycle(name.to_string())),
            None => {}
        }
        marks.insert(name.to_string(), Mark::Visiting);
        let config = configs.get(name).ok_or_else(|| OrderError::Unknown {
            process: name.to_string(),
            target: name.to_string(),
        })?;
        for dep in &config.depends_on {
            if !configs.contains_key(dep) {
                return Err(OrderError::Unknown {
                    process: name.to_string(),
                    target: dep.clone(),
                });
            }
            visit(dep, configs, marks, out)?;
        }
        marks.insert(name.to_string(), Mark::Done);
        out.push(name.to_string());
        Ok(())
    }

    let mut marks = IndexMap::new();
    let mut out = Vec::with_capacity(configs.len());
    for name in configs.keys() {
        visit(name, configs, &mut marks, &mut out)?;
    }
    Ok(out)
}

#[cfg(test)]
#[path = "order_tests.rs"]
mod tests;
