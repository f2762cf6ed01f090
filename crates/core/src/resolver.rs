// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment reference resolution for commands and env maps.
//!
//! Substitution order in a string:
//! 1. `$processes.<name>.<var>` — exports of another process, `port`
//!    falling back to the shared port table. Missing is an error.
//! 2. `$PORT` / `${PORT}` — the current process's own port. Missing is an
//!    error.
//! 3. `${VAR}` then `$VAR` — system environment; missing expands to the
//!    empty string. A literal `$processes` left over from step 1 is never
//!    re-matched here.

use crate::EnvContext;
use regex::{Captures, Regex};
use std::sync::LazyLock;
use thiserror::Error;

// Allow expect here as the regexes are compile-time verified to be valid
#[allow(clippy::expect_used)]
static PROCESS_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$processes\.([A-Za-z_][A-Za-z0-9_-]*)\.([A-Za-z_][A-Za-z0-9_]*)")
        .expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static PORT_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{PORT\}|\$PORT\b").expect("constant regex pattern is valid"));

#[allow(clippy::expect_used)]
static BRACED_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static BARE_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("constant regex pattern is valid")
});

/// A reference that cannot be satisfied from the current context.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unresolved reference $processes.{process}.{var}")]
    UnresolvedReference { process: String, var: String },

    #[error("unresolved reference $PORT: no port assigned")]
    PortUnavailable,
}

/// Expand every reference in `input` against `ctx`.
pub fn resolve(input: &str, ctx: &EnvContext) -> Result<String, ResolveError> {
    let step1 = replace_with(&PROCESS_REF, input, |caps| {
        let process = &caps[1];
        let var = &caps[2];
        ctx.process_var(process, var).ok_or_else(|| ResolveError::UnresolvedReference {
            process: process.to_string(),
            var: var.to_string(),
        })
    })?;

    let step2 = replace_with(&PORT_REF, &step1, |_| {
        ctx.current_port.map(|p| p.to_string()).ok_or(ResolveError::PortUnavailable)
    })?;

    let step3 = BRACED_VAR.replace_all(&step2, |caps: &Captures<'_>| {
        ctx.system_env.get(&caps[1]).cloned().unwrap_or_default()
    });

    let step4 = BARE_VAR.replace_all(&step3, |caps: &Captures<'_>| {
        let name = &caps[1];
        if name == "processes" {
            // A malformed $processes reference survived step 1; leave it
            // literal rather than expanding to the empty string.
            caps[0].to_string()
        } else {
            ctx.system_env.get(name).cloned().unwrap_or_default()
        }
    });

    Ok(step4.into_owned())
}

/// Like [`resolve`], but `None` on an unresolved reference.
///
/// Used when previewing a command whose dependencies are not ready yet.
pub fn try_resolve(input: &str, ctx: &EnvContext) -> Option<String> {
    resolve(input, ctx).ok()
}

/// `Regex::replace_all` with a fallible replacement closure.
fn replace_with(
    re: &Regex,
    input: &str,
    mut repl: impl FnMut(&Captures<'_>) -> Result<String, ResolveError>,
) -> Result<String, ResolveError> {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in re.captures_iter(input) {
        // Index 0 always exists for a match
        #[allow(clippy::expect_used)]
        let m = caps.get(0).expect("capture group 0 is the whole match");
        out.push_str(&input[last..m.start()]);
        out.push_str(&repl(&caps)?);
        last = m.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
