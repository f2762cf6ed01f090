// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sc_core::ProcessConfig;
use similar_asserts::assert_eq;
use std::path::Path;

fn resolved(pairs: &[(&str, &str)]) -> IndexMap<String, ResolvedProcessConfig> {
    pairs
        .iter()
        .map(|(name, command)| {
            (name.to_string(), ProcessConfig::from_command(*command).resolve(name, Path::new("/ws")))
        })
        .collect()
}

#[test]
fn empty_to_empty_is_empty() {
    let diff = diff(&IndexMap::new(), &IndexMap::new());
    assert!(diff.is_empty());
}

#[test]
fn identical_sets_produce_no_diff() {
    let old = resolved(&[("a", "x"), ("b", "y")]);
    let new = resolved(&[("a", "x"), ("b", "y")]);
    assert!(diff(&old, &new).is_empty());
}

#[test]
fn rename_is_add_plus_remove_plus_change() {
    // {a, b} -> {a', c}: b removed, c added, a changed.
    let old = resolved(&[("a", "old-cmd"), ("b", "y")]);
    let new = resolved(&[("a", "new-cmd"), ("c", "z")]);
    let out = diff(&old, &new);
    assert_eq!(out.added, vec!["c"]);
    assert_eq!(out.removed, vec!["b"]);
    assert_eq!(out.changed, vec!["a"]);
}

#[test]
fn port_change_counts_as_changed() {
    let old = resolved(&[("a", "x")]);
    let mut new = resolved(&[("a", "x")]);
    if let Some(config) = new.get_mut("a") {
        config.port = Some(8080);
    }
    assert_eq!(diff(&old, &new).changed, vec!["a"]);
}

#[test]
fn sets_are_disjoint() {
    // added, removed, and changed never overlap.
    let old = resolved(&[("a", "1"), ("b", "2"), ("c", "3")]);
    let new = resolved(&[("b", "2"), ("c", "altered"), ("d", "4")]);
    let out = diff(&old, &new);
    for name in &out.added {
        assert!(!out.removed.contains(name));
        assert!(!out.changed.contains(name));
    }
    for name in &out.removed {
        assert!(!out.changed.contains(name));
    }
    assert_eq!(out.added, vec!["d"]);
    assert_eq!(out.removed, vec!["a"]);
    assert_eq!(out.changed, vec!["c"]);
}
