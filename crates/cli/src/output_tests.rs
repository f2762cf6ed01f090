// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn dash_renders_missing_and_scalars() {
    let state = json!({"name": "web", "pid": 42, "ok": true});
    assert_eq!(dash(state.get("name")), "web");
    assert_eq!(dash(state.get("pid")), "42");
    assert_eq!(dash(state.get("ok")), "true");
    assert_eq!(dash(state.get("missing")), "-");
    assert_eq!(dash(Some(&json!(null))), "-");
}

#[test]
fn process_row_covers_all_columns() {
    let state = json!({
        "name": "web",
        "status": "ready",
        "pid": 4242,
        "port": 5173,
        "url": "http://localhost:5173",
        "restart_count": 1
    });
    assert_eq!(
        process_row(&state),
        vec!["web", "ready", "4242", "5173", "http://localhost:5173", "1"]
    );
}

#[test]
fn process_row_with_gaps() {
    let state = json!({"name": "db", "status": "pending", "restart_count": 0});
    assert_eq!(process_row(&state), vec!["db", "pending", "-", "-", "-", "0"]);
}
