// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn result_event_round_trips() {
    let event = SessionEvent::Result {
        ts: 1234,
        id: InteractionId::new("i-1"),
        action: ResultAction::Accept,
        answers: Some(serde_json::json!({"ok?": "yes"})),
        result: None,
    };
    let line = serde_json::to_string(&event).unwrap();
    assert!(line.starts_with(r#"{"type":"result""#));
    let back: SessionEvent = serde_json::from_str(&line).unwrap();
    assert_eq!(back, event);
}

#[test]
fn reload_event_carries_diff_arrays() {
    let line = r#"{"type":"reload","ts":1,"added":["c"],"removed":["b"],"changed":["a"]}"#;
    let event: SessionEvent = serde_json::from_str(line).unwrap();
    match event {
        SessionEvent::Reload { added, removed, changed, .. } => {
            assert_eq!(added, vec!["c"]);
            assert_eq!(removed, vec!["b"]);
            assert_eq!(changed, vec!["a"]);
        }
        other => panic!("expected reload, got {other:?}"),
    }
}

#[test]
fn status_event_fields_are_optional() {
    let event: SessionEvent = serde_json::from_str(r#"{"type":"status","ts":9}"#).unwrap();
    assert_eq!(event, SessionEvent::Status { ts: 9, message: None, prompts: vec![] });
}

#[test]
fn unknown_kind_is_tolerated() {
    let event: SessionEvent =
        serde_json::from_str(r#"{"type":"heartbeat","ts":1,"extra":true}"#).unwrap();
    assert_eq!(event, SessionEvent::Unknown);
}

#[yare::parameterized(
    accept  = { ResultAction::Accept, "\"accept\"" },
    decline = { ResultAction::Decline, "\"decline\"" },
    cancel  = { ResultAction::Cancel, "\"cancel\"" },
    timeout = { ResultAction::Timeout, "\"timeout\"" },
)]
fn action_tokens(action: ResultAction, json: &str) {
    assert_eq!(serde_json::to_string(&action).unwrap(), json);
}

#[test]
fn result_id_accessor() {
    let event = SessionEvent::Result {
        ts: 0,
        id: InteractionId::new("x"),
        action: ResultAction::Cancel,
        answers: None,
        result: None,
    };
    assert_eq!(event.result_id().map(|i| i.as_str()), Some("x"));
    assert!(SessionEvent::Unknown.result_id().is_none());
}
