// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write as _;

fn temp_log() -> (tempfile::TempDir, EventLog) {
    let dir = tempfile::tempdir().unwrap();
    let log = EventLog::in_dir(dir.path());
    (dir, log)
}

fn result_event(id: &str, action: ResultAction) -> SessionEvent {
    SessionEvent::Result {
        ts: 1,
        id: InteractionId::new(id),
        action,
        answers: None,
        result: None,
    }
}

#[test]
fn append_then_read_all() {
    let (_dir, log) = temp_log();
    log.append(&result_event("a", ResultAction::Accept)).unwrap();
    log.append(&SessionEvent::Status { ts: 2, message: Some("hi".into()), prompts: vec![] })
        .unwrap();
    let events = log.read_all().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].result_id().map(|i| i.as_str()), Some("a"));
}

#[test]
fn read_all_on_missing_file_is_empty() {
    let (_dir, log) = temp_log();
    assert!(log.read_all().unwrap().is_empty());
}

#[test]
fn append_result_is_idempotent_per_id() {
    let (_dir, log) = temp_log();
    let id = InteractionId::new("once");
    assert!(log.append_result(1, &id, ResultAction::Accept, None, None).unwrap());
    assert!(!log.append_result(2, &id, ResultAction::Cancel, None, None).unwrap());
    let results: Vec<_> =
        log.read_all().unwrap().into_iter().filter(|e| e.result_id().is_some()).collect();
    assert_eq!(results.len(), 1);
}

#[test]
fn append_result_allows_distinct_ids() {
    let (_dir, log) = temp_log();
    assert!(log
        .append_result(1, &InteractionId::new("a"), ResultAction::Accept, None, None)
        .unwrap());
    assert!(log
        .append_result(1, &InteractionId::new("b"), ResultAction::Decline, None, None)
        .unwrap());
    assert_eq!(log.read_all().unwrap().len(), 2);
}

#[test]
fn malformed_lines_are_skipped() {
    let (_dir, log) = temp_log();
    log.append(&result_event("ok", ResultAction::Accept)).unwrap();
    let mut file =
        std::fs::OpenOptions::new().append(true).open(log.path()).unwrap();
    writeln!(file, "{{not json").unwrap();
    log.append(&result_event("ok2", ResultAction::Accept)).unwrap();
    assert_eq!(log.read_all().unwrap().len(), 2);
}

#[test]
fn tailer_from_end_sees_only_new_events() {
    let (_dir, log) = temp_log();
    log.append(&result_event("old", ResultAction::Accept)).unwrap();
    let mut tailer = EventLogTailer::from_end(&log).unwrap();
    assert!(tailer.poll().unwrap().is_empty());
    log.append(&result_event("new", ResultAction::Decline)).unwrap();
    let events = tailer.poll().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].result_id().map(|i| i.as_str()), Some("new"));
}

#[test]
fn tailer_buffers_partial_lines() {
    let (_dir, log) = temp_log();
    let mut tailer = EventLogTailer::from_start(&log);
    let line = serde_json::to_string(&result_event("x", ResultAction::Accept)).unwrap();
    let (head, tail) = line.split_at(10);

    let mut file =
        std::fs::OpenOptions::new().create(true).append(true).open(log.path()).unwrap();
    file.write_all(head.as_bytes()).unwrap();
    assert!(tailer.poll().unwrap().is_empty());

    file.write_all(tail.as_bytes()).unwrap();
    file.write_all(b"\n").unwrap();
    let events = tailer.poll().unwrap();
    assert_eq!(events.len(), 1);
}

#[test]
fn tailer_resets_on_truncation() {
    let (_dir, log) = temp_log();
    log.append(&result_event("a", ResultAction::Accept)).unwrap();
    let mut tailer = EventLogTailer::from_start(&log);
    assert_eq!(tailer.poll().unwrap().len(), 1);

    std::fs::write(log.path(), b"").unwrap();
    log.append(&result_event("b", ResultAction::Accept)).unwrap();
    let events = tailer.poll().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].result_id().map(|i| i.as_str()), Some("b"));
}
