// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sc_panes::FakePaneHost;
use serde_json::json;

struct Harness {
    broker: InteractionBroker,
    host: FakePaneHost,
    log: EventLog,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let host = FakePaneHost::new();
    let log = EventLog::in_dir(dir.path());
    let broker = InteractionBroker::new(Arc::new(host.clone()), log.clone(), "sc-ui");
    Harness { broker, host, log, _dir: dir }
}

fn schema_request() -> InteractionRequest {
    InteractionRequest {
        schema: Some(json!({"questions": [{"question": "ok?"}]})),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn create_returns_fresh_ids_immediately() {
    let h = harness();
    let a = h.broker.create(schema_request()).await.unwrap();
    let b = h.broker.create(schema_request()).await.unwrap();
    // Distinct ids, both already registered.
    assert_ne!(a, b);
    assert_eq!(h.broker.status(&a), Some(InteractionStatus::Started));
    assert_eq!(h.broker.status(&b), Some(InteractionStatus::Started));
    assert_eq!(h.host.floating_spawns().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn create_injects_id_and_events_file() {
    let h = harness();
    let id = h.broker.create(schema_request()).await.unwrap();
    let spawn = &h.host.floating_spawns()[0];
    let get = |k: &str| spawn.env.iter().find(|(key, _)| key == k).map(|(_, v)| v.clone());
    assert_eq!(get("INTERACTION_ID"), Some(id.to_string()));
    assert_eq!(get("EVENTS_FILE"), Some(h.log.path().to_string_lossy().into_owned()));
    assert!(spawn.command.starts_with("sc-ui --schema"));
    assert!(spawn.command.contains("ok?"));
}

#[tokio::test(start_paused = true)]
async fn raw_command_is_used_verbatim() {
    let h = harness();
    let request =
        InteractionRequest { command: Some("htop".into()), ..Default::default() };
    h.broker.create(request).await.unwrap();
    assert_eq!(h.host.floating_spawns()[0].command, "htop");
}

#[tokio::test(start_paused = true)]
async fn empty_request_is_invalid() {
    let h = harness();
    let err = h.broker.create(InteractionRequest::default()).await.unwrap_err();
    assert!(matches!(err, BrokerError::InvalidRequest(_)));
    let err = h
        .broker
        .create(InteractionRequest {
            schema: Some(json!({})),
            command: Some("x".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::InvalidRequest(_)));
}

#[tokio::test(start_paused = true)]
async fn wait_sees_result_written_by_child() {
    let h = harness();
    let id = h.broker.create(schema_request()).await.unwrap();

    // The UI child appends its result to the events file.
    let log = h.log.clone();
    let child_id = id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        log.append_result(
            42,
            &child_id,
            ResultAction::Accept,
            Some(json!({"ok?": "yes"})),
            None,
        )
        .unwrap();
    });

    let outcome = h.broker.wait(&id, Some(Duration::from_secs(10))).await.unwrap();
    match outcome {
        WaitOutcome::Result(SessionEvent::Result { id: got, action, answers, .. }) => {
            assert_eq!(got, id);
            assert_eq!(action, ResultAction::Accept);
            assert_eq!(answers, Some(json!({"ok?": "yes"})));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn wait_returns_result_that_landed_earlier() {
    let h = harness();
    let id = h.broker.create(schema_request()).await.unwrap();
    h.log.append_result(1, &id, ResultAction::Decline, None, None).unwrap();
    let outcome = h.broker.wait(&id, None).await.unwrap();
    assert!(matches!(outcome, WaitOutcome::Result(SessionEvent::Result { .. })));
}

#[tokio::test(start_paused = true)]
async fn accepted_interaction_auto_closes_pane() {
    let h = harness();
    let id = h.broker.create(schema_request()).await.unwrap();
    h.log.append_result(1, &id, ResultAction::Accept, None, None).unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while h.host.closed_floats().is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "pane never closed");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(h.broker.status(&id), Some(InteractionStatus::Completed));
}

#[tokio::test(start_paused = true)]
async fn declined_interaction_keeps_pane_open() {
    let h = harness();
    let id = h.broker.create(schema_request()).await.unwrap();
    h.log.append_result(1, &id, ResultAction::Decline, None, None).unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while h.broker.status(&id) != Some(InteractionStatus::Completed) {
        assert!(tokio::time::Instant::now() < deadline, "result never correlated");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(h.host.closed_floats().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_kills_pane_and_records_result() {
    let h = harness();
    let id = h.broker.create(schema_request()).await.unwrap();
    h.broker.cancel(&id).await.unwrap();

    assert_eq!(h.broker.status(&id), Some(InteractionStatus::Cancelled));
    assert_eq!(h.host.closed_floats().len(), 1);
    let results: Vec<_> = h.log.read_all().unwrap();
    assert!(matches!(
        results.as_slice(),
        [SessionEvent::Result { action: ResultAction::Cancel, .. }]
    ));

    let unknown = InteractionId::fresh();
    assert!(matches!(
        h.broker.cancel(&unknown).await.unwrap_err(),
        BrokerError::NotFound(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn configured_timeout_emits_result_and_kills_pane() {
    let h = harness();
    let request = InteractionRequest { timeout_ms: Some(2_000), ..schema_request() };
    let id = h.broker.create(request).await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.broker.status(&id), Some(InteractionStatus::TimedOut));
    assert_eq!(h.host.closed_floats().len(), 1);
    let events = h.log.read_all().unwrap();
    assert!(matches!(
        events.as_slice(),
        [SessionEvent::Result { action: ResultAction::Timeout, .. }]
    ));
}

#[tokio::test(start_paused = true)]
async fn result_beats_timeout_exactly_once() {
    let h = harness();
    let request = InteractionRequest { timeout_ms: Some(60_000), ..schema_request() };
    let id = h.broker.create(request).await.unwrap();

    h.log.append_result(1, &id, ResultAction::Accept, None, None).unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while h.broker.status(&id) != Some(InteractionStatus::Completed) {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // Long after the would-be timeout: still exactly one result.
    tokio::time::sleep(Duration::from_secs(120)).await;
    let results: Vec<_> = h
        .log
        .read_all()
        .unwrap()
        .into_iter()
        .filter(|e| e.result_id() == Some(&id))
        .collect();
    assert_eq!(results.len(), 1);
    assert!(matches!(
        results[0],
        SessionEvent::Result { action: ResultAction::Accept, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn wait_deadline_times_the_interaction_out() {
    let h = harness();
    let id = h.broker.create(schema_request()).await.unwrap();
    let outcome = h.broker.wait(&id, Some(Duration::from_secs(2))).await.unwrap();
    assert_eq!(outcome, WaitOutcome::TimedOut);
    assert_eq!(h.broker.status(&id), Some(InteractionStatus::TimedOut));
    let events = h.log.read_all().unwrap();
    assert!(matches!(
        events.as_slice(),
        [SessionEvent::Result { action: ResultAction::Timeout, .. }]
    ));
}

#[tokio::test(start_paused = true)]
async fn results_correlate_in_completion_order() {
    let h = harness();
    let first = h.broker.create(schema_request()).await.unwrap();
    let second = h.broker.create(schema_request()).await.unwrap();

    // The second interaction completes first; the log keeps completion order.
    h.log.append_result(1, &second, ResultAction::Accept, None, None).unwrap();
    h.log.append_result(2, &first, ResultAction::Accept, None, None).unwrap();

    let events = h.log.read_all().unwrap();
    let ids: Vec<&InteractionId> = events.iter().filter_map(|e| e.result_id()).collect();
    assert_eq!(ids, vec![&second, &first]);
}
