// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

#[test]
fn push_and_tail_in_insertion_order() {
    let mut buf = LogBuffer::new(10);
    buf.push("one");
    buf.push("two");
    buf.push("three");
    assert_eq!(buf.tail(2), vec!["two", "three"]);
    assert_eq!(buf.tail(100), vec!["one", "two", "three"]);
}

#[test]
fn overflow_drops_oldest() {
    let mut buf = LogBuffer::new(3);
    for i in 0..5 {
        buf.push(format!("line-{i}"));
    }
    assert_eq!(buf.len(), 3);
    assert_eq!(buf.tail(3), vec!["line-2", "line-3", "line-4"]);
}

#[test]
fn push_lines_splits_and_drops_empties() {
    let mut buf = LogBuffer::new(10);
    buf.push_lines("a\n\nb\nc\n");
    assert_eq!(buf.tail(10), vec!["a", "b", "c"]);
}

#[test]
fn clear_empties_the_ring() {
    let mut buf = LogBuffer::new(4);
    buf.push_lines("a\nb");
    buf.clear();
    assert!(buf.is_empty());
    assert!(buf.tail(4).is_empty());
}

#[yare::parameterized(
    zero = { 0, 1 },
    one = { 1, 1 },
    huge = { 10_000, 10_000 },
)]
fn capacity_clamped_to_at_least_one(requested: usize, effective: usize) {
    assert_eq!(LogBuffer::new(requested).capacity(), effective);
}

#[test]
fn combined_interleaves_by_arrival() {
    let mut logs = ProcessLogs::new(10);
    logs.push_chunk(LogStream::Stdout, "out-1\n");
    logs.push_chunk(LogStream::Stderr, "err-1\n");
    logs.push_chunk(LogStream::Stdout, "out-2\n");
    assert_eq!(logs.tail(LogStream::Combined, 10), vec!["out-1", "err-1", "out-2"]);
    assert_eq!(logs.tail(LogStream::Stdout, 10), vec!["out-1", "out-2"]);
    assert_eq!(logs.tail(LogStream::Stderr, 10), vec!["err-1"]);
}

#[test]
fn combined_tail_limit_takes_newest() {
    let mut logs = ProcessLogs::new(10);
    logs.push_chunk(LogStream::Stdout, "a\nb\n");
    logs.push_chunk(LogStream::Stderr, "c\n");
    assert_eq!(logs.tail(LogStream::Combined, 2), vec!["b", "c"]);
}

#[test]
fn stream_tokens_round_trip() {
    for stream in [LogStream::Stdout, LogStream::Stderr, LogStream::Combined] {
        assert_eq!(LogStream::parse(stream.as_str()), Some(stream));
    }
    assert_eq!(LogStream::parse("bogus"), None);
}

proptest! {
    // The ring never exceeds its configured capacity.
    #[test]
    fn never_exceeds_capacity(cap in 1usize..64, lines in proptest::collection::vec(".{0,20}", 0..200)) {
        let mut buf = LogBuffer::new(cap);
        for line in &lines {
            buf.push_lines(line);
            prop_assert!(buf.len() <= cap);
        }
    }
}
