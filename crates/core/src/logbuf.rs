// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded in-memory log rings for supervised processes.
//!
//! Each process keeps one ring per output stream. Writes never block and
//! never grow past the configured capacity; the oldest line is dropped on
//! overflow. Lines carry an arrival sequence number so the combined view
//! can interleave stdout and stderr in arrival order.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Which output stream a log line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
    /// Both streams, interleaved in arrival order.
    Combined,
}

impl LogStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStream::Stdout => "stdout",
            LogStream::Stderr => "stderr",
            LogStream::Combined => "combined",
        }
    }

    /// Parse a lowercase stream token.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stdout" => Some(LogStream::Stdout),
            "stderr" => Some(LogStream::Stderr),
            "combined" => Some(LogStream::Combined),
            _ => None,
        }
    }
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured line with its arrival sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub seq: u64,
    pub text: String,
}

/// Fixed-capacity ring of text lines.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    capacity: usize,
    next_seq: u64,
    lines: VecDeque<LogLine>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), next_seq: 0, lines: VecDeque::new() }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Append one line, dropping the oldest line on overflow.
    pub fn push(&mut self, line: impl Into<String>) {
        let seq = self.next_seq;
        self.push_at(seq, line);
    }

    /// Append one line with an externally assigned arrival sequence.
    ///
    /// Used when two buffers share one arrival counter so their contents
    /// can be merged in order. `seq` must be monotonic across calls.
    pub fn push_at(&mut self, seq: u64, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(LogLine { seq, text: line.into() });
        self.next_seq = seq + 1;
    }

    /// Split `text` on newlines and append every non-empty line.
    pub fn push_lines(&mut self, text: &str) {
        for line in text.split('\n') {
            if !line.is_empty() {
                self.push(line);
            }
        }
    }

    /// Up to the `n` most recent lines, in insertion order.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(skip).map(|l| l.text.clone()).collect()
    }

    /// Like [`tail`](Self::tail), but keeps sequence numbers.
    pub fn tail_lines(&self, n: usize) -> Vec<LogLine> {
        let skip = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

/// Per-process pair of stdout/stderr rings sharing one arrival counter.
#[derive(Debug)]
pub struct ProcessLogs {
    seq: u64,
    stdout: LogBuffer,
    stderr: LogBuffer,
}

impl ProcessLogs {
    pub fn new(capacity: usize) -> Self {
        Self { seq: 0, stdout: LogBuffer::new(capacity), stderr: LogBuffer::new(capacity) }
    }

    /// Append a chunk of output to the given stream, splitting on newlines
    /// and dropping empty lines. `Combined` chunks are recorded as stdout.
    pub fn push_chunk(&mut self, stream: LogStream, text: &str) {
        let buf = match stream {
            LogStream::Stderr => &mut self.stderr,
            LogStream::Stdout | LogStream::Combined => &mut self.stdout,
        };
        for line in text.split('\n') {
            if line.is_empty() {
                continue;
            }
            buf.push_at(self.seq, line);
            self.seq += 1;
        }
    }

    /// Up to the `n` most recent lines of a stream, in arrival order.
    ///
    /// `Combined` merges both rings by arrival sequence.
    pub fn tail(&self, stream: LogStream, n: usize) -> Vec<String> {
        match stream {
            LogStream::Stdout => self.stdout.tail(n),
            LogStream::Stderr => self.stderr.tail(n),
            LogStream::Combined => {
                let mut merged: Vec<LogLine> = self.stdout.tail_lines(n);
                merged.extend(self.stderr.tail_lines(n));
                merged.sort_by_key(|l| l.seq);
                let skip = merged.len().saturating_sub(n);
                merged.into_iter().skip(skip).map(|l| l.text).collect()
            }
        }
    }

    pub fn clear(&mut self) {
        self.stdout.clear();
        self.stderr.clear();
    }
}

#[cfg(test)]
#[path = "logbuf_tests.rs"]
mod tests;
