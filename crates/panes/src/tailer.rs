// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental tailer for pane output files.
//!
//! tmux `pipe-pane` appends raw tty bytes to a file; this task follows the
//! file and forwards new content as [`PaneOutput`] chunks. The same loop
//! serves any host that captures output through a file.

use crate::{PaneId, PaneOutput};
use sc_core::LogStream;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Poll cadence for output files.
const TAIL_INTERVAL: Duration = Duration::from_millis(200);

/// Follow `path` and forward appended content to `output` until the channel
/// closes or the task is aborted.
pub(crate) fn spawn_file_tailer(
    pane: PaneId,
    path: PathBuf,
    stream: LogStream,
    output: mpsc::Sender<PaneOutput>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut offset: u64 = 0;
        let mut interval = tokio::time::interval(TAIL_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match read_past(&path, &mut offset) {
                Ok(Some(chunk)) => {
                    let out = PaneOutput { pane: pane.clone(), stream, chunk };
                    if output.send(out).await.is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "output tail error");
                }
            }
        }
    })
}

fn read_past(path: &PathBuf, offset: &mut u64) -> std::io::Result<Option<String>> {
    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let len = file.metadata()?.len();
    if len < *offset {
        *offset = 0;
    }
    if len == *offset {
        return Ok(None);
    }
    file.seek(SeekFrom::Start(*offset))?;
    let mut buf = Vec::with_capacity((len - *offset) as usize);
    file.take(len - *offset).read_to_end(&mut buf)?;
    *offset = len;
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

#[cfg(test)]
#[path = "tailer_tests.rs"]
mod tests;
