//! The forwarder control loop.
//!
//! Reads the append-only JSON-lines feed from a persisted byte offset,
//! filters by symbol and timeframe, deduplicates by id, and forwards unseen
//! records through the transport subject to a per-run cap. The cursor only
//! advances past a line once that line is fully handled, which is what makes
//! repeated invocations safe:
//!
//! - blank, malformed, duplicate, and filtered-out lines advance the cursor
//!   (they will never become sendable, so retrying them is pointless);
//! - a failed send parks the cursor at the start of the failing line and
//!   stops the run, so the next run retries the same record (at-least-once);
//! - hitting the per-run cap parks the cursor the same way, so the backlog
//!   drains across runs without flooding the destination.

use crate::config::{ConfigError, RelayConfig};
use crate::format::format_signal_message;
use crate::record::SignalRecord;
use crate::state::{CursorState, RunStats, StateError};
use crate::transport::Transport;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Structured error types for a forwarder run.
///
/// Transport failures are deliberately absent: a failed send stops the run
/// but is not an error at this level, since the cursor semantics already
/// guarantee the record is retried next run.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("failed to read signal file '{path}': {source}")]
    Feed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One pass over the feed file. Idempotent and safe to invoke repeatedly;
/// looping and scheduling belong to the caller.
pub fn run_once(cfg: &RelayConfig, transport: &dyn Transport) -> Result<RunStats, ForwardError> {
    cfg.validate()?;

    let mut state = CursorState::load(&cfg.state_file)?;

    let file_size = match std::fs::metadata(&cfg.signal_file) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %cfg.signal_file.display(), "signal file not found, nothing to do");
            return Ok(RunStats {
                offset_before: state.offset,
                offset_after: state.offset,
                ..RunStats::default()
            });
        }
        Err(source) => {
            return Err(ForwardError::Feed {
                path: cfg.signal_file.clone(),
                source,
            })
        }
    };

    let mut offset = state.offset;
    if offset > file_size {
        info!(
            offset,
            file_size, "offset beyond file size, rotation/truncation detected, resetting to 0"
        );
        offset = 0;
    }

    let allowed_symbols = cfg.filters.symbol_set();
    let allowed_tf = cfg.filters.allowed_tf.as_str();
    let max_per_run = cfg.runtime.max_messages_per_run as u64;
    let sleep_between = cfg.runtime.sleep_between_sends_sec;

    let feed_err = |source: std::io::Error| ForwardError::Feed {
        path: cfg.signal_file.clone(),
        source,
    };

    let mut file = std::fs::File::open(&cfg.signal_file).map_err(feed_err)?;
    file.seek(SeekFrom::Start(offset)).map_err(feed_err)?;
    let mut reader = BufReader::new(file);

    let mut scanned_lines = 0u64;
    let mut sent_count = 0u64;
    let mut pos = offset;
    let mut buf = Vec::new();

    // `pos` tracks bytes consumed; a `continue` commits the current line.
    // The loop breaks with the new cursor: `pos` on normal exits,
    // `line_start` when the line must be retried next run.
    let new_offset = loop {
        let line_start = pos;
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).map_err(feed_err)? as u64;
        if n == 0 {
            break pos;
        }
        pos += n;
        scanned_lines += 1;

        let line = String::from_utf8_lossy(&buf);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: SignalRecord = match serde_json::from_str(trimmed) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "skipping malformed JSON line");
                continue;
            }
        };

        // Cap reached: park the cursor at this line so the next run picks
        // it up first.
        if sent_count >= max_per_run {
            info!(max_per_run, "reached per-run message cap, will continue next cycle");
            break line_start;
        }

        if let Some(id) = &record.id {
            if state.already_sent(id) {
                continue;
            }
        }

        let pair_matches = record
            .pair
            .as_deref()
            .is_some_and(|p| allowed_symbols.contains(p));
        if !pair_matches || record.tf.as_deref() != Some(allowed_tf) {
            // Filtered records will never match, so they are never retried.
            continue;
        }

        let text = format_signal_message(&record);
        if let Err(e) = transport.send(&text) {
            // Park the cursor so the same record retries next run.
            warn!(id = record.display_id(), error = %e, "send failed, stopping run");
            break line_start;
        }

        if let Some(id) = &record.id {
            state.mark_sent(id);
        }
        sent_count += 1;
        info!(
            id = record.display_id(),
            pair = record.pair.as_deref().unwrap_or("-"),
            tf = record.tf.as_deref().unwrap_or("-"),
            side = record.side.as_deref().unwrap_or("-"),
            "sent signal"
        );

        if sent_count < max_per_run && sleep_between > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(sleep_between));
        }
    };

    let stats = RunStats {
        scanned_lines,
        sent_count,
        offset_before: offset,
        offset_after: new_offset,
        file_size,
    };
    state.record_run(stats.clone());
    state.save(&cfg.state_file)?;

    info!(
        scanned = stats.scanned_lines,
        sent = stats.sent_count,
        offset_before = stats.offset_before,
        offset_after = stats.offset_after,
        file_size = stats.file_size,
        "run done"
    );

    Ok(stats)
}
