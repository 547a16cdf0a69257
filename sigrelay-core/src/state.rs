//! Persisted cursor state — JSON save/load across runs.
//!
//! One record per state file: the byte offset already processed, a bounded
//! set of recently forwarded ids, and diagnostic metadata overwritten each
//! run. The state file is exclusively owned by the forwarder between runs;
//! operators reset it by deleting the file.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Seen-set retention: ids beyond the newest 2000 are evicted on save.
pub const SENT_IDS_CAP: usize = 2000;

/// Structured error types for state persistence.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file '{path}' is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Statistics for the most recent run, persisted for diagnostics only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub scanned_lines: u64,
    pub sent_count: u64,
    pub offset_before: u64,
    pub offset_after: u64,
    pub file_size: u64,
}

/// The resumable cursor: offset, dedup set, and last-run metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CursorState {
    #[serde(default)]
    pub offset: u64,

    /// Bounded ordered set of recently forwarded ids. Dedup window, not an
    /// audit log.
    #[serde(default)]
    pub sent_ids: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_stats: Option<RunStats>,
}

impl CursorState {
    /// Load state from disk. A missing file yields the first-run default
    /// (offset 0, empty id set); an unreadable or corrupt file is an error —
    /// silently resetting a live cursor would double-send the whole backlog.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(StateError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&content).map_err(|source| StateError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Persist state to disk. Creates parent directories, trims the seen-set
    /// to [`SENT_IDS_CAP`], and writes atomically (.tmp then rename) so a
    /// crash mid-write never leaves a truncated state file.
    pub fn save(&mut self, path: &Path) -> Result<(), StateError> {
        self.trim_sent_ids();

        let io_err = |source: std::io::Error| StateError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let json = serde_json::to_string_pretty(self).map_err(|source| StateError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(io_err)?;
        std::fs::rename(&tmp_path, path).map_err(io_err)?;
        Ok(())
    }

    /// Record a forwarded id in the dedup set.
    pub fn mark_sent(&mut self, id: &str) {
        self.sent_ids.insert(id.to_string());
    }

    /// Whether an id was already forwarded (within the retention window).
    pub fn already_sent(&self, id: &str) -> bool {
        self.sent_ids.contains(id)
    }

    /// Stamp the run metadata prior to saving.
    pub fn record_run(&mut self, stats: RunStats) {
        self.offset = stats.offset_after;
        self.last_run_at = Some(Local::now().format("%Y-%m-%d %H:%M:%S").to_string());
        self.last_run_stats = Some(stats);
    }

    /// Keep the newest [`SENT_IDS_CAP`] ids in sorted order.
    fn trim_sent_ids(&mut self) {
        while self.sent_ids.len() > SENT_IDS_CAP {
            self.sent_ids.pop_first();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_first_run_default() {
        let dir = tempfile::tempdir().unwrap();
        let state = CursorState::load(&dir.path().join("state.json")).unwrap();
        assert_eq!(state.offset, 0);
        assert!(state.sent_ids.is_empty());
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            CursorState::load(&path),
            Err(StateError::Corrupt { .. })
        ));
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut state = CursorState::default();
        state.mark_sent("SIG-1");
        state.mark_sent("SIG-2");
        state.record_run(RunStats {
            scanned_lines: 4,
            sent_count: 2,
            offset_before: 0,
            offset_after: 120,
            file_size: 120,
        });
        state.save(&path).unwrap();

        let loaded = CursorState::load(&path).unwrap();
        assert_eq!(loaded.offset, 120);
        assert!(loaded.already_sent("SIG-1"));
        assert!(loaded.already_sent("SIG-2"));
        assert_eq!(loaded.last_run_stats.unwrap().sent_count, 2);
        assert!(loaded.last_run_at.is_some());
    }

    #[test]
    fn seen_set_trims_to_newest_2000() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = CursorState::default();
        for i in 0..2100 {
            state.mark_sent(&format!("SIG-{i:05}"));
        }
        state.save(&path).unwrap();

        let loaded = CursorState::load(&path).unwrap();
        assert_eq!(loaded.sent_ids.len(), SENT_IDS_CAP);
        // Oldest 100 (lexicographically smallest) evicted, newest retained.
        assert!(!loaded.already_sent("SIG-00000"));
        assert!(!loaded.already_sent("SIG-00099"));
        assert!(loaded.already_sent("SIG-00100"));
        assert!(loaded.already_sent("SIG-02099"));
    }

    #[test]
    fn legacy_state_with_only_offset_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"offset": 42, "sent_ids": ["A"]}"#).unwrap();

        let state = CursorState::load(&path).unwrap();
        assert_eq!(state.offset, 42);
        assert!(state.already_sent("A"));
        assert!(state.last_run_at.is_none());
    }
}
