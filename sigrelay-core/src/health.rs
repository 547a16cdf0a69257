//! End-to-end health probe.
//!
//! Appends a synthetic record to the feed file, runs the forwarder once, and
//! verifies the probe id landed in the persisted seen-set. This exercises the
//! full path (feed file -> forwarder -> transport -> state) with a real send,
//! so it requires the strict purpose guard.

use crate::config::{ConfigError, RelayConfig};
use crate::forwarder::{run_once, ForwardError};
use crate::record::SignalRecord;
use crate::state::{CursorState, RunStats, StateError};
use crate::transport::Transport;
use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum HealthError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to append probe to '{path}': {source}")]
    Probe {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Forward(#[from] ForwardError),

    #[error(transparent)]
    State(#[from] StateError),
}

/// Outcome of a health check run.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub probe_id: String,
    pub delivered: bool,
    pub stats: RunStats,
}

/// Append a synthetic probe record matching the given filters. Returns the
/// generated probe id.
pub fn append_probe(signal_file: &Path, pair: &str, tf: &str) -> Result<String, HealthError> {
    let now = Utc::now();
    let probe_id = format!(
        "HC-{}-{}",
        now.format("%Y%m%d%H%M%S"),
        &uuid::Uuid::new_v4().simple().to_string()[..6]
    );

    let record = SignalRecord {
        id: Some(probe_id.clone()),
        pair: Some(pair.to_string()),
        tf: Some(tf.to_string()),
        side: Some("BUY".to_string()),
        entry: Some(serde_json::json!(99999.0)),
        sl: Some(serde_json::json!(99949.0)),
        tp: Some(serde_json::json!(100149.0)),
        rr: Some(serde_json::json!(3.0)),
        adx: Some(serde_json::json!(35.0)),
        rsi: Some(serde_json::json!(60.0)),
        signal_time: Some(now.to_rfc3339()),
        time: None,
        source: Some("health_check".to_string()),
    };

    let probe_err = |source: std::io::Error| HealthError::Probe {
        path: signal_file.to_path_buf(),
        source,
    };

    if let Some(parent) = signal_file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(probe_err)?;
        }
    }

    let line = serde_json::to_string(&record).expect("probe record serializes");
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(signal_file)
        .map_err(probe_err)?;
    writeln!(file, "{line}").map_err(probe_err)?;

    info!(%probe_id, pair, tf, "appended probe record");
    Ok(probe_id)
}

/// Inject a probe, run the forwarder once, and confirm the probe id shows
/// up in the persisted seen-set.
pub fn run_health_check(
    cfg: &RelayConfig,
    transport: &dyn Transport,
) -> Result<HealthReport, HealthError> {
    cfg.require_purpose()?;

    let pair = cfg
        .filters
        .primary_symbol()
        .ok_or(ConfigError::NoSymbols)?;

    let probe_id = append_probe(&cfg.signal_file, &pair, &cfg.filters.allowed_tf)?;
    let stats = run_once(cfg, transport)?;

    let state = CursorState::load(&cfg.state_file)?;
    let delivered = state.already_sent(&probe_id);

    Ok(HealthReport {
        probe_id,
        delivered,
        stats,
    })
}
