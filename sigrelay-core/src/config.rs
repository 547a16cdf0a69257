//! Forwarder configuration loaded from a JSON file.
//!
//! The config names the feed and state files, the Telegram destination, the
//! symbol/timeframe filters, and the per-run limits. Validation is fail-fast:
//! a bad config aborts before any file access or network send.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Sentinel the `telegram.purpose` guard must match when present.
///
/// The guard exists so a config file copied from another deployment (different
/// bot, different channel) refuses to send rather than posting to the wrong
/// destination.
pub const PURPOSE_SENTINEL: &str = "trading_signals_only";

/// Structured error types for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("refusing to send: telegram purpose '{found}' is not '{PURPOSE_SENTINEL}'")]
    PurposeMismatch { found: String },

    #[error("telegram purpose guard is required here but not set")]
    PurposeMissing,

    #[error("no allowed symbols configured (set filters.allowed_symbols or filters.allowed_symbol)")]
    NoSymbols,
}

/// Top-level forwarder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Append-only JSON-lines feed written by the external signal producer.
    pub signal_file: PathBuf,

    /// Persisted cursor state (created on first run).
    pub state_file: PathBuf,

    pub telegram: TelegramConfig,
    pub filters: FilterConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Telegram destination and the purpose guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,

    /// Optional safety valve: when set, must equal [`PURPOSE_SENTINEL`].
    #[serde(default)]
    pub purpose: Option<String>,
}

/// Symbol and timeframe filters.
///
/// `allowed_symbols` subsumes the legacy single-symbol `allowed_symbol`
/// field: the list wins when it has any non-blank entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub allowed_tf: String,

    #[serde(default)]
    pub allowed_symbol: Option<String>,

    #[serde(default)]
    pub allowed_symbols: Vec<String>,
}

/// Per-run limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_max_messages")]
    pub max_messages_per_run: u32,

    #[serde(default = "default_sleep_between_sends")]
    pub sleep_between_sends_sec: f64,
}

fn default_max_messages() -> u32 {
    3
}

fn default_sleep_between_sends() -> f64 {
    1.2
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_messages_per_run: default_max_messages(),
            sleep_between_sends_sec: default_sleep_between_sends(),
        }
    }
}

impl RelayConfig {
    /// Load and parse a config file. Does not validate; see [`Self::validate`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fail-fast checks that must pass before any file or network access.
    ///
    /// The purpose guard is lenient here: an absent guard is allowed, a
    /// mismatched one is not. The health check uses [`Self::require_purpose`]
    /// for the strict form.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(purpose) = &self.telegram.purpose {
            if purpose != PURPOSE_SENTINEL {
                return Err(ConfigError::PurposeMismatch {
                    found: purpose.clone(),
                });
            }
        }
        if self.filters.symbol_set().is_empty() {
            return Err(ConfigError::NoSymbols);
        }
        Ok(())
    }

    /// Strict purpose guard: the sentinel must be present and exact.
    pub fn require_purpose(&self) -> Result<(), ConfigError> {
        match self.telegram.purpose.as_deref() {
            Some(PURPOSE_SENTINEL) => Ok(()),
            Some(other) => Err(ConfigError::PurposeMismatch {
                found: other.to_string(),
            }),
            None => Err(ConfigError::PurposeMissing),
        }
    }
}

impl FilterConfig {
    /// Effective allowed-symbol set with the legacy fallback applied.
    pub fn symbol_set(&self) -> BTreeSet<String> {
        let mut set: BTreeSet<String> = self
            .allowed_symbols
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if set.is_empty() {
            if let Some(sym) = &self.allowed_symbol {
                if !sym.trim().is_empty() {
                    set.insert(sym.clone());
                }
            }
        }
        set
    }

    /// Primary symbol used when injecting a probe record.
    pub fn primary_symbol(&self) -> Option<String> {
        self.symbol_set().into_iter().next()
    }
}
