//! SigRelay Core — signal-feed forwarder over an append-only JSON-lines file.
//!
//! This crate contains the whole delivery pipeline:
//! - Configuration with a fail-fast purpose guard and symbol/timeframe filters
//! - Persisted cursor state (byte offset + bounded seen-id set)
//! - The forwarder loop: incremental scan, dedup, per-run cap, at-least-once
//!   retry semantics on send failure
//! - HTML message formatting
//! - Telegram transport with rate-limit-aware retries, behind a trait seam
//! - Health probe (inject a synthetic record, verify end-to-end delivery)

pub mod config;
pub mod format;
pub mod forwarder;
pub mod health;
pub mod record;
pub mod state;
pub mod transport;

pub use config::{ConfigError, FilterConfig, RelayConfig, RuntimeConfig, TelegramConfig};
pub use format::format_signal_message;
pub use forwarder::{run_once, ForwardError};
pub use health::{append_probe, run_health_check, HealthError, HealthReport};
pub use record::SignalRecord;
pub use state::{CursorState, RunStats, StateError, SENT_IDS_CAP};
pub use transport::{BotIdentity, TelegramTransport, Transport, TransportError};
