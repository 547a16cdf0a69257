//! Signal record schema.
//!
//! One JSON object per line in the feed file. Every field is optional: the
//! external producer's schema is not validated here, only modeled. Numeric
//! display fields arrive as either JSON numbers or strings (the producer is
//! an EA that emits both), so they are kept as raw values and coerced in the
//! formatter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single entry from the JSON-lines feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalRecord {
    /// Opaque unique id. Absent id means the record is still forwardable
    /// but cannot be deduplicated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tf: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sl: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tp: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rr: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adx: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsi: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_time: Option<String>,

    /// Older feed versions used `time` instead of `signal_time`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl SignalRecord {
    /// Id for log lines: the record id or `-`.
    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or("-")
    }

    /// Timestamp for display, preferring `signal_time` over legacy `time`.
    pub fn display_time(&self) -> &str {
        self.signal_time
            .as_deref()
            .or(self.time.as_deref())
            .unwrap_or("-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_record() {
        let r: SignalRecord = serde_json::from_str(r#"{"pair": "BTCUSD"}"#).unwrap();
        assert_eq!(r.pair.as_deref(), Some("BTCUSD"));
        assert!(r.id.is_none());
        assert_eq!(r.display_id(), "-");
    }

    #[test]
    fn numeric_fields_accept_numbers_and_strings() {
        let r: SignalRecord =
            serde_json::from_str(r#"{"entry": 68000, "sl": "67900", "rr": "1:2"}"#).unwrap();
        assert!(r.entry.as_ref().unwrap().is_number());
        assert!(r.sl.as_ref().unwrap().is_string());
        assert_eq!(r.rr.as_ref().unwrap().as_str(), Some("1:2"));
    }

    #[test]
    fn legacy_time_field_is_display_fallback() {
        let r: SignalRecord =
            serde_json::from_str(r#"{"time": "2026-02-16 20:00:00"}"#).unwrap();
        assert_eq!(r.display_time(), "2026-02-16 20:00:00");

        let r: SignalRecord = serde_json::from_str(
            r#"{"time": "old", "signal_time": "new"}"#,
        )
        .unwrap();
        assert_eq!(r.display_time(), "new");
    }
}
