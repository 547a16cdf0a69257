//! Message formatting for the chat destination.
//!
//! Pure functions: a record in, an HTML-formatted string out. Every display
//! field is escaped before interpolation since the transport sends with
//! `parse_mode=HTML`. Missing or non-numeric fields render as `-` rather
//! than failing the send.

use crate::record::SignalRecord;
use serde_json::Value;

/// Escape the characters significant to Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Coerce a raw JSON field to f64: numbers pass through, numeric strings
/// parse, everything else is None.
fn to_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                s.parse().ok()
            }
        }
        _ => None,
    }
}

/// Format a numeric field to two decimals, `-` when absent or unparseable.
fn fmt_num(value: Option<&Value>) -> String {
    match to_f64(value) {
        Some(n) => format!("{n:.2}"),
        None => "-".to_string(),
    }
}

/// RR display value.
///
/// Ratio strings from the producer ("1:3") are preserved verbatim, numeric
/// values are formatted to two decimals, and when `rr` is absent the ratio
/// is estimated from the entry/SL/TP levels with side-aware direction.
fn fmt_rr(record: &SignalRecord) -> String {
    if let Some(Value::String(raw)) = &record.rr {
        let cleaned = raw.trim();
        if !cleaned.is_empty() {
            if cleaned.contains(':') {
                return cleaned.to_string();
            }
            if let Ok(n) = cleaned.parse::<f64>() {
                return format!("{n:.2}");
            }
        }
    }

    if let Some(n) = to_f64(record.rr.as_ref()) {
        return format!("{n:.2}");
    }

    let (entry, sl, tp) = match (
        to_f64(record.entry.as_ref()),
        to_f64(record.sl.as_ref()),
        to_f64(record.tp.as_ref()),
    ) {
        (Some(e), Some(s), Some(t)) => (e, s, t),
        _ => return "-".to_string(),
    };

    let side = record.side.as_deref().unwrap_or("").to_uppercase();
    let (risk, reward) = match side.as_str() {
        "BUY" => (entry - sl, tp - entry),
        "SELL" => (sl - entry, entry - tp),
        _ => ((entry - sl).abs(), (tp - entry).abs()),
    };

    if risk <= 0.0 {
        return "-".to_string();
    }
    let rr = reward / risk;
    if rr <= 0.0 {
        return "-".to_string();
    }
    format!("{rr:.2}")
}

/// Render a record into the outbound HTML message.
pub fn format_signal_message(record: &SignalRecord) -> String {
    let pair = escape_html(record.pair.as_deref().unwrap_or("-"));
    let tf = escape_html(&record.tf.as_deref().unwrap_or("-").replace("PERIOD_", ""));

    let side_raw = record.side.as_deref().unwrap_or("-").to_uppercase();
    let side_icon = match side_raw.as_str() {
        "BUY" => "\u{1F7E2}",
        "SELL" => "\u{1F534}",
        _ => "\u{26AA}",
    };
    let side = escape_html(&side_raw);

    let id = escape_html(record.display_id());
    let signal_time = escape_html(record.display_time());

    let entry = fmt_num(record.entry.as_ref());
    let sl = fmt_num(record.sl.as_ref());
    let tp = fmt_num(record.tp.as_ref());
    let rr = escape_html(&fmt_rr(record));
    let adx = fmt_num(record.adx.as_ref());
    let rsi = fmt_num(record.rsi.as_ref());

    format!(
        "\u{1F4E1} <b>LIVE SIGNAL</b>\n\
         {side_icon} Pair: <b>{pair}</b> ({tf})\n\
         Side: <b>{side}</b>\n\
         Entry: <b>{entry}</b>\n\
         SL: <b>{sl}</b>\n\
         TP: <b>{tp}</b> (RR {rr})\n\
         ADX: {adx} | RSI: {rsi}\n\
         Time: {signal_time}\n\
         ID: <code>{id}</code>\n\n\
         <i>Disclaimer: educational content, not financial advice. Always use risk management.</i>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(fields: serde_json::Value) -> SignalRecord {
        serde_json::from_value(fields).unwrap()
    }

    #[test]
    fn escapes_markup_in_display_fields() {
        let r = record(json!({"pair": "BTC<&>USD", "id": "<b>X</b>"}));
        let msg = format_signal_message(&r);
        assert!(msg.contains("BTC&lt;&amp;&gt;USD"));
        assert!(msg.contains("&lt;b&gt;X&lt;/b&gt;"));
        assert!(!msg.contains("<b>X</b>"));
    }

    #[test]
    fn tf_strips_period_prefix() {
        let r = record(json!({"tf": "PERIOD_M5"}));
        assert!(format_signal_message(&r).contains("(M5)"));
    }

    #[test]
    fn missing_numbers_render_as_dash() {
        let r = record(json!({"pair": "BTCUSD"}));
        let msg = format_signal_message(&r);
        assert!(msg.contains("Entry: <b>-</b>"));
        assert!(msg.contains("(RR -)"));
    }

    #[test]
    fn string_prices_are_coerced() {
        // 67900.555 is 67900.554999... as a double, so it rounds down.
        let r = record(json!({"entry": "68000", "sl": 67900.555, "tp": 67900.556}));
        let msg = format_signal_message(&r);
        assert!(msg.contains("Entry: <b>68000.00</b>"));
        assert!(msg.contains("SL: <b>67900.55</b>"));
        assert!(msg.contains("TP: <b>67900.56</b>"));
    }

    #[test]
    fn ratio_rr_string_is_preserved() {
        let r = record(json!({"rr": "1:3"}));
        assert_eq!(fmt_rr(&r), "1:3");
    }

    #[test]
    fn numeric_rr_formats_to_two_decimals() {
        assert_eq!(fmt_rr(&record(json!({"rr": 2.5}))), "2.50");
        assert_eq!(fmt_rr(&record(json!({"rr": "2.5"}))), "2.50");
    }

    #[test]
    fn rr_falls_back_to_price_levels() {
        let buy = record(json!({"side": "BUY", "entry": 100.0, "sl": 95.0, "tp": 115.0}));
        assert_eq!(fmt_rr(&buy), "3.00");

        let sell = record(json!({"side": "SELL", "entry": 100.0, "sl": 105.0, "tp": 85.0}));
        assert_eq!(fmt_rr(&sell), "3.00");
    }

    #[test]
    fn degenerate_risk_renders_dash() {
        // SL on the wrong side of entry for a BUY
        let r = record(json!({"side": "BUY", "entry": 100.0, "sl": 110.0, "tp": 120.0}));
        assert_eq!(fmt_rr(&r), "-");
    }

    #[test]
    fn side_icons_match_direction() {
        assert!(format_signal_message(&record(json!({"side": "buy"}))).contains("\u{1F7E2}"));
        assert!(format_signal_message(&record(json!({"side": "SELL"}))).contains("\u{1F534}"));
        assert!(format_signal_message(&record(json!({}))).contains("\u{26AA}"));
    }
}
