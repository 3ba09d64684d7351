//! Lossy coercion of loosely typed source values
//!
//! Sources hand us JSON-ish cells: numbers, strings, nulls and the odd
//! boolean. These helpers turn them into the canonical field types. None of
//! them fail; an unusable cell becomes `None` and the caller picks the
//! default for that field.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Naive layouts accepted after RFC 3339 has been tried.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Largest float that still maps onto an exact integer identifier.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Parse a numeric cell.
///
/// Strings are trimmed before parsing; booleans count as 1/0. Non-finite
/// results are treated as unparsable.
pub fn parse_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

/// Coerce a numeric cell, defaulting to `0.0` when absent or unparsable.
pub fn coerce_f64(value: Option<&Value>) -> f64 {
    value.and_then(parse_f64).unwrap_or(0.0)
}

/// Parse a temporal cell into UTC.
///
/// Offsets are honoured and converted; naive values are taken as UTC.
/// Numbers are not interpreted as epochs.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

/// Parse a timestamp string using the accepted layouts.
pub fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }

    for format in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }

    None
}

/// Render a timestamp the way watermarks and sinks store it.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Canonical identifier for a cell.
///
/// Integral numbers render without a fractional part so that `1`, `1.0`,
/// `"1"` and `"1.0"` all name the same product. Strings without a decimal
/// point are kept as written (`"007"` stays `"007"`). Blank strings and
/// nulls are absent.
pub fn canonical_id(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(integral_decimal(trimmed).unwrap_or_else(|| trimmed.to_string()))
            }
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().filter(|f| f.is_finite()).map(render_float)
            }
        }
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn render_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// `"1.0"` and `"42.00"` as integers; anything else is left alone
fn integral_decimal(s: &str) -> Option<String> {
    let (whole, fraction) = s.split_once('.')?;
    let digits = whole.strip_prefix('-').unwrap_or(whole);
    let plain = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
        && fraction.chars().all(|c| c == '0');
    if !plain {
        return None;
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.abs() < MAX_EXACT_INTEGER)
        .map(render_float)
}

/// Optional text cell (movement type and similar labels).
pub fn optional_text(value: Option<&Value>) -> Option<String> {
    value.and_then(canonical_id)
}
