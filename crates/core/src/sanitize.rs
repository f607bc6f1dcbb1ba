//! Coercions applied to indexer data before it is written to the store.
//!
//! All functions are total: malformed input degrades to a neutral value
//! (`0`, `"0"`, `""`, `false`) instead of failing the write.

use serde_json::Value;

/// Coerce a timestamp or duration to integer seconds.
///
/// Integers pass through, floats are truncated toward zero and strings are
/// read like `parseInt`: optional leading whitespace and sign, then the
/// leading run of decimal digits. Anything else yields 0.
pub fn timestamp(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => {
            if let Some(v) = n.as_i64() {
                v
            } else if let Some(v) = n.as_f64() {
                float_to_seconds(v)
            } else {
                0
            }
        }
        Some(Value::String(s)) => parse_int_prefix(s),
        _ => 0,
    }
}

/// Coerce a token quantity to its decimal string form. Missing becomes `"0"`.
pub fn amount(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                "0".to_string()
            } else {
                s.to_string()
            }
        }
        Some(Value::Number(n)) => match (n.as_u64(), n.as_i64(), n.as_f64()) {
            (Some(v), _, _) => v.to_string(),
            (_, Some(v), _) => v.to_string(),
            (_, _, Some(v)) if v.is_finite() && v.fract() == 0.0 => format!("{v:.0}"),
            _ => n.to_string(),
        },
        _ => "0".to_string(),
    }
}

/// Strip null characters and surrounding whitespace from a stream name.
pub fn name(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.replace('\0', "").trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Normalise a boolean-like value.
///
/// Strings `""`, `"0"` and `"false"` (any case) are false, as are `0`,
/// `null` and missing values.
pub fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(s)) => {
            let s = s.trim();
            !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false"))
        }
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
        Some(Value::Null) | None => false,
    }
}

fn float_to_seconds(v: f64) -> i64 {
    if !v.is_finite() {
        return 0;
    }
    let truncated = v.trunc();
    // `i64::MAX as f64` rounds up to 2^63, which is already out of range.
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return 0;
    }
    truncated as i64
}

fn parse_int_prefix(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let digits = &digits[..end];
    if digits.is_empty() {
        return 0;
    }
    let Ok(magnitude) = digits.parse::<i64>() else {
        return 0;
    };
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

// =============================================================================
// Tests
// =============================================================================
