use chrono::Utc;
use serde_json::Value;

#[must_use]
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

#[must_use]
pub fn parse_positive_int(input: Option<&str>, fallback: usize) -> usize {
    let Some(raw) = input else {
        return fallback;
    };
    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 => value as usize,
        _ => fallback,
    }
}

#[must_use]
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out = value.chars().take(max_chars).collect::<String>();
    out.push('…');
    out
}

/// Short single-line rendering of memory text for log lines.
#[must_use]
pub fn preview(content: &str) -> String {
    truncate_chars(&content.split_whitespace().collect::<Vec<_>>().join(" "), 60)
}

fn finite_to_seconds(value: f64) -> Option<i64> {
    if value.is_finite() && value.abs() < i64::MAX as f64 {
        Some(value.trunc() as i64)
    } else {
        None
    }
}

/// Lax integer coercion: integers, floats (truncated) and numeric strings.
#[must_use]
pub fn coerce_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().and_then(finite_to_seconds)),
        Value::String(text) => {
            let trimmed = text.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(finite_to_seconds))
        }
        _ => None,
    }
}

#[must_use]
pub fn coerce_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|x| x.is_finite()),
        _ => None,
    }
}

/// JSON "truthiness" for the handful of scalar types the export uses.
#[must_use]
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::{coerce_float, coerce_seconds, is_falsy, parse_positive_int, preview};
    use serde_json::json;

    #[test]
    fn coerces_export_timestamps() {
        assert_eq!(coerce_seconds(&json!(1_700_000_000)), Some(1_700_000_000));
        assert_eq!(coerce_seconds(&json!(1_700_000_000.987)), Some(1_700_000_000));
        assert_eq!(coerce_seconds(&json!(" 42 ")), Some(42));
        assert_eq!(coerce_seconds(&json!("42.5")), Some(42));
        assert_eq!(coerce_seconds(&json!("soon")), None);
        assert_eq!(coerce_seconds(&json!(true)), None);
        assert_eq!(coerce_seconds(&json!([1])), None);
    }

    #[test]
    fn coerces_weights() {
        assert_eq!(coerce_float(&json!(1)), Some(1.0));
        assert_eq!(coerce_float(&json!("0.25")), Some(0.25));
        assert_eq!(coerce_float(&json!("NaN")), None);
        assert_eq!(coerce_float(&json!({})), None);
    }

    #[test]
    fn positive_int_falls_back() {
        assert_eq!(parse_positive_int(Some("8"), 16), 8);
        assert_eq!(parse_positive_int(Some("0"), 16), 16);
        assert_eq!(parse_positive_int(Some("-3"), 16), 16);
        assert_eq!(parse_positive_int(Some("many"), 16), 16);
        assert_eq!(parse_positive_int(None, 16), 16);
    }

    #[test]
    fn falsy_matches_export_semantics() {
        assert!(is_falsy(&json!(null)));
        assert!(is_falsy(&json!(0)));
        assert!(is_falsy(&json!(0.0)));
        assert!(is_falsy(&json!("")));
        assert!(!is_falsy(&json!(1_700_000_000.5)));
    }

    #[test]
    fn preview_collapses_whitespace() {
        assert_eq!(preview("likes\n  green tea"), "likes green tea");
        assert_eq!(preview(&"x".repeat(80)).chars().count(), 61);
    }
}
