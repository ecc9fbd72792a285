//! Field parsing for warehouse exports
//!
//! Snowflake writes NULL as `\N`, `NULL` or an empty field. None of the
//! parsers here fail: a null or malformed token becomes the default of its
//! field kind (`0`, `null` or `false`). Only key fields can reject a row.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

/// How a source field is parsed and what it defaults to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Natural-key text; null skips the row
    Key,
    /// Natural-key month, stored as the first day of the month; null skips the row
    MonthKey,
    /// Optional text
    Text,
    /// Required decimal, defaults to 0
    Number,
    /// Optional decimal
    OptionalNumber,
    /// Required integer, defaults to 0
    Integer,
    /// Boolean, defaults to false
    Flag,
    /// Optional date, stored as `YYYY-MM-DD`
    Date,
    /// Optional JSON document, stored as text
    Json,
}

impl FieldKind {
    pub fn is_key(&self) -> bool {
        matches!(self, FieldKind::Key | FieldKind::MonthKey)
    }

    /// Convert a raw field (`None` when the column is absent from the file)
    ///
    /// Returns `None` only for a key field without a usable value.
    pub fn convert(&self, raw: Option<&str>) -> Option<SqlValue> {
        let token = raw.map(str::trim).filter(|t| !is_null_token(t));

        match self {
            FieldKind::Key => token.map(|t| SqlValue::Text(t.to_string())),
            FieldKind::MonthKey => token
                .and_then(parse_month)
                .map(|d| SqlValue::Text(d.format("%Y-%m-%d").to_string())),
            FieldKind::Text => Some(
                token
                    .map(|t| SqlValue::Text(t.to_string()))
                    .unwrap_or(SqlValue::Null),
            ),
            FieldKind::Number => Some(SqlValue::Real(token.and_then(parse_number).unwrap_or(0.0))),
            FieldKind::OptionalNumber => Some(
                token
                    .and_then(parse_number)
                    .map(SqlValue::Real)
                    .unwrap_or(SqlValue::Null),
            ),
            FieldKind::Integer => Some(SqlValue::Integer(
                token.and_then(parse_integer).unwrap_or(0),
            )),
            FieldKind::Flag => Some(SqlValue::Bool(token.map(parse_flag).unwrap_or(false))),
            FieldKind::Date => Some(
                token
                    .and_then(parse_date)
                    .map(|d| SqlValue::Text(d.format("%Y-%m-%d").to_string()))
                    .unwrap_or(SqlValue::Null),
            ),
            FieldKind::Json => Some(
                token
                    .and_then(parse_json)
                    .map(SqlValue::Text)
                    .unwrap_or(SqlValue::Null),
            ),
        }
    }
}

/// A typed value ready to bind into an upsert
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Real(f64),
    Integer(i64),
    Bool(bool),
}

/// Snowflake NULL sentinel (expects a trimmed token)
pub fn is_null_token(token: &str) -> bool {
    token.is_empty() || token == "\\N" || token.eq_ignore_ascii_case("null")
}

/// Finite decimal
pub fn parse_number(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integer, accepting decimals truncated toward zero
pub fn parse_integer(token: &str) -> Option<i64> {
    if let Ok(v) = token.parse::<i64>() {
        return Some(v);
    }
    parse_number(token)
        .filter(|v| *v >= i64::MIN as f64 && *v <= i64::MAX as f64)
        .map(|v| v.trunc() as i64)
}

pub fn parse_flag(token: &str) -> bool {
    ["true", "t", "yes", "y", "1"]
        .iter()
        .any(|v| token.eq_ignore_ascii_case(v))
}

/// Date from a date, timestamp or RFC 3339 token
pub fn parse_date(token: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        return Some(d);
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(token, format) {
            return Some(dt.date());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
        return Some(dt.date_naive());
    }
    // TIMESTAMP_TZ default output: 2024-01-15 10:00:00.000 -0800
    DateTime::parse_from_str(token, "%Y-%m-%d %H:%M:%S%.f %z")
        .ok()
        .map(|dt| dt.date_naive())
}

/// First day of the month of a date token, or of a bare `YYYY-MM`
pub fn parse_month(token: &str) -> Option<NaiveDate> {
    parse_date(token)
        .or_else(|| NaiveDate::parse_from_str(&format!("{}-01", token), "%Y-%m-%d").ok())
        .and_then(|d| d.with_day(1))
}

/// Re-serialized JSON, so stored text is always valid JSON
pub fn parse_json(token: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(token)
        .ok()
        .map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sentinels() {
        for token in ["", "\\N", "NULL", "null", "Null"] {
            assert!(is_null_token(token), "{:?} should be null", token);
        }
        assert!(!is_null_token("0"));
        assert!(!is_null_token("N"));
    }

    #[test]
    fn test_required_number_defaults_to_zero() {
        for raw in [Some("\\N"), Some("NULL"), Some(""), Some("abc"), Some("NaN"), None] {
            assert_eq!(FieldKind::Number.convert(raw), Some(SqlValue::Real(0.0)));
        }
        assert_eq!(
            FieldKind::Number.convert(Some(" 1234.5 ")),
            Some(SqlValue::Real(1234.5))
        );
    }

    #[test]
    fn test_optional_number_defaults_to_null() {
        assert_eq!(FieldKind::OptionalNumber.convert(Some("\\N")), Some(SqlValue::Null));
        assert_eq!(FieldKind::OptionalNumber.convert(Some("inf")), Some(SqlValue::Null));
        assert_eq!(
            FieldKind::OptionalNumber.convert(Some("-3.25")),
            Some(SqlValue::Real(-3.25))
        );
    }

    #[test]
    fn test_integer_truncates_decimals() {
        assert_eq!(FieldKind::Integer.convert(Some("42")), Some(SqlValue::Integer(42)));
        assert_eq!(FieldKind::Integer.convert(Some("12.9")), Some(SqlValue::Integer(12)));
        assert_eq!(FieldKind::Integer.convert(Some("-1.5")), Some(SqlValue::Integer(-1)));
        assert_eq!(FieldKind::Integer.convert(Some("x")), Some(SqlValue::Integer(0)));
    }

    #[test]
    fn test_flag_values() {
        for raw in ["true", "TRUE", "t", "Y", "yes", "1"] {
            assert_eq!(FieldKind::Flag.convert(Some(raw)), Some(SqlValue::Bool(true)));
        }
        for raw in ["false", "0", "no", "\\N", "", "maybe"] {
            assert_eq!(FieldKind::Flag.convert(Some(raw)), Some(SqlValue::Bool(false)));
        }
        assert_eq!(FieldKind::Flag.convert(None), Some(SqlValue::Bool(false)));
    }

    #[test]
    fn test_date_formats() {
        let expected = Some(SqlValue::Text("2024-03-15".to_string()));
        for raw in [
            "2024-03-15",
            "2024-03-15 08:30:00",
            "2024-03-15 08:30:00.123",
            "2024-03-15T08:30:00",
            "2024-03-15T08:30:00Z",
            "2024-03-15 08:30:00.000 -0700",
        ] {
            assert_eq!(FieldKind::Date.convert(Some(raw)), expected, "input {}", raw);
        }
        assert_eq!(FieldKind::Date.convert(Some("15/03/2024")), Some(SqlValue::Null));
        assert_eq!(FieldKind::Date.convert(Some("\\N")), Some(SqlValue::Null));
    }

    #[test]
    fn test_month_key_normalizes_to_first_day() {
        assert_eq!(
            FieldKind::MonthKey.convert(Some("2024-03-15")),
            Some(SqlValue::Text("2024-03-01".to_string()))
        );
        assert_eq!(
            FieldKind::MonthKey.convert(Some("2024-03")),
            Some(SqlValue::Text("2024-03-01".to_string()))
        );
        assert_eq!(FieldKind::MonthKey.convert(Some("\\N")), None);
        assert_eq!(FieldKind::MonthKey.convert(Some("March")), None);
    }

    #[test]
    fn test_key_rejects_null() {
        assert_eq!(FieldKind::Key.convert(Some("  ")), None);
        assert_eq!(FieldKind::Key.convert(None), None);
        assert_eq!(
            FieldKind::Key.convert(Some(" ABC123DEF456 ")),
            Some(SqlValue::Text("ABC123DEF456".to_string()))
        );
    }

    #[test]
    fn test_json_is_validated() {
        assert_eq!(
            FieldKind::Json.convert(Some(r#"{ "DOD": 10 }"#)),
            Some(SqlValue::Text(r#"{"DOD":10}"#.to_string()))
        );
        assert_eq!(FieldKind::Json.convert(Some("{broken")), Some(SqlValue::Null));
    }
}
