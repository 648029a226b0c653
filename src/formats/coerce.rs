//! Conversion of raw CSV fields into typed values

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};

use crate::config::NA_VALUES;
use crate::db::schema::{SqlType, is_na};

/// A typed field value; `None` is SQL NULL
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(Option<bool>),
    Int(Option<i64>),
    Float(Option<f64>),
    Text(Option<String>),
    Timestamp(Option<NaiveDateTime>),
}

impl Value {
    /// NULL of the given type
    pub fn null(sql_type: SqlType) -> Self {
        match sql_type {
            SqlType::Boolean => Value::Bool(None),
            SqlType::BigInt => Value::Int(None),
            SqlType::DoublePrecision => Value::Float(None),
            SqlType::Text => Value::Text(None),
            SqlType::Timestamp => Value::Timestamp(None),
        }
    }
}

/// Timestamp layouts accepted in date columns
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",    // 2021-01-01 00:30:10
    "%Y-%m-%dT%H:%M:%S",    // ISO 8601
    "%Y-%m-%d %H:%M:%S%.f", // With fractional seconds
    "%Y-%m-%dT%H:%M:%S%.f", // ISO 8601 with fractional seconds
    "%Y-%m-%d %H:%M",       // Without seconds
];

/// Convert a raw field into a value of the given type
pub fn coerce(raw: &str, sql_type: SqlType) -> Result<Value> {
    // Text keeps surrounding whitespace, so only an exact NA token is NULL
    let missing = match sql_type {
        SqlType::Text => NA_VALUES.contains(&raw),
        _ => is_na(raw),
    };
    if missing {
        return Ok(Value::null(sql_type));
    }
    let trimmed = raw.trim();

    Ok(match sql_type {
        SqlType::Boolean => Value::Bool(Some(parse_bool(trimmed)?)),
        SqlType::BigInt => Value::Int(Some(parse_int(trimmed)?)),
        SqlType::DoublePrecision => Value::Float(Some(parse_float(trimmed)?)),
        SqlType::Text => Value::Text(Some(raw.to_string())),
        SqlType::Timestamp => Value::Timestamp(Some(parse_timestamp(trimmed)?)),
    })
}

fn parse_bool(value: &str) -> Result<bool> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(anyhow!("expected a boolean, got '{}'", value))
    }
}

/// Integers, plus floats without a fractional part ("2.0")
fn parse_int(value: &str) -> Result<i64> {
    if let Ok(int) = value.parse::<i64>() {
        return Ok(int);
    }

    match value.parse::<f64>() {
        Ok(float)
            if float.is_finite()
                && float.fract() == 0.0
                && float >= i64::MIN as f64
                && float <= i64::MAX as f64 =>
        {
            Ok(float as i64)
        }
        _ => Err(anyhow!("expected an integer, got '{}'", value)),
    }
}

fn parse_float(value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|e| anyhow!("expected a float, got '{}': {}", value, e))
}

fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(ts);
        }
    }

    // A bare date means midnight
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default());
    }

    Err(anyhow!("expected a timestamp, got '{}'", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap()
    }

    #[test]
    fn test_nulls_keep_column_type() {
        assert_eq!(coerce("", SqlType::BigInt).unwrap(), Value::Int(None));
        assert_eq!(
            coerce("NaN", SqlType::DoublePrecision).unwrap(),
            Value::Float(None)
        );
        assert_eq!(coerce("NA", SqlType::Text).unwrap(), Value::Text(None));
        assert_eq!(
            coerce(" ", SqlType::Timestamp).unwrap(),
            Value::Timestamp(None)
        );
        assert_eq!(coerce("", SqlType::Boolean).unwrap(), Value::Bool(None));
    }

    #[test]
    fn test_integer_coercion() {
        assert_eq!(coerce("1", SqlType::BigInt).unwrap(), Value::Int(Some(1)));
        assert_eq!(coerce(" -7 ", SqlType::BigInt).unwrap(), Value::Int(Some(-7)));
        assert_eq!(coerce("2.0", SqlType::BigInt).unwrap(), Value::Int(Some(2)));
        assert!(coerce("2.5", SqlType::BigInt).is_err());
        assert!(coerce("abc", SqlType::BigInt).is_err());
        assert!(coerce("inf", SqlType::BigInt).is_err());
    }

    #[test]
    fn test_float_coercion() {
        assert_eq!(
            coerce("2.5", SqlType::DoublePrecision).unwrap(),
            Value::Float(Some(2.5))
        );
        assert_eq!(
            coerce("-0.3", SqlType::DoublePrecision).unwrap(),
            Value::Float(Some(-0.3))
        );
        assert!(coerce("N", SqlType::DoublePrecision).is_err());
    }

    #[test]
    fn test_text_is_kept_verbatim() {
        assert_eq!(
            coerce("N", SqlType::Text).unwrap(),
            Value::Text(Some("N".to_string()))
        );
        assert_eq!(
            coerce(" padded ", SqlType::Text).unwrap(),
            Value::Text(Some(" padded ".to_string()))
        );
        assert_eq!(
            coerce(" ", SqlType::Text).unwrap(),
            Value::Text(Some(" ".to_string()))
        );
        assert_eq!(coerce(" ", SqlType::BigInt).unwrap(), Value::Int(None));
    }

    #[test]
    fn test_bool_coercion() {
        assert_eq!(
            coerce("True", SqlType::Boolean).unwrap(),
            Value::Bool(Some(true))
        );
        assert!(coerce("yes", SqlType::Boolean).is_err());
    }

    #[test]
    fn test_timestamp_coercion() {
        let test_cases = [
            ("2021-01-01 00:30:10", "2021-01-01 00:30:10"),
            ("2021-01-01T00:30:10", "2021-01-01 00:30:10"),
            ("2021-01-01 00:30:10.250", "2021-01-01 00:30:10.250"),
            ("2021-01-01 00:30", "2021-01-01 00:30:00"),
            ("2021-01-01", "2021-01-01 00:00:00"),
        ];

        for (input, expected) in test_cases {
            assert_eq!(
                coerce(input, SqlType::Timestamp).unwrap(),
                Value::Timestamp(Some(ts(expected))),
                "Failed for input '{}'",
                input
            );
        }

        assert!(coerce("2021-02-30 00:00:00", SqlType::Timestamp).is_err());
        assert!(coerce("01/01/2021", SqlType::Timestamp).is_err());
    }
}
