//! Attribute values and column types of the canonical feature table.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeDelta, Utc};

/// Declared type of an attribute column.
///
/// The type is inferred once, when a table is decoded, and drives the
/// aggregation rule the union operator applies to the column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
    Timestamp,
    Duration,
}

impl ColumnType {
    /// Returns a lowercase label suitable for display.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Text => "text",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Duration => "duration",
        }
    }

    /// Returns `true` for integer and floating point columns.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    /// The narrowest type able to hold values of both `self` and `other`.
    #[must_use]
    pub fn unify(self, other: ColumnType) -> ColumnType {
        match (self, other) {
            (a, b) if a == b => a,
            (ColumnType::Integer, ColumnType::Float) | (ColumnType::Float, ColumnType::Integer) => {
                ColumnType::Float
            },
            _ => ColumnType::Text,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    Timestamp(DateTime<Utc>),
    Duration(TimeDelta),
}

impl AttributeValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// The column type this value naturally belongs to, `None` for null.
    #[must_use]
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            AttributeValue::Null => None,
            AttributeValue::Integer(_) => Some(ColumnType::Integer),
            AttributeValue::Float(_) => Some(ColumnType::Float),
            AttributeValue::Boolean(_) => Some(ColumnType::Boolean),
            AttributeValue::Text(_) => Some(ColumnType::Text),
            AttributeValue::Timestamp(_) => Some(ColumnType::Timestamp),
            AttributeValue::Duration(_) => Some(ColumnType::Duration),
        }
    }

    /// Infer a value from a raw text cell.
    ///
    /// Empty cells are null; integers, floats and booleans (`true`/`false`,
    /// case-insensitive) are recognised, anything else stays text.
    #[must_use]
    pub fn parse_text(raw: &str) -> AttributeValue {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return AttributeValue::Null;
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return AttributeValue::Integer(value);
        }
        if let Ok(value) = trimmed.parse::<f64>()
            && value.is_finite()
        {
            return AttributeValue::Float(value);
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return AttributeValue::Boolean(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return AttributeValue::Boolean(false);
        }
        AttributeValue::Text(raw.to_string())
    }

    /// Convert the value to `target`, stringifying when no lossless conversion exists.
    #[must_use]
    pub fn coerce(self, target: ColumnType) -> AttributeValue {
        match (self, target) {
            (AttributeValue::Null, _) => AttributeValue::Null,
            (AttributeValue::Integer(v), ColumnType::Float) => AttributeValue::Float(v as f64),
            (AttributeValue::Text(s), ColumnType::Timestamp) => match parse_timestamp(&s) {
                Some(ts) => AttributeValue::Timestamp(ts),
                None => AttributeValue::Text(s),
            },
            (value, ColumnType::Text) => match value {
                AttributeValue::Text(s) => AttributeValue::Text(s),
                other => AttributeValue::Text(other.to_string()),
            },
            (value, _) => value,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => Ok(()),
            AttributeValue::Integer(v) => write!(f, "{v}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::Boolean(v) => write!(f, "{v}"),
            AttributeValue::Text(v) => f.write_str(v),
            AttributeValue::Timestamp(v) => {
                f.write_str(&v.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            },
            AttributeValue::Duration(v) => write!(f, "{v}"),
        }
    }
}

/// A duration as fractional seconds, the form durations take in text outputs.
#[must_use]
pub fn duration_seconds(duration: &TimeDelta) -> f64 {
    duration.num_milliseconds() as f64 / 1000.0
}

/// Parse an RFC 3339 timestamp, a naive `YYYY-MM-DD HH:MM:SS` timestamp or a
/// bare date. Naive values are interpreted as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for pattern in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, pattern) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_cells() {
        assert_eq!(AttributeValue::parse_text(""), AttributeValue::Null);
        assert_eq!(AttributeValue::parse_text("  "), AttributeValue::Null);
        assert_eq!(AttributeValue::parse_text("42"), AttributeValue::Integer(42));
        assert_eq!(AttributeValue::parse_text("4.5"), AttributeValue::Float(4.5));
        assert_eq!(AttributeValue::parse_text("TRUE"), AttributeValue::Boolean(true));
        assert_eq!(
            AttributeValue::parse_text("Perth"),
            AttributeValue::Text("Perth".to_string())
        );
    }

    #[test]
    fn test_nan_is_text() {
        assert_eq!(
            AttributeValue::parse_text("NaN"),
            AttributeValue::Text("NaN".to_string())
        );
    }

    #[test]
    fn test_unify_types() {
        assert_eq!(ColumnType::Integer.unify(ColumnType::Float), ColumnType::Float);
        assert_eq!(ColumnType::Boolean.unify(ColumnType::Boolean), ColumnType::Boolean);
        assert_eq!(ColumnType::Boolean.unify(ColumnType::Integer), ColumnType::Text);
    }

    #[test]
    fn test_coerce_to_text_and_float() {
        assert_eq!(
            AttributeValue::Integer(3).coerce(ColumnType::Float),
            AttributeValue::Float(3.0)
        );
        assert_eq!(
            AttributeValue::Boolean(true).coerce(ColumnType::Text),
            AttributeValue::Text("true".to_string())
        );
        assert_eq!(
            AttributeValue::Null.coerce(ColumnType::Text),
            AttributeValue::Null
        );
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        assert_eq!(parse_timestamp("2024-03-01T00:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01"), Some(expected));
        assert_eq!(parse_timestamp("March 1st"), None);
    }

    #[test]
    fn test_duration_seconds() {
        assert_eq!(duration_seconds(&TimeDelta::milliseconds(1500)), 1.5);
    }

    #[test]
    fn test_timestamp_display_is_rfc3339() {
        let ts = parse_timestamp("2024-03-01T10:30:00+02:00").unwrap();
        assert_eq!(AttributeValue::Timestamp(ts).to_string(), "2024-03-01T08:30:00Z");
    }
}
