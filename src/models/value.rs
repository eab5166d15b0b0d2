use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// DICOM DA wire format
pub const DATE_FORMAT: &str = "%Y%m%d";

/// How a field's wire text is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Date,
    Integer,
}

/// A typed field or constraint value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    Integer(i64),
}

impl FieldValue {
    /// Parse wire text into the given kind; `None` when it does not parse
    pub fn parse(kind: ValueKind, raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match kind {
            ValueKind::Text => Some(FieldValue::Text(raw.to_string())),
            ValueKind::Date => NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .map(FieldValue::Date),
            ValueKind::Integer => raw.parse().ok().map(FieldValue::Integer),
        }
    }

    /// The absent value: empty or whitespace-only text
    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s.trim().is_empty())
    }

    /// Wildcard containment used by `Like` matching
    ///
    /// Text compares case-insensitively on its own; dates and integers fall
    /// back to a substring test on their wire form.
    pub fn contains(&self, needle: &FieldValue) -> bool {
        match (self, needle) {
            (FieldValue::Text(hay), FieldValue::Text(needle)) => {
                hay.to_lowercase().contains(&needle.to_lowercase())
            }
            (hay, needle) => hay.to_string().contains(&needle.to_string()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s),
            other => Some(other.to_string()),
        }
    }

    pub fn into_date(self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(d),
            FieldValue::Text(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok(),
            FieldValue::Integer(_) => None,
        }
    }

    pub fn into_integer(self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(n),
            FieldValue::Text(s) => s.trim().parse().ok(),
            FieldValue::Date(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            FieldValue::Integer(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_by_kind() {
        assert_eq!(
            FieldValue::parse(ValueKind::Date, "20240131"),
            Some(FieldValue::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()))
        );
        assert_eq!(FieldValue::parse(ValueKind::Integer, " 12 "), Some(FieldValue::Integer(12)));
        assert_eq!(FieldValue::parse(ValueKind::Integer, "twelve"), None);
        assert_eq!(FieldValue::parse(ValueKind::Text, "   "), None);
    }

    #[test]
    fn test_text_containment_ignores_case() {
        let name = FieldValue::from("Doe^John");
        assert!(name.contains(&"doe".into()));
        assert!(name.contains(&"JOHN".into()));
        assert!(!name.contains(&"Smith".into()));
    }

    #[test]
    fn test_date_containment_uses_wire_form() {
        let date = FieldValue::Date(NaiveDate::from_ymd_opt(2023, 5, 7).unwrap());
        assert_eq!(date.to_string(), "20230507");
        assert!(date.contains(&"202305".into()));
        assert!(!date.contains(&"2024".into()));
    }

    #[test]
    fn test_empty_value() {
        assert!(FieldValue::from(" ").is_empty());
        assert!(!FieldValue::Integer(0).is_empty());
    }
}
