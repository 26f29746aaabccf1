//! Normalized Time-Series Points
//!
//! The uniform record every topic payload is normalized into before it
//! reaches the sink. A point carries a measurement name, string tags,
//! numeric or string fields, and an absolute timestamp.
//!
//! Tag and field key sets are disjoint and a point always has at least one
//! field; both are checked at construction so the sink never has to.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Tag set of a point (identifying dimensions).
pub type Tags = BTreeMap<String, String>;

/// Field set of a point (measured values).
pub type Fields = BTreeMap<String, FieldValue>;

/// Value of a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Floating-point value.
    Float(f64),
    /// String value.
    Text(String),
}

impl FieldValue {
    /// Numeric value, if this is a float field.
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    /// String value, if this is a text field.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Float(_) => None,
            Self::Text(s) => Some(s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Errors raised when a point would violate its invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PointError {
    /// A key appears both as tag and as field.
    #[error("key {0:?} is both a tag and a field")]
    OverlappingKey(String),

    /// The point has no fields.
    #[error("point for measurement {0:?} has no fields")]
    NoFields(String),
}

/// A uniform time-series record.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPoint {
    measurement: String,
    tags: Tags,
    fields: Fields,
    timestamp: DateTime<Utc>,
}

impl NormalizedPoint {
    /// Create a point, checking that tags and fields are disjoint and that
    /// at least one field is present.
    ///
    /// # Errors
    ///
    /// Returns [`PointError`] if either invariant is violated.
    pub fn new(
        measurement: impl Into<String>,
        tags: Tags,
        fields: Fields,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, PointError> {
        let measurement = measurement.into();

        if fields.is_empty() {
            return Err(PointError::NoFields(measurement));
        }
        if let Some(key) = tags.keys().find(|k| fields.contains_key(*k)) {
            return Err(PointError::OverlappingKey(key.clone()));
        }

        Ok(Self {
            measurement,
            tags,
            fields,
            timestamp,
        })
    }

    /// Measurement name.
    #[must_use]
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Tags, sorted by key.
    #[must_use]
    pub const fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Fields, sorted by key.
    #[must_use]
    pub const fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Point timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Convenience lookup of a float field.
    #[must_use]
    pub fn float_field(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(FieldValue::as_f64)
    }
}

/// Convert a millisecond epoch into an absolute time.
///
/// Returns `None` when the value is outside chrono's representable range.
#[must_use]
pub fn from_unix_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Convert a second epoch into an absolute time.
#[must_use]
pub fn from_unix_secs(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        from_unix_millis(1_700_000_000_000).unwrap()
    }

    #[test]
    fn rejects_overlapping_keys() {
        let tags = Tags::from([("symbol".to_string(), "BTC".to_string())]);
        let fields = Fields::from([("symbol".to_string(), FieldValue::Float(1.0))]);
        let err = NormalizedPoint::new("m", tags, fields, ts()).unwrap_err();
        assert_eq!(err, PointError::OverlappingKey("symbol".to_string()));
    }

    #[test]
    fn rejects_empty_fields() {
        let err = NormalizedPoint::new("m", Tags::new(), Fields::new(), ts()).unwrap_err();
        assert_eq!(err, PointError::NoFields("m".to_string()));
    }

    #[test]
    fn accessors_return_parts() {
        let fields = Fields::from([
            ("open".to_string(), FieldValue::from(1.0)),
            ("miner".to_string(), FieldValue::from("0xabc")),
        ]);
        let point = NormalizedPoint::new("m", Tags::new(), fields, ts()).unwrap();
        assert_eq!(point.measurement(), "m");
        assert_eq!(point.float_field("open"), Some(1.0));
        assert_eq!(point.fields()["miner"].as_str(), Some("0xabc"));
        assert_eq!(point.timestamp().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn epoch_conversions() {
        assert_eq!(from_unix_millis(1_500).unwrap().timestamp_subsec_millis(), 500);
        assert_eq!(from_unix_secs(1_700_000_000).unwrap(), ts());
        assert!(from_unix_millis(i64::MAX).is_none());
    }
}
