//! InfluxDB Line Protocol Encoding
//!
//! ```text
//! measurement,tag1=a,tag2=b field1=1.5,field2="text" 1700000000000000000
//! ```
//!
//! Timestamps are nanoseconds. Floats are written without a type suffix.
//! Non-finite floats and empty tag values are left out, since the backend
//! rejects them; a point with no writable field is skipped entirely.

use std::fmt::Write as _;

use crate::domain::point::{FieldValue, NormalizedPoint};

/// Encode one point, or `None` if nothing about it is writable.
#[must_use]
pub fn encode_point(point: &NormalizedPoint) -> Option<String> {
    let timestamp = point.timestamp().timestamp_nanos_opt()?;

    let fields: Vec<String> = point
        .fields()
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                FieldValue::Float(v) if v.is_finite() => v.to_string(),
                FieldValue::Float(_) => return None,
                FieldValue::Text(s) => format!("\"{}\"", escape_string(s)),
            };
            Some(format!("{}={value}", escape_key(key)))
        })
        .collect();

    if fields.is_empty() {
        return None;
    }

    let mut line = escape_measurement(point.measurement());
    for (key, value) in point.tags() {
        if value.is_empty() {
            continue;
        }
        let _ = write!(line, ",{}={}", escape_key(key), escape_key(value));
    }
    let _ = write!(line, " {} {timestamp}", fields.join(","));
    Some(line)
}

/// Encode a batch as newline-separated lines, skipping unwritable points.
#[must_use]
pub fn encode_batch(points: &[NormalizedPoint]) -> String {
    points
        .iter()
        .filter_map(encode_point)
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_measurement(s: &str) -> String {
    escape(s, &[',', ' '])
}

fn escape_key(s: &str) -> String {
    escape(s, &[',', '=', ' '])
}

fn escape_string(s: &str) -> String {
    escape(s, &['"', '\\'])
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::domain::point::{Fields, Tags};

    fn point(tags: &[(&str, &str)], fields: Fields) -> NormalizedPoint {
        NormalizedPoint::new(
            "candle stick",
            tags.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<Tags>(),
            fields,
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn encodes_tags_fields_and_nanos() {
        let line = encode_point(&point(
            &[("pair", "BTC/USDT"), ("exchange", "X")],
            Fields::from([
                ("open".to_string(), FieldValue::Float(1.5)),
                ("close".to_string(), FieldValue::Float(2.0)),
            ]),
        ))
        .unwrap();
        assert_eq!(
            line,
            r"candle\ stick,exchange=X,pair=BTC/USDT close=2,open=1.5 1700000000000000000"
        );
    }

    #[test]
    fn escapes_keys_and_strings() {
        let line = encode_point(&point(
            &[("market type", "a,b=c")],
            Fields::from([("note".to_string(), FieldValue::from(r#"say "hi" \o/"#))]),
        ))
        .unwrap();
        assert!(line.contains(r"market\ type=a\,b\=c"));
        assert!(line.contains(r#"note="say \"hi\" \\o/""#));
    }

    #[test]
    fn drops_non_finite_and_empty_tags() {
        let line = encode_point(&point(
            &[("quote", "")],
            Fields::from([
                ("bad".to_string(), FieldValue::Float(f64::NAN)),
                ("good".to_string(), FieldValue::Float(1.0)),
            ]),
        ))
        .unwrap();
        assert_eq!(line, r"candle\ stick good=1 1700000000000000000");
    }

    #[test]
    fn skips_point_without_writable_fields() {
        let only_nan = point(
            &[],
            Fields::from([("v".to_string(), FieldValue::Float(f64::INFINITY))]),
        );
        assert!(encode_point(&only_nan).is_none());
        assert_eq!(encode_batch(&[only_nan]), "");
    }

    #[test]
    fn batch_joins_lines() {
        let p = point(&[], Fields::from([("v".to_string(), FieldValue::Float(1.0))]));
        assert_eq!(encode_batch(&[p.clone(), p]).lines().count(), 2);
    }
}
