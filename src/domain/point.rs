use std::collections::BTreeMap;
use time::OffsetDateTime;

pub type Tags = BTreeMap<String, String>;
pub type Fields = BTreeMap<String, f64>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PointError {
    #[error("measurement name is empty")]
    EmptyMeasurement,
    #[error("point has no fields")]
    NoFields,
    #[error("empty tag key")]
    EmptyTagKey,
    #[error("empty field key")]
    EmptyFieldKey,
    #[error("field {key:?} has unsupported value {value}")]
    UnsupportedValue { key: String, value: f64 },
    #[error("{0:?} contains a line break")]
    LineBreak(String),
    #[error("{0:?} ends with a backslash")]
    TrailingBackslash(String),
    #[error("timestamp {0} is outside the nanosecond range")]
    TimeOutOfRange(OffsetDateTime),
}

/// A single measurement ready for the storage backend.
///
/// Construction goes through [`Point::new`], which rejects what the backend
/// would refuse to store.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: Tags,
    fields: Fields,
    ts: OffsetDateTime,
}

impl Point {
    pub fn new(
        measurement: impl Into<String>,
        tags: Tags,
        fields: Fields,
        ts: OffsetDateTime,
    ) -> Result<Self, PointError> {
        let measurement = measurement.into();
        if measurement.is_empty() {
            return Err(PointError::EmptyMeasurement);
        }
        if fields.is_empty() {
            return Err(PointError::NoFields);
        }
        if tags.keys().any(|k| k.is_empty()) {
            return Err(PointError::EmptyTagKey);
        }
        i64::try_from(ts.unix_timestamp_nanos()).map_err(|_| PointError::TimeOutOfRange(ts))?;
        check_text(&measurement)?;
        for (key, value) in &tags {
            check_text(key)?;
            check_text(value)?;
        }
        for (key, value) in &fields {
            if key.is_empty() {
                return Err(PointError::EmptyFieldKey);
            }
            check_text(key)?;
            if !value.is_finite() {
                return Err(PointError::UnsupportedValue {
                    key: key.clone(),
                    value: *value,
                });
            }
        }
        Ok(Self {
            measurement,
            tags,
            fields,
            ts,
        })
    }

    pub fn name(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn time(&self) -> OffsetDateTime {
        self.ts
    }

    /// Encodes the point as one line of InfluxDB line protocol with a
    /// nanosecond timestamp. Tags come out sorted by key.
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape_measurement(&self.measurement);

        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }

        line.push(' ');
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&value.to_string());
        }

        line.push(' ');
        line.push_str(&self.ts.unix_timestamp_nanos().to_string());
        line
    }
}

// Line protocol cannot escape line breaks, and a trailing backslash would
// escape the delimiter that follows it.
fn check_text(s: &str) -> Result<(), PointError> {
    if s.contains(['\n', '\r']) {
        return Err(PointError::LineBreak(s.to_owned()));
    }
    if s.ends_with('\\') {
        return Err(PointError::TrailingBackslash(s.to_owned()));
    }
    Ok(())
}

fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

// Tag keys, tag values and field keys share the same rules.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
