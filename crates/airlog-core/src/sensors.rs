//! Sensor schema and parsed sample types

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Description of one configured sensor metric.
///
/// A spec without a `data_key` describes a derived field: it is part of the
/// schema but cannot be parsed out of raw log text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorSpec {
    /// Stable key used by consumers (e.g. `temperature`)
    pub key: String,
    /// Display unit (e.g. `°C`, `ppm`)
    #[serde(default)]
    pub unit: String,
    /// Number of fraction digits used when presenting values
    #[serde(default = "default_fraction")]
    pub fraction: u8,
    /// Token identifying the metric in raw log lines (e.g. `TEMPERATURE`)
    #[serde(default)]
    pub data_key: Option<String>,
}

const fn default_fraction() -> u8 {
    2
}

impl SensorSpec {
    /// Create a parseable sensor spec
    pub fn new(key: impl Into<String>, unit: impl Into<String>, data_key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            unit: unit.into(),
            fraction: default_fraction(),
            data_key: Some(data_key.into()),
        }
    }

    /// Create a derived (non-parseable) sensor spec
    pub fn derived(key: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            unit: unit.into(),
            fraction: default_fraction(),
            data_key: None,
        }
    }

    /// Whether values for this sensor can be read from raw text
    pub fn is_parseable(&self) -> bool {
        self.data_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// A single timestamped reading.
///
/// The time is kept exactly as it appeared in the source line; use
/// [`Sample::instant`] when a UTC instant is needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: String,
    pub value: f64,
}

impl Sample {
    pub fn new(time: impl Into<String>, value: f64) -> Self {
        Self {
            time: time.into(),
            value,
        }
    }

    /// Interpret the timestamp as a UTC instant, if it is ISO-8601
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        parse_instant(&self.time)
    }
}

/// Parse an ISO-8601 timestamp into a UTC instant.
///
/// Accepts RFC 3339 with any offset, and offset-less timestamps which are
/// taken to be UTC already.
pub fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
