//! Raw log line grammar
//!
//! A raw line carries a free-text timestamp prefix, whitespace, the sensor's
//! data key, optional further text, whitespace and a floating-point value at
//! the very end:
//!
//! ```text
//! 2024-01-01T00:00:00Z    TEMPERATURE    21.5
//! 2024-01-01 00:00:00 CO2 (ppm): 415
//! ```
//!
//! One pattern per configured data key is compiled when the parser is built
//! and reused for every line after that.

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::{Error, Result};
use crate::sensors::{Sample, SensorSpec};

const VALUE_PATTERN: &str = r"[-+]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][-+]?\d+)?";

/// Result of parsing a batch of lines
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedData {
    /// Most recent value per sensor key, only for sensors that produced samples
    pub current: BTreeMap<String, f64>,
    /// Samples per sensor key in line order; every parseable sensor has an entry
    pub history: BTreeMap<String, Vec<Sample>>,
}

impl ParsedData {
    /// Most recent value for `key`, if any line produced one
    pub fn latest(&self, key: &str) -> Option<f64> {
        self.current.get(key).copied()
    }
}

/// Compiled matcher for one parseable sensor
#[derive(Debug, Clone)]
struct SensorPattern {
    spec: SensorSpec,
    data_key: String,
    regex: Regex,
}

/// Line parser bound to a sensor schema.
///
/// The parser is immutable after construction and can be shared between
/// threads behind an `Arc` or a plain reference.
#[derive(Debug, Clone)]
pub struct LineParser {
    patterns: Vec<SensorPattern>,
}

impl LineParser {
    /// Compile one pattern per sensor that has a data key.
    ///
    /// Derived sensors (no data key) are kept out of the parser entirely.
    pub fn new(specs: &[SensorSpec]) -> Result<Self> {
        let mut patterns = Vec::with_capacity(specs.len());

        for spec in specs.iter().filter(|s| s.is_parseable()) {
            let data_key = spec.data_key.clone().unwrap_or_default();
            let regex = Self::compile(&data_key)?;
            patterns.push(SensorPattern {
                spec: spec.clone(),
                data_key,
                regex,
            });
        }

        Ok(Self { patterns })
    }

    fn compile(data_key: &str) -> Result<Regex> {
        // `PM_10` must not match inside `PM_100`.
        let boundary = if data_key.ends_with(|c: char| c.is_alphanumeric() || c == '_') {
            r"\b"
        } else {
            ""
        };
        let pattern = format!(
            r"^(?P<time>.*?\S)\s+{key}{boundary}.*?\s(?P<value>{VALUE_PATTERN})$",
            key = regex::escape(data_key),
        );

        Regex::new(&pattern).map_err(|source| Error::Pattern {
            key: data_key.to_string(),
            source,
        })
    }

    /// Sensor specs this parser can extract values for
    pub fn sensors(&self) -> impl Iterator<Item = &SensorSpec> {
        self.patterns.iter().map(|p| &p.spec)
    }

    /// Try to read a sample for one sensor out of one line.
    ///
    /// Returns `None` when the line does not match the sensor's grammar or
    /// the value is not a finite number.
    fn match_line(pattern: &SensorPattern, line: &str) -> Option<Sample> {
        if !line.contains(pattern.data_key.as_str()) {
            return None;
        }

        let captures = pattern.regex.captures(line.trim())?;
        let value: f64 = captures.name("value")?.as_str().parse().ok()?;
        if !value.is_finite() {
            return None;
        }

        Some(Sample::new(captures.name("time")?.as_str(), value))
    }

    /// Parse `lines` into per-sensor histories.
    ///
    /// Returns `None` when no configured sensor produced a single sample, so
    /// callers can keep their previous state instead of overwriting it.
    pub fn parse<S: AsRef<str>>(&self, lines: &[S]) -> Option<ParsedData> {
        let mut data = ParsedData::default();
        let mut produced = false;

        for pattern in &self.patterns {
            let history: Vec<Sample> = lines
                .iter()
                .filter_map(|line| Self::match_line(pattern, line.as_ref()))
                .collect();

            if let Some(last) = history.last() {
                data.current.insert(pattern.spec.key.clone(), last.value);
                produced = true;
            }
            data.history.insert(pattern.spec.key.clone(), history);
        }

        produced.then_some(data)
    }

    /// Whether `line` matches at least one configured sensor's grammar.
    ///
    /// Ingestion adapters use this to drop noise before persisting a line.
    pub fn is_valid_sensor_string(&self, line: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| Self::match_line(pattern, line).is_some())
    }
}
