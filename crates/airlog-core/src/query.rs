//! Period queries over raw and aggregate files
//!
//! A chart request names a period (`raw`, `1d`, `1w`, ... `5y`). Each
//! aggregated period reads the daily file of one level, keeps the samples
//! that fall inside the period's span and downsamples them per sensor.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, Utc};
use log::{debug, warn};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::parsing::LineParser;
use crate::sampling::{DownsampledPoint, Distribution, downsample_with};
use crate::sensors::{Sample, SensorSpec};
use crate::storage::record::format_bucket;
use crate::storage::{AggregateRecord, Level, StorageLayout};

/// Default number of points per chart series
pub const DEFAULT_CHART_LENGTH: usize = 300;
/// Upper bound on points per chart series
pub const MAX_CHART_LENGTH: usize = 5000;

const DAY_SECS: i64 = 24 * 60 * 60;

/// Time range a chart covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Period {
    #[serde(rename = "raw")]
    Raw,
    #[serde(rename = "1d")]
    Day,
    #[serde(rename = "1w")]
    Week,
    #[serde(rename = "1m")]
    Month,
    #[serde(rename = "3m")]
    Quarter,
    #[serde(rename = "6m")]
    HalfYear,
    #[serde(rename = "1y")]
    Year,
    #[serde(rename = "2y")]
    TwoYears,
    #[serde(rename = "5y")]
    FiveYears,
}

impl Period {
    pub const ALL: [Period; 9] = [
        Period::Raw,
        Period::Day,
        Period::Week,
        Period::Month,
        Period::Quarter,
        Period::HalfYear,
        Period::Year,
        Period::TwoYears,
        Period::FiveYears,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Period::Raw => "raw",
            Period::Day => "1d",
            Period::Week => "1w",
            Period::Month => "1m",
            Period::Quarter => "3m",
            Period::HalfYear => "6m",
            Period::Year => "1y",
            Period::TwoYears => "2y",
            Period::FiveYears => "5y",
        }
    }

    /// Aggregation level read for this period; `None` reads the raw log
    pub const fn level(self) -> Option<Level> {
        match self {
            Period::Raw => None,
            Period::Day => Some(Level::FiveMinutes),
            Period::Week => Some(Level::ThirtyMinutes),
            Period::Month | Period::Quarter | Period::HalfYear => Some(Level::TwoHours),
            Period::Year | Period::TwoYears => Some(Level::TwelveHours),
            Period::FiveYears => Some(Level::OneWeek),
        }
    }

    /// How far back from the reference instant samples are kept
    pub fn span(self) -> Option<TimeDelta> {
        let days = match self {
            Period::Raw => return None,
            Period::Day => 1,
            Period::Week => 7,
            Period::Month => 30,
            Period::Quarter => 90,
            Period::HalfYear => 180,
            Period::Year => 365,
            Period::TwoYears => 730,
            Period::FiveYears => 5 * 365,
        };
        Some(TimeDelta::seconds(days * DAY_SECS))
    }

    /// Instant the span is measured back from.
    ///
    /// `1d` charts the last complete day, so its reference is the final
    /// millisecond of the day before `now`.
    pub fn reference_instant(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Period::Day => {
                let yesterday = now.date_naive().checked_sub_days(Days::new(1));
                let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999);
                match (yesterday, end_of_day) {
                    (Some(day), Some(time)) => day.and_time(time).and_utc(),
                    _ => now,
                }
            }
            _ => now,
        }
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Period {
    type Err = String;

    /// Case-insensitive
    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Period::ALL
            .into_iter()
            .find(|p| p.label() == lower)
            .ok_or_else(|| {
                let valid: Vec<&str> = Period::ALL.iter().map(|p| p.label()).collect();
                format!("Invalid period. Use: {}", valid.join(", "))
            })
    }
}

/// Daily file backing `period` on `date`.
///
/// Falls back to the most recent file of the level when the expected one
/// does not exist yet. `Ok(None)` for the raw period or when the level has
/// no files at all.
pub fn resolve_aggregate_file(
    layout: &StorageLayout,
    period: Period,
    date: NaiveDate,
) -> Result<Option<PathBuf>> {
    let Some(level) = period.level() else {
        return Ok(None);
    };

    let expected = layout.aggregate_file(level, date);
    if expected.is_file() {
        return Ok(Some(expected));
    }

    debug!("[{period}] {} missing, falling back to latest {level} file", expected.display());
    layout.latest_aggregate_file(level)
}

/// Read an aggregate file into per-sensor histories keyed by sensor key.
///
/// Metrics no sensor maps to are ignored, as are lines that do not parse.
pub fn load_aggregate_series(path: &Path, specs: &[SensorSpec]) -> Result<BTreeMap<String, Vec<Sample>>> {
    let text = fs::read_to_string(path).map_err(Error::io(path))?;

    let keys: BTreeMap<&str, &str> = specs
        .iter()
        .filter(|spec| spec.is_parseable())
        .filter_map(|spec| Some((spec.data_key.as_deref()?, spec.key.as_str())))
        .collect();

    let mut series: BTreeMap<String, Vec<Sample>> = BTreeMap::new();
    for record in text.lines().filter_map(AggregateRecord::parse) {
        let Some(key) = keys.get(record.metric.as_str()) else {
            continue;
        };
        series
            .entry((*key).to_string())
            .or_default()
            .push(Sample::new(format_bucket(record.bucket), record.average));
    }

    Ok(series)
}

/// Samples no older than `period`'s span before `reference`.
///
/// Samples whose time is not ISO-8601 are dropped. The raw period keeps
/// everything.
pub fn filter_by_span(samples: &[Sample], period: Period, reference: DateTime<Utc>) -> Vec<Sample> {
    let Some(span) = period.span() else {
        return samples.to_vec();
    };

    samples
        .iter()
        .filter(|s| s.instant().is_some_and(|t| reference - t <= span))
        .cloned()
        .collect()
}

/// Downsampled series for one sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub config: SensorSpec,
    pub data: Vec<DownsampledPoint>,
}

/// A validated chart query
#[derive(Debug, Clone, PartialEq)]
pub struct ChartRequest {
    pub period: Period,
    /// Logarithmic share of the sampling curve, in `[0, 1]`
    pub ratio: f64,
    /// Maximum points per series, in `[2, MAX_CHART_LENGTH]`
    pub length: usize,
    /// Only chart these sensor keys when set
    pub keys: Option<Vec<String>>,
}

impl ChartRequest {
    /// Clamp the query parameters into range, filling in defaults.
    pub fn new(period: Period, ratio: Option<f64>, length: Option<usize>) -> Self {
        let ratio = match ratio {
            Some(r) if !r.is_nan() => r.clamp(0.0, 1.0),
            _ => 1.0,
        };

        Self {
            period,
            ratio,
            length: length.unwrap_or(DEFAULT_CHART_LENGTH).clamp(2, MAX_CHART_LENGTH),
            keys: None,
        }
    }

    /// Restrict the request to a comma-separated list of sensor keys
    pub fn with_keys(mut self, keys: &str) -> Self {
        self.keys = Some(keys.split(',').map(str::to_string).collect());
        self
    }

    fn wants(&self, key: &str) -> bool {
        self.keys.as_ref().is_none_or(|keys| keys.iter().any(|k| k == key))
    }

    /// Run the query: pick the file, load histories, cut to span, downsample.
    ///
    /// `raw_file` is read for the raw period. A backing file that does not
    /// exist yields no samples rather than an error.
    pub fn series(
        &self,
        layout: &StorageLayout,
        specs: &[SensorSpec],
        raw_file: &Path,
        now: DateTime<Utc>,
    ) -> Result<Vec<ChartSeries>> {
        let reference = self.period.reference_instant(now);

        let history = match self.period.level() {
            None => load_raw_series(raw_file, specs)?,
            Some(_) => match resolve_aggregate_file(layout, self.period, reference.date_naive())? {
                Some(path) => load_aggregate_series(&path, specs)?,
                None => {
                    warn!("[{}] No aggregate file available", self.period);
                    BTreeMap::new()
                }
            },
        };

        specs
            .iter()
            .filter(|spec| spec.is_parseable() && self.wants(&spec.key))
            .map(|spec| {
                let entries = history.get(&spec.key).map(Vec::as_slice).unwrap_or_default();
                let entries = filter_by_span(entries, self.period, reference);
                let data = downsample_with(
                    &entries,
                    self.length,
                    self.ratio,
                    Distribution::Logarithmic,
                    |s| s.value,
                )?;

                Ok(ChartSeries {
                    config: spec.clone(),
                    data,
                })
            })
            .collect()
    }
}

fn load_raw_series(path: &Path, specs: &[SensorSpec]) -> Result<BTreeMap<String, Vec<Sample>>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("Raw file {} not found", path.display());
            return Ok(BTreeMap::new());
        }
        Err(e) => return Err(Error::io(path)(e)),
    };

    let lines: Vec<&str> = text.lines().collect();
    let parsed = LineParser::new(specs)?.parse(&lines);
    Ok(parsed.map(|data| data.history).unwrap_or_default())
}
