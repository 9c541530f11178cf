//! Deterministic synthetic raw data for demos and tests
//!
//! Every metric is a pure periodic function of wall-clock time (milliseconds
//! since the Unix epoch), so a generated day is identical no matter when or
//! how often it is generated.

use std::io::Write;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime, TimeDelta};
use log::info;

use super::aggregate::write_atomic;
use super::layout::StorageLayout;
use super::record::format_bucket;
use crate::error::Result;

const MS_PER_DAY: i64 = 86_400_000;

/// One synthetic metric: name, printed precision and value at time `t` (ms)
#[derive(Debug, Clone, Copy)]
pub struct SyntheticMetric {
    pub name: &'static str,
    pub decimals: usize,
    pub value: fn(f64) -> f64,
}

impl SyntheticMetric {
    /// Value at `t_ms` formatted with the metric's precision
    pub fn format(&self, t_ms: f64) -> String {
        format!("{:.*}", self.decimals, (self.value)(t_ms))
    }
}

/// Registry of generated metrics, in the order they are written per sample
pub const SYNTHETIC_METRICS: [SyntheticMetric; 7] = [
    SyntheticMetric { name: "PM_10", decimals: 0, value: pm_10 },
    SyntheticMetric { name: "PM_25", decimals: 0, value: pm_25 },
    SyntheticMetric { name: "PM_100", decimals: 0, value: pm_100 },
    SyntheticMetric { name: "TVOC", decimals: 2, value: tvoc },
    SyntheticMetric { name: "CO2", decimals: 0, value: co2 },
    SyntheticMetric { name: "TEMPERATURE", decimals: 2, value: temperature },
    SyntheticMetric { name: "HUMIDITY", decimals: 2, value: humidity },
];

/// Round half up, so `-2.5` becomes `-2`
fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

fn pm_10(t: f64) -> f64 {
    round_half_up(10.0 + 5.0 * (t / 60_000.0).sin()).max(0.0)
}

fn pm_25(t: f64) -> f64 {
    round_half_up(5.0 + 3.0 * (t / 60_000.0).cos()).max(0.0)
}

fn pm_100(_t: f64) -> f64 {
    0.0
}

fn tvoc(t: f64) -> f64 {
    120.0 + 20.0 * (t / 3_600_000.0).sin()
}

fn co2(t: f64) -> f64 {
    400.0 + round_half_up(20.0 * (t / 900_000.0).sin())
}

fn temperature(t: f64) -> f64 {
    20.0 + 5.0 * (t / 3_600_000.0).sin()
}

fn humidity(t: f64) -> f64 {
    40.0 + 5.0 * (t / 3_600_000.0).cos()
}

/// Milliseconds between samples for a samples-per-minute setting
pub fn sample_interval_ms(samples_per_minute: u32) -> i64 {
    (60_000 / i64::from(samples_per_minute.max(1))).max(1)
}

/// Write a synthetic raw file for `date` unless one already exists.
///
/// Returns the path of the (new or existing) file.
pub fn generate_synthetic_raw(
    layout: &StorageLayout,
    date: NaiveDate,
    samples_per_minute: u32,
) -> Result<PathBuf> {
    let path = layout.synthetic_raw_file(date);
    if path.exists() {
        info!("[gen] Synthetic raw already exists: {}", path.display());
        return Ok(path);
    }

    let start = date.and_time(NaiveTime::MIN).and_utc();
    let start_ms = start.timestamp_millis();
    let interval = sample_interval_ms(samples_per_minute);

    write_atomic(&path, |writer| {
        let mut offset = 0;
        while offset < MS_PER_DAY {
            let ts = format_bucket(start + TimeDelta::milliseconds(offset));
            let t = (start_ms + offset) as f64;

            for metric in &SYNTHETIC_METRICS {
                writeln!(writer, "{ts}\t{}\t{}", metric.name, metric.format(t))?;
            }
            offset += interval;
        }
        Ok(())
    })?;

    info!(
        "[gen] Generated synthetic raw: {} (samples/min={samples_per_minute})",
        path.display()
    );
    Ok(path)
}
