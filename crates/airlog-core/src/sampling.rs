//! Adaptive downsampling of sample series for presentation
//!
//! A series of `N` samples is reduced to at most `M` points. Output point `i`
//! averages the source window that ends at position `p(i)`, where the
//! positions follow a blend of a linear and a base-10 logarithmic curve:
//!
//! ```text
//! linear(i)      = i / (M - 1)
//! logarithmic(i) = log10(1 + linear(i) * 9)
//! p(i)           = (1 - ratio) * linear(i) + ratio * logarithmic(i)
//! ```
//!
//! `ratio = 0` spaces windows evenly, `ratio = 1` makes early windows wide and
//! late windows narrow, which keeps the most recent readings at full detail.
//! [`Distribution::InvertedLogarithmic`] mirrors that curve.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::sensors::Sample;

/// One reduced point: mean value of its window, timestamp of the window's last sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownsampledPoint {
    pub time: String,
    pub value: f64,
}

/// Shape of the position curve used to place window boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Distribution {
    /// Linear/log10 blend, windows shrink toward the end of the series
    #[default]
    Logarithmic,
    /// Mirror of [`Distribution::Logarithmic`], windows grow toward the end
    InvertedLogarithmic,
}

impl Distribution {
    /// Generate `count` increasing positions over `[min, max]`.
    pub fn positions(self, min: f64, max: f64, count: usize, ratio: f64) -> Result<Vec<f64>> {
        match self {
            Self::Logarithmic => log_distribution(min, max, count, ratio),
            Self::InvertedLogarithmic => inverted_log_distribution(min, max, count, ratio),
        }
    }
}

/// Positions over `[min, max]` blending a linear and a log10 curve.
///
/// Fails if `count < 2`. `ratio` is clamped into `[0, 1]`. Bounds given in
/// the wrong order are swapped.
pub fn log_distribution(min: f64, max: f64, count: usize, ratio: f64) -> Result<Vec<f64>> {
    if count < 2 {
        return Err(Error::InvalidMaxCount(count));
    }

    let (mut min, mut max) = if min > max { (max, min) } else { (min, max) };

    // log10 is undefined or negative below 1, so shift the domain up for the
    // computation and back down for the result.
    let offset = if min < 1.0 { min.abs() + 1.0 } else { 0.0 };
    min += offset;
    max += offset;

    let ratio = clamp_ratio(ratio);
    let last = (count - 1) as f64;

    let positions = (0..count)
        .map(|i| {
            let linear = i as f64 / last;
            let logarithmic = if i > 0 { (1.0 + linear * 9.0).log10() } else { 0.0 };
            let interpolated = (1.0 - ratio) * linear + ratio * logarithmic;

            min + interpolated * (max - min) - offset
        })
        .collect();

    Ok(positions)
}

/// Mirror of [`log_distribution`]: the gaps are replayed from the tail.
pub fn inverted_log_distribution(min: f64, max: f64, count: usize, ratio: f64) -> Result<Vec<f64>> {
    let mut values = log_distribution(min, max, count, ratio)?;
    values.reverse();

    let start = min.min(max);
    let mut prev = values[0];
    let mut last = start;

    let positions = values
        .into_iter()
        .map(|value| {
            last += prev - value;
            prev = value;
            last
        })
        .collect();

    Ok(positions)
}

/// Clamp a downsampling ratio into `[0, 1]`, mapping NaN to 0
pub fn clamp_ratio(ratio: f64) -> f64 {
    if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) }
}

/// Reduce `series` to at most `max_count` points using the default
/// logarithmic distribution and the sample values.
pub fn downsample(series: &[Sample], max_count: usize, ratio: f64) -> Result<Vec<DownsampledPoint>> {
    downsample_with(series, max_count, ratio, Distribution::Logarithmic, |s| s.value)
}

/// Reduce `series` to at most `max_count` points.
///
/// Consecutive rounded positions `[prev, index]` delimit each window; the
/// first window starts at 0 and each following one starts right after the
/// previous window's end. When rounding makes a window empty or inverted the
/// point repeats the sample at `index`, so short series with high ratios can
/// produce repeated points.
pub fn downsample_with<F>(
    series: &[Sample],
    max_count: usize,
    ratio: f64,
    distribution: Distribution,
    value_fn: F,
) -> Result<Vec<DownsampledPoint>>
where
    F: Fn(&Sample) -> f64,
{
    if max_count < 2 {
        return Err(Error::InvalidMaxCount(max_count));
    }
    if series.is_empty() {
        return Ok(Vec::new());
    }

    let last_index = series.len() - 1;
    let positions = distribution.positions(0.0, last_index as f64, max_count, ratio)?;

    let mut points = Vec::with_capacity(max_count);
    let mut from = 0usize;

    for position in positions {
        let index = (position.round().max(0.0) as usize).min(last_index);

        points.push(DownsampledPoint {
            time: series[index].time.clone(),
            value: window_average(series, from, index, &value_fn),
        });

        from = index + 1;
    }

    Ok(points)
}

fn window_average<F>(series: &[Sample], from: usize, to: usize, value_fn: &F) -> f64
where
    F: Fn(&Sample) -> f64,
{
    if from >= to {
        return value_fn(&series[to]);
    }

    let window = &series[from..=to];
    window.iter().map(value_fn).sum::<f64>() / window.len() as f64
}
