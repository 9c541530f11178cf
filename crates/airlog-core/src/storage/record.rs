//! Records read and written by the rollup cascade
//!
//! Input files carry either raw lines (`time metric value`) or lines from a
//! previous aggregation (`time metric average count`). Both are resolved once
//! per line into a [`LineRecord`]; output files carry [`AggregateRecord`]s:
//!
//! ```text
//! 2024-01-01T00:30:00.000Z\tTEMPERATURE\t21.37\t6
//! ```

use core::fmt::Display;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::sensors::parse_instant;

/// Largest count accepted in an aggregated line
pub const MAX_COUNT: f64 = u32::MAX as f64;

/// One parsed input line
#[derive(Debug, Clone, PartialEq)]
pub enum LineRecord {
    /// A single reading, implicit count of 1
    Raw {
        time: DateTime<Utc>,
        metric: String,
        value: f64,
    },
    /// An average over `count` readings from a finer level
    Aggregated {
        time: DateTime<Utc>,
        metric: String,
        average: f64,
        count: u64,
    },
}

impl LineRecord {
    /// Parse a whitespace-separated record line.
    ///
    /// Returns `None` for blank lines, lines with fewer than three fields,
    /// unparseable timestamps, non-finite values and counts above
    /// [`MAX_COUNT`]. A fourth field that is not a positive number leaves the
    /// line a raw record.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();

        let time = parse_instant(fields.next()?)?;
        let metric = fields.next()?.to_string();
        let value: f64 = fields.next()?.parse().ok()?;
        if !value.is_finite() {
            return None;
        }

        let count = fields
            .next()
            .and_then(|field| field.parse::<f64>().ok())
            .filter(|count| count.is_finite() && *count >= 1.0);
        if count.is_some_and(|count| count > MAX_COUNT) {
            return None;
        }
        let count = count.map(|count| count.floor() as u64);

        Some(match count {
            Some(count) => Self::Aggregated {
                time,
                metric,
                average: value,
                count,
            },
            None => Self::Raw {
                time,
                metric,
                value,
            },
        })
    }

    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Self::Raw { time, .. } | Self::Aggregated { time, .. } => *time,
        }
    }

    pub fn metric(&self) -> &str {
        match self {
            Self::Raw { metric, .. } | Self::Aggregated { metric, .. } => metric,
        }
    }

    /// Contribution to a running `(sum, count)` accumulator
    pub fn weighted(&self) -> (f64, u64) {
        match self {
            Self::Raw { value, .. } => (*value, 1),
            Self::Aggregated { average, count, .. } => (average * *count as f64, *count),
        }
    }
}

/// One output line: the average of `count` readings of `metric` in a bucket
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRecord {
    pub bucket: DateTime<Utc>,
    pub metric: String,
    pub average: f64,
    pub count: u64,
}

impl AggregateRecord {
    /// Read an aggregate line back; raw lines are accepted with a count of 1
    pub fn parse(line: &str) -> Option<Self> {
        let record = LineRecord::parse(line)?;
        let (sum, count) = record.weighted();

        Some(Self {
            bucket: record.time(),
            metric: record.metric().to_string(),
            average: sum / count as f64,
            count,
        })
    }
}

/// Format a bucket start as `2024-01-01T00:00:00.000Z`
pub fn format_bucket(bucket: DateTime<Utc>) -> String {
    bucket.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Round to two decimals, exact ties away from zero.
///
/// Non-ties are left to the formatter, which rounds the exact binary value
/// correctly. Only values whose scaled form is exactly `n.5` are adjusted,
/// since the formatter would send those to the even neighbour.
fn round_cents(value: f64) -> f64 {
    let scaled = value * 100.0;
    let exact = value.mul_add(100.0, -scaled) == 0.0;

    if exact && scaled.fract().abs() == 0.5 {
        (scaled.trunc() + scaled.signum()) / 100.0
    } else {
        value
    }
}

impl Display for AggregateRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}\t{}\t{:.2}\t{}",
            format_bucket(self.bucket),
            self.metric,
            round_cents(self.average),
            self.count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_raw_and_aggregated() {
        let time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();

        assert_eq!(
            LineRecord::parse("2024-01-01T00:05:00Z\tTEMP\t20"),
            Some(LineRecord::Raw {
                time,
                metric: "TEMP".into(),
                value: 20.0
            })
        );
        assert_eq!(
            LineRecord::parse("2024-01-01T00:05:00.000Z TEMP 15.50 4"),
            Some(LineRecord::Aggregated {
                time,
                metric: "TEMP".into(),
                average: 15.5,
                count: 4
            })
        );
    }

    #[test]
    fn test_invalid_count_falls_back_to_raw() {
        for count in ["0", "-3", "abc", "0.5"] {
            let line = format!("2024-01-01T00:00:00Z TEMP 1 {count}");
            assert!(matches!(LineRecord::parse(&line), Some(LineRecord::Raw { .. })), "{line}");
        }
    }

    #[test]
    fn test_oversized_count_is_malformed() {
        assert_eq!(LineRecord::parse("2024-01-01T00:00:00Z TEMP 1 1e19"), None);
        assert_eq!(LineRecord::parse("2024-01-01T00:00:00Z TEMP 1 4294967296"), None);
        assert!(matches!(
            LineRecord::parse("2024-01-01T00:00:00Z TEMP 1 4294967295"),
            Some(LineRecord::Aggregated { count: 4_294_967_295, .. })
        ));
    }

    #[test]
    fn test_average_ties_round_away_from_zero() {
        let line = |average: f64| {
            AggregateRecord {
                bucket: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                metric: "TEMP".into(),
                average,
                count: 8,
            }
            .to_string()
        };

        assert_eq!(line(81.0 / 8.0), "2024-01-01T00:00:00.000Z\tTEMP\t10.13\t8");
        assert!(line(0.125).ends_with("\t0.13\t8"));
        assert!(line(-10.125).ends_with("\t-10.13\t8"));
        assert!(line(2.5).ends_with("\t2.50\t8"));
        // Not exact ties in binary: rounded by their true value.
        assert!(line(1.005).ends_with("\t1.00\t8"));
        assert!(line(2.675).ends_with("\t2.67\t8"));
    }

    #[test]
    fn test_malformed_lines() {
        for line in [
            "",
            "   ",
            "garbage text",
            "2024-01-01T00:00:00Z TEMP",
            "not-a-time TEMP 1",
            "2024-01-01T00:00:00Z TEMP abc",
            "2024-01-01T00:00:00Z TEMP inf",
        ] {
            assert_eq!(LineRecord::parse(line), None, "{line:?}");
        }
    }

    #[test]
    fn test_weighted_contribution() {
        let raw = LineRecord::parse("2024-01-01T00:00:00Z CO2 400").unwrap();
        assert_eq!(raw.weighted(), (400.0, 1));

        let agg = LineRecord::parse("2024-01-01T00:00:00Z CO2 410.5 2").unwrap();
        assert_eq!(agg.weighted(), (821.0, 2));
    }

    #[test]
    fn test_aggregate_record_format() {
        let record = AggregateRecord {
            bucket: Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap(),
            metric: "TEMPERATURE".into(),
            average: 21.0,
            count: 6,
        };

        let line = record.to_string();
        assert_eq!(line, "2024-01-01T00:30:00.000Z\tTEMPERATURE\t21.00\t6");
        assert_eq!(AggregateRecord::parse(&line), Some(record));
    }
}
