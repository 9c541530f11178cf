//! Aggregation levels and UTC bucket truncation

use core::fmt::Display;
use core::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Seconds between 1970-01-01 (a Thursday) and 1970-01-05 (a Monday)
const MONDAY_EPOCH_OFFSET_SECS: i64 = 4 * 86_400;

/// One granularity step of the rollup chain
///
/// Levels form a parent → child chain: each aggregated level is built from
/// the daily files of the level before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    /// Raw sensor lines as written by ingestion
    #[serde(rename = "raw")]
    Raw,
    /// 5-minute buckets
    #[serde(rename = "5m")]
    FiveMinutes,
    /// 30-minute buckets
    #[serde(rename = "30m")]
    ThirtyMinutes,
    /// 2-hour buckets (even hours)
    #[serde(rename = "2h")]
    TwoHours,
    /// 12-hour buckets (00:00 and 12:00)
    #[serde(rename = "12h")]
    TwelveHours,
    /// Weekly buckets starting Monday 00:00
    #[serde(rename = "1w")]
    OneWeek,
}

impl Level {
    /// All levels, finest first
    pub const ALL: [Level; 6] = [
        Self::Raw,
        Self::FiveMinutes,
        Self::ThirtyMinutes,
        Self::TwoHours,
        Self::TwelveHours,
        Self::OneWeek,
    ];

    /// Levels built from a parent aggregate level, in build order
    pub const UPPER: [Level; 4] = [
        Self::ThirtyMinutes,
        Self::TwoHours,
        Self::TwelveHours,
        Self::OneWeek,
    ];

    /// Short label used in directory and file names
    pub const fn label(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::FiveMinutes => "5m",
            Self::ThirtyMinutes => "30m",
            Self::TwoHours => "2h",
            Self::TwelveHours => "12h",
            Self::OneWeek => "1w",
        }
    }

    /// Bucket width in seconds, `None` for raw data
    pub const fn bucket_secs(self) -> Option<i64> {
        match self {
            Self::Raw => None,
            Self::FiveMinutes => Some(300),
            Self::ThirtyMinutes => Some(1_800),
            Self::TwoHours => Some(7_200),
            Self::TwelveHours => Some(43_200),
            Self::OneWeek => Some(604_800),
        }
    }

    /// The level this one is built from
    pub const fn parent(self) -> Option<Level> {
        match self {
            Self::Raw => None,
            Self::FiveMinutes => Some(Self::Raw),
            Self::ThirtyMinutes => Some(Self::FiveMinutes),
            Self::TwoHours => Some(Self::ThirtyMinutes),
            Self::TwelveHours => Some(Self::TwoHours),
            Self::OneWeek => Some(Self::TwelveHours),
        }
    }

    /// Truncate `t` to the start of its bucket at this level.
    ///
    /// Every width divides a UTC day, so flooring seconds since the epoch
    /// lands on the wall-clock boundaries (`:05`, `:30`, even hours, 00/12).
    /// Weeks are floored against a Monday instead of the Thursday epoch.
    /// Raw data has no buckets and is returned unchanged.
    pub fn truncate(self, t: DateTime<Utc>) -> DateTime<Utc> {
        let Some(width) = self.bucket_secs() else {
            return t;
        };

        let anchor = if self == Self::OneWeek {
            MONDAY_EPOCH_OFFSET_SECS
        } else {
            0
        };

        let into_bucket = (t.timestamp() - anchor).rem_euclid(width);
        t - TimeDelta::seconds(into_bucket)
            - TimeDelta::nanoseconds(i64::from(t.timestamp_subsec_nanos()))
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.label() == s)
            .ok_or_else(|| format!("Unknown interval: {s}"))
    }
}
