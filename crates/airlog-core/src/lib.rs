//! Temporal data-reduction core for airlog
//!
//! This crate turns append-only, tab-delimited sensor logs into bounded time
//! slices for dashboards and bots: a backward tail reader, a per-sensor line
//! parser, a file-based rollup cascade (5m → 30m → 2h → 12h → 1w) and an
//! adaptive downsampler.
//!
//! Ingestion, notification and rendering live elsewhere; they hand this crate
//! raw lines and sensor schemas and get samples, aggregate files and point
//! sequences back.

pub mod config;
pub mod error;
pub mod parsing;
pub mod query;
pub mod sampling;
pub mod sensors;
pub mod storage;
pub mod tail;

pub use config::{CascadeConfig, LevelPolicy};
pub use error::{Error, Result};
pub use parsing::{LineParser, ParsedData};
pub use query::{ChartRequest, Period};
pub use sampling::{DownsampledPoint, Distribution, downsample, downsample_with};
pub use sensors::{Sample, SensorSpec};
pub use tail::read_last_lines;
