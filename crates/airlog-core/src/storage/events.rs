//! Progress events published while building aggregate files
//!
//! A build over years of daily files can run for minutes. The aggregator
//! publishes [`BuildEvent`]s to a [`ProgressSink`] so the operator tool can
//! draw a progress bar while library callers get plain log records.

use std::path::Path;

use log::{debug, info, warn};

use super::aggregate::AggregateStats;
use super::level::Level;

/// Events published by the aggregator
#[derive(Debug, Clone, Copy)]
pub enum BuildEvent<'a> {
    /// An output file is about to be built from `inputs` files
    Started {
        level: Level,
        output: &'a Path,
        inputs: usize,
    },
    /// Input file `index` (0-based) of `total` is being read
    FileStarted {
        level: Level,
        index: usize,
        total: usize,
        path: &'a Path,
        lines_read: u64,
    },
    /// Input file `index` of `total` has been fully read
    FileFinished {
        level: Level,
        index: usize,
        total: usize,
        path: &'a Path,
        lines_read: u64,
    },
    /// An input file could not be read and was skipped
    FileFailed {
        level: Level,
        path: &'a Path,
        error: &'a std::io::Error,
    },
    /// The output file has been written and renamed into place
    Finished {
        level: Level,
        output: &'a Path,
        stats: &'a AggregateStats,
    },
}

/// Receiver of build progress
pub trait ProgressSink {
    fn on_event(&mut self, event: BuildEvent<'_>);
}

/// Progress sink that forwards events to the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_event(&mut self, event: BuildEvent<'_>) {
        match event {
            BuildEvent::Started {
                level,
                output,
                inputs,
            } => info!("[{level}] Building: {} (inputs: {inputs})", file_name(output)),
            BuildEvent::FileStarted {
                level,
                index,
                total,
                path,
                lines_read,
            } => debug!(
                "[{level}] ({}/{total}) reading: {} lines_read: {lines_read}",
                index + 1,
                file_name(path)
            ),
            BuildEvent::FileFinished { .. } => {}
            BuildEvent::FileFailed { level, path, error } => {
                warn!("[{level}] Failed reading {}: {error}", file_name(path))
            }
            BuildEvent::Finished {
                level,
                output,
                stats,
            } => info!(
                "[{level}] Wrote {} lines -> {} (files_read={}, lines_read={}, skipped={}, buckets={})",
                stats.written,
                file_name(output),
                stats.files_read,
                stats.lines_read,
                stats.lines_skipped,
                stats.buckets
            ),
        }
    }
}

impl<P: ProgressSink + ?Sized> ProgressSink for &mut P {
    fn on_event(&mut self, event: BuildEvent<'_>) {
        (**self).on_event(event);
    }
}

/// Last path component for compact log lines
pub fn file_name(path: &Path) -> std::borrow::Cow<'_, str> {
    path.file_name()
        .unwrap_or(path.as_os_str())
        .to_string_lossy()
}
