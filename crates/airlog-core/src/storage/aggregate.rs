//! Streaming aggregation of record files into level buckets
//!
//! Each input line contributes `value * count` to the running sum of its
//! (bucket, metric) pair and `count` to its count. Weighting by count is what
//! lets already-aggregated files be merged into a correct combined average.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::info;

use super::events::{BuildEvent, ProgressSink, file_name};
use super::level::Level;
use super::record::{AggregateRecord, LineRecord};
use crate::error::{Error, Result};

/// Counters for one aggregation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    /// Input files opened and read to the end
    pub files_read: usize,
    /// Input files that could not be opened or read
    pub files_failed: usize,
    /// Lines accepted into the aggregate
    pub lines_read: u64,
    /// Non-blank lines dropped as malformed
    pub lines_skipped: u64,
    /// Distinct buckets in the output
    pub buckets: usize,
    /// Lines written to the output
    pub written: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: f64,
    count: u64,
}

/// In-memory (bucket, metric) accumulator for one level
///
/// Buckets and metrics are kept in sorted maps, so iteration order is the
/// output order.
#[derive(Debug, Clone)]
pub struct BucketAggregator {
    level: Level,
    buckets: BTreeMap<DateTime<Utc>, BTreeMap<String, Accumulator>>,
}

impl BucketAggregator {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            buckets: BTreeMap::new(),
        }
    }

    /// Fold one record into its bucket
    pub fn add(&mut self, record: &LineRecord) {
        let bucket = self.level.truncate(record.time());
        let (sum, count) = record.weighted();

        let acc = self
            .buckets
            .entry(bucket)
            .or_default()
            .entry(record.metric().to_string())
            .or_default();
        acc.sum += sum;
        acc.count = acc.count.saturating_add(count);
    }

    /// Number of distinct buckets seen so far
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Aggregated records sorted by bucket, then metric name
    pub fn records(&self) -> impl Iterator<Item = AggregateRecord> + '_ {
        self.buckets.iter().flat_map(|(bucket, metrics)| {
            metrics.iter().map(move |(metric, acc)| AggregateRecord {
                bucket: *bucket,
                metric: metric.clone(),
                average: if acc.count > 0 {
                    acc.sum / acc.count as f64
                } else {
                    0.0
                },
                count: acc.count,
            })
        })
    }

    /// Stream every line of `path` into the aggregate.
    ///
    /// Lines already folded in before an I/O error stay in the aggregate.
    fn read_file(&mut self, path: &Path, stats: &mut AggregateStats) -> io::Result<()> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }

            let Ok(line) = core::str::from_utf8(&buf) else {
                stats.lines_skipped += 1;
                continue;
            };
            if line.trim().is_empty() {
                continue;
            }

            match LineRecord::parse(line) {
                Some(record) => {
                    self.add(&record);
                    stats.lines_read += 1;
                }
                None => stats.lines_skipped += 1,
            }
        }

        Ok(())
    }
}

/// Aggregate `inputs` into `output` at `level`.
///
/// Unreadable inputs are reported through `progress` and skipped. When no
/// input could be read at all the build fails and nothing is written, so an
/// empty output never stands in for data that was merely unreadable. The
/// output is written next to its final path and renamed into place, so
/// readers never see a partial file. An empty input list writes nothing.
pub fn aggregate_files_to_interval<P, I>(
    inputs: &[I],
    level: Level,
    output: &Path,
    progress: &mut P,
) -> Result<AggregateStats>
where
    P: ProgressSink + ?Sized,
    I: AsRef<Path>,
{
    let mut stats = AggregateStats::default();

    if inputs.is_empty() {
        info!("[{level}] No input files -> skipping {}", file_name(output));
        return Ok(stats);
    }

    progress.on_event(BuildEvent::Started {
        level,
        output,
        inputs: inputs.len(),
    });

    let mut aggregator = BucketAggregator::new(level);
    let total = inputs.len();
    let mut last_failure = None;

    for (index, input) in inputs.iter().enumerate() {
        let path = input.as_ref();
        progress.on_event(BuildEvent::FileStarted {
            level,
            index,
            total,
            path,
            lines_read: stats.lines_read,
        });

        match aggregator.read_file(path, &mut stats) {
            Ok(()) => {
                stats.files_read += 1;
                progress.on_event(BuildEvent::FileFinished {
                    level,
                    index,
                    total,
                    path,
                    lines_read: stats.lines_read,
                });
            }
            Err(error) => {
                stats.files_failed += 1;
                progress.on_event(BuildEvent::FileFailed {
                    level,
                    path,
                    error: &error,
                });
                last_failure = Some((path.to_path_buf(), error));
            }
        }
    }

    if stats.files_read == 0
        && let Some((path, source)) = last_failure
    {
        return Err(Error::Io { path, source });
    }

    stats.buckets = aggregator.bucket_count();

    let mut written = 0;
    write_atomic(output, |writer| {
        for record in aggregator.records() {
            writeln!(writer, "{record}")?;
            written += 1;
        }
        Ok(())
    })?;
    stats.written = written;

    progress.on_event(BuildEvent::Finished {
        level,
        output,
        stats: &stats,
    });

    Ok(stats)
}

/// Sibling path used while `output` is being written
pub(crate) fn temp_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write through a temporary sibling file, then rename over `output`.
pub(crate) fn write_atomic<F>(output: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let tmp = temp_path(output);

    let written: io::Result<()> = (|| {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        write(&mut writer)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    })();

    if let Err(source) = written {
        let _ = fs::remove_file(&tmp);
        return Err(Error::Io { path: tmp, source });
    }

    fs::rename(&tmp, output).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        Error::Io {
            path: output.to_path_buf(),
            source,
        }
    })
}
