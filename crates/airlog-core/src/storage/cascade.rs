//! Daily rollup cascade, backfill and synthetic range generation
//!
//! For one calendar date the cascade builds:
//!
//! - **5m** from the raw file of that date
//! - **30m** from the 5m files of the last 90 days ending at that date
//! - **2h** from the 30m files of the last 730 days
//! - **12h** from the 2h files of the last 1825 days
//! - **1w** from the 12h files of the last 1825 days
//!
//! (window lengths come from [`CascadeConfig`]). An existing output file is
//! authoritative and only rebuilt when forced. Per-date and per-level
//! failures are recorded in a [`CascadeReport`] and never abort a run.

use std::fs;
use std::path::PathBuf;

use chrono::{Days, NaiveDate, Utc};
use log::{error, info, warn};

use super::aggregate::{AggregateStats, aggregate_files_to_interval};
use super::events::{LogProgress, ProgressSink, file_name};
use super::layout::StorageLayout;
use super::level::Level;
use super::synthetic::generate_synthetic_raw;
use crate::config::CascadeConfig;
use crate::error::{Error, Result};

/// Knobs shared by the daily run and backfill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Rebuild outputs that already exist
    pub force: bool,
    /// Synthesize raw data for dates that have none
    pub generate_missing: bool,
    /// Sample rate of synthesized raw data
    pub samples_per_minute: u32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            force: false,
            generate_missing: false,
            samples_per_minute: 1,
        }
    }
}

/// What happened to one (level, date) output
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    /// The output was (re)built
    Built {
        path: PathBuf,
        stats: AggregateStats,
    },
    /// The output already existed and was left untouched
    Exists(PathBuf),
    /// No input was available, nothing was written
    MissingInput,
}

/// A (date, level) output that could not be produced
#[derive(Debug)]
pub struct Failure {
    pub date: NaiveDate,
    pub level: Level,
    pub error: Error,
}

/// Summary of a cascade, backfill or generation run
#[derive(Debug, Default)]
pub struct CascadeReport {
    /// Aggregate files built
    pub built: usize,
    /// Outputs left as they were because they already existed
    pub existing: usize,
    /// Outputs skipped for lack of input
    pub missing_input: usize,
    /// Synthetic raw files written
    pub generated: usize,
    /// Daily files removed by pruning
    pub pruned: usize,
    pub failures: Vec<Failure>,
}

impl CascadeReport {
    /// Fold one build result into the report, logging failures
    pub fn record(&mut self, date: NaiveDate, level: Level, result: Result<BuildOutcome>) {
        match result {
            Ok(BuildOutcome::Built { .. }) => self.built += 1,
            Ok(BuildOutcome::Exists(_)) => self.existing += 1,
            Ok(BuildOutcome::MissingInput) => self.missing_input += 1,
            Err(error) => {
                error!("[{level}:{date}] error: {error}");
                self.failures.push(Failure { date, level, error });
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Rollup cascade over one storage root
///
/// Builds for one invocation run sequentially. Two cascades writing to the
/// same root at the same time are not safe; the operator must serialize them.
pub struct Cascade<P: ProgressSink = LogProgress> {
    config: CascadeConfig,
    layout: StorageLayout,
    progress: P,
}

impl Cascade<LogProgress> {
    /// Create a cascade that reports progress through the `log` facade
    pub fn new(config: CascadeConfig) -> Result<Self> {
        Self::with_progress(config, LogProgress)
    }
}

impl<P: ProgressSink> Cascade<P> {
    /// Create a cascade, making sure every level directory exists.
    ///
    /// Failing to create the directories is fatal.
    pub fn with_progress(config: CascadeConfig, progress: P) -> Result<Self> {
        let layout = config.layout();
        layout.ensure_dirs()?;

        Ok(Self {
            config,
            layout,
            progress,
        })
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    /// Consume the cascade, handing back its progress sink
    pub fn into_progress(self) -> P {
        self.progress
    }

    /// Build the 5m file for `date` from that date's raw file.
    pub fn generate_5m_for_date(&mut self, date: NaiveDate, opts: &BuildOptions) -> Result<BuildOutcome> {
        let level = Level::FiveMinutes;
        let output = self.layout.aggregate_file(level, date);

        if output.exists() && !opts.force {
            info!(
                "[{level}:{date}] Output exists, skipping (use --force to overwrite): {}",
                file_name(&output)
            );
            return Ok(BuildOutcome::Exists(output));
        }

        let raw = match self.layout.find_raw_file(date)? {
            Some(raw) => raw,
            None if opts.generate_missing => {
                info!("[{level}:{date}] Raw missing; generating synthetic raw");
                generate_synthetic_raw(&self.layout, date, opts.samples_per_minute)?
            }
            None => {
                info!("[{level}:{date}] Raw not found; skipping (use --gen-missing to auto-generate)");
                return Ok(BuildOutcome::MissingInput);
            }
        };

        let stats = aggregate_files_to_interval(&[raw], level, &output, &mut self.progress)?;
        Ok(BuildOutcome::Built {
            path: output,
            stats,
        })
    }

    /// Build one upper level for `date` from its parent's retention window.
    fn generate_level_for_date(
        &mut self,
        level: Level,
        date: NaiveDate,
        opts: &BuildOptions,
    ) -> Result<BuildOutcome> {
        let (Some(parent), Some(policy)) = (level.parent(), self.config.policy(level)) else {
            return Ok(BuildOutcome::MissingInput);
        };

        let days = policy.retention_days;
        let inputs = self.layout.files_for_last_days(parent, days, date);
        if inputs.is_empty() {
            info!("[{level}:{date}] Not enough {parent} inputs (need last {days} days)");
            return Ok(BuildOutcome::MissingInput);
        }

        let output = self.layout.aggregate_file(level, date);
        if output.exists() && !opts.force {
            info!("[{level}:{date}] Exists, skipping: {}", file_name(&output));
            return Ok(BuildOutcome::Exists(output));
        }

        let stats = aggregate_files_to_interval(&inputs, level, &output, &mut self.progress)?;
        Ok(BuildOutcome::Built {
            path: output,
            stats,
        })
    }

    /// Build 30m, 2h, 12h and 1w for `date`, in that order.
    ///
    /// A failing level does not stop the coarser ones; they simply consume
    /// whatever parent files exist.
    pub fn generate_upper_levels_for_date(
        &mut self,
        date: NaiveDate,
        opts: &BuildOptions,
    ) -> Vec<(Level, Result<BuildOutcome>)> {
        info!("--- Building upper levels for {date} ---");

        Level::UPPER
            .into_iter()
            .map(|level| (level, self.generate_level_for_date(level, date, opts)))
            .collect()
    }

    /// Daily scheduled run for the current UTC date
    pub fn run_daily_cascade(&mut self, opts: &BuildOptions) -> CascadeReport {
        self.run_daily_cascade_on(Utc::now().date_naive(), opts)
    }

    /// Daily run as if `today` were the current date: 5m, upper levels, prune.
    pub fn run_daily_cascade_on(&mut self, today: NaiveDate, opts: &BuildOptions) -> CascadeReport {
        info!("=== DAILY RUN (UTC {today}) ===");
        let mut report = CascadeReport::default();

        let five = self.generate_5m_for_date(today, opts);
        report.record(today, Level::FiveMinutes, five);

        for (level, result) in self.generate_upper_levels_for_date(today, opts) {
            report.record(today, level, result);
        }

        report.pruned = self.prune(today);

        info!("=== DAILY RUN COMPLETE ===");
        report
    }

    /// Remove daily files older than `retention + buffer` days before `today`.
    ///
    /// Levels without a prune buffer are left alone. Failures are logged and
    /// skipped. Returns the number of files removed.
    pub fn prune(&self, today: NaiveDate) -> usize {
        let mut removed = 0;

        for level in Level::ALL {
            let Some(policy) = self.config.policy(level) else {
                continue;
            };
            let Some(buffer) = policy.prune_buffer_days else {
                continue;
            };
            let keep_days = u64::from(policy.retention_days) + u64::from(buffer);
            let Some(cutoff) = today.checked_sub_days(Days::new(keep_days)) else {
                continue;
            };

            let files = match self.layout.list_aggregate_files(level) {
                Ok(files) => files,
                Err(e) => {
                    warn!("[cleanup] Error listing {level} files: {e}");
                    continue;
                }
            };

            for (_, path) in files.into_iter().filter(|(date, _)| *date < cutoff) {
                match fs::remove_file(&path) {
                    Ok(()) => {
                        info!("[cleanup] Removed {}", file_name(&path));
                        removed += 1;
                    }
                    Err(e) => warn!("[cleanup] Error removing {}: {e}", file_name(&path)),
                }
            }
        }

        removed
    }

    /// Rebuild the cascade for `from..=to` in two strictly ordered phases.
    ///
    /// Phase 1 produces the 5m file of every date in the range. Only once the
    /// whole range is done does phase 2 build the upper levels of every date,
    /// since one date's upper level reads a window of its parent's files.
    pub fn backfill(&mut self, from: NaiveDate, to: NaiveDate, opts: &BuildOptions) -> CascadeReport {
        info!("=== BACKFILL from {from} to {to} (UTC) ===");
        let mut report = CascadeReport::default();

        if from > to {
            warn!("[backfill] Empty range: {from} is after {to}");
            return report;
        }

        let dates: Vec<NaiveDate> = from.iter_days().take_while(|date| *date <= to).collect();

        for &date in &dates {
            let result = self.generate_5m_for_date(date, opts);
            report.record(date, Level::FiveMinutes, result);
        }

        for &date in &dates {
            for (level, result) in self.generate_upper_levels_for_date(date, opts) {
                report.record(date, level, result);
            }
        }

        info!(
            "=== BACKFILL COMPLETE (built={}, existing={}, missing={}, failed={}) ===",
            report.built,
            report.existing,
            report.missing_input,
            report.failures.len()
        );
        report
    }

    /// Write synthetic raw files for `from..=to`, skipping dates that have one.
    pub fn gen_range(&self, from: NaiveDate, to: NaiveDate, samples_per_minute: u32) -> CascadeReport {
        info!("=== GENERATE RAW from {from} to {to} (samples/min={samples_per_minute}) ===");
        let mut report = CascadeReport::default();

        for date in from.iter_days().take_while(|date| *date <= to) {
            let path = self.layout.synthetic_raw_file(date);
            if path.exists() {
                info!("[gen] Exists: {}, skipping", file_name(&path));
                report.existing += 1;
                continue;
            }

            match generate_synthetic_raw(&self.layout, date, samples_per_minute) {
                Ok(_) => report.generated += 1,
                Err(e) => report.record(date, Level::Raw, Err(e)),
            }
        }

        info!("=== GENERATE RAW COMPLETE ===");
        report
    }
}
