//! Operator tool for the airlog rollup cascade
//!
//! ```text
//! airlog-cascade run
//! airlog-cascade backfill --from 2024-01-01 --to 2024-01-31 [--force] [--gen-missing] [--samples-per-minute N]
//! airlog-cascade gen --from 2024-01-01 --to 2024-01-07 [--samples-per-minute N]
//! ```
//!
//! Dates are UTC calendar dates. `--to` defaults to `--from`. Logging goes
//! through `env_logger` (`RUST_LOG`, default `info`).

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::{error, info};

use airlog_core::CascadeConfig;
use airlog_core::storage::events::file_name;
use airlog_core::storage::layout::parse_date;
use airlog_core::storage::{BuildEvent, BuildOptions, Cascade, CascadeReport, LogProgress, ProgressSink};

/// Width of the progress bar in characters
const BAR_WIDTH: usize = 30;

/// Build and backfill the airlog rollup cascade
#[derive(Parser)]
#[command(name = "airlog-cascade", version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Storage root, overrides the configured one
    #[arg(long, value_name = "DIR", global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Daily run for the current UTC date: 5m, upper levels, prune
    Run,

    /// Rebuild the cascade over a date range
    Backfill {
        #[command(flatten)]
        range: DateRange,

        /// Rebuild outputs that already exist
        #[arg(long)]
        force: bool,

        /// Generate synthetic raw data for dates without any
        #[arg(long)]
        gen_missing: bool,

        /// Sample rate of generated raw data
        #[arg(long, value_name = "N", default_value_t = 1)]
        samples_per_minute: u32,
    },

    /// Generate synthetic raw files over a date range
    Gen {
        #[command(flatten)]
        range: DateRange,

        /// Sample rate of generated raw data
        #[arg(long, value_name = "N", default_value_t = 1)]
        samples_per_minute: u32,
    },
}

#[derive(clap::Args)]
struct DateRange {
    /// First date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", value_parser = parse_date_arg)]
    from: NaiveDate,

    /// Last date, inclusive (YYYY-MM-DD); defaults to --from
    #[arg(long, value_name = "DATE", value_parser = parse_date_arg)]
    to: Option<NaiveDate>,
}

impl DateRange {
    fn bounds(&self) -> (NaiveDate, NaiveDate) {
        (self.from, self.to.unwrap_or(self.from))
    }
}

fn parse_date_arg(text: &str) -> Result<NaiveDate, String> {
    parse_date(text).map_err(|e| e.to_string())
}

/// Single-line progress bar on stderr, log records otherwise
struct TerminalProgress {
    log: LogProgress,
}

impl TerminalProgress {
    fn draw(level: impl std::fmt::Display, done: usize, total: usize, path: &std::path::Path) {
        let filled = if total == 0 { BAR_WIDTH } else { done * BAR_WIDTH / total };
        let mut stderr = io::stderr().lock();
        // Drawing is best effort
        let _ = write!(
            stderr,
            "\r[{level}] [{}{}] {done}/{total} {:<40}",
            "#".repeat(filled),
            "-".repeat(BAR_WIDTH - filled),
            file_name(path)
        );
        let _ = stderr.flush();
    }
}

impl ProgressSink for TerminalProgress {
    fn on_event(&mut self, event: BuildEvent<'_>) {
        match event {
            BuildEvent::FileStarted {
                level, index, total, path, ..
            } => Self::draw(level, index, total, path),
            BuildEvent::FileFinished {
                level, index, total, path, ..
            } => Self::draw(level, index + 1, total, path),
            BuildEvent::Finished { .. } | BuildEvent::FileFailed { .. } => {
                eprintln!();
                self.log.on_event(event);
            }
            BuildEvent::Started { .. } => self.log.on_event(event),
        }
    }
}

fn load_config(cli: &Cli) -> Result<CascadeConfig> {
    let mut config = match &cli.config {
        Some(path) => CascadeConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => CascadeConfig::default(),
    };

    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    Ok(config)
}

fn execute<P: ProgressSink>(cascade: &mut Cascade<P>, command: &Commands) -> CascadeReport {
    match command {
        Commands::Run => cascade.run_daily_cascade(&BuildOptions::default()),
        Commands::Backfill {
            range,
            force,
            gen_missing,
            samples_per_minute,
        } => {
            let (from, to) = range.bounds();
            let opts = BuildOptions {
                force: *force,
                generate_missing: *gen_missing,
                samples_per_minute: *samples_per_minute,
            };
            cascade.backfill(from, to, &opts)
        }
        Commands::Gen {
            range,
            samples_per_minute,
        } => {
            let (from, to) = range.bounds();
            cascade.gen_range(from, to, *samples_per_minute)
        }
    }
}

fn run(cli: &Cli) -> Result<CascadeReport> {
    let config = load_config(cli)?;
    let root = config.root.clone();
    info!("Storage root: {}", root.display());

    let report = if io::stderr().is_terminal() {
        let progress = TerminalProgress { log: LogProgress };
        let mut cascade = Cascade::with_progress(config, progress)
            .with_context(|| format!("Failed to prepare storage under {}", root.display()))?;
        execute(&mut cascade, &cli.command)
    } else {
        let mut cascade = Cascade::new(config)
            .with_context(|| format!("Failed to prepare storage under {}", root.display()))?;
        execute(&mut cascade, &cli.command)
    };

    Ok(report)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(report) => {
            for failure in &report.failures {
                error!("[{}:{}] {}", failure.level, failure.date, failure.error);
            }
            error!("{} output(s) failed", report.failures.len());
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
