//! Directory layout and file naming for raw and aggregate files

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Days, NaiveDate};

use super::level::Level;
use crate::error::{Error, Result};

/// File extension shared by raw and aggregate files
const LOG_EXTENSION: &str = ".log";

/// Locates raw and per-level daily files under a storage root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
    raw_prefix: String,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>, raw_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            raw_prefix: raw_prefix.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the daily files of `level`; raw files live at the root
    pub fn level_dir(&self, level: Level) -> PathBuf {
        match level {
            Level::Raw => self.root.clone(),
            _ => self.root.join(level.label()),
        }
    }

    /// Create the root and every level directory.
    ///
    /// A failure here is fatal for a cascade run.
    pub fn ensure_dirs(&self) -> Result<()> {
        for level in Level::ALL {
            let dir = self.level_dir(level);
            fs::create_dir_all(&dir).map_err(Error::io(&dir))?;
        }
        Ok(())
    }

    fn aggregate_prefix(level: Level) -> String {
        format!("agg_{}_", level.label())
    }

    /// Daily aggregate file of `level` for `date`, e.g. `30m/agg_30m_2024-01-01.log`
    pub fn aggregate_file(&self, level: Level, date: NaiveDate) -> PathBuf {
        self.level_dir(level).join(format!(
            "{}{}{LOG_EXTENSION}",
            Self::aggregate_prefix(level),
            date.format("%Y-%m-%d")
        ))
    }

    /// Path a synthetic raw file for `date` is written to
    pub fn synthetic_raw_file(&self, date: NaiveDate) -> PathBuf {
        self.root.join(format!(
            "{}{}T00-00-01{LOG_EXTENSION}",
            self.raw_prefix,
            date.format("%Y-%m-%d")
        ))
    }

    /// Raw file whose name embeds `date`.
    ///
    /// When several files match, the lexicographically last one wins. A
    /// missing root means there is no raw data at all.
    pub fn find_raw_file(&self, date: NaiveDate) -> Result<Option<PathBuf>> {
        let date = date.format("%Y-%m-%d").to_string();

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(&self.root)(e)),
        };

        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name.starts_with(&self.raw_prefix)
                    && name.contains(&date)
                    && name.ends_with(LOG_EXTENSION)
            })
            .map(|entry| entry.path())
            .collect();

        candidates.sort();
        Ok(candidates.pop())
    }

    /// Existing daily files of `level` for the `days` days ending at `end`
    /// (inclusive), oldest first. Missing days are left out.
    pub fn files_for_last_days(&self, level: Level, days: u32, end: NaiveDate) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = (0..u64::from(days))
            .map_while(|back| end.checked_sub_days(Days::new(back)))
            .map(|date| self.aggregate_file(level, date))
            .filter(|path| path.is_file())
            .collect();

        files.reverse();
        files
    }

    /// All daily files of `level` with the date embedded in their name, oldest first
    pub fn list_aggregate_files(&self, level: Level) -> Result<Vec<(NaiveDate, PathBuf)>> {
        let dir = self.level_dir(level);
        let prefix = Self::aggregate_prefix(level);

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&dir)(e)),
        };

        let mut files: Vec<(NaiveDate, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let date = name.strip_prefix(&prefix)?.strip_suffix(LOG_EXTENSION)?;
                let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
                Some((date, entry.path()))
            })
            .collect();

        files.sort();
        Ok(files)
    }

    /// Most recent daily file of `level`, if any
    pub fn latest_aggregate_file(&self, level: Level) -> Result<Option<PathBuf>> {
        Ok(self.list_aggregate_files(level)?.pop().map(|(_, path)| path))
    }
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| Error::InvalidDate(text.to_string()))
}
