//! Error types shared by every airlog component

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised by the tail reader, parser, rollup cascade and sampler
///
/// Malformed input lines are never reported through this type; they are
/// dropped and counted by the component that met them.
#[derive(Debug, Error)]
pub enum Error {
    /// A file or directory could not be opened, read, written or renamed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path the failing operation targeted
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// The sampler was asked for fewer than two output points
    #[error("Max count should be at least 2 (got {0})")]
    InvalidMaxCount(usize),

    /// A calendar date could not be parsed as `YYYY-MM-DD`
    #[error("Bad date: {0:?}")]
    InvalidDate(String),

    /// The line pattern for a sensor could not be compiled
    #[error("Invalid pattern for data key {key:?}: {source}")]
    Pattern {
        /// Data key the pattern was built for
        key: String,
        /// Regex compilation failure
        #[source]
        source: regex::Error,
    },

    /// Configuration could not be deserialized
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Returns a closure that wraps an [`io::Error`] with the path it concerns.
    ///
    /// ```rust,ignore
    /// File::open(&path).map_err(Error::io(&path))?;
    /// ```
    pub fn io(path: impl AsRef<Path>) -> impl FnOnce(io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        move |source| Self::Io { path, source }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
