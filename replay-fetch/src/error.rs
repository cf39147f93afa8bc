//! Application-wide error types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg_runner::FfmpegError;
use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Transfer of {url} failed: {message}")]
    Transfer { url: String, message: String },

    #[error("Probing {} failed: {source}", path.display())]
    Probe {
        path: PathBuf,
        #[source]
        source: FfmpegError,
    },

    #[error("Remuxing {} failed: {source}", path.display())]
    Remux {
        path: PathBuf,
        #[source]
        source: FfmpegError,
    },

    #[error(
        "Duration check failed for {}: declared {:.3}s, probed {:.3}s",
        path.display(),
        declared.as_secs_f64(),
        probed.as_secs_f64()
    )]
    Integrity {
        path: PathBuf,
        declared: Duration,
        probed: Duration,
    },

    #[error("Assembly error: {0}")]
    Assembly(String),

    #[error("Invalid selection: {0}")]
    Selection(String),

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("IO error while {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn transfer(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Transfer {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn probe(path: &Path, source: FfmpegError) -> Self {
        Self::Probe {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn remux(path: &Path, source: FfmpegError) -> Self {
        Self::Remux {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn assembly(msg: impl Into<String>) -> Self {
        Self::Assembly(msg.into())
    }

    pub fn selection(msg: impl Into<String>) -> Self {
        Self::Selection(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether the error only affects the segment it was raised for.
    ///
    /// Segment-scoped errors fail their task; the rest of the job carries on.
    pub fn is_segment_scoped(&self) -> bool {
        matches!(
            self,
            Self::Transfer { .. } | Self::Probe { .. } | Self::Remux { .. } | Self::Integrity { .. }
        )
    }
}
