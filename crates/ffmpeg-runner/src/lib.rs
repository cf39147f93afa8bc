//! Thin, timeout-aware wrappers around the `ffmpeg` and `ffprobe` binaries.
//!
//! - [`FfmpegRunner`] spawns `ffmpeg`, parses its `-progress` side channel and
//!   reports `(current, total)` durations to a callback.
//! - [`DurationProber`] asks `ffprobe` for the container duration of one file
//!   or the summed duration of several.
//!
//! Binary locations are passed in through [`FfmpegConfig`]; nothing here reads
//! process-wide state.

mod error;
pub mod progress;
mod probe;
mod runner;

use std::path::PathBuf;
use std::time::Duration;

pub use error::FfmpegError;
pub use probe::DurationProber;
pub use runner::FfmpegRunner;

/// Default time limit for a single `ffprobe` invocation.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Locations of the external binaries and the probe time limit.
#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub probe_timeout: Duration,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl FfmpegConfig {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            ..Default::default()
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}
