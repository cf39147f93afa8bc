use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FfmpegError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` timed out after {limit:?} and was killed")]
    Timeout { program: String, limit: Duration },

    #[error("`{program}` exited with status {code:?}: {stderr}")]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("could not read a duration for {} from probe output `{output}`", path.display())]
    ProbeOutput { path: PathBuf, output: String },

    #[error("total duration must be known before running ffmpeg")]
    UnknownTotal,

    #[error("no input files given")]
    NoInputs,
}

impl FfmpegError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
