use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use process_utils::{WaitError, tool_command, wait_with_timeout};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::progress::parse_seconds;
use crate::runner::tool_version;
use crate::{FfmpegConfig, FfmpegError};

/// Reads container durations with `ffprobe`.
#[derive(Debug, Clone)]
pub struct DurationProber {
    binary: PathBuf,
    timeout: Duration,
}

impl DurationProber {
    pub fn new(config: &FfmpegConfig) -> Self {
        Self {
            binary: config.ffprobe_path.clone(),
            timeout: config.probe_timeout,
        }
    }

    /// Duration of a single media file.
    pub async fn probe(&self, path: &Path) -> Result<Duration, FfmpegError> {
        let program = self.binary.display().to_string();
        let mut child = tool_command(&self.binary)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1",
            ])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| FfmpegError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let read_pipes = async { tokio::try_join!(read_lossy(stdout), read_lossy(stderr)) };

        let (status, pipes) =
            tokio::join!(wait_with_timeout(&mut child, self.timeout), read_pipes);

        let status = match status {
            Ok(status) => status,
            Err(WaitError::TimedOut(limit)) => return Err(FfmpegError::Timeout { program, limit }),
            Err(WaitError::Io(source)) => return Err(FfmpegError::Io { program, source }),
        };
        let (out, err) = pipes.map_err(|source| FfmpegError::Io {
            program: program.clone(),
            source,
        })?;
        if !status.success() {
            return Err(FfmpegError::Exit {
                program,
                code: status.code(),
                stderr: err.trim().to_string(),
            });
        }

        let duration = parse_probe_output(&out).ok_or_else(|| FfmpegError::ProbeOutput {
            path: path.to_path_buf(),
            output: out.trim().to_string(),
        })?;
        debug!(path = %path.display(), duration_secs = duration.as_secs_f64(), "Probed duration");
        Ok(duration)
    }

    /// Run `ffprobe -version` and return its first output line.
    pub async fn version(&self) -> Result<String, FfmpegError> {
        tool_version(&self.binary).await
    }

    /// Sum of the durations of `paths`, probed in order.
    ///
    /// Fails on the first file that cannot be probed.
    pub async fn probe_total<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Duration, FfmpegError> {
        if paths.is_empty() {
            return Err(FfmpegError::NoInputs);
        }

        let mut total = Duration::ZERO;
        for path in paths {
            total += self.probe(path.as_ref()).await?;
        }
        Ok(total)
    }
}

/// Read a pipe to its end, replacing bytes that are not valid UTF-8.
async fn read_lossy<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Pick the `duration=` value out of ffprobe's flat output.
pub(crate) fn parse_probe_output(output: &str) -> Option<Duration> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("duration="))
        .and_then(parse_seconds)
}
