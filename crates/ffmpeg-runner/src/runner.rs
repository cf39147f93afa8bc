use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use process_utils::{WaitError, tool_command, wait_with_timeout};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::progress::parse_out_time;
use crate::{FfmpegConfig, FfmpegError};

/// Arguments always placed before the caller's own.
const FIXED_ARGS: [&str; 6] = [
    "-hide_banner",
    "-nostats",
    "-loglevel",
    "error",
    "-progress",
    "pipe:1",
];

/// Number of trailing stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Runs `ffmpeg` with a hard time limit and forwards its progress.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    binary: PathBuf,
}

impl FfmpegRunner {
    pub fn new(config: &FfmpegConfig) -> Self {
        Self {
            binary: config.ffmpeg_path.clone(),
        }
    }

    /// Build the full argument list for a run.
    ///
    /// Progress and stats flags supplied by the caller are dropped; the runner
    /// owns the progress channel.
    pub fn build_args<S: AsRef<str>>(args: &[S]) -> Vec<String> {
        let mut full: Vec<String> = FIXED_ARGS.iter().map(|s| s.to_string()).collect();

        let mut iter = args.iter().map(AsRef::as_ref);
        while let Some(arg) = iter.next() {
            match arg {
                "-nostats" | "-stats" => {}
                "-progress" => {
                    // Skip the flag's value too.
                    iter.next();
                }
                _ => full.push(arg.to_string()),
            }
        }
        full
    }

    /// Run ffmpeg to completion.
    ///
    /// `on_progress(current, total)` is called for every `out_time` the tool
    /// reports, with `current` clamped to `total`, and once more with
    /// `current == total` after a successful exit. A zero `total` is rejected
    /// since no meaningful progress could be reported against it. A zero
    /// `timeout` waits without bound.
    pub async fn run<S, F>(
        &self,
        args: &[S],
        total: Duration,
        timeout: Duration,
        mut on_progress: F,
    ) -> Result<(), FfmpegError>
    where
        S: AsRef<str>,
        F: FnMut(Duration, Duration) + Send,
    {
        if total.is_zero() {
            return Err(FfmpegError::UnknownTotal);
        }

        let program = self.program_name();
        let full_args = Self::build_args(args);
        debug!(program = %program, args = ?full_args, "Spawning ffmpeg");

        let start = Instant::now();
        let mut child = tool_command(&self.binary)
            .args(&full_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| FfmpegError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stderr_task = child.stderr.take().map(collect_stderr_tail);
        let stdout = child.stdout.take();

        let progress = async {
            let Some(stdout) = stdout else {
                return;
            };
            let read = for_each_line(stdout, |line| {
                if let Some(current) = parse_out_time(line) {
                    on_progress(current.min(total), total);
                }
            });
            if let Err(e) = read.await {
                debug!(program = %program, error = %e, "Stopped reading ffmpeg progress");
            }
        };

        let (status, ()) = tokio::join!(wait_with_timeout(&mut child, timeout), progress);

        let stderr_tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        let status = match status {
            Ok(status) => status,
            Err(WaitError::TimedOut(limit)) => {
                return Err(FfmpegError::Timeout { program, limit });
            }
            Err(WaitError::Io(source)) => return Err(FfmpegError::Io { program, source }),
        };

        if !status.success() {
            let stderr = stderr_tail.join("\n");
            warn!(program = %program, code = ?status.code(), stderr = %stderr, "ffmpeg failed");
            return Err(FfmpegError::Exit {
                program,
                code: status.code(),
                stderr,
            });
        }

        on_progress(total, total);
        info!(
            program = %program,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ffmpeg finished"
        );
        Ok(())
    }

    /// Run `ffmpeg -version` and return its first output line.
    pub async fn version(&self) -> Result<String, FfmpegError> {
        tool_version(&self.binary).await
    }

    fn program_name(&self) -> String {
        self.binary.display().to_string()
    }
}

/// Run `<binary> -version` and return the first line it prints.
pub(crate) async fn tool_version(binary: &Path) -> Result<String, FfmpegError> {
    let program = binary.display().to_string();
    let output = tool_command(binary)
        .arg("-version")
        .output()
        .await
        .map_err(|source| FfmpegError::Spawn {
            program: program.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(FfmpegError::Exit {
            program,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
}

/// Drain a stderr pipe, logging each line and keeping the last few.
fn collect_stderr_tail<R>(stderr: R) -> JoinHandle<Vec<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let read = for_each_line(stderr, |line| {
            debug!("ffmpeg stderr: {}", line);
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line.to_string());
        });
        if let Err(e) = read.await {
            debug!(error = %e, "Stopped reading ffmpeg stderr");
        }
        tail.into()
    })
}

/// Call `f` with every line of `reader`, without the line terminator.
///
/// Bytes that are not valid UTF-8 are replaced rather than ending the read.
pub(crate) async fn for_each_line<R, F>(reader: R, mut f: F) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        f(line.trim_end_matches(['\n', '\r']));
    }
}
