//! Child-process helpers shared by the media tool wrappers.
//!
//! Every external tool the workspace drives (`ffmpeg`, `ffprobe`) is spawned
//! through [`tool_command`] and awaited through [`wait_with_timeout`], so the
//! console-window, stdin and kill-on-timeout behaviour is identical everywhere.

use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self) -> &mut Self;
}

impl NoWindowExt for Command {
    fn no_window(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

/// Create a `tokio::process::Command` suitable for a non-interactive tool.
///
/// stdin is closed so a tool can never block on a prompt, and the child is
/// killed if its handle is dropped before it was awaited.
pub fn tool_command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    cmd.no_window()
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .env("LC_ALL", "C");
    cmd
}

/// Failure modes of [`wait_with_timeout`].
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("process did not exit within {0:?} and was killed")]
    TimedOut(Duration),

    #[error("failed to wait for process: {0}")]
    Io(#[from] std::io::Error),
}

/// Wait for `child` to exit, killing it once `limit` has elapsed.
///
/// A zero `limit` waits without bound.
pub async fn wait_with_timeout(child: &mut Child, limit: Duration) -> Result<ExitStatus, WaitError> {
    if limit.is_zero() {
        return Ok(child.wait().await?);
    }

    match tokio::time::timeout(limit, child.wait()).await {
        Ok(status) => Ok(status?),
        Err(_) => {
            warn!(pid = ?child.id(), ?limit, "Process exceeded its time limit, killing it");
            if let Err(e) = child.kill().await {
                // The process may have exited between the timeout and the kill.
                debug!(error = %e, "Kill after timeout failed");
            }
            Err(WaitError::TimedOut(limit))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_wait_returns_exit_status() {
        let mut child = tool_command("sh").args(["-c", "exit 3"]).spawn().unwrap();
        let status = wait_with_timeout(&mut child, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_wait_kills_on_timeout() {
        let mut child = tool_command("sh").args(["-c", "sleep 10"]).spawn().unwrap();
        let start = Instant::now();
        let err = wait_with_timeout(&mut child, Duration::from_millis(200))
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::TimedOut(_)));
        assert!(start.elapsed() < Duration::from_secs(5));
        // The child has been reaped by the kill.
        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_zero_limit_waits_without_bound() {
        let mut child = tool_command("sh").args(["-c", "exit 0"]).spawn().unwrap();
        let status = wait_with_timeout(&mut child, Duration::ZERO).await.unwrap();
        assert!(status.success());
    }
}
