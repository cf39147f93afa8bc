//! Per-segment state machine: download, remux, verify.
//!
//! ```text
//! Queued -> Transferring -> Transferred -> Remuxing -> Verifying -> Completed
//!   |                          ^               |           |
//!   +------ raw file present --+               +-> Failed <+
//!   +------ remuxed file present ---------------------------> Completed
//! ```
//!
//! `Failed` is also reachable from `Transferring`. Both terminal states are
//! final; a failed segment is not retried within a run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::progress::ProgressReporter;
use crate::domain::Segment;
use crate::downloader::SegmentFetcher;
use crate::tools::MediaTools;
use crate::utils::fs::{io_error, regular_file_size, remove_file_logged};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Transferring,
    Transferred,
    Remuxing,
    Verifying,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Queued, Transferring)
                | (Queued, Transferred)
                | (Queued, Completed)
                | (Transferring, Transferred)
                | (Transferring, Failed)
                | (Transferred, Remuxing)
                | (Remuxing, Verifying)
                | (Remuxing, Failed)
                | (Verifying, Completed)
                | (Verifying, Failed)
        )
    }

    /// Human-readable step label.
    pub fn step(self) -> &'static str {
        match self {
            Self::Queued => "waiting",
            Self::Transferring => "downloading",
            Self::Transferred => "downloaded",
            Self::Remuxing => "remuxing",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "Queued",
            Self::Transferring => "Transferring",
            Self::Transferred => "Transferred",
            Self::Remuxing => "Remuxing",
            Self::Verifying => "Verifying",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Knobs shared by every task of a job.
#[derive(Debug, Clone)]
pub struct TaskSettings {
    pub progress_interval: Duration,
    /// Maximum accepted difference between declared and probed duration.
    pub segment_tolerance: Duration,
    pub intermediate_extension: String,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_millis(120),
            segment_tolerance: Duration::from_secs(3),
            intermediate_extension: "ts".to_string(),
        }
    }
}

/// Collaborators a task needs to run.
#[derive(Clone)]
pub struct TaskContext {
    pub fetcher: Arc<dyn SegmentFetcher>,
    pub tools: Arc<dyn MediaTools>,
    pub settings: TaskSettings,
}

/// One segment's journey through the pipeline.
#[derive(Debug)]
pub struct SegmentTask {
    segment: Segment,
    target_dir: PathBuf,
    state: TaskState,
    step: &'static str,
    output_name: String,
    progress: ProgressReporter,
    failure: Option<String>,
}

impl SegmentTask {
    pub fn new(segment: Segment, target_dir: impl Into<PathBuf>, progress: ProgressReporter) -> Self {
        let output_name = segment.file_name();
        Self {
            segment,
            target_dir: target_dir.into(),
            state: TaskState::Queued,
            step: TaskState::Queued.step(),
            output_name,
            progress,
            failure: None,
        }
    }

    pub fn index(&self) -> u32 {
        self.segment.index
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    fn raw_path(&self) -> PathBuf {
        self.segment.raw_path(&self.target_dir)
    }

    fn remuxed_path(&self, settings: &TaskSettings) -> PathBuf {
        self.segment
            .remuxed_path(&self.target_dir, &settings.intermediate_extension)
    }

    fn transition(&mut self, next: TaskState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(index = self.segment.index, from = %self.state, to = %next, "Segment state change");
        self.state = next;
        self.step = next.step();
        Ok(())
    }

    /// Drive the task to a terminal state.
    ///
    /// Returns the remuxed file on success. On failure the task records the
    /// reason, moves to `Failed` where the state machine allows it, and leaves
    /// the raw file in place.
    pub async fn run(&mut self, ctx: &TaskContext) -> Result<PathBuf> {
        if self.state != TaskState::Queued {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: TaskState::Transferring.to_string(),
            });
        }

        match self.execute(ctx).await {
            Ok(path) => Ok(path),
            Err(e) => {
                self.failure = Some(e.to_string());
                if self.state.can_transition_to(TaskState::Failed) {
                    self.state = TaskState::Failed;
                    self.step = TaskState::Failed.step();
                }
                Err(e)
            }
        }
    }

    async fn execute(&mut self, ctx: &TaskContext) -> Result<PathBuf> {
        let raw = self.raw_path();
        let remuxed = self.remuxed_path(&ctx.settings);

        // Existing remuxed output is taken as-is.
        if let Some(size) = regular_file_size(&remuxed).await {
            self.transition(TaskState::Completed)?;
            self.step = "already present";
            self.set_output_name(&remuxed);
            self.progress.bytes(self.step, size, size);
            debug!(index = self.index(), path = %remuxed.display(), "Remuxed file exists, skipping");
            return Ok(remuxed);
        }

        match regular_file_size(&raw).await {
            Some(size) if size == self.segment.size => {
                self.transition(TaskState::Transferred)?;
                self.progress.bytes(self.step, size, size);
                debug!(index = self.index(), path = %raw.display(), "Raw file complete, skipping download");
            }
            _ => self.transfer(ctx, &raw).await?,
        }

        // The remuxed file takes its final name only after verification.
        self.set_output_name(&remuxed);
        let staging = staging_path(&remuxed);
        let produced = match self.remux(ctx, &raw, &staging).await {
            Ok(()) => self.verify(ctx, &staging, &remuxed).await,
            Err(e) => Err(e),
        };
        if let Err(e) = produced {
            if regular_file_size(&staging).await.is_some() {
                remove_file_logged(&staging).await;
            }
            return Err(e);
        }

        remove_file_logged(&raw).await;
        self.transition(TaskState::Completed)?;
        info!(index = self.index(), path = %remuxed.display(), "Segment completed");
        Ok(remuxed)
    }

    async fn transfer(&mut self, ctx: &TaskContext, raw: &Path) -> Result<()> {
        self.transition(TaskState::Transferring)?;
        debug!(index = self.index(), url = %self.segment.url, path = %raw.display(), "Downloading");

        let primary = self.segment.url.clone();
        let bytes = match self.transfer_from(ctx, &primary, raw).await {
            Ok(bytes) => bytes,
            Err(e) => match self.segment.backup_url.clone() {
                Some(backup) => {
                    warn!(index = self.index(), error = %e, backup = %backup, "Primary transfer failed, trying backup");
                    self.transfer_from(ctx, &backup, raw).await?
                }
                None => return Err(e),
            },
        };

        self.transition(TaskState::Transferred)?;
        if bytes != self.segment.size {
            warn!(
                index = self.index(),
                expected = self.segment.size,
                received = bytes,
                "Downloaded size differs from declared size"
            );
        }
        Ok(())
    }

    /// One transfer attempt, sampling progress at the configured interval.
    async fn transfer_from(&self, ctx: &TaskContext, url: &str, raw: &Path) -> Result<u64> {
        let received = AtomicU64::new(0);
        let total = self.segment.size;
        let fetch = ctx.fetcher.fetch(url, raw, &received);
        tokio::pin!(fetch);

        let mut ticker = tokio::time::interval(ctx.settings.progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                result = &mut fetch => {
                    self.progress.bytes(self.step, received.load(Ordering::Relaxed), total);
                    return result;
                }
                _ = ticker.tick() => {
                    self.progress.bytes(self.step, received.load(Ordering::Relaxed), total);
                }
            }
        }
    }

    async fn remux(&mut self, ctx: &TaskContext, raw: &Path, staging: &Path) -> Result<()> {
        self.transition(TaskState::Remuxing)?;

        let total = ctx
            .tools
            .probe_duration(raw)
            .await
            .map_err(|e| Error::probe(raw, e))?;
        debug!(index = self.index(), duration_secs = total.as_secs_f64(), "Remuxing");

        let progress = &self.progress;
        let step = self.step;
        ctx.tools
            .remux(raw, staging, total, &|current, total| {
                progress.duration(step, current, total)
            })
            .await
            .map_err(|e| Error::remux(raw, e))
    }

    /// Check the staged output against the declared duration and move it to
    /// its final name.
    async fn verify(&mut self, ctx: &TaskContext, staging: &Path, remuxed: &Path) -> Result<()> {
        self.transition(TaskState::Verifying)?;

        let probed = ctx
            .tools
            .probe_duration(staging)
            .await
            .map_err(|e| Error::probe(staging, e))?;
        let declared = self.segment.duration;
        if declared.abs_diff(probed) >= ctx.settings.segment_tolerance {
            return Err(Error::Integrity {
                path: remuxed.to_path_buf(),
                declared,
                probed,
            });
        }

        tokio::fs::rename(staging, remuxed)
            .await
            .map_err(|e| io_error("moving remuxed file into place", remuxed, e))
    }

    fn set_output_name(&mut self, path: &Path) {
        if let Some(name) = path.file_name() {
            self.output_name = name.to_string_lossy().into_owned();
            self.progress.set_label(self.output_name.clone());
        }
    }
}

/// Temporary name the remuxer writes to, next to the final file.
fn staging_path(remuxed: &Path) -> PathBuf {
    let mut name = remuxed.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    remuxed.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_transitions() {
        use TaskState::*;
        assert!(Queued.can_transition_to(Transferring));
        assert!(Queued.can_transition_to(Transferred));
        assert!(Queued.can_transition_to(Completed));
        assert!(Transferring.can_transition_to(Failed));
        assert!(Verifying.can_transition_to(Completed));

        assert!(!Queued.can_transition_to(Failed));
        assert!(!Transferred.can_transition_to(Failed));
        assert!(!Transferred.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Queued));
        assert!(!Remuxing.can_transition_to(Completed));
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Verifying.is_terminal());
    }

    #[test]
    fn test_staging_path_sits_next_to_output() {
        assert_eq!(
            staging_path(Path::new("/out/1.ts")),
            PathBuf::from("/out/1.ts.part")
        );
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let segment = Segment::new(1, "https://example.com/1.flv", 1, Duration::from_secs(1));
        let mut task = SegmentTask::new(segment, "/tmp", ProgressReporter::noop("1.flv"));
        let err = task.transition(TaskState::Verifying).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid state transition: cannot transition from Queued to Verifying"
        );
        assert_eq!(task.state(), TaskState::Queued);
    }
}
