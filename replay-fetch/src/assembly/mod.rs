//! Turns a fully completed set of segments into a single recording or a
//! playlist referencing them.

pub mod manifest;
pub mod merge;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::{Job, Selection};
use crate::pipeline::{ProgressReporter, ProgressSink, ResultMap};
use crate::tools::MediaTools;
use crate::utils::fs::exists;
use crate::{Error, Result};

pub use manifest::write_manifest;
pub use merge::merge_segments;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyOutcome {
    Merged(PathBuf),
    Manifest(PathBuf),
    /// A merged recording matching the job was already present.
    AlreadyComplete(PathBuf),
    Skipped(String),
    Failed(String),
}

impl fmt::Display for AssemblyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merged(path) => write!(f, "merged into {}", path.display()),
            Self::Manifest(path) => write!(f, "manifest written to {}", path.display()),
            Self::AlreadyComplete(path) => write!(f, "already complete at {}", path.display()),
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Why assembly cannot run, if it cannot.
///
/// Assembly needs every segment of the recording selected and completed.
pub fn gate(selection: &Selection, total: usize, results: &ResultMap) -> Option<String> {
    if !selection.covers_all(total) {
        return Some(format!(
            "selection `{selection}` does not cover all {total} segments"
        ));
    }
    let complete = (1..=total as u32).all(|index| results.contains_key(&index));
    if !complete || results.len() != total {
        return Some(format!("{} of {} segments completed", results.len(), total));
    }
    None
}

pub struct AssemblyStage {
    tools: Arc<dyn MediaTools>,
    manifest_name: String,
    sink: Arc<dyn ProgressSink>,
}

impl AssemblyStage {
    pub fn new(
        tools: Arc<dyn MediaTools>,
        manifest_name: impl Into<String>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            tools,
            manifest_name: manifest_name.into(),
            sink,
        }
    }

    /// Merge or write a manifest, depending on the job's mode.
    ///
    /// Returns `Skipped` without touching the filesystem when the gate is
    /// closed.
    pub async fn assemble(&self, job: &Job, results: &ResultMap) -> Result<AssemblyOutcome> {
        if let Some(reason) = gate(&job.selection, job.segments.len(), results) {
            info!(%reason, "Skipping assembly");
            return Ok(AssemblyOutcome::Skipped(reason));
        }

        let inputs: Vec<PathBuf> = results.values().cloned().collect();

        if job.merge_mode {
            let dest = job.artifact_path();
            let progress = ProgressReporter::new(None, "merge", self.sink.clone());
            merge_segments(self.tools.as_ref(), &inputs, &dest, &progress).await?;
            Ok(AssemblyOutcome::Merged(dest))
        } else {
            let mut files = Vec::with_capacity(inputs.len());
            for input in inputs {
                let duration = self.tools.probe_duration(&input).await.map_err(|e| {
                    Error::assembly(format!("probing {} failed: {e}", input.display()))
                })?;
                files.push((input, duration));
            }
            let path = write_manifest(&job.output_dir, &self.manifest_name, &files).await?;
            Ok(AssemblyOutcome::Manifest(path))
        }
    }

    /// Whether a previously merged recording already satisfies `job`.
    ///
    /// The artifact counts as complete when its probed duration is within
    /// `tolerance` of the declared total. Probe failures count as "no".
    pub async fn existing_recording(
        &self,
        job: &Job,
        tolerance: Duration,
    ) -> Option<PathBuf> {
        let path = job.artifact_path();
        match exists("checking existing recording", &path).await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                warn!(error = %e, "Could not check for an existing recording");
                return None;
            }
        }

        let declared = job.total_duration();
        match self.tools.probe_duration(&path).await {
            Ok(probed) if probed.abs_diff(declared) < tolerance => Some(path),
            Ok(probed) => {
                warn!(
                    path = %path.display(),
                    declared_secs = declared.as_secs_f64(),
                    probed_secs = probed.as_secs_f64(),
                    "Existing recording does not match the job"
                );
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not probe existing recording");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(indices: &[u32]) -> ResultMap {
        indices
            .iter()
            .map(|&i| (i, PathBuf::from(format!("/out/{i}.ts"))))
            .collect()
    }

    #[test]
    fn test_gate_requires_full_selection() {
        let selection = Selection::from_indices([2, 4]);
        let reason = gate(&selection, 5, &results(&[2, 4])).unwrap();
        assert!(reason.contains("does not cover"));
    }

    #[test]
    fn test_gate_requires_every_result() {
        let reason = gate(&Selection::All, 5, &results(&[1, 2, 3, 5])).unwrap();
        assert_eq!(reason, "4 of 5 segments completed");
        assert!(gate(&Selection::All, 5, &results(&[1, 2, 3, 4, 5])).is_none());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(
            AssemblyOutcome::Skipped("partial".to_string()).to_string(),
            "skipped: partial"
        );
    }
}
