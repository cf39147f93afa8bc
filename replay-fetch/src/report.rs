//! Per-segment outcome summary of a job run.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::assembly::AssemblyOutcome;
use crate::pipeline::{FailureMap, ResultMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum SegmentOutcome {
    Succeeded(PathBuf),
    Failed(String),
}

impl SegmentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    /// One entry per selected index, ascending.
    pub entries: Vec<(u32, SegmentOutcome)>,
    pub assembly: AssemblyOutcome,
}

impl JobReport {
    /// Combine the pool's maps into a report for `selected`.
    ///
    /// An index in neither map is reported as failed.
    pub fn build(
        selected: &[u32],
        results: &ResultMap,
        failures: &FailureMap,
        assembly: AssemblyOutcome,
    ) -> Self {
        let mut indices = selected.to_vec();
        indices.sort_unstable();
        indices.dedup();

        let entries = indices
            .into_iter()
            .map(|index| {
                let outcome = match (results.get(&index), failures.get(&index)) {
                    (Some(path), _) => SegmentOutcome::Succeeded(path.clone()),
                    (None, Some(reason)) => SegmentOutcome::Failed(reason.clone()),
                    (None, None) => {
                        SegmentOutcome::Failed("worker did not report a result".to_string())
                    }
                };
                (index, outcome)
            })
            .collect();

        Self { entries, assembly }
    }

    /// Report for a job whose merged recording already exists.
    pub fn already_complete(path: PathBuf) -> Self {
        Self {
            entries: Vec::new(),
            assembly: AssemblyOutcome::AlreadyComplete(path),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|(_, o)| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
            && !matches!(self.assembly, AssemblyOutcome::Failed(_))
    }

    pub fn log_summary(&self) {
        for (index, outcome) in &self.entries {
            match outcome {
                SegmentOutcome::Succeeded(path) => {
                    info!(index, path = %path.display(), "Segment succeeded")
                }
                SegmentOutcome::Failed(reason) => warn!(index, %reason, "Segment failed"),
            }
        }

        match &self.assembly {
            AssemblyOutcome::Failed(_) => warn!(
                succeeded = self.succeeded(),
                failed = self.failed(),
                assembly = %self.assembly,
                "Job finished with errors"
            ),
            _ => info!(
                succeeded = self.succeeded(),
                failed = self.failed(),
                assembly = %self.assembly,
                "Job finished"
            ),
        }
    }
}
