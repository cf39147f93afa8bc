use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use super::segment::{Segment, SegmentDescriptor};
use super::selection::Selection;
use crate::utils::filename::sanitize_filename;
use crate::utils::fs::io_error;
use crate::{Error, Result};

/// Identity of the recording a job downloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInfo {
    pub id: String,
    pub title: String,
    /// Start of the live session, as unix seconds on the wire.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start: DateTime<Utc>,
    /// Quality label, e.g. `原画` or `1080P`.
    pub quality: String,
}

impl RecordInfo {
    /// File name of the merged recording.
    ///
    /// `<start>-<id>-<title>-<quality>-complete.mp4`, with the start time in
    /// local time and the whole name sanitized.
    pub fn artifact_name(&self) -> String {
        let start = self.start.with_timezone(&Local).format("%Y-%m-%d %H-%M-%S");
        sanitize_filename(&format!(
            "{}-{}-{}-{}-complete.mp4",
            start, self.id, self.title, self.quality
        ))
    }
}

fn default_concurrency() -> usize {
    2
}

fn default_merge_mode() -> bool {
    true
}

/// Job file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub record: RecordInfo,
    pub segments: Vec<SegmentDescriptor>,
    #[serde(default)]
    pub selection: Selection,
    pub output_dir: PathBuf,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_bytes_per_second: Option<u64>,
    #[serde(default = "default_merge_mode")]
    pub merge_mode: bool,
}

/// A validated download job.
#[derive(Debug, Clone)]
pub struct Job {
    pub record: RecordInfo,
    pub segments: Vec<Segment>,
    pub selection: Selection,
    pub output_dir: PathBuf,
    pub concurrency: usize,
    pub rate_limit: Option<u64>,
    /// Merge into one file when true, write a manifest otherwise.
    pub merge_mode: bool,
}

impl Job {
    pub fn from_descriptor(descriptor: JobDescriptor) -> Result<Self> {
        if descriptor.segments.is_empty() {
            return Err(Error::config("job has no segments"));
        }
        if descriptor.concurrency == 0 {
            return Err(Error::config("concurrency must be greater than zero"));
        }
        if descriptor.rate_limit_bytes_per_second == Some(0) {
            return Err(Error::config("rate limit must be greater than zero"));
        }

        let segments = descriptor
            .segments
            .into_iter()
            .zip(1u32..)
            .map(|(segment, index)| Segment::from_descriptor(index, segment))
            .collect();

        Ok(Self {
            record: descriptor.record,
            segments,
            selection: descriptor.selection,
            output_dir: descriptor.output_dir,
            concurrency: descriptor.concurrency,
            rate_limit: descriptor.rate_limit_bytes_per_second,
            merge_mode: descriptor.merge_mode,
        })
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let descriptor: JobDescriptor = serde_json::from_str(content)?;
        Self::from_descriptor(descriptor)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| io_error("reading job file", path, e))?;
        Self::from_json(&content)
    }

    pub fn segment(&self, index: u32) -> Option<&Segment> {
        index
            .checked_sub(1)
            .and_then(|i| self.segments.get(i as usize))
    }

    /// Sum of the declared durations of every segment.
    pub fn total_duration(&self) -> Duration {
        self.segments.iter().map(|s| s.duration).sum()
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.output_dir.join(self.record.artifact_name())
    }
}
