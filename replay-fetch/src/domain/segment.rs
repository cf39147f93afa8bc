use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Segment as it appears in a job file.
///
/// `duration` is in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    pub url: String,
    pub size: u64,
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_url: Option<String>,
}

/// One numbered part of a recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 1-based position within the recording.
    pub index: u32,
    pub url: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Declared playback duration.
    pub duration: Duration,
    pub backup_url: Option<String>,
}

impl Segment {
    pub fn new(index: u32, url: impl Into<String>, size: u64, duration: Duration) -> Self {
        Self {
            index,
            url: url.into(),
            size,
            duration,
            backup_url: None,
        }
    }

    pub fn from_descriptor(index: u32, descriptor: SegmentDescriptor) -> Self {
        Self {
            index,
            url: descriptor.url,
            size: descriptor.size,
            duration: Duration::from_millis(descriptor.duration),
            backup_url: descriptor.backup_url.filter(|u| !u.trim().is_empty()),
        }
    }

    /// Stable local file name for the downloaded payload.
    ///
    /// The last path component of the URL with `:` replaced by `-`. URLs
    /// without a usable component fall back to a hash of the whole URL with
    /// an `.flv` extension.
    pub fn file_name(&self) -> String {
        url_file_name(&self.url).unwrap_or_else(|| fallback_file_name(&self.url))
    }

    /// Where the downloaded payload is written inside `dir`.
    pub fn raw_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }

    /// Where the remuxed payload is written inside `dir`.
    ///
    /// Never equal to [`Segment::raw_path`]: a raw file that already carries
    /// the intermediate extension gets a `_remux` suffix on its stem.
    pub fn remuxed_path(&self, dir: &Path, extension: &str) -> PathBuf {
        let raw = self.raw_path(dir);
        let candidate = raw.with_extension(extension);
        if candidate != raw {
            return candidate;
        }

        let stem = raw
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        raw.with_file_name(format!("{stem}_remux.{extension}"))
    }
}

fn url_file_name(raw: &str) -> Option<String> {
    let url = url::Url::parse(raw).ok()?;
    let last = url.path_segments()?.next_back()?;
    if last.is_empty() || last == "." || last == ".." {
        return None;
    }
    Some(last.replace(':', "-"))
}

fn fallback_file_name(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    format!("{}.flv", hex::encode(digest))
}
