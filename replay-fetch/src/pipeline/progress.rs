use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressUnit {
    Bytes,
    /// `current` and `total` are milliseconds.
    Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Segment index; `None` for job-level work such as merging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    pub label: String,
    pub step: String,
    pub unit: ProgressUnit,
    pub current: u64,
    pub total: u64,
    pub updated_at: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn percent(&self) -> Option<f32> {
        (self.total > 0).then(|| (self.current as f64 / self.total as f64 * 100.0) as f32)
    }
}

/// Receives progress updates. Must not block.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_progress(&self, _event: ProgressEvent) {}
}

/// Emits every update as a `debug` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn on_progress(&self, event: ProgressEvent) {
        debug!(
            index = ?event.index,
            label = %event.label,
            step = %event.step,
            unit = ?event.unit,
            current = event.current,
            total = event.total,
            percent = ?event.percent(),
            "Progress"
        );
    }
}

/// Forwards updates to a bounded channel, dropping them when it is full.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, event: ProgressEvent) {
        let _ = self.tx.try_send(event);
    }
}

/// Progress handle bound to one unit of work.
#[derive(Clone)]
pub struct ProgressReporter {
    index: Option<u32>,
    label: String,
    sink: Arc<dyn ProgressSink>,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("index", &self.index)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl ProgressReporter {
    pub fn new(index: Option<u32>, label: impl Into<String>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            index,
            label: label.into(),
            sink,
        }
    }

    pub fn noop(label: impl Into<String>) -> Self {
        Self::new(None, label, Arc::new(NoopSink))
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn report(&self, step: &str, unit: ProgressUnit, current: u64, total: u64) {
        self.sink.on_progress(ProgressEvent {
            index: self.index,
            label: self.label.clone(),
            step: step.to_string(),
            unit,
            current,
            total,
            updated_at: Utc::now(),
        });
    }

    pub fn bytes(&self, step: &str, current: u64, total: u64) {
        self.report(step, ProgressUnit::Bytes, current, total);
    }

    pub fn duration(&self, step: &str, current: Duration, total: Duration) {
        self.report(
            step,
            ProgressUnit::Duration,
            current.as_millis() as u64,
            total.as_millis() as u64,
        );
    }
}
