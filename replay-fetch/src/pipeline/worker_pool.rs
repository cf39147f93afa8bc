//! Bounded pool driving segment tasks to completion.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::task::{SegmentTask, TaskContext};

/// Segment index -> remuxed file, ordered by index.
pub type ResultMap = BTreeMap<u32, PathBuf>;

/// Segment index -> failure reason.
pub type FailureMap = BTreeMap<u32, String>;

/// Configuration for a worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Maximum concurrent workers.
    pub max_workers: usize,
    /// Start delay per segment index.
    pub stagger_step: Duration,
    /// Upper bound of the start delay.
    pub stagger_max: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 2,
            stagger_step: Duration::from_millis(20),
            stagger_max: Duration::from_secs(2),
        }
    }
}

impl WorkerPoolConfig {
    fn stagger(&self, index: u32) -> Duration {
        self.stagger_step.saturating_mul(index).min(self.stagger_max)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Workers spawned.
    pub workers: usize,
    /// Most workers executing a task at the same time.
    pub peak_busy: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} workers, peak {} busy", self.workers, self.peak_busy)
    }
}

/// Everything the pool learned about its tasks.
#[derive(Debug, Default)]
pub struct PoolOutcome {
    pub results: ResultMap,
    pub failures: FailureMap,
    pub stats: PoolStats,
}

pub struct WorkerPool {
    config: WorkerPoolConfig,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self { config }
    }

    /// Run every task to a terminal state and collect the outcomes.
    ///
    /// Uses `min(max_workers, tasks.len())` workers sharing one queue. A
    /// failing or panicking task does not stop the other workers.
    pub async fn run(&self, tasks: Vec<SegmentTask>, ctx: Arc<TaskContext>) -> PoolOutcome {
        if tasks.is_empty() {
            return PoolOutcome::default();
        }

        let workers = self.config.max_workers.clamp(1, tasks.len());
        if workers != self.config.max_workers {
            info!(
                requested = self.config.max_workers,
                workers, "Adjusted concurrency to the number of selected segments"
            );
        }

        let (tx, rx) = flume::unbounded::<SegmentTask>();
        for task in tasks {
            if tx.send(task).is_err() {
                break;
            }
        }
        // Closing the queue is the workers' only stop signal.
        drop(tx);

        let results = Arc::new(Mutex::new(ResultMap::new()));
        let failures = Arc::new(Mutex::new(FailureMap::new()));
        let busy = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut join_set = JoinSet::new();
        for worker_id in 1..=workers {
            let rx = rx.clone();
            let ctx = ctx.clone();
            let config = self.config.clone();
            let results = results.clone();
            let failures = failures.clone();
            let busy = busy.clone();
            let peak = peak.clone();

            join_set.spawn(async move {
                debug!(worker = worker_id, "Worker started");
                while let Ok(mut task) = rx.recv_async().await {
                    let index = task.index();
                    debug!(worker = worker_id, index, "Picked up segment");

                    let now_busy = busy.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now_busy, Ordering::SeqCst);

                    tokio::time::sleep(config.stagger(index)).await;
                    let outcome = AssertUnwindSafe(task.run(&ctx)).catch_unwind().await;
                    match outcome {
                        Ok(Ok(path)) => {
                            results.lock().insert(index, path);
                        }
                        Ok(Err(e)) => {
                            let reason = task.failure().map_or_else(|| e.to_string(), str::to_string);
                            error!(index, state = %task.state(), error = %reason, "Segment failed");
                            failures.lock().insert(index, reason);
                        }
                        Err(payload) => {
                            let reason = format!("task panicked: {}", panic_message(payload.as_ref()));
                            error!(index, %reason, "Segment task panicked");
                            failures.lock().insert(index, reason);
                        }
                    }

                    busy.fetch_sub(1, Ordering::SeqCst);
                }
                debug!(worker = worker_id, "Worker exiting");
            });
        }
        drop(rx);

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    error!(error = %e, "Worker panicked");
                } else {
                    warn!(error = %e, "Worker was cancelled");
                }
            }
        }

        let stats = PoolStats {
            workers,
            peak_busy: peak.load(Ordering::SeqCst),
        };
        debug!(%stats, "Worker pool drained");

        PoolOutcome {
            results: std::mem::take(&mut *results.lock()),
            failures: std::mem::take(&mut *failures.lock()),
            stats,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stagger_is_capped() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.stagger(1), Duration::from_millis(20));
        assert_eq!(config.stagger(10), Duration::from_millis(200));
        assert_eq!(config.stagger(500), Duration::from_secs(2));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_stats_display() {
        let stats = PoolStats {
            workers: 3,
            peak_busy: 2,
        };
        assert_eq!(stats.to_string(), "3 workers, peak 2 busy");
    }
}
