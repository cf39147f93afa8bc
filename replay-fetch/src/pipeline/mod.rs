//! Segment processing: per-segment state machine, the pool that runs it, and
//! progress reporting.

pub mod progress;
pub mod task;
pub mod worker_pool;

pub use progress::{
    ChannelSink, NoopSink, ProgressEvent, ProgressReporter, ProgressSink, ProgressUnit, TracingSink,
};
pub use task::{SegmentTask, TaskContext, TaskSettings, TaskState};
pub use worker_pool::{FailureMap, PoolOutcome, PoolStats, ResultMap, WorkerPool, WorkerPoolConfig};
