//! Job, segment and selection types.

pub mod job;
pub mod segment;
pub mod selection;

pub use job::{Job, JobDescriptor, RecordInfo};
pub use segment::{Segment, SegmentDescriptor};
pub use selection::Selection;
