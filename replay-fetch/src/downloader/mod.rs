//! Segment transfer over HTTP with an optional shared rate limit.

pub mod rate_limiter;
pub mod transfer;

pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use transfer::{HttpFetcher, SegmentFetcher};
