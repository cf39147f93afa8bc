//! replay-fetch library crate.
//!
//! Downloads the segments of a multi-part replay, remuxes each into MPEG-TS,
//! verifies it, and assembles the result into one recording or a playlist.

pub mod assembly;
pub mod config;
pub mod domain;
pub mod downloader;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod tools;
pub mod utils;

pub use error::{Error, Result};
pub use report::{JobReport, SegmentOutcome};
pub use runner::JobRunner;
