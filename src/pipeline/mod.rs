//! Orchestration of a full registration run

pub mod report;
pub mod stitcher;

pub use report::*;
pub use stitcher::*;
