//! Stream plumbing shared by the pipeline stages.

pub mod guard;
pub mod merge;

pub use guard::ConnectionGuard;
pub use merge::{merge_streams, merge_streams_with, MergeOptions, SourceStream};
