//! Core types for jungle.
//!
//! This crate provides the fundamental data structures used throughout
//! the jungle workspace: inventory records, the arena-backed path tree
//! with its insertion rules, analysis configuration, and error types.

mod config;
mod error;
mod node;
mod record;
mod tree;

pub use config::{
    AgeCutoff, AnalysisConfig, AnalysisConfigBuilder, BYTES_PER_GB, SECONDS_PER_YEAR, unix_now,
};
pub use error::{AnalysisError, IngestWarning, RecordError, WarningKind};
pub use node::{FileStat, NodeId, NodeKind, TreeNode};
pub use record::{PathRecord, RecordRow, join_segments, split_path};
pub use tree::{IngestStats, Inserted, MAX_RETAINED_WARNINGS, PathTree};
