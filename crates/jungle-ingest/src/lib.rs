//! Listing ingestion for jungle.
//!
//! This crate turns an inventory listing into a [`PathTree`]:
//!
//! - **Parsing** of the ` -- `-separated listing format
//! - **Streaming** through a bounded channel from a reader thread
//! - **Sharded construction** of subtrees on the rayon pool, grafted into
//!   one tree in a deterministic order
//! - **Filtering** by owner, glob pattern and analysis root
//!
//! # Example
//!
//! ```rust,no_run
//! use jungle_ingest::{AnalysisConfig, TreeBuilder};
//!
//! let builder = TreeBuilder::new(AnalysisConfig::default()).unwrap();
//! let tree = builder.build_from_listing("inventory.list".as_ref()).unwrap();
//!
//! println!("Records: {}", tree.stats().records_inserted);
//! println!("Nodes: {}", tree.len());
//! ```

mod builder;
mod parser;
mod progress;
mod reader;

pub use builder::TreeBuilder;
pub use parser::ListingParser;
pub use progress::IngestProgress;
pub use reader::{BATCH_SIZE, ListingReader, ParsedLine, ReaderHandle};

// Re-export core types for convenience
pub use jungle_core::{
    AnalysisConfig, AnalysisError, IngestStats, IngestWarning, PathRecord, PathTree, RecordError,
    WarningKind,
};
