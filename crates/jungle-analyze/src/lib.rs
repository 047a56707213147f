//! Analysis stages for jungle.
//!
//! Given a [`PathTree`](jungle_core::PathTree) built by `jungle-ingest`:
//! - [`aggregate`] fills subtree sizes, oldest access times and file counts
//! - [`FrontierPruner`] selects the shallowest subtrees that are too large
//!   or too stale
//! - [`Projector`] renders the selection as flat rows and a nested tree
//!
//! [`Analyzer`] runs all three. [`AgeAnalyzer`] and [`OwnerAnalyzer`]
//! produce the supplementary age-bucket and per-owner reports.

mod age;
mod aggregate;
mod frontier;
mod owners;
mod project;
mod report;

pub use age::{
    AgeAnalyzer, AgeBucket, AgeBucketStats, AgeConfig, AgeConfigBuilder, AgeReport, AgedFile,
    AgedFileRow, format_age,
};
pub use aggregate::{Aggregate, aggregate, aggregate_from};
pub use frontier::{Decision, Frontier, FrontierPruner, Selection, SignificanceReason, Thresholds};
pub use owners::{OwnerAnalyzer, OwnerFile, OwnerReport, OwnerSummary};
pub use project::{FrontierRow, Projector, ReportNode};
pub use report::{AnalysisReport, Analyzer, ReportSummary};
