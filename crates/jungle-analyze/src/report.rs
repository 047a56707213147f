//! One-call analysis: aggregate, prune and project a built tree.

use serde::{Deserialize, Serialize};

use jungle_core::{AnalysisConfig, IngestStats, PathTree, unix_now};

use crate::aggregate::{Aggregate, aggregate};
use crate::frontier::{FrontierPruner, Thresholds};
use crate::project::{FrontierRow, Projector, ReportNode};

/// Headline numbers for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub reference_time: i64,
    pub thresholds: Thresholds,
    pub min_depth: u32,
    /// Totals over the whole tree.
    pub total: Aggregate,
    /// Bytes covered by the reported subtrees.
    pub reported_size: u64,
    pub selected: usize,
    pub by_size: u64,
    pub by_age: u64,
    pub by_both: u64,
    pub visited: u64,
    pub ingest: IngestStats,
}

/// Full output of an analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub rows: Vec<FrontierRow>,
    pub tree: ReportNode,
    pub summary: ReportSummary,
}

/// Runs the analysis stages over a built tree.
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: AnalysisConfig,
    reference_time: i64,
}

impl Analyzer {
    /// Analyzer with the current time as reference.
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            reference_time: unix_now(),
        }
    }

    /// Fix the reference time used for relative cutoffs and ages.
    pub fn with_reference_time(mut self, reference_time: i64) -> Self {
        self.reference_time = reference_time;
        self
    }

    pub fn reference_time(&self) -> i64 {
        self.reference_time
    }

    pub fn analyze(&self, tree: &mut PathTree) -> AnalysisReport {
        let total = aggregate(tree);
        let pruner = FrontierPruner::from_config(&self.config, self.reference_time);
        let frontier = pruner.prune_parallel(tree);
        let projector = Projector::new(self.reference_time);

        let (by_size, by_age, by_both) = frontier.reason_counts();
        let summary = ReportSummary {
            reference_time: self.reference_time,
            thresholds: *pruner.thresholds(),
            min_depth: pruner.min_depth(),
            total,
            reported_size: frontier.total_size(tree),
            selected: frontier.len(),
            by_size,
            by_age,
            by_both,
            visited: frontier.visited,
            ingest: tree.stats().clone(),
        };

        tracing::info!(
            selected = summary.selected,
            reported_size = summary.reported_size,
            visited = summary.visited,
            "frontier selected"
        );

        AnalysisReport {
            rows: projector.rows(tree, &frontier),
            tree: projector.nest(tree, &frontier),
            summary,
        }
    }
}
