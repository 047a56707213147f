//! Threshold pruning: select the shallowest significant subtrees.
//!
//! A node at or below `min_depth` is significant when its subtree is
//! strictly larger than the size threshold or was last accessed strictly
//! before the age cutoff. The walk stops at the first significant node on
//! every root-to-leaf path, so the selected set is an antichain: no
//! selected node is an ancestor of another. Insignificant leaves are
//! dropped and insignificant interior nodes are descended into.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use jungle_core::{AnalysisConfig, NodeId, PathTree, TreeNode};

/// Why a node was selected.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SignificanceReason {
    /// Larger than the size threshold only.
    Size,
    /// Older than the age cutoff only.
    Age,
    /// Both.
    Both,
}

/// Resolved significance thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// A subtree strictly larger than this is significant.
    pub size_bytes: u64,
    /// A subtree accessed strictly before this is significant. `None`
    /// places the cutoff after every timestamp.
    pub age_cutoff: Option<i64>,
}

impl Thresholds {
    pub fn new(size_bytes: u64, age_cutoff: Option<i64>) -> Self {
        Self {
            size_bytes,
            age_cutoff,
        }
    }

    /// Resolve thresholds from a config for a run at `reference_time`.
    pub fn from_config(config: &AnalysisConfig, reference_time: i64) -> Self {
        Self::new(
            config.size_threshold_bytes(),
            config.cutoff_timestamp(reference_time),
        )
    }

    /// Evaluate an aggregated node.
    pub fn evaluate(&self, node: &TreeNode) -> Option<SignificanceReason> {
        let large = node.aggregate_size > self.size_bytes;
        let stale = match (node.oldest_access, self.age_cutoff) {
            (Some(accessed), Some(cutoff)) => accessed < cutoff,
            (Some(_), None) => true,
            // Never accessed: nothing to call stale.
            (None, _) => false,
        };
        match (large, stale) {
            (true, true) => Some(SignificanceReason::Both),
            (true, false) => Some(SignificanceReason::Size),
            (false, true) => Some(SignificanceReason::Age),
            (false, false) => None,
        }
    }
}

/// Outcome for a single visited node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Report this node and stop.
    Selected(SignificanceReason),
    /// Visit the children.
    Descend,
    /// Insignificant leaf, or a leaf above the minimum depth.
    Dropped,
}

/// A selected node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub id: NodeId,
    pub reason: SignificanceReason,
}

/// Result of a pruning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontier {
    /// Selected nodes in depth-first lexicographic order.
    pub selected: Vec<Selection>,
    /// Nodes the walk examined.
    pub visited: u64,
    /// Nodes discarded without selection.
    pub dropped: u64,
}

impl Frontier {
    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Selected node ids.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.selected.iter().map(|s| s.id)
    }

    /// Check if a node was selected.
    pub fn contains(&self, id: NodeId) -> bool {
        self.selected.iter().any(|s| s.id == id)
    }

    /// Sum of the selected nodes' aggregate sizes.
    pub fn total_size(&self, tree: &PathTree) -> u64 {
        self.ids()
            .map(|id| tree.node(id).aggregate_size)
            .fold(0u64, u64::saturating_add)
    }

    /// Number of selections per reason, as (size, age, both).
    pub fn reason_counts(&self) -> (u64, u64, u64) {
        self.selected
            .iter()
            .fold((0, 0, 0), |(size, age, both), s| match s.reason {
                SignificanceReason::Size => (size + 1, age, both),
                SignificanceReason::Age => (size, age + 1, both),
                SignificanceReason::Both => (size, age, both + 1),
            })
    }

    fn append(&mut self, other: Frontier) {
        self.selected.extend(other.selected);
        self.visited += other.visited;
        self.dropped += other.dropped;
    }
}

/// Selects the frontier of an aggregated tree.
#[derive(Debug, Clone, Copy)]
pub struct FrontierPruner {
    thresholds: Thresholds,
    min_depth: u32,
}

impl FrontierPruner {
    pub fn new(thresholds: Thresholds, min_depth: u32) -> Self {
        Self {
            thresholds,
            min_depth,
        }
    }

    /// Build a pruner from a config for a run at `reference_time`.
    pub fn from_config(config: &AnalysisConfig, reference_time: i64) -> Self {
        Self::new(
            Thresholds::from_config(config, reference_time),
            config.min_depth,
        )
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn min_depth(&self) -> u32 {
        self.min_depth
    }

    /// Decide what to do with one node. The tree must be aggregated.
    pub fn decide(&self, tree: &PathTree, id: NodeId) -> Decision {
        let node = tree.node(id);
        if node.depth >= self.min_depth {
            if let Some(reason) = self.thresholds.evaluate(node) {
                return Decision::Selected(reason);
            }
        }
        if node.is_leaf() {
            Decision::Dropped
        } else {
            Decision::Descend
        }
    }

    /// Walk the whole tree.
    pub fn prune(&self, tree: &PathTree) -> Frontier {
        self.prune_from(tree, tree.root())
    }

    /// Walk the subtree under `start`.
    pub fn prune_from(&self, tree: &PathTree, start: NodeId) -> Frontier {
        let mut frontier = Frontier::default();
        let mut stack = vec![start];

        while let Some(id) = stack.pop() {
            frontier.visited += 1;
            match self.decide(tree, id) {
                Decision::Selected(reason) => frontier.selected.push(Selection { id, reason }),
                Decision::Dropped => frontier.dropped += 1,
                // Reversed so the smallest name is popped first.
                Decision::Descend => stack.extend(tree.children(id).rev()),
            }
        }

        frontier
    }

    /// Same result as [`prune`](Self::prune), with the root's children
    /// walked in parallel and concatenated in name order.
    pub fn prune_parallel(&self, tree: &PathTree) -> Frontier {
        let root = tree.root();
        if self.decide(tree, root) != Decision::Descend {
            return self.prune_from(tree, root);
        }

        let children: Vec<NodeId> = tree.children(root).collect();
        let parts: Vec<Frontier> = children
            .into_par_iter()
            .map(|child| self.prune_from(tree, child))
            .collect();

        let mut frontier = Frontier {
            visited: 1,
            ..Frontier::default()
        };
        for part in parts {
            frontier.append(part);
        }
        frontier
    }
}
