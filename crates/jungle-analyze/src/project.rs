//! Turn a frontier into flat rows and a nested report tree.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use jungle_core::{BYTES_PER_GB, NodeId, PathTree, SECONDS_PER_YEAR};

use crate::frontier::{Frontier, SignificanceReason};

/// One reported subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierRow {
    pub path: String,
    pub aggregate_size: u64,
    pub size_gb: f64,
    pub file_count: u64,
    /// Oldest access time in the subtree, Unix epoch seconds.
    pub oldest_access: Option<i64>,
    pub oldest_access_age_years: Option<f64>,
    pub reason: SignificanceReason,
}

/// Node of the nested report: the root-to-frontier paths of the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportNode {
    pub name: String,
    /// Aggregate size of this node's subtree in bytes.
    pub value: u64,
    pub age_in_years: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ReportNode>,
}

impl ReportNode {
    /// Number of nodes in this report subtree.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    /// Find a direct child by name.
    pub fn child(&self, name: &str) -> Option<&ReportNode> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Renders selections relative to a fixed reference time.
#[derive(Debug, Clone, Copy)]
pub struct Projector {
    reference_time: i64,
}

impl Projector {
    pub fn new(reference_time: i64) -> Self {
        Self { reference_time }
    }

    pub fn reference_time(&self) -> i64 {
        self.reference_time
    }

    /// Age in 365-day years. Timestamps after the reference time read as 0.
    pub fn age_in_years(&self, accessed: Option<i64>) -> Option<f64> {
        accessed.map(|ts| {
            let secs = self.reference_time.saturating_sub(ts).max(0);
            secs as f64 / SECONDS_PER_YEAR as f64
        })
    }

    /// One row per selected node, in frontier order.
    pub fn rows(&self, tree: &PathTree, frontier: &Frontier) -> Vec<FrontierRow> {
        frontier
            .selected
            .iter()
            .map(|selection| {
                let node = tree.node(selection.id);
                FrontierRow {
                    path: tree.path_of(selection.id),
                    aggregate_size: node.aggregate_size,
                    size_gb: node.aggregate_size as f64 / BYTES_PER_GB,
                    file_count: node.file_count,
                    oldest_access: node.oldest_access,
                    oldest_access_age_years: self.age_in_years(node.oldest_access),
                    reason: selection.reason,
                }
            })
            .collect()
    }

    /// Nested tree holding the root, every selected node and their
    /// ancestors. Selected nodes appear without children.
    pub fn nest(&self, tree: &PathTree, frontier: &Frontier) -> ReportNode {
        let mut kept: Vec<NodeId> = Vec::new();
        let mut seen: HashSet<NodeId> = HashSet::new();
        let root = tree.root();
        seen.insert(root);
        kept.push(root);

        for id in frontier.ids() {
            let mut current = Some(id);
            while let Some(node_id) = current {
                if !seen.insert(node_id) {
                    break;
                }
                kept.push(node_id);
                current = tree.node(node_id).parent;
            }
        }

        // Deepest first so every child is built before its parent.
        kept.sort_by(|a, b| tree.node(*b).depth.cmp(&tree.node(*a).depth));

        let mut pending: HashMap<NodeId, Vec<ReportNode>> = HashMap::new();
        for id in kept {
            let node = tree.node(id);
            let mut children = pending.remove(&id).unwrap_or_default();
            children.sort_by(|a, b| a.name.cmp(&b.name));
            let report = ReportNode {
                name: node.name.to_string(),
                value: node.aggregate_size,
                age_in_years: self.age_in_years(node.oldest_access),
                children,
            };
            match node.parent {
                Some(parent) => pending.entry(parent).or_default().push(report),
                None => return report,
            }
        }

        // Only reachable when the root is missing from `kept`.
        ReportNode {
            name: tree.node(root).name.to_string(),
            value: tree.node(root).aggregate_size,
            age_in_years: self.age_in_years(tree.node(root).oldest_access),
            children: Vec::new(),
        }
    }
}
