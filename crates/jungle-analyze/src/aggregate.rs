//! Bottom-up subtree aggregation.

use serde::{Deserialize, Serialize};

use jungle_core::{NodeId, PathTree};

/// Totals for one subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Total bytes.
    pub size: u64,
    /// Oldest access time, `None` if the subtree holds no file.
    pub oldest_access: Option<i64>,
    /// Number of files.
    pub file_count: u64,
}

/// Aggregate the whole tree.
pub fn aggregate(tree: &mut PathTree) -> Aggregate {
    let root = tree.root();
    aggregate_from(tree, root)
}

/// Fill `aggregate_size`, `oldest_access` and `file_count` for every node
/// under `start` with one post-order walk on an explicit stack.
pub fn aggregate_from(tree: &mut PathTree, start: NodeId) -> Aggregate {
    let mut stack = vec![(start, false)];

    while let Some((id, expanded)) = stack.pop() {
        if !expanded {
            stack.push((id, true));
            stack.extend(tree.children(id).map(|child| (child, false)));
            continue;
        }

        let node = tree.node(id);
        let mut size = node.kind.own_size();
        let mut oldest = node.kind.own_oldest_access();
        let mut file_count = node.kind.own_file_count();

        for &child in node.children.values() {
            let child = tree.node(child);
            size = size.saturating_add(child.aggregate_size);
            oldest = older(oldest, child.oldest_access);
            file_count += child.file_count;
        }

        let node = tree.node_mut(id);
        node.aggregate_size = size;
        node.oldest_access = oldest;
        node.file_count = file_count;
    }

    let node = tree.node(start);
    Aggregate {
        size: node.aggregate_size,
        oldest_access: node.oldest_access,
        file_count: node.file_count,
    }
}

/// Minimum of two access times where `None` means "never".
fn older(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}
