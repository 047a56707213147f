//! Arena node types for the path tree.

use std::collections::{BTreeMap, HashMap};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Index of a node within a [`PathTree`](crate::PathTree) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Create a new NodeId from an arena index.
    pub fn new(index: usize) -> Self {
        Self(index as u64)
    }

    /// Arena index of this node.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Size and access time of a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    /// Size in bytes.
    pub size: u64,
    /// Last access time, Unix epoch seconds.
    pub accessed: i64,
}

impl FileStat {
    pub fn new(size: u64, accessed: i64) -> Self {
        Self { size, accessed }
    }
}

/// Type of path tree node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum NodeKind {
    /// Interior node with no size of its own.
    #[default]
    Directory,
    /// Exactly one ingested record.
    File(FileStat),
    /// Node at the depth cap that absorbed deeper records, keyed by the
    /// path remaining below it.
    Rollup {
        entries: HashMap<CompactString, FileStat>,
    },
}

impl NodeKind {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }

    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File(_))
    }

    /// Check if this is a rollup.
    pub fn is_rollup(&self) -> bool {
        matches!(self, NodeKind::Rollup { .. })
    }

    /// Size owned directly by this node.
    pub fn own_size(&self) -> u64 {
        match self {
            NodeKind::Directory => 0,
            NodeKind::File(stat) => stat.size,
            NodeKind::Rollup { entries } => entries
                .values()
                .fold(0u64, |acc, stat| acc.saturating_add(stat.size)),
        }
    }

    /// Oldest access time owned directly by this node.
    pub fn own_oldest_access(&self) -> Option<i64> {
        match self {
            NodeKind::Directory => None,
            NodeKind::File(stat) => Some(stat.accessed),
            NodeKind::Rollup { entries } => entries.values().map(|stat| stat.accessed).min(),
        }
    }

    /// Number of files owned directly by this node.
    pub fn own_file_count(&self) -> u64 {
        match self {
            NodeKind::Directory => 0,
            NodeKind::File(_) => 1,
            NodeKind::Rollup { entries } => entries.len() as u64,
        }
    }
}

/// One path component in the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    /// Segment name (not the full path).
    pub name: CompactString,

    /// Parent node, `None` only for the root.
    pub parent: Option<NodeId>,

    /// Segments between the root and this node.
    pub depth: u32,

    /// Node type and owned data.
    pub kind: NodeKind,

    /// Children keyed by segment name, in lexicographic order.
    pub children: BTreeMap<CompactString, NodeId>,

    /// Subtree total size. Written by the aggregator.
    pub aggregate_size: u64,

    /// Subtree minimum access time, `None` meaning never accessed.
    /// Written by the aggregator.
    pub oldest_access: Option<i64>,

    /// Subtree file count. Written by the aggregator.
    pub file_count: u64,
}

impl TreeNode {
    /// Create a new directory node.
    pub fn new_directory(name: impl Into<CompactString>, parent: Option<NodeId>, depth: u32) -> Self {
        Self {
            name: name.into(),
            parent,
            depth,
            kind: NodeKind::Directory,
            children: BTreeMap::new(),
            aggregate_size: 0,
            oldest_access: None,
            file_count: 0,
        }
    }

    /// Check if this node is a file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Check if this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Get the number of direct children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Look up a direct child by name.
    pub fn child(&self, name: &str) -> Option<NodeId> {
        self.children.get(name).copied()
    }

    /// Size owned directly by this node.
    pub fn own_size(&self) -> u64 {
        self.kind.own_size()
    }
}
