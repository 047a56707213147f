//! Arena-backed path tree and ingestion statistics.

use std::collections::HashMap;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::error::{IngestWarning, RecordError, WarningKind};
use crate::node::{FileStat, NodeId, NodeKind, TreeNode};
use crate::record::{PathRecord, join_segments};

/// Maximum number of warnings kept verbatim. Every warning is still counted.
pub const MAX_RETAINED_WARNINGS: usize = 1000;

/// Counters collected while building a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Records offered to the tree or skipped before it.
    pub records_seen: u64,
    /// Records that ended up in the tree (replacements included).
    pub records_inserted: u64,
    /// Unparseable lines and empty paths.
    pub malformed: u64,
    /// Records skipped because of a file/directory collision.
    pub conflicts: u64,
    /// Records that replaced an earlier record at the same path.
    pub duplicates: u64,
    /// Records outside the analysis root.
    pub outside_root: u64,
    /// Records removed by owner or path filters.
    pub filtered: u64,
    /// Records folded into a rollup node at the depth cap.
    pub rolled_up: u64,
    /// Deepest record path seen, in segments.
    pub max_record_depth: u32,
}

impl IngestStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a skipped record under its error kind.
    pub fn record_error(&mut self, error: &RecordError) {
        match error.kind() {
            WarningKind::MalformedRecord => self.malformed += 1,
            WarningKind::PathConflict => self.conflicts += 1,
            WarningKind::OutsideRoot => self.outside_root += 1,
            WarningKind::DuplicatePath => self.duplicates += 1,
        }
    }

    /// Total records skipped for any reason.
    pub fn skipped(&self) -> u64 {
        self.malformed + self.conflicts + self.outside_root + self.filtered
    }

    /// Fold another set of counters into this one.
    pub fn merge(&mut self, other: &IngestStats) {
        self.records_seen += other.records_seen;
        self.records_inserted += other.records_inserted;
        self.malformed += other.malformed;
        self.conflicts += other.conflicts;
        self.duplicates += other.duplicates;
        self.outside_root += other.outside_root;
        self.filtered += other.filtered;
        self.rolled_up += other.rolled_up;
        self.max_record_depth = self.max_record_depth.max(other.max_record_depth);
    }
}

/// Outcome of a successful insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    /// First record at this path.
    New,
    /// Replaced an earlier record at the same path.
    Replaced { previous_size: u64 },
}

/// Prefix tree over path segments, stored as an arena.
///
/// Nodes are only ever appended, so a child always has a larger index than
/// its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathTree {
    nodes: Vec<TreeNode>,
    prefix: String,
    max_depth: Option<u32>,
    stats: IngestStats,
    warnings: Vec<IngestWarning>,
    warning_count: u64,
}

impl PathTree {
    /// Create an empty tree. `prefix` is the absolute path the root stands
    /// for (empty for `/`); records deeper than `max_depth` segments are
    /// folded into the node at `max_depth`.
    pub fn new(prefix: impl Into<String>, max_depth: Option<u32>) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        let root_name = prefix
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("/");
        Self {
            nodes: vec![TreeNode::new_directory(root_name, None, 0)],
            prefix,
            max_depth,
            stats: IngestStats::new(),
            warnings: Vec::new(),
            warning_count: 0,
        }
    }

    /// Root node id.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Borrow a node.
    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.index()]
    }

    /// Mutably borrow a node.
    pub fn node_mut(&mut self, id: NodeId) -> &mut TreeNode {
        &mut self.nodes[id.index()]
    }

    /// All nodes in creation order.
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the tree holds nothing but its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Depth cap applied during insertion.
    pub fn max_depth(&self) -> Option<u32> {
        self.max_depth
    }

    /// Absolute path the root stands for.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Ingestion counters.
    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// Retained warnings (at most [`MAX_RETAINED_WARNINGS`]).
    pub fn warnings(&self) -> &[IngestWarning] {
        &self.warnings
    }

    /// Total warnings raised, retained or not.
    pub fn warning_count(&self) -> u64 {
        self.warning_count
    }

    /// Children of a node in lexicographic order.
    pub fn children(&self, id: NodeId) -> impl DoubleEndedIterator<Item = NodeId> + '_ {
        self.nodes[id.index()].children.values().copied()
    }

    /// Absolute path of a node.
    pub fn path_of(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id);
            if node.parent.is_some() {
                names.push(node.name.as_str());
            }
            current = node.parent;
        }
        names.reverse();

        if names.is_empty() {
            return if self.prefix.is_empty() {
                "/".to_string()
            } else {
                self.prefix.clone()
            };
        }
        format!("{}{}", self.prefix, join_segments(&names))
    }

    /// Find a node by its root-relative segments.
    pub fn find<S: AsRef<str>>(&self, segments: &[S]) -> Option<NodeId> {
        let mut current = self.root();
        for segment in segments {
            current = self.node(current).child(segment.as_ref())?;
        }
        Some(current)
    }

    /// Count a record skipped before it reached the tree.
    pub fn record_skipped(&mut self, path: &str, error: &RecordError) {
        self.stats.records_seen += 1;
        self.stats.record_error(error);
        self.push_warning(IngestWarning::from_record_error(path, error));
    }

    /// Count a record removed by an owner or path filter.
    pub fn record_filtered(&mut self) {
        self.stats.records_seen += 1;
        self.stats.filtered += 1;
    }

    /// Insert a record, creating intermediate directories as needed.
    ///
    /// Conflicting records are skipped and counted; the tree is left
    /// untouched in that case.
    pub fn insert(&mut self, record: &PathRecord) -> Result<Inserted, RecordError> {
        self.stats.records_seen += 1;
        match self.insert_inner(record) {
            Ok(inserted) => {
                self.stats.records_inserted += 1;
                self.stats.max_record_depth =
                    self.stats.max_record_depth.max(record.depth() as u32);
                if let Inserted::Replaced { previous_size } = inserted {
                    let path = record.path();
                    tracing::warn!(
                        path = %path,
                        previous_size,
                        size = record.size_bytes,
                        "duplicate path, keeping last record"
                    );
                    self.stats.duplicates += 1;
                    self.push_warning(IngestWarning::duplicate(
                        path,
                        previous_size,
                        record.size_bytes,
                    ));
                }
                Ok(inserted)
            }
            Err(error) => {
                if let RecordError::PathConflict { path } = &error {
                    tracing::warn!(path = %path, "path used as both file and directory, skipping");
                }
                self.stats.record_error(&error);
                self.push_warning(IngestWarning::from_record_error(record.path(), &error));
                Err(error)
            }
        }
    }

    fn insert_inner(&mut self, record: &PathRecord) -> Result<Inserted, RecordError> {
        let segments = &record.segments;
        if segments.is_empty() {
            return Err(RecordError::EmptyPath);
        }

        let cut = self
            .max_depth
            .map(|d| d as usize)
            .unwrap_or(usize::MAX)
            .max(1);
        let (head, tail) = segments.split_at(segments.len().min(cut));
        let stat = FileStat::new(record.size_bytes, record.last_access);
        let conflict = || RecordError::PathConflict {
            path: record.path(),
        };

        // Walk the existing prefix without mutating anything.
        let mut current = self.root();
        let mut matched = 0;
        while matched < head.len() {
            let node = self.node(current);
            if !node.kind.is_dir() {
                return Err(conflict());
            }
            match node.child(&head[matched]) {
                Some(child) => {
                    current = child;
                    matched += 1;
                }
                None => break,
            }
        }

        if matched == head.len() {
            return self.update_terminal(current, tail, stat, conflict);
        }

        for segment in &head[matched..head.len() - 1] {
            current = self.push_child(current, segment.clone(), NodeKind::Directory);
        }
        let kind = if tail.is_empty() {
            NodeKind::File(stat)
        } else {
            self.stats.rolled_up += 1;
            let mut entries = HashMap::new();
            entries.insert(CompactString::from(tail.join("/")), stat);
            NodeKind::Rollup { entries }
        };
        self.push_child(current, head[head.len() - 1].clone(), kind);
        Ok(Inserted::New)
    }

    fn update_terminal(
        &mut self,
        id: NodeId,
        tail: &[CompactString],
        stat: FileStat,
        conflict: impl Fn() -> RecordError,
    ) -> Result<Inserted, RecordError> {
        let node = &mut self.nodes[id.index()];
        let convertible = node.kind.is_dir() && node.children.is_empty() && node.parent.is_some();

        if tail.is_empty() {
            if let NodeKind::File(existing) = &mut node.kind {
                let previous_size = existing.size;
                *existing = stat;
                return Ok(Inserted::Replaced { previous_size });
            }
            if convertible {
                node.kind = NodeKind::File(stat);
                return Ok(Inserted::New);
            }
            return Err(conflict());
        }

        let key = CompactString::from(tail.join("/"));
        if let NodeKind::Rollup { entries } = &mut node.kind {
            self.stats.rolled_up += 1;
            return Ok(match entries.insert(key, stat) {
                Some(previous) => Inserted::Replaced {
                    previous_size: previous.size,
                },
                None => Inserted::New,
            });
        }
        if convertible {
            let mut entries = HashMap::new();
            entries.insert(key, stat);
            node.kind = NodeKind::Rollup { entries };
            self.stats.rolled_up += 1;
            return Ok(Inserted::New);
        }
        Err(conflict())
    }

    fn push_child(&mut self, parent: NodeId, name: CompactString, kind: NodeKind) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        let depth = self.node(parent).depth + 1;
        let mut node = TreeNode::new_directory(name.clone(), Some(parent), depth);
        node.kind = kind;
        self.nodes.push(node);
        self.node_mut(parent).children.insert(name, id);
        id
    }

    fn push_warning(&mut self, warning: IngestWarning) {
        self.warning_count += 1;
        if self.warnings.len() < MAX_RETAINED_WARNINGS {
            self.warnings.push(warning);
        }
    }

    /// Merge another tree built over a disjoint part of the path space.
    ///
    /// Both trees must share the same root. A leaf of `other` landing on an
    /// existing node (or a directory of `other` landing on an existing leaf)
    /// is a path conflict: that subtree of `other` is dropped and counted.
    pub fn graft(&mut self, mut other: PathTree) {
        self.stats.merge(&other.stats);
        self.warning_count += other.warning_count;
        let room = MAX_RETAINED_WARNINGS.saturating_sub(self.warnings.len());
        self.warnings
            .extend(std::mem::take(&mut other.warnings).into_iter().take(room));

        let mut mapped: Vec<Option<NodeId>> = vec![None; other.nodes.len()];
        mapped[0] = Some(self.root());

        for index in 1..other.nodes.len() {
            let Some(parent) = other.nodes[index].parent.and_then(|p| mapped[p.index()]) else {
                continue;
            };
            let name = other.nodes[index].name.clone();
            let incoming_is_dir = other.nodes[index].kind.is_dir();
            let parent_node = self.node(parent);

            let target = match parent_node.child(&name) {
                Some(existing) if incoming_is_dir && self.node(existing).kind.is_dir() => {
                    Some(existing)
                }
                Some(_) => None,
                None if parent_node.kind.is_dir() => {
                    let kind = std::mem::take(&mut other.nodes[index].kind);
                    Some(self.push_child(parent, name, kind))
                }
                None => None,
            };

            match target {
                Some(id) => mapped[index] = Some(id),
                None => {
                    let lost = other.subtree_file_count(NodeId::new(index));
                    let path = other.path_of(NodeId::new(index));
                    tracing::warn!(path = %path, lost, "path conflict while merging shards");
                    self.stats.records_inserted = self.stats.records_inserted.saturating_sub(lost);
                    self.stats.conflicts += lost.max(1);
                    self.push_warning(IngestWarning::from_record_error(
                        path.clone(),
                        &RecordError::PathConflict { path },
                    ));
                }
            }
        }
    }

    /// Files held in a subtree, counted from node kinds without aggregates.
    fn subtree_file_count(&self, id: NodeId) -> u64 {
        let mut total = 0;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.node(current);
            total += node.kind.own_file_count();
            stack.extend(node.children.values().copied());
        }
        total
    }
}

impl Default for PathTree {
    fn default() -> Self {
        Self::new("", None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, size: u64, accessed: i64) -> PathRecord {
        PathRecord::from_path("user", path, size, accessed)
    }

    #[test]
    fn test_insert_creates_intermediates() {
        let mut tree = PathTree::default();
        tree.insert(&record("/a/b/x.dat", 10, 0)).unwrap();

        assert_eq!(tree.len(), 4);
        let file = tree.find(&["a", "b", "x.dat"]).unwrap();
        assert!(tree.node(file).is_file());
        assert_eq!(tree.node(file).depth, 3);
        assert_eq!(tree.path_of(file), "/a/b/x.dat");
    }

    #[test]
    fn test_shared_prefixes_share_nodes() {
        let mut tree = PathTree::default();
        tree.insert(&record("/a/b/x", 1, 0)).unwrap();
        tree.insert(&record("/a/b/y", 1, 0)).unwrap();
        tree.insert(&record("/a/c/z", 1, 0)).unwrap();

        // root, a, b, x, y, c, z
        assert_eq!(tree.len(), 7);
        assert_eq!(tree.stats().records_inserted, 3);
    }

    #[test]
    fn test_empty_path_is_malformed() {
        let mut tree = PathTree::default();
        let err = tree.insert(&record("/", 1, 0)).unwrap_err();
        assert_eq!(err, RecordError::EmptyPath);
        assert_eq!(tree.stats().malformed, 1);
    }

    #[test]
    fn test_file_then_directory_conflict() {
        let mut tree = PathTree::default();
        tree.insert(&record("/a/b", 1, 0)).unwrap();
        let err = tree.insert(&record("/a/b/c", 1, 0)).unwrap_err();

        assert!(matches!(err, RecordError::PathConflict { .. }));
        assert_eq!(tree.stats().conflicts, 1);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_directory_then_file_conflict() {
        let mut tree = PathTree::default();
        tree.insert(&record("/a/b/c", 1, 0)).unwrap();
        let err = tree.insert(&record("/a/b", 1, 0)).unwrap_err();

        assert!(matches!(err, RecordError::PathConflict { .. }));
        assert!(tree.node(tree.find(&["a", "b"]).unwrap()).kind.is_dir());
    }

    #[test]
    fn test_duplicate_is_last_write_wins() {
        let mut tree = PathTree::default();
        tree.insert(&record("/a/x", 10, 100)).unwrap();
        let outcome = tree.insert(&record("/a/x", 30, 50)).unwrap();

        assert_eq!(outcome, Inserted::Replaced { previous_size: 10 });
        let node = tree.node(tree.find(&["a", "x"]).unwrap());
        assert!(matches!(node.kind, NodeKind::File(FileStat { size: 30, accessed: 50 })));
        assert_eq!(tree.stats().duplicates, 1);
        assert_eq!(tree.warnings()[0].kind, WarningKind::DuplicatePath);
    }

    #[test]
    fn test_max_depth_rolls_up() {
        let mut tree = PathTree::new("", Some(2));
        tree.insert(&record("/a/b/c/d.dat", 5, 10)).unwrap();
        tree.insert(&record("/a/b/e.dat", 7, 20)).unwrap();
        tree.insert(&record("/a/b/e.dat", 9, 30)).unwrap();

        let b = tree.node(tree.find(&["a", "b"]).unwrap());
        assert!(b.is_leaf());
        assert_eq!(b.own_size(), 14);
        assert_eq!(tree.stats().rolled_up, 3);
        assert_eq!(tree.stats().duplicates, 1);
    }

    #[test]
    fn test_file_at_depth_cap_conflicts_with_rollup() {
        let mut tree = PathTree::new("", Some(2));
        tree.insert(&record("/a/b/c", 5, 10)).unwrap();
        assert!(tree.insert(&record("/a/b", 1, 0)).is_err());
    }

    #[test]
    fn test_prefix_paths() {
        let mut tree = PathTree::new("/projectnb/", None);
        tree.insert(&record("/econ/x", 1, 0)).unwrap();

        assert_eq!(tree.node(tree.root()).name.as_str(), "projectnb");
        assert_eq!(tree.path_of(tree.root()), "/projectnb");
        assert_eq!(tree.path_of(tree.find(&["econ"]).unwrap()), "/projectnb/econ");
    }

    #[test]
    fn test_graft_disjoint_shards() {
        let mut left = PathTree::default();
        left.insert(&record("/a/b/x", 1, 0)).unwrap();
        let mut right = PathTree::default();
        right.insert(&record("/a/c/y", 2, 0)).unwrap();

        left.graft(right);

        assert!(left.find(&["a", "b", "x"]).is_some());
        assert!(left.find(&["a", "c", "y"]).is_some());
        assert_eq!(left.stats().records_inserted, 2);
        // root, a, b, x, c, y
        assert_eq!(left.len(), 6);
    }

    #[test]
    fn test_graft_conflict_drops_subtree() {
        let mut left = PathTree::default();
        left.insert(&record("/a", 1, 0)).unwrap();
        let mut right = PathTree::default();
        right.insert(&record("/a/b/x", 2, 0)).unwrap();
        right.insert(&record("/a/b/y", 2, 0)).unwrap();

        left.graft(right);

        assert!(left.node(left.find(&["a"]).unwrap()).is_file());
        assert_eq!(left.stats().records_inserted, 1);
        assert_eq!(left.stats().conflicts, 2);
    }
}
