//! Path tree construction, sequential or sharded across the rayon pool.

use std::collections::BTreeMap;
use std::path::Path;

use compact_str::CompactString;
use crossbeam_channel::{Receiver, Sender, bounded};
use globset::GlobSet;
use rayon::prelude::*;
use tracing::{debug, info};

use jungle_core::{AnalysisConfig, AnalysisError, PathRecord, PathTree, RecordError, join_segments};

use crate::parser::ListingParser;
use crate::progress::{IngestProgress, ProgressTracker};
use crate::reader::ListingReader;

/// Lines between progress updates.
const PROGRESS_INTERVAL: u64 = 100_000;

/// Builds [`PathTree`]s from record streams.
pub struct TreeBuilder {
    config: AnalysisConfig,
    filter: RecordFilter,
    progress_tx: Sender<IngestProgress>,
    progress_rx: Receiver<IngestProgress>,
}

impl TreeBuilder {
    /// Create a builder. The config is validated here.
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        let filter = RecordFilter::from_config(&config)?;
        let (progress_tx, progress_rx) = bounded(100);
        Ok(Self {
            config,
            filter,
            progress_tx,
            progress_rx,
        })
    }

    /// Subscribe to ingestion progress updates.
    ///
    /// Updates are dropped rather than queued when nobody keeps up.
    pub fn subscribe(&self) -> Receiver<IngestProgress> {
        self.progress_rx.clone()
    }

    /// Configuration in use.
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Build a tree on the calling thread.
    pub fn build<I>(&self, records: I) -> Result<PathTree, AnalysisError>
    where
        I: IntoIterator<Item = PathRecord>,
    {
        let mut tree = self.new_tree();
        for record in records {
            match self.filter.admit(record) {
                Admission::Keep(record) => {
                    let _ = tree.insert(&record);
                }
                Admission::Filtered => tree.record_filtered(),
                Admission::Skip(path, error) => tree.record_skipped(&path, &error),
            }
        }
        finish(tree)
    }

    /// Build a tree by partitioning records into shards built in parallel.
    pub fn build_sharded<I>(&self, records: I) -> Result<PathTree, AnalysisError>
    where
        I: IntoIterator<Item = PathRecord>,
    {
        let mut tree = self.new_tree();
        let mut shards = ShardSet::new(self.shard_depth());
        let mut tracker = ProgressTracker::new();
        for record in records {
            tracker.record_line();
            self.route(record, &mut tree, &mut shards, &mut tracker);
        }
        self.assemble(tree, shards)
    }

    /// Read a listing file and build its tree.
    ///
    /// Parsing runs on a reader thread feeding a bounded channel; records are
    /// routed to shards as they arrive and the shards are built in parallel
    /// once the listing is exhausted.
    pub fn build_from_listing(&self, path: &Path) -> Result<PathTree, AnalysisError> {
        let parser = ListingParser::new().with_strip_prefix(self.config.strip_prefix.clone());
        let reader = ListingReader::new(parser, self.config.channel_capacity).spawn(path)?;

        let mut tree = self.new_tree();
        let mut shards = ShardSet::new(self.shard_depth());
        let mut tracker = ProgressTracker::new();

        for batch in reader.batches() {
            for line in batch {
                tracker.record_line();
                match line.result {
                    Ok(record) => self.route(record, &mut tree, &mut shards, &mut tracker),
                    Err(error) => {
                        debug!(line = line.line_number, %error, "skipping malformed line");
                        tracker.record_skipped();
                        tree.record_skipped(&format!("line {}", line.line_number), &error);
                    }
                }
                if tracker.lines_read() % PROGRESS_INTERVAL == 0 {
                    let _ = self.progress_tx.try_send(tracker.snapshot());
                }
            }
        }

        let lines = reader.join()?;
        let progress = tracker.snapshot();
        let _ = self.progress_tx.try_send(progress.clone());
        info!(
            path = %path.display(),
            lines,
            accepted = progress.records_accepted,
            skipped = progress.skipped,
            "listing read"
        );

        self.assemble(tree, shards)
    }

    fn new_tree(&self) -> PathTree {
        let root = self.config.root_segments();
        let prefix = if root.is_empty() {
            String::new()
        } else {
            join_segments(&root)
        };
        PathTree::new(prefix, self.config.max_depth)
    }

    /// Shard key length. Nodes at the depth cap must not be split across
    /// shards, so keys stay strictly above it.
    fn shard_depth(&self) -> usize {
        let depth = self.config.shard_depth as usize;
        match self.config.max_depth {
            Some(max) => depth.min((max as usize).saturating_sub(1)),
            None => depth,
        }
    }

    fn route(
        &self,
        record: PathRecord,
        tree: &mut PathTree,
        shards: &mut ShardSet,
        tracker: &mut ProgressTracker,
    ) {
        match self.filter.admit(record) {
            Admission::Keep(record) => {
                tracker.record_accepted(record.size_bytes);
                shards.push(record);
            }
            Admission::Filtered => {
                tracker.record_skipped();
                tree.record_filtered();
            }
            Admission::Skip(path, error) => {
                tracker.record_skipped();
                tree.record_skipped(&path, &error);
            }
        }
    }

    fn assemble(&self, mut tree: PathTree, shards: ShardSet) -> Result<PathTree, AnalysisError> {
        let shards = shards.into_vec();
        debug!(shards = shards.len(), "building shards");

        let built: Vec<PathTree> = self.run_in_pool(|| {
            shards
                .into_par_iter()
                .map(|(key, records)| {
                    let mut shard = self.new_tree();
                    for record in &records {
                        let _ = shard.insert(record);
                    }
                    debug!(
                        shard = %join_segments(&key),
                        records = records.len(),
                        nodes = shard.len(),
                        "shard built"
                    );
                    shard
                })
                .collect()
        })?;

        for shard in built {
            tree.graft(shard);
        }
        finish(tree)
    }

    fn run_in_pool<T, F>(&self, op: F) -> Result<T, AnalysisError>
    where
        T: Send,
        F: FnOnce() -> T + Send,
    {
        match self.config.threads {
            0 => Ok(op()),
            n => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| {
                        AnalysisError::invalid_config(format!("cannot build thread pool: {e}"))
                    })?;
                Ok(pool.install(op))
            }
        }
    }
}

/// Reject trees with nothing in them.
fn finish(tree: PathTree) -> Result<PathTree, AnalysisError> {
    let stats = tree.stats();
    if stats.records_inserted == 0 {
        return Err(AnalysisError::EmptyInput {
            malformed: stats.malformed,
            conflicts: stats.conflicts,
            filtered: stats.filtered + stats.outside_root,
        });
    }
    info!(
        inserted = stats.records_inserted,
        nodes = tree.len(),
        skipped = stats.skipped(),
        duplicates = stats.duplicates,
        "path tree built"
    );
    Ok(tree)
}

/// Records grouped by top-level segment, in arrival order.
///
/// A group is split further on its first `k <= depth` segments only when
/// every record in it is deeper than `k`. Nodes shared between shards are
/// then always directories, so the graft never has to pick between two
/// shapes of one path and the result matches a sequential build.
struct ShardSet {
    depth: usize,
    groups: BTreeMap<Option<CompactString>, ShardGroup>,
}

struct ShardGroup {
    records: Vec<PathRecord>,
    shortest: usize,
}

impl ShardSet {
    fn new(depth: usize) -> Self {
        Self {
            depth,
            groups: BTreeMap::new(),
        }
    }

    fn push(&mut self, record: PathRecord) {
        let group = self
            .groups
            .entry(record.segments.first().cloned())
            .or_insert_with(|| ShardGroup {
                records: Vec::new(),
                shortest: usize::MAX,
            });
        group.shortest = group.shortest.min(record.segments.len());
        group.records.push(record);
    }

    /// Shards in key order, so grafting is deterministic.
    fn into_vec(self) -> Vec<(Vec<CompactString>, Vec<PathRecord>)> {
        let ShardSet { depth, groups } = self;
        let mut shards = Vec::with_capacity(groups.len());

        for (top, group) in groups {
            let split = depth.min(group.shortest.saturating_sub(1));
            if split <= 1 {
                shards.push((top.into_iter().collect(), group.records));
                continue;
            }

            let mut buckets: BTreeMap<Vec<CompactString>, Vec<PathRecord>> = BTreeMap::new();
            for record in group.records {
                let key = record.segments[..split].to_vec();
                buckets.entry(key).or_default().push(record);
            }
            shards.extend(buckets);
        }
        shards
    }
}

/// Owner, path and root filters applied before insertion.
struct RecordFilter {
    root: Vec<CompactString>,
    ignore: GlobSet,
    exclude_owners: Vec<String>,
}

enum Admission {
    Keep(PathRecord),
    Filtered,
    Skip(String, RecordError),
}

impl RecordFilter {
    fn from_config(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        Ok(Self {
            root: config.root_segments(),
            ignore: config.ignore_set()?,
            exclude_owners: config.exclude_owners.clone(),
        })
    }

    fn admit(&self, mut record: PathRecord) -> Admission {
        if self.exclude_owners.iter().any(|o| o == record.owner.as_str()) {
            return Admission::Filtered;
        }
        if !self.ignore.is_empty() && self.ignore.is_match(record.path()) {
            return Admission::Filtered;
        }
        if !self.root.is_empty() && !record.strip_segments(&self.root) {
            let path = record.path();
            return Admission::Skip(path.clone(), RecordError::OutsideRoot { path });
        }
        Admission::Keep(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, size: u64) -> PathRecord {
        PathRecord::from_path("alice", path, size, 1_600_000_000)
    }

    fn builder(config: AnalysisConfig) -> TreeBuilder {
        TreeBuilder::new(config).unwrap()
    }

    #[test]
    fn test_build_sequential() {
        let tree = builder(AnalysisConfig::default())
            .build(vec![record("/a/b/x", 1), record("/a/c/y", 2)])
            .unwrap();
        assert_eq!(tree.stats().records_inserted, 2);
        assert!(tree.find(&["a", "c", "y"]).is_some());
    }

    #[test]
    fn test_empty_input_is_fatal() {
        let err = builder(AnalysisConfig::default())
            .build(Vec::new())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyInput { .. }));
    }

    #[test]
    fn test_all_filtered_is_empty() {
        let config = AnalysisConfig::builder()
            .exclude_owners(vec!["alice".to_string()])
            .build()
            .unwrap();
        let err = builder(config).build(vec![record("/a/x", 1)]).unwrap_err();
        match err {
            AnalysisError::EmptyInput { filtered, .. } => assert_eq!(filtered, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_root_restriction() {
        let config = AnalysisConfig::builder()
            .root(Some("/projectnb".to_string()))
            .build()
            .unwrap();
        let tree = builder(config)
            .build(vec![record("/projectnb/econ/x", 1), record("/scratch/y", 1)])
            .unwrap();

        assert_eq!(tree.prefix(), "/projectnb");
        assert!(tree.find(&["econ", "x"]).is_some());
        assert_eq!(tree.stats().outside_root, 1);
        assert_eq!(tree.path_of(tree.find(&["econ"]).unwrap()), "/projectnb/econ");
    }

    #[test]
    fn test_ignore_patterns() {
        let config = AnalysisConfig::builder()
            .ignore_patterns(vec!["**/.snapshot/**".to_string()])
            .build()
            .unwrap();
        let tree = builder(config)
            .build(vec![record("/a/.snapshot/old/x", 1), record("/a/y", 1)])
            .unwrap();

        assert!(tree.find(&["a", ".snapshot"]).is_none());
        assert_eq!(tree.stats().filtered, 1);
    }

    #[test]
    fn test_sharded_matches_sequential() {
        let records: Vec<PathRecord> = (0..200)
            .map(|i| record(&format!("/p{}/d{}/f{i}", i % 5, i % 11), i as u64))
            .collect();

        for shard_depth in [1u32, 2, 3] {
            let config = AnalysisConfig::builder()
                .shard_depth(shard_depth)
                .threads(2usize)
                .build()
                .unwrap();
            let b = builder(config);
            let sequential = b.build(records.clone()).unwrap();
            let sharded = b.build_sharded(records.clone()).unwrap();

            assert_eq!(sequential.len(), sharded.len());
            assert_eq!(sequential.stats().records_inserted, sharded.stats().records_inserted);
            for i in 0..200 {
                let segments = [format!("p{}", i % 5), format!("d{}", i % 11), format!("f{i}")];
                assert!(sharded.find(&segments).is_some());
            }
        }
    }

    fn shape(tree: &PathTree) -> Vec<(String, bool, u64)> {
        let mut shape: Vec<(String, bool, u64)> = (0..tree.len())
            .map(|i| {
                let id = jungle_core::NodeId::new(i);
                let node = tree.node(id);
                (tree.path_of(id), node.is_file(), node.own_size())
            })
            .collect();
        shape.sort();
        shape
    }

    #[test]
    fn test_sharded_conflicts_follow_input_order() {
        let inputs = [
            vec![record("/a/x", 1), record("/a", 2)],
            vec![record("/a", 2), record("/a/x", 1)],
            vec![record("/a/b/x", 1), record("/a/b", 2), record("/a/c/y", 3)],
            vec![record("/a/b", 2), record("/a/b/x", 1), record("/a/c/y", 3)],
        ];

        for shard_depth in [1u32, 2, 3] {
            let config = AnalysisConfig::builder()
                .shard_depth(shard_depth)
                .build()
                .unwrap();
            let b = builder(config);
            for records in &inputs {
                let sequential = b.build(records.clone()).unwrap();
                let sharded = b.build_sharded(records.clone()).unwrap();

                assert_eq!(shape(&sequential), shape(&sharded), "{records:?}");
                assert_eq!(sequential.stats(), sharded.stats(), "{records:?}");
            }
        }
    }

    #[test]
    fn test_sharded_keeps_first_shape() {
        let b = builder(AnalysisConfig::default());
        let tree = b.build_sharded(vec![record("/a/x", 1), record("/a", 2)]).unwrap();

        assert!(tree.node(tree.find(&["a"]).unwrap()).kind.is_dir());
        assert!(tree.find(&["a", "x"]).is_some());
        assert_eq!(tree.stats().conflicts, 1);
    }

    #[test]
    fn test_deep_groups_split_on_shard_depth() {
        let mut shards = ShardSet::new(2);
        for path in ["/p/b/x", "/p/a/y", "/q/z", "/p/a/w"] {
            shards.push(record(path, 1));
        }
        let keys: Vec<Vec<CompactString>> = shards.into_vec().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                vec![CompactString::from("p"), CompactString::from("a")],
                vec![CompactString::from("p"), CompactString::from("b")],
                vec![CompactString::from("q")],
            ]
        );
    }

    #[test]
    fn test_shard_depth_respects_depth_cap() {
        let config = AnalysisConfig::builder()
            .min_depth(1u32)
            .max_depth(Some(1u32))
            .shard_depth(3u32)
            .build()
            .unwrap();
        let tree = builder(config)
            .build_sharded(vec![record("/a/b/c/x", 1), record("/a/z/y", 2)])
            .unwrap();

        let a = tree.node(tree.find(&["a"]).unwrap());
        assert!(a.kind.is_rollup());
        assert_eq!(a.own_size(), 3);
        assert_eq!(tree.stats().conflicts, 0);
    }
}
