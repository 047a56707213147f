use std::fs;
use std::io::Write;

use jungle_ingest::{
    AnalysisConfig, AnalysisError, ListingParser, ListingReader, TreeBuilder, WarningKind,
};
use tempfile::TempDir;

fn line(owner: &str, size: u64, atime: i64, path: &str) -> String {
    format!("1 0 0 -rw-r--r-- {owner} grp {size} 4 {atime} {atime} -- {path}\n")
}

fn write_listing(dir: &TempDir, lines: &[String]) -> std::path::PathBuf {
    let path = dir.path().join("inventory.list");
    let mut file = fs::File::create(&path).unwrap();
    for line in lines {
        file.write_all(line.as_bytes()).unwrap();
    }
    path
}

#[test]
fn test_build_from_listing() {
    let dir = TempDir::new().unwrap();
    let listing = write_listing(
        &dir,
        &[
            line("alice", 100, 1_600_000_000, "/gpfs4/proj/a/x.dat"),
            line("bob", 200, 1_500_000_000, "/gpfs4/proj/a/y.dat"),
            "\n".to_string(),
            "this line is not a record\n".to_string(),
            line("carol", 300, 1_400_000_000, "/gpfs4/proj/b/z.dat"),
        ],
    );

    let config = AnalysisConfig::builder()
        .strip_prefix(Some("/gpfs4".to_string()))
        .build()
        .unwrap();
    let tree = TreeBuilder::new(config).unwrap().build_from_listing(&listing).unwrap();

    let stats = tree.stats();
    assert_eq!(stats.records_inserted, 3);
    assert_eq!(stats.malformed, 1);
    assert!(tree.find(&["proj", "a", "x.dat"]).is_some());
    assert!(tree.find(&["gpfs4"]).is_none());
    assert_eq!(tree.warnings()[0].kind, WarningKind::MalformedRecord);
}

#[test]
fn test_listing_with_root_restriction() {
    let dir = TempDir::new().unwrap();
    let listing = write_listing(
        &dir,
        &[
            line("alice", 1, 0, "/proj/econ/a/x"),
            line("alice", 1, 0, "/proj/bio/b/y"),
        ],
    );

    let config = AnalysisConfig::builder()
        .root(Some("/proj/econ".to_string()))
        .build()
        .unwrap();
    let tree = TreeBuilder::new(config).unwrap().build_from_listing(&listing).unwrap();

    assert_eq!(tree.stats().records_inserted, 1);
    assert_eq!(tree.stats().outside_root, 1);
    assert_eq!(tree.path_of(tree.find(&["a", "x"]).unwrap()), "/proj/econ/a/x");
}

#[test]
fn test_missing_listing_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = TreeBuilder::new(AnalysisConfig::default())
        .unwrap()
        .build_from_listing(&dir.path().join("absent.list"))
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Io { .. }));
}

#[test]
fn test_only_malformed_lines_is_empty_input() {
    let dir = TempDir::new().unwrap();
    let listing = write_listing(&dir, &["garbage\n".to_string(), "more garbage\n".to_string()]);

    let err = TreeBuilder::new(AnalysisConfig::default())
        .unwrap()
        .build_from_listing(&listing)
        .unwrap_err();
    match err {
        AnalysisError::EmptyInput { malformed, .. } => assert_eq!(malformed, 2),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_progress_is_reported() {
    let dir = TempDir::new().unwrap();
    let listing = write_listing(&dir, &[line("alice", 5, 0, "/a/b/c")]);

    let builder = TreeBuilder::new(AnalysisConfig::default()).unwrap();
    let progress = builder.subscribe();
    builder.build_from_listing(&listing).unwrap();

    let last = progress.try_iter().last().unwrap();
    assert_eq!(last.lines_read, 1);
    assert_eq!(last.records_accepted, 1);
    assert_eq!(last.bytes_accepted, 5);
}

#[test]
fn test_conflicting_listing_keeps_first_shape() {
    let dir = TempDir::new().unwrap();
    let listing = write_listing(
        &dir,
        &[
            line("alice", 1, 0, "/a/b"),
            line("alice", 1, 0, "/a/b/c"),
            line("alice", 2, 0, "/a/d/e"),
        ],
    );

    let tree = TreeBuilder::new(AnalysisConfig::default())
        .unwrap()
        .build_from_listing(&listing)
        .unwrap();
    assert_eq!(tree.stats().conflicts, 1);
    assert!(tree.node(tree.find(&["a", "b"]).unwrap()).is_file());
}

#[test]
fn test_reader_batches_large_listing() {
    let text: String = (0..10_000)
        .map(|i| line("u", 1, 0, &format!("/d{}/f{i}", i % 10)))
        .collect();
    let reader = ListingReader::new(ListingParser::new(), 2)
        .spawn_reader(std::io::Cursor::new(text.into_bytes()), "memory")
        .unwrap();

    let mut batches = 0;
    let mut records = 0;
    for batch in reader.batches() {
        batches += 1;
        records += batch.len();
    }
    assert_eq!(reader.join().unwrap(), 10_000);
    assert_eq!(records, 10_000);
    assert_eq!(batches, 3);
}

fn duplicate_listing() -> Vec<String> {
    vec![
        line("alice", 100, 1_000, "/p/a/x.dat"),
        line("bob", 5, 1_000, "/q/y.dat"),
        line("alice", 1, 1_000, "/p/b/z.dat"),
        line("carol", 300, 2_000, "/p/a/x.dat"),
    ]
}

#[test]
fn test_duplicate_in_listing_last_record_wins() {
    let dir = TempDir::new().unwrap();
    let listing = write_listing(&dir, &duplicate_listing());

    for shard_depth in [1u32, 2, 3] {
        let config = AnalysisConfig::builder().shard_depth(shard_depth).build().unwrap();
        let tree = TreeBuilder::new(config).unwrap().build_from_listing(&listing).unwrap();

        assert_eq!(tree.stats().duplicates, 1, "shard depth {shard_depth}");
        let duplicate = tree
            .warnings()
            .iter()
            .find(|w| w.kind == WarningKind::DuplicatePath)
            .expect("duplicate warning kept through the graft");
        assert_eq!(duplicate.path, "/p/a/x.dat");

        let node = tree.node(tree.find(&["p", "a", "x.dat"]).unwrap());
        assert_eq!(node.own_size(), 300);
        assert_eq!(tree.len(), 8);
    }
}

#[test]
fn test_duplicate_sharded_matches_sequential() {
    let parser = ListingParser::new();
    let records: Vec<_> = duplicate_listing()
        .iter()
        .filter_map(|l| parser.parse_line(l).unwrap())
        .collect();

    for shard_depth in [1u32, 2, 3] {
        let config = AnalysisConfig::builder().shard_depth(shard_depth).build().unwrap();
        let builder = TreeBuilder::new(config).unwrap();
        let sequential = builder.build(records.clone()).unwrap();
        let sharded = builder.build_sharded(records.clone()).unwrap();

        assert_eq!(sequential.stats(), sharded.stats(), "shard depth {shard_depth}");
        let kinds: Vec<WarningKind> = sharded.warnings().iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WarningKind::DuplicatePath]);
        let id = sharded.find(&["p", "a", "x.dat"]).unwrap();
        assert_eq!(sharded.node(id).own_size(), 300);
    }
}

#[test]
fn test_file_then_directory_listing_matches_sequential() {
    let dir = TempDir::new().unwrap();
    let listing = write_listing(
        &dir,
        &[line("alice", 1, 0, "/a/x"), line("alice", 2, 0, "/a"), line("alice", 3, 0, "/b/c/d")],
    );

    for shard_depth in [1u32, 2, 3] {
        let config = AnalysisConfig::builder().shard_depth(shard_depth).build().unwrap();
        let tree = TreeBuilder::new(config).unwrap().build_from_listing(&listing).unwrap();

        assert!(!tree.node(tree.find(&["a"]).unwrap()).is_file());
        assert_eq!(tree.node(tree.find(&["a", "x"]).unwrap()).own_size(), 1);
        assert_eq!(tree.stats().conflicts, 1);
    }
}
