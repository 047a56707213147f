//! Per-owner storage summaries.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use compact_str::CompactString;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use jungle_core::{BYTES_PER_GB, PathRecord};

/// A single file attributed to its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerFile {
    pub owner: String,
    pub path: String,
    pub size_bytes: u64,
    pub size_gb: f64,
    pub last_access: i64,
}

/// Totals for one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerSummary {
    pub owner: String,
    pub file_count: u64,
    pub total_size: u64,
    pub total_gb: f64,
    pub oldest_access: Option<i64>,
}

/// Results of an owner analysis, ordered by total size descending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OwnerReport {
    pub summaries: Vec<OwnerSummary>,
    /// Largest files of each owner, grouped in `summaries` order and
    /// biggest first within a group.
    pub top_files: Vec<OwnerFile>,
    /// Records replaced by a later record for the same path.
    pub duplicates: u64,
}

impl OwnerReport {
    /// The single biggest file of every owner.
    pub fn biggest_files(&self) -> Vec<&OwnerFile> {
        self.top_files
            .iter()
            .chunk_by(|f| f.owner.as_str())
            .into_iter()
            .filter_map(|(_, mut group)| group.next())
            .collect()
    }

    /// Summary for one owner.
    pub fn owner(&self, name: &str) -> Option<&OwnerSummary> {
        self.summaries.iter().find(|s| s.owner == name)
    }
}

/// Groups records by owner.
#[derive(Debug, Clone)]
pub struct OwnerAnalyzer {
    top_n: usize,
    exclude: Vec<String>,
}

impl OwnerAnalyzer {
    pub fn new(top_n: usize) -> Self {
        Self {
            top_n,
            exclude: Vec::new(),
        }
    }

    /// Skip these owners entirely.
    pub fn with_excluded(mut self, owners: Vec<String>) -> Self {
        self.exclude = owners;
        self
    }

    /// Summarize records per owner. A path listed more than once counts
    /// once, with the last record winning.
    pub fn analyze<I>(&self, records: I) -> OwnerReport
    where
        I: IntoIterator<Item = PathRecord>,
    {
        let mut latest: Vec<PathRecord> = Vec::new();
        let mut by_path: HashMap<Vec<CompactString>, usize> = HashMap::new();
        let mut duplicates = 0u64;

        for record in records {
            if self.exclude.iter().any(|o| o == record.owner.as_str()) {
                continue;
            }
            match by_path.entry(record.segments.clone()) {
                Entry::Occupied(slot) => {
                    let previous = &mut latest[*slot.get()];
                    tracing::warn!(
                        path = %record.path(),
                        previous_size = previous.size_bytes,
                        size = record.size_bytes,
                        "duplicate path, keeping last record"
                    );
                    duplicates += 1;
                    *previous = record;
                }
                Entry::Vacant(slot) => {
                    slot.insert(latest.len());
                    latest.push(record);
                }
            }
        }

        let mut collectors: HashMap<CompactString, OwnerCollector> = HashMap::new();
        for record in latest {
            collectors
                .entry(record.owner.clone())
                .or_insert_with(|| OwnerCollector::new(self.top_n))
                .add(record);
        }

        let mut report = OwnerReport {
            duplicates,
            ..OwnerReport::default()
        };
        let ordered = collectors
            .into_iter()
            .sorted_by(|(a_name, a), (b_name, b)| {
                b.total_size.cmp(&a.total_size).then_with(|| a_name.cmp(b_name))
            });

        for (owner, collector) in ordered {
            report.summaries.push(OwnerSummary {
                owner: owner.to_string(),
                file_count: collector.file_count,
                total_size: collector.total_size,
                total_gb: collector.total_size as f64 / BYTES_PER_GB,
                oldest_access: collector.oldest_access,
            });
            report
                .top_files
                .extend(collector.largest.into_iter().map(|record| OwnerFile {
                    owner: owner.to_string(),
                    path: record.path(),
                    size_bytes: record.size_bytes,
                    size_gb: record.size_bytes as f64 / BYTES_PER_GB,
                    last_access: record.last_access,
                }));
        }

        tracing::debug!(
            owners = report.summaries.len(),
            duplicates = report.duplicates,
            "owner analysis complete"
        );
        report
    }
}

struct OwnerCollector {
    file_count: u64,
    total_size: u64,
    oldest_access: Option<i64>,
    largest: Vec<PathRecord>,
    max_files: usize,
}

impl OwnerCollector {
    fn new(max_files: usize) -> Self {
        Self {
            file_count: 0,
            total_size: 0,
            oldest_access: None,
            largest: Vec::with_capacity(max_files.min(64)),
            max_files,
        }
    }

    fn add(&mut self, record: PathRecord) {
        self.file_count += 1;
        self.total_size = self.total_size.saturating_add(record.size_bytes);
        self.oldest_access = Some(match self.oldest_access {
            Some(oldest) => oldest.min(record.last_access),
            None => record.last_access,
        });

        if self.max_files == 0 {
            return;
        }
        let full = self.largest.len() >= self.max_files;
        if full && self.largest.last().is_some_and(|r| r.size_bytes >= record.size_bytes) {
            return;
        }
        if full {
            self.largest.pop();
        }
        self.largest.push(record);
        self.largest.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<PathRecord> {
        vec![
            PathRecord::from_path("alice", "/p/a1", 100, 50),
            PathRecord::from_path("alice", "/p/a2", 300, 10),
            PathRecord::from_path("alice", "/p/a3", 200, 90),
            PathRecord::from_path("bob", "/p/b1", 50, 5),
            PathRecord::from_path("root", "/p/r1", 10_000, 1),
        ]
    }

    #[test]
    fn test_summaries_ordered_by_size() {
        let report = OwnerAnalyzer::new(2).analyze(records());
        let names: Vec<&str> = report.summaries.iter().map(|s| s.owner.as_str()).collect();
        assert_eq!(names, vec!["root", "alice", "bob"]);

        let alice = report.owner("alice").unwrap();
        assert_eq!(alice.file_count, 3);
        assert_eq!(alice.total_size, 600);
        assert_eq!(alice.oldest_access, Some(10));
    }

    #[test]
    fn test_top_files_capped_per_owner() {
        let report = OwnerAnalyzer::new(2)
            .with_excluded(vec!["root".to_string()])
            .analyze(records());

        let alice: Vec<u64> = report
            .top_files
            .iter()
            .filter(|f| f.owner == "alice")
            .map(|f| f.size_bytes)
            .collect();
        assert_eq!(alice, vec![300, 200]);
        assert!(report.owner("root").is_none());
    }

    #[test]
    fn test_biggest_files() {
        let report = OwnerAnalyzer::new(3).analyze(records());
        let biggest: Vec<&str> = report.biggest_files().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(biggest, vec!["/p/r1", "/p/a2", "/p/b1"]);
    }

    #[test]
    fn test_duplicate_path_counted_once() {
        let mut input = records();
        input.push(PathRecord::from_path("alice", "/p/a1", 700, 80));
        let report = OwnerAnalyzer::new(5).analyze(input);

        let alice = report.owner("alice").unwrap();
        assert_eq!(alice.file_count, 3);
        assert_eq!(alice.total_size, 1200);
        assert_eq!(report.duplicates, 1);

        let a1: Vec<u64> = report
            .top_files
            .iter()
            .filter(|f| f.path == "/p/a1")
            .map(|f| f.size_bytes)
            .collect();
        assert_eq!(a1, vec![700]);
    }

    #[test]
    fn test_duplicate_path_moves_to_last_owner() {
        let mut input = records();
        input.push(PathRecord::from_path("bob", "/p/a2", 300, 10));
        let report = OwnerAnalyzer::new(5).analyze(input);

        assert_eq!(report.owner("alice").unwrap().total_size, 300);
        assert_eq!(report.owner("bob").unwrap().file_count, 2);
        assert_eq!(report.owner("bob").unwrap().total_size, 350);
        let total: u64 = report.summaries.iter().map(|s| s.total_size).sum();
        assert_eq!(total, 10_650);
    }
}
