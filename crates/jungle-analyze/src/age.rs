//! Age distribution of the files in a path tree.
//!
//! Files are grouped into buckets by the years elapsed since their last
//! access. The default buckets split at 2.5, 5, 7.5 and 10 years.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use jungle_core::{BYTES_PER_GB, FileStat, NodeId, NodeKind, PathTree, SECONDS_PER_YEAR, unix_now};

/// An age bucket for categorizing files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeBucket {
    /// Human-readable name for this bucket.
    pub name: String,
    /// Files strictly younger than this many years fall in this bucket.
    pub max_years: f64,
}

impl AgeBucket {
    pub fn new(name: impl Into<String>, max_years: f64) -> Self {
        Self {
            name: name.into(),
            max_years,
        }
    }
}

/// Configuration for age analysis.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct AgeConfig {
    /// Reference time for ages, Unix epoch seconds (default: now).
    #[builder(default = "unix_now()")]
    pub reference_time: i64,

    /// Buckets in ascending order of `max_years`.
    #[builder(default = "Self::default_buckets()")]
    pub buckets: Vec<AgeBucket>,

    /// Number of largest files to keep per bucket.
    #[builder(default = "10")]
    pub top_files_per_bucket: usize,
}

impl AgeConfigBuilder {
    fn default_buckets() -> Vec<AgeBucket> {
        vec![
            AgeBucket::new("0-2.5 years", 2.5),
            AgeBucket::new("2.5-5 years", 5.0),
            AgeBucket::new("5-7.5 years", 7.5),
            AgeBucket::new("7.5-10 years", 10.0),
            AgeBucket::new("10+ years", f64::INFINITY),
        ]
    }
}

impl Default for AgeConfig {
    fn default() -> Self {
        Self {
            reference_time: unix_now(),
            buckets: AgeConfigBuilder::default_buckets(),
            top_files_per_bucket: 10,
        }
    }
}

impl AgeConfig {
    pub fn builder() -> AgeConfigBuilder {
        AgeConfigBuilder::default()
    }
}

/// A file kept as one of the largest in its bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgedFile {
    pub path: String,
    pub size: u64,
    pub last_access: i64,
}

/// One file tagged with its age bucket, as written to the per-file export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgedFileRow {
    pub path: String,
    pub size_bytes: u64,
    pub size_gb: f64,
    pub last_access: i64,
    pub age_years: f64,
    pub age_bucket: String,
}

/// Statistics for an age bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgeBucketStats {
    pub name: String,
    pub max_years: f64,
    pub file_count: u64,
    pub total_size: u64,
    /// Largest files, biggest first.
    pub largest_files: Vec<AgedFile>,
}

/// Results from age analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgeReport {
    pub buckets: Vec<AgeBucketStats>,
    pub total_files: u64,
    pub total_size: u64,
    /// Mean age in years, 0 for an empty tree.
    pub average_age_years: f64,
    /// Name of the bucket holding the median file.
    pub median_age_bucket: String,
}

impl AgeReport {
    /// Get the bucket containing most files.
    pub fn largest_bucket(&self) -> Option<&AgeBucketStats> {
        self.buckets.iter().max_by_key(|b| b.file_count)
    }

    /// Get the bucket containing most bytes.
    pub fn largest_bucket_by_size(&self) -> Option<&AgeBucketStats> {
        self.buckets.iter().max_by_key(|b| b.total_size)
    }
}

/// Age-based file analyzer.
pub struct AgeAnalyzer {
    config: AgeConfig,
}

impl AgeAnalyzer {
    pub fn new() -> Self {
        Self {
            config: AgeConfig::default(),
        }
    }

    pub fn with_config(config: AgeConfig) -> Self {
        Self { config }
    }

    /// Age of a timestamp in years. Future timestamps are age 0.
    pub fn age_years(&self, accessed: i64) -> f64 {
        let secs = self.config.reference_time.saturating_sub(accessed).max(0);
        secs as f64 / SECONDS_PER_YEAR as f64
    }

    /// Index of the bucket an age falls in. The last bucket catches anything
    /// past the final boundary.
    fn slot(&self, age: f64) -> usize {
        self.config
            .buckets
            .iter()
            .position(|b| age < b.max_years)
            .unwrap_or(self.config.buckets.len().saturating_sub(1))
    }

    /// Bucket for a last access time, `None` only with no buckets configured.
    pub fn bucket_for(&self, accessed: i64) -> Option<&AgeBucket> {
        self.config.buckets.get(self.slot(self.age_years(accessed)))
    }

    /// Every file in the tree with its age and bucket, ordered by path.
    pub fn file_rows(&self, tree: &PathTree) -> Vec<AgedFileRow> {
        let mut rows: Vec<AgedFileRow> = tree_files(tree)
            .into_iter()
            .map(|(path, stat)| {
                let age_years = self.age_years(stat.accessed);
                AgedFileRow {
                    path,
                    size_bytes: stat.size,
                    size_gb: stat.size as f64 / BYTES_PER_GB,
                    last_access: stat.accessed,
                    age_years,
                    age_bucket: self
                        .config
                        .buckets
                        .get(self.slot(age_years))
                        .map(|b| b.name.clone())
                        .unwrap_or_default(),
                }
            })
            .collect();
        rows.sort_by(|a, b| a.path.cmp(&b.path));
        rows
    }

    /// Bucket every file in the tree.
    pub fn analyze(&self, tree: &PathTree) -> AgeReport {
        let mut collectors: Vec<BucketCollector> = self
            .config
            .buckets
            .iter()
            .map(|b| BucketCollector::new(b.clone(), self.config.top_files_per_bucket))
            .collect();

        let mut total_files: u64 = 0;
        let mut total_size: u64 = 0;
        let mut total_age_years = 0.0;

        for (path, stat) in tree_files(tree) {
            let age = self.age_years(stat.accessed);
            total_files += 1;
            total_size = total_size.saturating_add(stat.size);
            total_age_years += age;

            if let Some(collector) = collectors.get_mut(self.slot(age)) {
                collector.add_file(path, stat);
            }
        }

        let average_age_years = if total_files > 0 {
            total_age_years / total_files as f64
        } else {
            0.0
        };

        let half_files = total_files / 2;
        let mut cumulative = 0u64;
        let mut median_age_bucket = self
            .config
            .buckets
            .first()
            .map(|b| b.name.clone())
            .unwrap_or_default();
        for collector in &collectors {
            cumulative += collector.file_count;
            if cumulative > half_files {
                median_age_bucket = collector.bucket.name.clone();
                break;
            }
        }

        let buckets = collectors
            .into_iter()
            .map(|c| AgeBucketStats {
                name: c.bucket.name,
                max_years: c.bucket.max_years,
                file_count: c.file_count,
                total_size: c.total_size,
                largest_files: c.largest_files,
            })
            .collect();

        AgeReport {
            buckets,
            total_files,
            total_size,
            average_age_years,
            median_age_bucket,
        }
    }
}

impl Default for AgeAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Absolute path and stat of every file, rollup entries included.
fn tree_files(tree: &PathTree) -> Vec<(String, FileStat)> {
    let mut files = Vec::new();
    for (index, node) in tree.nodes().iter().enumerate() {
        match &node.kind {
            NodeKind::Directory => {}
            NodeKind::File(stat) => files.push((tree.path_of(NodeId::new(index)), *stat)),
            NodeKind::Rollup { entries } => {
                let base = tree.path_of(NodeId::new(index));
                files.extend(entries.iter().map(|(rest, stat)| (format!("{base}/{rest}"), *stat)));
            }
        }
    }
    files
}

struct BucketCollector {
    bucket: AgeBucket,
    file_count: u64,
    total_size: u64,
    largest_files: Vec<AgedFile>,
    max_files: usize,
}

impl BucketCollector {
    fn new(bucket: AgeBucket, max_files: usize) -> Self {
        Self {
            bucket,
            file_count: 0,
            total_size: 0,
            largest_files: Vec::with_capacity(max_files),
            max_files,
        }
    }

    fn add_file(&mut self, path: String, stat: FileStat) {
        self.file_count += 1;
        self.total_size = self.total_size.saturating_add(stat.size);

        if self.max_files == 0 {
            return;
        }
        let full = self.largest_files.len() >= self.max_files;
        if full && self.largest_files.last().is_some_and(|f| f.size >= stat.size) {
            return;
        }
        if full {
            self.largest_files.pop();
        }
        self.largest_files.push(AgedFile {
            path,
            size: stat.size,
            last_access: stat.accessed,
        });
        self.largest_files.sort_by(|a, b| b.size.cmp(&a.size));
    }
}

/// Format an age in years as a human-readable string.
pub fn format_age(years: f64) -> String {
    let days = years * 365.0;
    if days < 1.0 {
        "today".to_string()
    } else if days < 31.0 {
        format!("{} days", days as u64)
    } else if years < 1.0 {
        format!("{} months", (days / 30.0) as u64)
    } else {
        format!("{years:.1} years")
    }
}
