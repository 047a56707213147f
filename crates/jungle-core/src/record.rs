//! Inventory records.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// One inventory entry: a file with its size and last access time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRecord {
    /// Owning user. Not used by the tree, carried for owner reports.
    pub owner: CompactString,
    /// Root-relative path components.
    pub segments: Vec<CompactString>,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Last access time, Unix epoch seconds.
    pub last_access: i64,
}

impl PathRecord {
    /// Create a record from already split segments.
    pub fn new(
        owner: impl Into<CompactString>,
        segments: Vec<CompactString>,
        size_bytes: u64,
        last_access: i64,
    ) -> Self {
        Self {
            owner: owner.into(),
            segments,
            size_bytes,
            last_access,
        }
    }

    /// Create a record from a `/`-separated path. Empty components are dropped.
    pub fn from_path(
        owner: impl Into<CompactString>,
        path: &str,
        size_bytes: u64,
        last_access: i64,
    ) -> Self {
        Self::new(owner, split_path(path), size_bytes, last_access)
    }

    /// Path depth in segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Rebuild the absolute path string.
    pub fn path(&self) -> String {
        join_segments(&self.segments)
    }

    /// Strip a leading run of segments. Returns `false` if the record is not
    /// under `prefix`, leaving it untouched.
    pub fn strip_segments(&mut self, prefix: &[CompactString]) -> bool {
        if !self.segments.starts_with(prefix) {
            return false;
        }
        self.segments.drain(..prefix.len());
        true
    }
}

/// A parsed record flattened for the records export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRow {
    pub owner: String,
    pub size_in_bytes: u64,
    /// Size in KiB, rounded up.
    pub size_in_kb: u64,
    /// Last access time, Unix epoch seconds.
    pub access_time: i64,
    pub full_pathname: String,
    /// Number of path segments.
    pub levels: usize,
}

impl From<&PathRecord> for RecordRow {
    fn from(record: &PathRecord) -> Self {
        Self {
            owner: record.owner.to_string(),
            size_in_bytes: record.size_bytes,
            size_in_kb: record.size_bytes.div_ceil(1024),
            access_time: record.last_access,
            full_pathname: record.path(),
            levels: record.depth(),
        }
    }
}

/// Split a `/`-separated path into non-empty components.
pub fn split_path(path: &str) -> Vec<CompactString> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(CompactString::from)
        .collect()
}

/// Join components back into an absolute path.
pub fn join_segments<S: AsRef<str>>(segments: &[S]) -> String {
    let mut path = String::with_capacity(segments.iter().map(|s| s.as_ref().len() + 1).sum());
    for segment in segments {
        path.push('/');
        path.push_str(segment.as_ref());
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}
