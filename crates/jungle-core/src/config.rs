//! Analysis configuration types.

use chrono::Utc;
use compact_str::CompactString;
use derive_builder::Builder;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::record::split_path;

/// Bytes per reported gigabyte.
pub const BYTES_PER_GB: f64 = 1e9;

/// Seconds per reported year (365 days).
pub const SECONDS_PER_YEAR: i64 = 365 * 24 * 60 * 60;

/// Current time as Unix epoch seconds.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Staleness cutoff, absolute or relative to the run time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeCutoff {
    /// Absolute Unix timestamp.
    Timestamp(i64),
    /// This many years before the reference time.
    YearsBefore(f64),
}

impl AgeCutoff {
    /// Resolve to an absolute timestamp. Negative or non-finite durations
    /// are treated as zero.
    pub fn resolve(&self, reference_time: i64) -> i64 {
        match *self {
            AgeCutoff::Timestamp(ts) => ts,
            AgeCutoff::YearsBefore(years) => {
                let years = if years.is_finite() { years.max(0.0) } else { 0.0 };
                let secs = (years * SECONDS_PER_YEAR as f64).round() as i64;
                reference_time.saturating_sub(secs)
            }
        }
    }
}

/// Configuration for an analysis run.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct AnalysisConfig {
    /// Size threshold in gigabytes; a subtree strictly larger is significant.
    #[builder(default = "2.0")]
    #[serde(default = "default_gb_threshold")]
    pub gb_threshold: f64,

    /// Staleness cutoff; a subtree accessed strictly before it is significant.
    /// `None` makes every subtree holding a file significant.
    #[builder(default = "Some(AgeCutoff::YearsBefore(5.0))")]
    #[serde(default = "default_age_cutoff")]
    pub age_cutoff: Option<AgeCutoff>,

    /// Shallowest depth at which nodes may be reported.
    #[builder(default = "2")]
    #[serde(default = "default_min_depth")]
    pub min_depth: u32,

    /// Depth at which deeper paths are folded together (None = unlimited).
    #[builder(default)]
    #[serde(default)]
    pub max_depth: Option<u32>,

    /// Absolute path the analysis is restricted to (None = `/`).
    #[builder(default)]
    #[serde(default)]
    pub root: Option<String>,

    /// Prefix stripped from every listed path before analysis.
    #[builder(default)]
    #[serde(default)]
    pub strip_prefix: Option<String>,

    /// Paths to skip (glob syntax, matched against the full path).
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Owners whose files are skipped.
    #[builder(default)]
    #[serde(default)]
    pub exclude_owners: Vec<String>,

    /// Directory segments used to partition records for parallel building.
    #[builder(default = "1")]
    #[serde(default = "default_shard_depth")]
    pub shard_depth: u32,

    /// Number of worker threads (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,

    /// Record batches buffered between the reader and the builder.
    #[builder(default = "64")]
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_gb_threshold() -> f64 {
    2.0
}

fn default_age_cutoff() -> Option<AgeCutoff> {
    Some(AgeCutoff::YearsBefore(5.0))
}

fn default_min_depth() -> u32 {
    2
}

fn default_shard_depth() -> u32 {
    1
}

fn default_channel_capacity() -> usize {
    64
}

impl AnalysisConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        check(
            self.gb_threshold.unwrap_or_else(default_gb_threshold),
            self.min_depth.unwrap_or_else(default_min_depth),
            self.max_depth.flatten(),
            self.shard_depth.unwrap_or_else(default_shard_depth),
        )
    }
}

fn check(gb_threshold: f64, min_depth: u32, max_depth: Option<u32>, shard_depth: u32) -> Result<(), String> {
    if !gb_threshold.is_finite() || gb_threshold < 0.0 {
        return Err(format!("gb_threshold must be a non-negative number, got {gb_threshold}"));
    }
    if min_depth == 0 {
        return Err("min_depth must be at least 1".to_string());
    }
    if let Some(max_depth) = max_depth {
        if min_depth > max_depth {
            return Err(format!(
                "min_depth ({min_depth}) cannot exceed max_depth ({max_depth})"
            ));
        }
    }
    if shard_depth == 0 {
        return Err("shard_depth must be at least 1".to_string());
    }
    Ok(())
}

impl AnalysisConfig {
    /// Create a new config builder.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::default()
    }

    /// Validate a config that did not come through the builder.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        check(self.gb_threshold, self.min_depth, self.max_depth, self.shard_depth)
            .map_err(AnalysisError::invalid_config)?;
        self.ignore_set()?;
        Ok(())
    }

    /// Load and validate a config from JSON text.
    pub fn from_json(text: &str) -> Result<Self, AnalysisError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| AnalysisError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Size threshold in bytes.
    pub fn size_threshold_bytes(&self) -> u64 {
        (self.gb_threshold.max(0.0) * BYTES_PER_GB) as u64
    }

    /// Absolute staleness cutoff for a run at `reference_time`.
    pub fn cutoff_timestamp(&self, reference_time: i64) -> Option<i64> {
        self.age_cutoff.map(|cutoff| cutoff.resolve(reference_time))
    }

    /// Root segments records must start with.
    pub fn root_segments(&self) -> Vec<CompactString> {
        self.root.as_deref().map(split_path).unwrap_or_default()
    }

    /// Compile the ignore patterns.
    pub fn ignore_set(&self) -> Result<GlobSet, AnalysisError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.ignore_patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                AnalysisError::invalid_config(format!("bad ignore pattern {pattern:?}: {e}"))
            })?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| AnalysisError::invalid_config(e.to_string()))
    }

    /// Check if an owner is excluded.
    pub fn excludes_owner(&self, owner: &str) -> bool {
        self.exclude_owners.iter().any(|o| o == owner)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            gb_threshold: default_gb_threshold(),
            age_cutoff: default_age_cutoff(),
            min_depth: default_min_depth(),
            max_depth: None,
            root: None,
            strip_prefix: None,
            ignore_patterns: Vec::new(),
            exclude_owners: Vec::new(),
            shard_depth: default_shard_depth(),
            threads: 0,
            channel_capacity: default_channel_capacity(),
        }
    }
}
