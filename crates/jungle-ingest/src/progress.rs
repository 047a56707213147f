//! Ingestion progress reporting.

use std::time::{Duration, Instant};

/// Progress information during ingestion.
#[derive(Debug, Clone)]
pub struct IngestProgress {
    /// Listing lines read so far.
    pub lines_read: u64,
    /// Records admitted to a shard so far.
    pub records_accepted: u64,
    /// Total bytes of admitted records.
    pub bytes_accepted: u64,
    /// Lines or records skipped so far.
    pub skipped: u64,
    /// Time elapsed since ingestion started.
    pub elapsed: Duration,
}

impl IngestProgress {
    /// Create initial progress state.
    pub fn new() -> Self {
        Self {
            lines_read: 0,
            records_accepted: 0,
            bytes_accepted: 0,
            skipped: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Calculate ingestion rate in lines per second.
    pub fn lines_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.lines_read as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

impl Default for IngestProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Internal progress tracker with timing.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    current: IngestProgress,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            current: IngestProgress::new(),
        }
    }

    pub fn record_line(&mut self) {
        self.current.lines_read += 1;
    }

    pub fn record_accepted(&mut self, size: u64) {
        self.current.records_accepted += 1;
        self.current.bytes_accepted += size;
    }

    pub fn record_skipped(&mut self) {
        self.current.skipped += 1;
    }

    pub fn lines_read(&self) -> u64 {
        self.current.lines_read
    }

    pub fn snapshot(&self) -> IngestProgress {
        IngestProgress {
            elapsed: self.start_time.elapsed(),
            ..self.current.clone()
        }
    }
}
