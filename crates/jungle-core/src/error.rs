//! Error and warning types for ingestion and analysis.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal errors that abort a run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Configuration rejected before any processing.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// No record survived ingestion.
    #[error("No valid records after ingestion ({malformed} malformed, {conflicts} conflicting, {filtered} filtered)")]
    EmptyInput {
        malformed: u64,
        conflicts: u64,
        filtered: u64,
    },

    /// I/O error reading input or writing output.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AnalysisError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Per-record failures. These never abort a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// Unparseable fields or wrong arity.
    #[error("Malformed record: {reason}")]
    Malformed { reason: String },

    /// Record has no path segments.
    #[error("Record has an empty path")]
    EmptyPath,

    /// A path is used both as a directory prefix and as a file.
    #[error("Path conflict: {path} is both a file and a directory")]
    PathConflict { path: String },

    /// Record lies outside the configured analysis root.
    #[error("Outside analysis root: {path}")]
    OutsideRoot { path: String },
}

impl RecordError {
    /// Create a malformed-record error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    /// Warning kind this error is counted under.
    pub fn kind(&self) -> WarningKind {
        match self {
            Self::Malformed { .. } | Self::EmptyPath => WarningKind::MalformedRecord,
            Self::PathConflict { .. } => WarningKind::PathConflict,
            Self::OutsideRoot { .. } => WarningKind::OutsideRoot,
        }
    }
}

/// Kind of ingestion warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningKind {
    /// Line could not be parsed into a record.
    MalformedRecord,
    /// Path used as both a file and a directory.
    PathConflict,
    /// Same exact path ingested twice.
    DuplicatePath,
    /// Path outside the analysis root.
    OutsideRoot,
}

/// Non-fatal warning encountered during ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestWarning {
    /// Path (or raw line fragment) the warning refers to.
    pub path: String,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl IngestWarning {
    /// Create a new ingest warning.
    pub fn new(path: impl Into<String>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a warning from a skipped record.
    pub fn from_record_error(path: impl Into<String>, error: &RecordError) -> Self {
        Self::new(path, error.to_string(), error.kind())
    }

    /// Create a duplicate-path warning carrying both sizes.
    pub fn duplicate(path: impl Into<String>, previous_size: u64, new_size: u64) -> Self {
        let path = path.into();
        Self {
            message: format!(
                "Duplicate path {path}: replacing {previous_size} bytes with {new_size} bytes"
            ),
            path,
            kind: WarningKind::DuplicatePath,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_error_kinds() {
        assert_eq!(RecordError::EmptyPath.kind(), WarningKind::MalformedRecord);
        assert_eq!(
            RecordError::PathConflict { path: "/a".into() }.kind(),
            WarningKind::PathConflict
        );
    }

    #[test]
    fn test_duplicate_warning_mentions_both_sizes() {
        let warning = IngestWarning::duplicate("/a/b", 10, 20);
        assert_eq!(warning.kind, WarningKind::DuplicatePath);
        assert!(warning.message.contains("10"));
        assert!(warning.message.contains("20"));
    }

    #[test]
    fn test_empty_input_message() {
        let err = AnalysisError::EmptyInput {
            malformed: 3,
            conflicts: 1,
            filtered: 0,
        };
        assert!(err.to_string().contains("3 malformed"));
    }
}
