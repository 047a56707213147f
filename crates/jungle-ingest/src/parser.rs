//! Parser for the inventory listing format.
//!
//! Each line looks like
//!
//! ```text
//! <inode> <gen> <snap> <mode> <owner> <group> <bytes> <kb> <atime> <mtime> -- /full/path
//! ```
//!
//! Only the owner, size in bytes, access time and path are kept.

use compact_str::CompactString;

use jungle_core::{PathRecord, RecordError, split_path};

/// Separator between the metadata fields and the path.
const PATH_SEPARATOR: &str = " -- ";

const OWNER_FIELD: usize = 4;
const SIZE_FIELD: usize = 6;
const ACCESS_FIELD: usize = 8;

/// Parses listing lines into [`PathRecord`]s.
#[derive(Debug, Clone, Default)]
pub struct ListingParser {
    strip_prefix: Option<String>,
}

impl ListingParser {
    /// Create a parser that keeps paths as listed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove `prefix` from the front of every path.
    pub fn with_strip_prefix(mut self, prefix: Option<String>) -> Self {
        self.strip_prefix = prefix
            .map(|p| p.trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty());
        self
    }

    /// Parse one line. Returns `Ok(None)` for blank lines.
    pub fn parse_line(&self, line: &str) -> Result<Option<PathRecord>, RecordError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (meta, path) = line
            .split_once(PATH_SEPARATOR)
            .ok_or_else(|| RecordError::malformed("missing ' -- ' path separator"))?;

        let fields: Vec<&str> = meta.split_whitespace().collect();
        if fields.len() <= ACCESS_FIELD {
            return Err(RecordError::malformed(format!(
                "expected at least {} fields, found {}",
                ACCESS_FIELD + 1,
                fields.len()
            )));
        }

        let owner = CompactString::from(fields[OWNER_FIELD]);
        let size_bytes = fields[SIZE_FIELD].parse::<u64>().map_err(|_| {
            RecordError::malformed(format!("bad size {:?}", fields[SIZE_FIELD]))
        })?;
        let last_access = parse_timestamp(fields[ACCESS_FIELD]).ok_or_else(|| {
            RecordError::malformed(format!("bad access time {:?}", fields[ACCESS_FIELD]))
        })?;

        let path = self.strip(path.trim());
        let segments = split_path(path);
        if segments.is_empty() {
            return Err(RecordError::EmptyPath);
        }

        Ok(Some(PathRecord::new(owner, segments, size_bytes, last_access)))
    }

    fn strip<'a>(&self, path: &'a str) -> &'a str {
        match &self.strip_prefix {
            Some(prefix) => match path.strip_prefix(prefix.as_str()) {
                Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
                _ => path,
            },
            None => path,
        }
    }
}

/// Parse epoch seconds, accepting a fractional part.
fn parse_timestamp(field: &str) -> Option<i64> {
    field.parse::<i64>().ok().or_else(|| {
        field
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v.floor() as i64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str =
        "123 0 0 -rw-r--r-- alice econ 1048576 1024 1600000000 1500000000 -- /gpfs4/projectnb/econ/data.csv";

    #[test]
    fn test_parse_line() {
        let record = ListingParser::new().parse_line(LINE).unwrap().unwrap();
        assert_eq!(record.owner, "alice");
        assert_eq!(record.size_bytes, 1_048_576);
        assert_eq!(record.last_access, 1_600_000_000);
        assert_eq!(record.path(), "/gpfs4/projectnb/econ/data.csv");
    }

    #[test]
    fn test_strip_prefix() {
        let parser = ListingParser::new().with_strip_prefix(Some("/gpfs4/".to_string()));
        let record = parser.parse_line(LINE).unwrap().unwrap();
        assert_eq!(record.path(), "/projectnb/econ/data.csv");
    }

    #[test]
    fn test_strip_prefix_respects_segment_boundary() {
        let parser = ListingParser::new().with_strip_prefix(Some("/gpfs".to_string()));
        let record = parser.parse_line(LINE).unwrap().unwrap();
        assert_eq!(record.path(), "/gpfs4/projectnb/econ/data.csv");
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(ListingParser::new().parse_line("   ").unwrap(), None);
    }

    #[test]
    fn test_missing_separator() {
        let err = ListingParser::new()
            .parse_line("1 2 3 4 alice 6 7 8 9 /no/separator")
            .unwrap_err();
        assert!(matches!(err, RecordError::Malformed { .. }));
    }

    #[test]
    fn test_too_few_fields() {
        let err = ListingParser::new().parse_line("1 2 3 -- /a/b").unwrap_err();
        assert!(err.to_string().contains("expected at least 9 fields"));
    }

    #[test]
    fn test_bad_numbers() {
        let parser = ListingParser::new();
        assert!(parser.parse_line("1 2 3 4 alice g big 8 9 10 -- /a").is_err());
        assert!(parser.parse_line("1 2 3 4 alice g 7 8 soon 10 -- /a").is_err());
    }

    #[test]
    fn test_fractional_timestamp() {
        let record = ListingParser::new()
            .parse_line("1 2 3 4 alice g 7 8 1600000000.75 10 -- /a")
            .unwrap()
            .unwrap();
        assert_eq!(record.last_access, 1_600_000_000);
    }

    #[test]
    fn test_path_keeps_inner_separator() {
        let record = ListingParser::new()
            .parse_line("1 2 3 4 alice g 7 8 9 10 -- /a/odd -- name")
            .unwrap()
            .unwrap();
        assert_eq!(record.path(), "/a/odd -- name");
    }

    #[test]
    fn test_root_only_path_is_empty() {
        let err = ListingParser::new()
            .parse_line("1 2 3 4 alice g 7 8 9 10 -- /")
            .unwrap_err();
        assert_eq!(err, RecordError::EmptyPath);
    }
}
