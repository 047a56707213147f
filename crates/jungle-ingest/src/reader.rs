//! Background listing reader feeding a bounded channel.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, bounded};

use jungle_core::{AnalysisError, PathRecord, RecordError};

use crate::parser::ListingParser;

/// Lines parsed before a batch is handed to the consumer.
pub const BATCH_SIZE: usize = 4096;

/// Outcome of parsing one non-blank listing line.
#[derive(Debug, Clone)]
pub struct ParsedLine {
    /// 1-based line number in the listing.
    pub line_number: u64,
    /// Parsed record, or why the line was rejected.
    pub result: Result<PathRecord, RecordError>,
}

/// Reads a listing on its own thread and streams parsed batches.
#[derive(Debug, Clone)]
pub struct ListingReader {
    parser: ListingParser,
    capacity: usize,
}

impl ListingReader {
    /// Create a reader buffering at most `capacity` batches.
    pub fn new(parser: ListingParser, capacity: usize) -> Self {
        Self { parser, capacity }
    }

    /// Open `path` and start reading it.
    pub fn spawn(&self, path: &Path) -> Result<ReaderHandle, AnalysisError> {
        let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;
        self.spawn_reader(BufReader::new(file), path)
    }

    /// Start reading from any buffered source. `label` names it in errors.
    pub fn spawn_reader<R>(&self, mut reader: R, label: impl Into<PathBuf>) -> Result<ReaderHandle, AnalysisError>
    where
        R: BufRead + Send + 'static,
    {
        let label = label.into();
        let (tx, rx) = bounded::<Vec<ParsedLine>>(self.capacity);
        let parser = self.parser.clone();
        let thread_label = label.clone();

        let handle = std::thread::Builder::new()
            .name("listing-reader".to_string())
            .spawn(move || -> Result<u64, AnalysisError> {
                let mut buf = Vec::new();
                let mut batch = Vec::with_capacity(BATCH_SIZE);
                let mut line_number = 0u64;

                loop {
                    buf.clear();
                    let read = reader
                        .read_until(b'\n', &mut buf)
                        .map_err(|e| AnalysisError::io(&thread_label, e))?;
                    if read == 0 {
                        break;
                    }
                    line_number += 1;

                    let line = String::from_utf8_lossy(&buf);
                    let result = match parser.parse_line(&line) {
                        Ok(Some(record)) => Ok(record),
                        Ok(None) => continue,
                        Err(error) => Err(error),
                    };
                    batch.push(ParsedLine {
                        line_number,
                        result,
                    });

                    if batch.len() >= BATCH_SIZE {
                        let full = std::mem::replace(&mut batch, Vec::with_capacity(BATCH_SIZE));
                        if tx.send(full).is_err() {
                            // Consumer hung up; nothing left to do.
                            return Ok(line_number);
                        }
                    }
                }

                if !batch.is_empty() {
                    let _ = tx.send(batch);
                }
                Ok(line_number)
            })
            .map_err(|e| AnalysisError::io(&label, e))?;

        Ok(ReaderHandle {
            receiver: rx,
            handle,
            label,
        })
    }
}

/// Running reader: a batch receiver plus the thread to join.
#[derive(Debug)]
pub struct ReaderHandle {
    receiver: Receiver<Vec<ParsedLine>>,
    handle: JoinHandle<Result<u64, AnalysisError>>,
    label: PathBuf,
}

impl ReaderHandle {
    /// Receiver of parsed batches. Iteration ends once the file is read.
    pub fn batches(&self) -> &Receiver<Vec<ParsedLine>> {
        &self.receiver
    }

    /// Wait for the reader thread; returns the number of lines read.
    pub fn join(self) -> Result<u64, AnalysisError> {
        drop(self.receiver);
        self.handle.join().map_err(|_| {
            AnalysisError::io(
                &self.label,
                std::io::Error::other("listing reader thread panicked"),
            )
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn listing(lines: usize) -> String {
        (0..lines)
            .map(|i| format!("1 2 3 4 alice g {i} 0 1600000000 0 -- /p/dir{}/f{i}\n", i % 7))
            .collect()
    }

    #[test]
    fn test_reads_all_lines_in_order() {
        let text = listing(BATCH_SIZE * 2 + 17);
        let reader = ListingReader::new(ListingParser::new(), 2);
        let handle = reader
            .spawn_reader(Cursor::new(text.into_bytes()), "memory")
            .unwrap();

        let mut numbers = Vec::new();
        for batch in handle.batches() {
            numbers.extend(batch.iter().map(|l| l.line_number));
        }
        let lines = handle.join().unwrap();

        assert_eq!(lines as usize, BATCH_SIZE * 2 + 17);
        assert_eq!(numbers.len(), lines as usize);
        assert!(numbers.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_malformed_and_blank_lines() {
        let text = "garbage\n\n1 2 3 4 bob g 5 0 1600000000 0 -- /p/x\n";
        let reader = ListingReader::new(ListingParser::new(), 1);
        let handle = reader
            .spawn_reader(Cursor::new(text.as_bytes().to_vec()), "memory")
            .unwrap();

        let lines: Vec<ParsedLine> = handle.batches().iter().flatten().collect();
        assert_eq!(handle.join().unwrap(), 3);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].result.is_err());
        assert_eq!(lines[1].line_number, 3);
        assert!(lines[1].result.is_ok());
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut bytes = b"1 2 3 4 bob g 5 0 1600000000 0 -- /p/caf".to_vec();
        bytes.push(0xff);
        bytes.push(b'\n');
        let reader = ListingReader::new(ListingParser::new(), 1);
        let handle = reader.spawn_reader(Cursor::new(bytes), "memory").unwrap();

        let lines: Vec<ParsedLine> = handle.batches().iter().flatten().collect();
        handle.join().unwrap();
        let record = lines[0].result.as_ref().unwrap();
        assert!(record.path().starts_with("/p/caf"));
    }

    #[test]
    fn test_missing_file() {
        let reader = ListingReader::new(ListingParser::new(), 1);
        let err = reader.spawn(Path::new("/definitely/not/here.list")).unwrap_err();
        assert!(matches!(err, AnalysisError::Io { .. }));
    }
}
