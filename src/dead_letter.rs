//! Append-only dead-letter stream.
//!
//! Every rejected record is written as one JSON line
//! `{"id", "reason", "raw_doc"}`. Files are opened in append mode and never
//! truncated; creating the parent directory is up to the caller.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::models::DeadLetterRecord;

/// Destination for rejected records.
pub trait DeadLetterSink: Send + Sync {
    /// Append `records`, in order. Must not interleave with concurrent calls.
    fn append(&self, records: &[DeadLetterRecord]) -> Result<()>;
}

/// Writes dead letters as JSON lines to a file.
pub struct JsonlDeadLetterSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlDeadLetterSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DeadLetterSink for JsonlDeadLetterSink {
    fn append(&self, records: &[DeadLetterRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("dead-letter writer lock poisoned"))?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open dead-letter file: {}", self.path.display()))?;
        let mut writer = BufWriter::new(file);
        for record in records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to write dead-letter file: {}", self.path.display()))
    }
}

/// Keeps dead letters in memory. Useful for the HTTP service and tests.
#[derive(Default)]
pub struct MemoryDeadLetterSink {
    records: Mutex<Vec<DeadLetterRecord>>,
}

impl MemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far.
    pub fn records(&self) -> Vec<DeadLetterRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl DeadLetterSink for MemoryDeadLetterSink {
    fn append(&self, records: &[DeadLetterRecord]) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("dead-letter buffer lock poisoned"))?
            .extend_from_slice(records);
        Ok(())
    }
}

/// Discards dead letters.
pub struct NullDeadLetterSink;

impl DeadLetterSink for NullDeadLetterSink {
    fn append(&self, _records: &[DeadLetterRecord]) -> Result<()> {
        Ok(())
    }
}

/// Read a dead-letter file back. Blank lines are skipped; a missing file
/// reads as empty.
pub fn read_dead_letters(path: &Path) -> Result<Vec<DeadLetterRecord>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to open dead-letter file: {}", path.display()))
        }
    };

    let mut records = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: DeadLetterRecord = serde_json::from_str(&line).with_context(|| {
            format!("Malformed dead letter at {}:{}", path.display(), i + 1)
        })?;
        records.push(record);
    }
    Ok(records)
}
