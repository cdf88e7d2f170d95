//! Storage sinks for extracted records.
//!
//! The CSV log is append-only. Each `append` builds the complete buffer
//! first and hands it to the file in a single write.

use chrono::SecondsFormat;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::extract::ExtractedRecord;
use crate::result::PriceWatchResult;

/// First line of every CSV log
pub const CSV_HEADER: &str = "Timestamp,Brand,Price";

/// Destination for extracted records
pub trait StorageSink {
    /// Persist `rows` in order; zero rows is valid
    fn append(&mut self, rows: &[ExtractedRecord]) -> PriceWatchResult<()>;
}

/// Format one CSV line (without newline). Line breaks in the brand become spaces.
#[must_use]
pub fn format_row(record: &ExtractedRecord) -> String {
    format!(
        "\"{}\",\"{}\",{}",
        record
            .captured_at
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        record.brand.replace(['\r', '\n'], " ").replace('"', "\"\""),
        record.price
    )
}

/// Appends to a CSV file, writing the header when the file is new or empty
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    /// Sink writing to `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Output path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageSink for CsvSink {
    fn append(&mut self, rows: &[ExtractedRecord]) -> PriceWatchResult<()> {
        let needs_header = fs::metadata(&self.path).map_or(true, |meta| meta.len() == 0);

        let mut buffer = String::new();
        if needs_header {
            buffer.push_str(CSV_HEADER);
            buffer.push('\n');
        }
        for row in rows {
            buffer.push_str(&format_row(row));
            buffer.push('\n');
        }
        if buffer.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buffer.as_bytes())?;
        file.flush()?;

        debug!(path = %self.path.display(), rows = rows.len(), header = needs_header, "rows appended");
        Ok(())
    }
}

/// Keeps rows in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    rows: Vec<ExtractedRecord>,
    appends: usize,
}

impl MemorySink {
    /// Empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows appended so far
    #[must_use]
    pub fn rows(&self) -> &[ExtractedRecord] {
        &self.rows
    }

    /// Number of `append` calls
    #[must_use]
    pub const fn appends(&self) -> usize {
        self.appends
    }
}

impl StorageSink for MemorySink {
    fn append(&mut self, rows: &[ExtractedRecord]) -> PriceWatchResult<()> {
        self.rows.extend_from_slice(rows);
        self.appends += 1;
        Ok(())
    }
}
