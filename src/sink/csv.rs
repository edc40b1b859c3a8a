//! Append-only CSV log sink.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use tracing::debug;

use super::{FlushError, Sink};
use crate::sampler::Sample;

/// Column header, written exactly once per log file.
pub const HEADER: &str = "time,cpu%,mem%";

/// Local wall-clock timestamp format for records: `YYYYMMDD-HHMMSS`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Appends sample batches to a CSV log file.
///
/// The file handle is scoped to each flush: opened append-create, synced,
/// and closed before `flush` returns, so a restart safely continues the same
/// log. The header is only written when the file is empty, and the whole
/// batch (header included) goes out in a single write so a reader of the
/// single-writer log never observes a torn record.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Verifies the log path is usable by opening it append-create once.
    ///
    /// Called at startup so an invalid path is fatal before the first tick.
    pub fn probe(&self) -> Result<(), FlushError> {
        self.open().map(drop)
    }

    fn open(&self) -> Result<File, FlushError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| FlushError::from_io("opening log", e))
    }
}

/// Formats one sample as a CSV record (no trailing newline).
///
/// Percentages use one decimal place; parsing the fields back reproduces the
/// formatted values exactly.
pub fn format_record(sample: &Sample) -> String {
    format!(
        "{},{:.1},{:.1}",
        sample.timestamp.format(TIMESTAMP_FORMAT),
        sample.cpu_percent,
        sample.mem_percent,
    )
}

impl Sink for CsvSink {
    fn name(&self) -> &str {
        "csv"
    }

    async fn flush(&mut self, batch: &[Sample]) -> Result<(), FlushError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut file = self.open()?;

        let fresh = file
            .metadata()
            .map_err(|e| FlushError::from_io("inspecting log", e))?
            .len()
            == 0;

        let mut buf = String::with_capacity((batch.len() + 1) * 32);
        if fresh {
            buf.push_str(HEADER);
            buf.push('\n');
        }
        for sample in batch {
            buf.push_str(&format_record(sample));
            buf.push('\n');
        }

        file.write_all(buf.as_bytes())
            .map_err(|e| FlushError::from_io("appending records", e))?;
        file.sync_data()
            .map_err(|e| FlushError::from_io("syncing log", e))?;

        debug!(samples = batch.len(), header = fresh, "batch appended");

        Ok(())
    }
}
