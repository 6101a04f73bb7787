//! Dump log command implementation.

use super::{require_rvm_dir, CliResult, OutputFormat};
use rvm_core::log::LogIterator;
use rvm_storage::FileBackend;
use serde::Serialize;
use std::path::Path;

/// Commit log record representation for output.
#[derive(Debug, Serialize)]
pub struct LogRecordInfo {
    /// Offset of the record in the log file.
    pub log_offset: u64,
    /// Transaction ID.
    pub txid: u64,
    /// Segment name.
    pub segment: String,
    /// Offset of the range inside the segment.
    pub offset: u64,
    /// Range length in bytes.
    pub length: u64,
    /// Whether the record has been applied to its backing file.
    pub backed: bool,
}

/// Runs the dump-log command.
pub fn run(path: &Path, limit: Option<usize>, format: OutputFormat) -> CliResult<()> {
    let records = read_log_records(path, limit)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Text => print_text_output(&records),
    }

    Ok(())
}

/// Reads up to `limit` records from the commit log at `path`.
pub fn read_log_records(path: &Path, limit: Option<usize>) -> CliResult<Vec<LogRecordInfo>> {
    let log_path = require_rvm_dir(path)?;
    let backend = FileBackend::open_existing(&log_path)?;

    let mut records = Vec::new();
    for entry in LogIterator::new(&backend)?.take(limit.unwrap_or(usize::MAX)) {
        let (log_offset, record) = entry?;
        records.push(LogRecordInfo {
            log_offset,
            txid: record.tid.as_u64(),
            length: record.len(),
            segment: record.segment,
            offset: record.offset,
            backed: record.backed,
        });
    }
    Ok(records)
}

fn print_text_output(records: &[LogRecordInfo]) {
    println!(
        "{:>10}  {:>8}  {:<24} {:>10} {:>10}  BACKED",
        "LOG_OFF", "TXID", "SEGMENT", "OFFSET", "LENGTH"
    );
    for r in records {
        println!(
            "{:>10}  {:>8}  {:<24} {:>10} {:>10}  {}",
            r.log_offset,
            r.txid,
            r.segment,
            r.offset,
            r.length,
            if r.backed { "yes" } else { "no" }
        );
    }
    println!();
    println!("Total: {} records", records.len());
}
