//! Inspect command implementation.

use super::{require_rvm_dir, CliResult, OutputFormat};
use rvm_core::log::LogIterator;
use rvm_storage::{FileBackend, StorageBackend};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// RVM directory inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// RVM directory path.
    pub path: String,
    /// Commit log size in bytes.
    pub log_size: u64,
    /// Number of records in the commit log.
    pub log_record_count: usize,
    /// Records already applied to their backing file.
    pub backed_count: usize,
    /// Records not yet applied.
    pub unbacked_count: usize,
    /// Unbacked records whose segment has no backing file.
    pub orphaned_count: usize,
    /// Segments with a backing file.
    pub segments: Vec<SegmentInfo>,
}

/// One backing segment.
#[derive(Debug, Serialize)]
pub struct SegmentInfo {
    /// Segment name.
    pub name: String,
    /// Backing file size in bytes.
    pub size: u64,
    /// Unbacked log records targeting this segment.
    pub unbacked_records: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: OutputFormat) -> CliResult<()> {
    let result = inspect(path)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text_output(&result),
    }

    Ok(())
}

/// Collects statistics for the RVM directory at `path`.
///
/// Reads the directory without taking its lock.
pub fn inspect(path: &Path) -> CliResult<InspectResult> {
    let log_path = require_rvm_dir(path)?;
    let backend = FileBackend::open_existing(&log_path)?;

    let mut result = InspectResult {
        path: path.display().to_string(),
        log_size: backend.size()?,
        log_record_count: 0,
        backed_count: 0,
        unbacked_count: 0,
        orphaned_count: 0,
        segments: Vec::new(),
    };

    let mut unbacked: BTreeMap<String, usize> = BTreeMap::new();
    for entry in LogIterator::new(&backend)? {
        let (_, record) = entry?;
        result.log_record_count += 1;
        if record.backed {
            result.backed_count += 1;
        } else {
            result.unbacked_count += 1;
            *unbacked.entry(record.segment).or_default() += 1;
        }
    }

    for (name, size) in rvm_core::list_segments_in(path)? {
        let unbacked_records = unbacked.remove(&name).unwrap_or(0);
        result.segments.push(SegmentInfo {
            name,
            size,
            unbacked_records,
        });
    }
    result.orphaned_count = unbacked.values().sum();

    Ok(result)
}

fn print_text_output(result: &InspectResult) {
    println!("RVM Directory: {}", result.path);
    println!();
    println!("Commit Log:");
    println!("  Size:      {}", format_size(result.log_size));
    println!("  Records:   {}", result.log_record_count);
    println!("  Backed:    {}", result.backed_count);
    println!("  Unbacked:  {}", result.unbacked_count);
    if result.orphaned_count > 0 {
        println!("  Orphaned:  {} (no backing file)", result.orphaned_count);
    }
    println!();
    println!("Segments: {}", result.segments.len());
    for seg in &result.segments {
        println!(
            "  {:<24} {:>12}  unbacked={}",
            seg.name,
            format_size(seg.size),
            seg.unbacked_records
        );
    }
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
