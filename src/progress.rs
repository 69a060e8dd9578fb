//! Progress reporting and display
//!
//! The importer reports phases and per-row outcomes through a trait so the
//! merge logic stays decoupled from how, or whether, anything is displayed.

use std::sync::{Mutex, PoisonError};

use crate::stats::{Category, MergeStatistics};

/// Outcome of a single row, as displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowStatus {
    /// A new product was stored
    Created,
    /// An existing product was stored
    Updated,
    /// Nothing to store
    Unchanged,
    /// Deliberately skipped by a filter
    Skipped(String),
    /// Failed with error
    Failed(String),
}

/// Phase of the overall batch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchPhase {
    /// Scanning the images directory
    ScanningImages,
    /// Compiling the field registry
    CompilingSchema,
    /// Merging rows
    ProcessingRows,
    /// Completed successfully
    Completed,
    /// Failed with error
    Failed(String),
}

pub trait ProgressReporter: Send + Sync {
    /// Set the overall batch phase.
    fn set_phase(&self, phase: BatchPhase);

    /// Number of rows about to be processed.
    fn register_rows(&self, count: usize);

    fn row_finished(&self, line: usize, code: Option<&str>, status: RowStatus);

    fn log_info(&self, message: &str);

    fn log_warn(&self, message: &str);

    /// Finish and print the batch statistics.
    fn finish(&self, stats: &MergeStatistics);
}

/// A no-op reporter for when progress display is disabled.
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn set_phase(&self, _phase: BatchPhase) {}
    fn register_rows(&self, _count: usize) {}
    fn row_finished(&self, _line: usize, _code: Option<&str>, _status: RowStatus) {}
    fn log_info(&self, _message: &str) {}
    fn log_warn(&self, _message: &str) {}
    fn finish(&self, _stats: &MergeStatistics) {}
}

/// A simple reporter that prints to stderr.
pub struct SimpleReporter {
    stats: Mutex<Stats>,
}

impl SimpleReporter {
    pub fn new() -> Self {
        Self {
            stats: Mutex::new(Stats {
                start_time: Some(std::time::Instant::now()),
                ..Default::default()
            }),
        }
    }

    fn stats(&self) -> std::sync::MutexGuard<'_, Stats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimpleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for SimpleReporter {
    fn set_phase(&self, phase: BatchPhase) {
        let msg = match phase {
            BatchPhase::ScanningImages => "Scanning images directory...",
            BatchPhase::CompilingSchema => "Compiling field registry...",
            BatchPhase::ProcessingRows => "Processing rows...",
            BatchPhase::Completed => "Completed!",
            BatchPhase::Failed(ref e) => {
                eprintln!("Failed: {e}");
                return;
            }
        };
        eprintln!("{msg}");
    }

    fn register_rows(&self, count: usize) {
        self.stats().total_rows = count;
        eprintln!("   Found {count} rows");
    }

    fn row_finished(&self, line: usize, code: Option<&str>, status: RowStatus) {
        let code = code.unwrap_or("-");
        let mut stats = self.stats();
        match status {
            RowStatus::Created | RowStatus::Updated => {
                stats.stored_rows += 1;
                eprintln!("   + {line} {code}");
            }
            RowStatus::Unchanged => {}
            RowStatus::Skipped(ref reason) => {
                stats.skipped_rows += 1;
                eprintln!("   - {line} {code}: {reason}");
            }
            RowStatus::Failed(ref e) => {
                stats.failed_rows += 1;
                eprintln!("   x {line} {code}: {e}");
            }
        }
    }

    fn log_info(&self, message: &str) {
        eprintln!("info: {message}");
    }

    fn log_warn(&self, message: &str) {
        eprintln!("warning: {message}");
    }

    fn finish(&self, merge_stats: &MergeStatistics) {
        let stats = self.stats();
        let duration = stats.start_time.map(|t| t.elapsed()).unwrap_or_default();

        eprintln!();
        eprintln!("Summary");
        eprintln!("   Rows:     {} total", stats.total_rows);
        eprintln!("   Stored:   {}", stats.stored_rows);
        if stats.skipped_rows > 0 {
            eprintln!("   Skipped:  {}", stats.skipped_rows);
        }
        if stats.failed_rows > 0 {
            eprintln!("   Failed:   {}", stats.failed_rows);
        }
        eprintln!("   Duration: {:.2}s", duration.as_secs_f64());
        for (category, codes) in merge_stats.iter() {
            eprintln!("   {category}: {}", codes.len());
        }
        let updated = merge_stats.count(Category::ProductsUpdated);
        if updated == 0 {
            eprintln!("   No product was updated");
        }
    }
}

#[derive(Debug, Default)]
struct Stats {
    total_rows: usize,
    stored_rows: usize,
    skipped_rows: usize,
    failed_rows: usize,
    start_time: Option<std::time::Instant>,
}
