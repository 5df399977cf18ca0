use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{FileSettings, SourceFile, WorkItem};

/// Units and bytes processed so far, out of the run totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressCounters {
    pub units_processed: usize,
    pub total_units: usize,
    pub bytes_processed: u64,
    pub total_bytes: u64,
}

impl ProgressCounters {
    /// Percentage done, weighted by bytes when any byte total is known
    pub fn percent_done(&self) -> u64 {
        if self.total_bytes > 0 {
            self.bytes_processed.saturating_mul(100) / self.total_bytes
        } else if self.total_units > 0 {
            (self.units_processed as u64 * 100) / self.total_units as u64
        } else {
            100
        }
    }

    /// Status line as shown to the user after each unit
    pub fn status_line(&self) -> String {
        format!(
            "{}/{} files checked {}% done",
            self.units_processed,
            self.total_units,
            self.percent_done()
        )
    }
}

struct QueueState {
    files: Vec<SourceFile>,
    configs: Vec<FileSettings>,
    next_file: usize,
    next_config: usize,
    closed: bool,
    progress: ProgressCounters,
}

/// Shared, lock-protected cursor pair over the files and project entries of a run.
///
/// Files are handed out before project entries, each in input order, and every
/// unit is returned to exactly one caller. Cursors only move forward. The
/// progress counters live under the same lock because they change at the same
/// call sites.
pub struct WorkQueue {
    state: Mutex<QueueState>,
}

impl WorkQueue {
    pub fn new(files: Vec<SourceFile>, configs: Vec<FileSettings>) -> Self {
        let total_units = files.len() + configs.len();
        let total_bytes = files.iter().map(|f| f.size).sum();

        Self {
            state: Mutex::new(QueueState {
                files,
                configs,
                next_file: 0,
                next_config: 0,
                closed: false,
                progress: ProgressCounters {
                    total_units,
                    total_bytes,
                    ..ProgressCounters::default()
                },
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the next unit, or `None` once both collections are exhausted
    /// (or the queue was closed)
    pub fn next(&self) -> Option<WorkItem> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }

        if state.next_file < state.files.len() {
            let item = state.files[state.next_file].clone();
            state.next_file += 1;
            return Some(WorkItem::SourceFile(item));
        }

        if state.next_config < state.configs.len() {
            let item = state.configs[state.next_config].clone();
            state.next_config += 1;
            return Some(WorkItem::ParsedConfig(item));
        }

        None
    }

    /// Record one finished unit and return the counters after the update
    pub fn complete(&self, bytes: u64) -> ProgressCounters {
        let mut state = self.lock();
        state.progress.units_processed += 1;
        state.progress.bytes_processed += bytes;
        state.progress
    }

    /// Stop handing out work. Units already taken are unaffected.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn progress(&self) -> ProgressCounters {
        self.lock().progress
    }

    pub fn total_units(&self) -> usize {
        self.lock().progress.total_units
    }

    pub fn is_empty(&self) -> bool {
        self.total_units() == 0
    }
}
