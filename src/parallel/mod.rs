//! Concurrent multi-file checking core
//!
//! This module fans units of work out to a fixed pool of worker threads and
//! merges everything they produce back into one race-free stream.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   next()   ┌──────────────┐  check()  ┌──────────────────┐
//! │  WorkQueue   │───────────▶│  Worker N    │──────────▶│ private engine   │
//! │ (one lock)   │◀───────────│              │◀──────────│ (per worker)     │
//! └──────────────┘ complete() └──────┬───────┘ findings  └──────────────────┘
//!                                    │ reconcile()             │ report_*
//!                             ┌──────▼───────┐         ┌───────▼──────────┐
//!                             │ Suppressions │◀────────│ SyncLogForwarder │
//!                             │ (one lock)   │ dropped?│ (sink lock)      │
//!                             └──────────────┘         └──────────────────┘
//! ```
//!
//! ## Guarantees
//! - Every unit is checked exactly once, whatever the worker count.
//! - Each forwarded message is written whole; ordering between workers is unspecified.
//! - No lock is held while an engine checks a file.
//! - The total error count is a plain sum and does not depend on scheduling.
//!
//! ## What this module does NOT do
//! - Weight work by size: units are handed out first come, first served.
//! - Cancel or preempt a file check in flight.
//! - Grow or shrink the pool mid-run.
//!
//! # Example
//!
//! ```rust
//! use parcheck::parallel::ExecutionStrategy;
//!
//! // `jobs = 1` keeps everything on the calling thread
//! assert!(matches!(ExecutionStrategy::for_jobs(1), ExecutionStrategy::Sequential));
//!
//! // More than one job engages the threaded core
//! let strategy = ExecutionStrategy::for_jobs(4);
//! assert!(matches!(strategy, ExecutionStrategy::Parallel { workers: 4 }));
//! ```

pub mod executor;
pub mod forwarder;

#[cfg(test)]
mod tests;

pub use executor::{ExecutorError, LaunchHook, RunSettings, ThreadExecutor, Worker};
pub use forwarder::{Reporter, SyncLogForwarder};

/// Execution strategy: everything on the calling thread, or a worker pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStrategy {
    Sequential,
    Parallel { workers: usize },
}

impl ExecutionStrategy {
    /// The threaded core is only engaged for more than one job
    pub fn for_jobs(jobs: usize) -> Self {
        if jobs > 1 {
            ExecutionStrategy::Parallel { workers: jobs }
        } else {
            ExecutionStrategy::Sequential
        }
    }

    /// Number of workers this strategy runs
    pub fn workers(&self) -> usize {
        match self {
            ExecutionStrategy::Sequential => 1,
            ExecutionStrategy::Parallel { workers } => *workers,
        }
    }

    /// Resolve a configured job count. An explicit count is used as is;
    /// `0` means auto-size from the available cores.
    ///
    /// # Algorithm
    /// ```text
    /// 1. jobs > 0: use jobs unchanged
    /// 2. otherwise detect cores: num_cpus::get()
    /// 3. apply percentage: cores * thread_percentage / 100
    /// 4. ensure minimum: max(1, result)
    /// ```
    pub fn resolve_jobs(jobs: usize, thread_percentage: u8) -> usize {
        if jobs > 0 {
            return jobs;
        }

        let available_cores = num_cpus::get();
        std::cmp::max(1, (available_cores * thread_percentage as usize) / 100)
    }
}
