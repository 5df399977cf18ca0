//! # parcheck - parallel multi-file pattern checker
//!
//! Runs configurable line checks over many files with a fixed pool of worker
//! threads. Every worker owns a private checking engine; what the engines
//! find is merged back into one race-free report stream, and the suppression
//! state they discover is folded into a single run-wide database.
//!
//! ## Layout
//!
//! - [`work`]: work items, file discovery and the shared work queue
//! - [`engine`]: the checking engine interface and the regex engine
//! - [`suppressions`]: suppression rules and the shared database
//! - [`parallel`]: log forwarder, workers and the orchestrator
//! - [`report`]: console and JSON-lines reporting
//! - [`timing`]: aggregated per-pass timing
//! - [`config`]: layered configuration
//!
//! ## Quick Start
//!
//! ```bash
//! # Check the current directory with an automatically sized worker pool
//! parcheck check
//!
//! # Four workers, JSON output, one extra suppression
//! parcheck check -j 4 --format json --suppress 'todo:vendor/*' src/
//! ```

pub mod cli;
pub mod config;
pub mod engine;
pub mod parallel;
pub mod report;
pub mod suppressions;
pub mod timing;
pub mod work;

pub use cli::{Cli, Output};
pub use config::ParcheckConfig;

/// Result type alias for parcheck operations
pub type Result<T> = anyhow::Result<T>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
