//! Checking engine interface
//!
//! The engine is the expensive, stateful part of a check: it reads one unit,
//! runs every enabled pass over it and reports what it finds. The scheduler
//! never shares one engine between threads; each worker builds its own through
//! an [`EngineFactory`], handing it the sink it must report into.

use anyhow::Result;
use serde::Serialize;
use std::fmt;

pub mod pattern_engine;
pub mod patterns;

pub use pattern_engine::{PatternEngine, PatternEngineFactory};
pub use patterns::CheckPattern;

use crate::suppressions::SuppressionRule;
use crate::work::WorkItem;

/// Severity of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Style,
    Information,
}

impl Severity {
    /// Whether findings of this severity count toward the run's error total
    pub fn counts_as_error(self) -> bool {
        !matches!(self, Severity::Information)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Style => write!(f, "style"),
            Severity::Information => write!(f, "information"),
        }
    }
}

/// Parse a severity name, defaulting to `Error` for unknown values
pub fn parse_severity(value: &str) -> Severity {
    match value.to_lowercase().as_str() {
        "warning" | "warn" => Severity::Warning,
        "style" => Severity::Style,
        "information" | "info" => Severity::Information,
        _ => Severity::Error,
    }
}

/// One reported problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub id: String,
    pub severity: Severity,
    pub message: String,
    pub file: String,
    /// 1-based; 0 when the finding concerns the whole file
    pub line: usize,
    /// 1-based; 0 when unknown
    pub column: usize,
}

impl Finding {
    /// Finding produced when checking a unit failed outright
    pub fn internal_error(file: &str, message: impl Into<String>) -> Self {
        Self {
            id: "internalError".to_string(),
            severity: Severity::Error,
            message: message.into(),
            file: file.to_string(),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {} [{}]",
            self.file, self.line, self.column, self.severity, self.message, self.id
        )
    }
}

/// Sink an engine reports into while checking.
///
/// Implementations must be callable from several threads at once; the
/// scheduler's implementation serializes every call.
pub trait ErrorLogger: Sync {
    /// Free-form text
    fn report_out(&self, text: &str);
    /// A finding
    fn report_err(&self, finding: &Finding);
    /// A metric line
    fn report_metric(&self, text: &str);
}

impl<T: ErrorLogger + ?Sized> ErrorLogger for &T {
    fn report_out(&self, text: &str) {
        (**self).report_out(text)
    }

    fn report_err(&self, finding: &Finding) {
        (**self).report_err(finding)
    }

    fn report_metric(&self, text: &str) {
        (**self).report_metric(text)
    }
}

/// A private, stateful engine instance owned by one worker
pub trait CheckEngine {
    /// Check one unit, reporting findings through the engine's logger.
    /// Returns the number of errors found.
    fn check(&mut self, item: &WorkItem) -> Result<u32>;

    /// Suppression state produced by the last `check`: inline rules discovered
    /// in that unit plus the engine's copies of the global rules. Inline rules
    /// are handed out once.
    fn drain_suppressions(&mut self) -> Vec<SuppressionRule>;
}

/// Builds engines bound to a given logger
pub trait EngineFactory<L: ErrorLogger>: Sync {
    type Engine: CheckEngine;

    /// `global_rules` is a copy of the run's global suppressions
    fn create(&self, logger: L, global_rules: Vec<SuppressionRule>) -> Self::Engine;
}
