//! Regex-driven checking engine
//!
//! Reads one file per unit, discovers its inline suppressions, runs every
//! enabled pattern over each line and reports the findings that are not
//! suppressed. Suppression copies are private to the engine; the scheduler
//! folds their state back into the shared database after each unit.

use anyhow::{Context, Result};
use std::sync::Arc;

use super::patterns::CheckPattern;
use super::{CheckEngine, EngineFactory, ErrorLogger, Finding};
use crate::suppressions::{SuppressionRule, parse_inline};
use crate::timing::TimerResults;
use crate::work::WorkItem;

/// Per-run engine settings
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    /// Discover `parcheck:ignore` comments
    pub inline_suppressions: bool,
    /// Emit a metric line per checked unit
    pub metrics: bool,
    /// Skip files larger than this many bytes (0 = no limit)
    pub max_file_size: u64,
    /// Report file-local suppressions that did not fire for their file
    pub report_unmatched: bool,
}

/// Builds [`PatternEngine`]s sharing one compiled pattern set
pub struct PatternEngineFactory {
    patterns: Arc<Vec<CheckPattern>>,
    settings: EngineSettings,
    timer: Option<Arc<TimerResults>>,
}

impl PatternEngineFactory {
    pub fn new(patterns: Vec<CheckPattern>, settings: EngineSettings) -> Self {
        Self {
            patterns: Arc::new(patterns),
            settings,
            timer: None,
        }
    }

    /// Record pass timings into `timer`
    pub fn with_timer(mut self, timer: Arc<TimerResults>) -> Self {
        self.timer = Some(timer);
        self
    }
}

impl<L: ErrorLogger> EngineFactory<L> for PatternEngineFactory {
    type Engine = PatternEngine<L>;

    fn create(&self, logger: L, global_rules: Vec<SuppressionRule>) -> PatternEngine<L> {
        PatternEngine {
            logger,
            patterns: Arc::clone(&self.patterns),
            settings: self.settings.clone(),
            timer: self.timer.clone(),
            global_rules,
            inline_rules: Vec::new(),
        }
    }
}

pub struct PatternEngine<L> {
    logger: L,
    patterns: Arc<Vec<CheckPattern>>,
    settings: EngineSettings,
    timer: Option<Arc<TimerResults>>,
    global_rules: Vec<SuppressionRule>,
    inline_rules: Vec<SuppressionRule>,
}

impl<L: ErrorLogger> PatternEngine<L> {
    fn timed<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        match &self.timer {
            Some(timer) => {
                let _timer = timer.start(name);
                f()
            }
            None => f(),
        }
    }

    /// Inline rules of the current file first, then the global copies
    fn suppress(&mut self, finding: &Finding) -> bool {
        self.inline_rules
            .iter_mut()
            .chain(self.global_rules.iter_mut())
            .any(|rule| rule.try_suppress(finding))
    }

    fn scan(&self, content: &str, file: &str, item: &WorkItem) -> Vec<Finding> {
        let enabled = item.enabled_ids();
        let mut findings = Vec::new();

        for pattern in self.patterns.iter() {
            if !enabled.is_empty() && !enabled.contains(&pattern.id) {
                continue;
            }
            self.timed(&format!("pattern:{}", pattern.id), || {
                for (index, line) in content.lines().enumerate() {
                    for found in pattern.regex.find_iter(line) {
                        findings.push(Finding {
                            id: pattern.id.clone(),
                            severity: pattern.severity,
                            message: pattern.message.clone(),
                            file: file.to_string(),
                            line: index + 1,
                            column: found.start() + 1,
                        });
                    }
                }
            });
        }

        findings.sort_by(|a, b| {
            (a.line, a.column)
                .cmp(&(b.line, b.column))
                .then_with(|| a.id.cmp(&b.id))
        });
        findings
    }

    fn report_unmatched_local(&mut self, file: &str) {
        let unmatched: Vec<Finding> = self
            .global_rules
            .iter()
            .filter(|rule| rule.is_local() && !rule.matched && rule.file.as_deref() == Some(file))
            .map(SuppressionRule::unmatched_finding)
            .collect();

        for finding in unmatched {
            if !self.suppress(&finding) {
                self.logger.report_err(&finding);
            }
        }
    }
}

impl<L: ErrorLogger> CheckEngine for PatternEngine<L> {
    fn check(&mut self, item: &WorkItem) -> Result<u32> {
        let path = item.path();
        let file = path.display().to_string();

        self.inline_rules.clear();
        for rule in self.global_rules.iter_mut().filter(|rule| rule.is_local()) {
            rule.matched = false;
        }

        let bytes = self.timed("read", || std::fs::read(path))
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        if self.settings.max_file_size > 0 && bytes.len() as u64 > self.settings.max_file_size {
            tracing::debug!("Skipping oversized file: {}", file);
            return Ok(0);
        }
        let content = String::from_utf8_lossy(&bytes);

        if self.settings.inline_suppressions {
            self.inline_rules = self.timed("inline", || parse_inline(&content, &file))?;
        }

        let findings = self.scan(&content, &file, item);
        let mut errors = 0u32;
        let mut reported = 0usize;
        for finding in &findings {
            if self.suppress(finding) {
                continue;
            }
            self.logger.report_err(finding);
            reported += 1;
            if finding.severity.counts_as_error() {
                errors += 1;
            }
        }

        if self.settings.report_unmatched {
            self.report_unmatched_local(&file);
        }

        if self.settings.metrics {
            self.logger.report_metric(&format!(
                "file={} lines={} bytes={} findings={}",
                item.display_name(),
                content.lines().count(),
                bytes.len(),
                reported
            ));
        }

        tracing::trace!("{}: {} findings, {} errors", file, reported, errors);
        Ok(errors)
    }

    fn drain_suppressions(&mut self) -> Vec<SuppressionRule> {
        let mut rules = std::mem::take(&mut self.inline_rules);
        rules.extend(self.global_rules.iter().cloned());
        rules
    }
}
