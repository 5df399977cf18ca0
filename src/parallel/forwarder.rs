use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::engine::{ErrorLogger, Finding};
use crate::suppressions::SharedSuppressions;
use crate::work::ProgressCounters;

/// Unsynchronized report sink (console, file, GUI bridge...)
pub trait Reporter: Send {
    fn report_out(&mut self, text: &str);
    fn report_err(&mut self, finding: &Finding);
    fn report_metric(&mut self, text: &str);
    fn report_status(&mut self, progress: &ProgressCounters);
}

struct SinkState<R> {
    reporter: R,
    forwarded: HashSet<String>,
}

/// Serializes calls from all workers into one [`Reporter`].
///
/// Each call is forwarded whole under the sink lock. Findings are first checked
/// against the shared suppression database (under its own lock) and against
/// the set of findings already forwarded, so suppressed and duplicate findings
/// never reach the reporter.
pub struct SyncLogForwarder<R> {
    sink: Mutex<SinkState<R>>,
    suppressions: Arc<SharedSuppressions>,
    quiet: bool,
}

impl<R: Reporter> SyncLogForwarder<R> {
    pub fn new(reporter: R, suppressions: Arc<SharedSuppressions>, quiet: bool) -> Self {
        Self {
            sink: Mutex::new(SinkState {
                reporter,
                forwarded: HashSet::new(),
            }),
            suppressions,
            quiet,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkState<R>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forward a progress update; skipped entirely in quiet runs
    pub fn report_status(&self, progress: &ProgressCounters) {
        if self.quiet {
            return;
        }
        self.lock().reporter.report_status(progress);
    }

    pub fn into_reporter(self) -> R {
        self.sink
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .reporter
    }
}

impl<R: Reporter> ErrorLogger for SyncLogForwarder<R> {
    fn report_out(&self, text: &str) {
        self.lock().reporter.report_out(text);
    }

    fn report_err(&self, finding: &Finding) {
        if self.suppressions.is_suppressed(finding) {
            return;
        }

        let rendered = finding.to_string();
        let mut sink = self.lock();
        if !sink.forwarded.insert(rendered) {
            return;
        }
        sink.reporter.report_err(finding);
    }

    fn report_metric(&self, text: &str) {
        self.lock().reporter.report_metric(text);
    }
}
