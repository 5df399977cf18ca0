//! Aggregated timing of engine passes
//!
//! Every engine instance records into one shared [`TimerResults`]; the summary
//! is printed once after all workers have finished.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::engine::ErrorLogger;

/// Which timing summary to print after a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ShowTime {
    /// No timing output
    #[default]
    None,
    /// Every timed pass, slowest first
    Summary,
    /// The five slowest passes
    Top5,
}

impl ShowTime {
    pub fn is_enabled(self) -> bool {
        self != ShowTime::None
    }
}

/// Accumulated time for one named pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerStats {
    pub total: Duration,
    pub calls: u64,
}

impl TimerStats {
    pub fn average(&self) -> Duration {
        if self.calls == 0 {
            return Duration::ZERO;
        }
        match u32::try_from(self.calls) {
            Ok(calls) => self.total / calls,
            Err(_) => Duration::from_secs_f64(self.total.as_secs_f64() / self.calls as f64),
        }
    }
}

/// Run-wide timing table shared by all workers
#[derive(Debug, Default)]
pub struct TimerResults {
    results: Mutex<HashMap<String, TimerStats>>,
}

impl TimerResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, name: &str, elapsed: Duration) {
        let mut results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        let stats = results.entry(name.to_string()).or_default();
        stats.total += elapsed;
        stats.calls += 1;
    }

    /// Start a scoped timer that records into this table when dropped
    pub fn start(&self, name: impl Into<String>) -> Timer<'_> {
        Timer {
            results: self,
            name: name.into(),
            start: Instant::now(),
        }
    }

    /// All entries, slowest first (ties broken by name)
    pub fn sorted(&self) -> Vec<(String, TimerStats)> {
        let results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<_> = results
            .iter()
            .map(|(name, stats)| (name.clone(), *stats))
            .collect();
        entries.sort_by(|a, b| b.1.total.cmp(&a.1.total).then_with(|| a.0.cmp(&b.0)));
        entries
    }

    /// Render the summary for `mode`
    pub fn summary_lines(&self, mode: ShowTime) -> Vec<String> {
        let entries = self.sorted();
        let limit = match mode {
            ShowTime::None => return Vec::new(),
            ShowTime::Summary => entries.len(),
            ShowTime::Top5 => 5,
        };

        let overall: Duration = entries.iter().map(|(_, stats)| stats.total).sum();
        let mut lines: Vec<String> = entries
            .iter()
            .take(limit)
            .map(|(name, stats)| {
                format!(
                    "{}: {:.3}s (avg. {:.3}s - {} result(s))",
                    name,
                    stats.total.as_secs_f64(),
                    stats.average().as_secs_f64(),
                    stats.calls
                )
            })
            .collect();
        lines.push(format!("Overall time: {:.3}s", overall.as_secs_f64()));
        lines
    }

    /// Print the summary through a logger
    pub fn show<L: ErrorLogger + ?Sized>(&self, mode: ShowTime, logger: &L) {
        for line in self.summary_lines(mode) {
            logger.report_out(&line);
        }
    }
}

/// Records the time between its creation and drop
pub struct Timer<'a> {
    results: &'a TimerResults,
    name: String,
    start: Instant,
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.results.add(&self.name, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_accumulates() {
        let results = TimerResults::new();
        results.add("read", Duration::from_millis(10));
        results.add("read", Duration::from_millis(30));

        let sorted = results.sorted();
        assert_eq!(sorted.len(), 1);
        assert_eq!(sorted[0].1.calls, 2);
        assert_eq!(sorted[0].1.total, Duration::from_millis(40));
        assert_eq!(sorted[0].1.average(), Duration::from_millis(20));
    }

    #[test]
    fn test_average_with_huge_call_count() {
        let stats = TimerStats {
            total: Duration::from_secs(1 << 32),
            calls: 1 << 32,
        };
        assert_eq!(stats.average(), Duration::from_secs(1));
    }

    #[test]
    fn test_scoped_timer_records_on_drop() {
        let results = TimerResults::new();
        {
            let _timer = results.start("pattern:todo");
        }
        assert_eq!(results.sorted()[0].0, "pattern:todo");
    }

    #[test]
    fn test_top5_limits_entries() {
        let results = TimerResults::new();
        for i in 0..8 {
            results.add(&format!("pass{}", i), Duration::from_millis(i + 1));
        }

        let lines = results.summary_lines(ShowTime::Top5);
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("pass7:"));
        assert!(lines[5].starts_with("Overall time:"));

        assert_eq!(results.summary_lines(ShowTime::Summary).len(), 9);
        assert!(results.summary_lines(ShowTime::None).is_empty());
    }
}
