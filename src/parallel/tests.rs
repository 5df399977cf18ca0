//! Scheduler tests
//!
//! A deterministic in-test engine keyed on file names stands in for the
//! pattern engine so the concurrency properties can be checked directly.

use super::*;
use crate::engine::{CheckEngine, EngineFactory, ErrorLogger, Finding, Severity};
use crate::suppressions::{SharedSuppressions, SuppressionDatabase, SuppressionRule};
use crate::timing::{ShowTime, TimerResults};
use crate::work::{FileSettings, ProgressCounters, SourceFile, WorkItem};
use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FakeFactory {
    seen: Arc<Mutex<Vec<(String, String)>>>,
    engines_created: Arc<AtomicUsize>,
}

impl FakeFactory {
    fn seen_units(&self) -> Vec<String> {
        let mut units: Vec<String> = self.seen.lock().unwrap().iter().map(|(_, unit)| unit.clone()).collect();
        units.sort();
        units
    }

    fn thread_names(&self) -> BTreeSet<String> {
        self.seen.lock().unwrap().iter().map(|(thread, _)| thread.clone()).collect()
    }
}

impl<L: ErrorLogger> EngineFactory<L> for FakeFactory {
    type Engine = FakeEngine<L>;

    fn create(&self, logger: L, global_rules: Vec<SuppressionRule>) -> FakeEngine<L> {
        self.engines_created.fetch_add(1, Ordering::SeqCst);
        FakeEngine {
            logger,
            seen: Arc::clone(&self.seen),
            global_rules,
            inline_rules: Vec::new(),
        }
    }
}

/// Errors per unit: file size modulo 7, or the number of enabled ids for
/// project entries. File names steer the special cases.
struct FakeEngine<L> {
    logger: L,
    seen: Arc<Mutex<Vec<(String, String)>>>,
    global_rules: Vec<SuppressionRule>,
    inline_rules: Vec<SuppressionRule>,
}

impl<L: ErrorLogger> CheckEngine for FakeEngine<L> {
    fn check(&mut self, item: &WorkItem) -> anyhow::Result<u32> {
        let file = item.path().display().to_string();
        let thread = std::thread::current().name().unwrap_or("main").to_string();
        self.seen.lock().unwrap().push((thread, item.display_name()));

        if file.contains("panic") {
            panic!("engine blew up on {}", file);
        }
        if file.contains("fail") {
            anyhow::bail!("cannot parse {}", file);
        }
        if file.contains("inline") {
            self.inline_rules.push(SuppressionRule::inline("inl", &file, Some(3))?);
        }
        if file.contains("hit") {
            let finding = finding("hit", &file, 2);
            if !self.global_rules.iter_mut().any(|rule| rule.try_suppress(&finding)) {
                self.logger.report_err(&finding);
            }
        }

        self.logger.report_err(&finding("unit", &file, 1));
        Ok(match item {
            WorkItem::SourceFile(source) => (source.size % 7) as u32,
            WorkItem::ParsedConfig(settings) => settings.enable.len() as u32,
        })
    }

    fn drain_suppressions(&mut self) -> Vec<SuppressionRule> {
        let mut rules = std::mem::take(&mut self.inline_rules);
        rules.extend(self.global_rules.iter().cloned());
        rules
    }
}

fn finding(id: &str, file: &str, line: usize) -> Finding {
    Finding {
        id: id.to_string(),
        severity: Severity::Warning,
        message: format!("{} found", id),
        file: file.to_string(),
        line,
        column: 1,
    }
}

#[derive(Default)]
struct Recording {
    out: Vec<String>,
    findings: Vec<Finding>,
    statuses: Vec<ProgressCounters>,
}

impl Reporter for Recording {
    fn report_out(&mut self, text: &str) {
        self.out.push(text.to_string());
    }

    fn report_err(&mut self, finding: &Finding) {
        self.findings.push(finding.clone());
    }

    fn report_metric(&mut self, _text: &str) {}

    fn report_status(&mut self, progress: &ProgressCounters) {
        self.statuses.push(*progress);
    }
}

fn settings(jobs: usize) -> RunSettings {
    RunSettings {
        jobs,
        quiet: false,
        showtime: ShowTime::None,
    }
}

fn files(count: usize) -> Vec<SourceFile> {
    (0..count)
        .map(|i| SourceFile::new(format!("src/f{:03}.c", i), i as u64))
        .collect()
}

fn configs(count: usize) -> Vec<FileSettings> {
    (0..count)
        .map(|i| FileSettings {
            path: PathBuf::from(format!("cfg/p{}.c", i)),
            label: Some(format!("cfg{}", i)),
            enable: vec!["a".to_string(); i],
        })
        .collect()
}

fn shared(rules: Vec<SuppressionRule>) -> Arc<SharedSuppressions> {
    Arc::new(SharedSuppressions::new(SuppressionDatabase::from_rules(rules)))
}

struct Outcome {
    result: Result<u32, ExecutorError>,
    report: Recording,
    progress: ProgressCounters,
}

fn execute(
    executor: ThreadExecutor<'_, FakeFactory>,
    suppressions: &Arc<SharedSuppressions>,
    quiet: bool,
) -> Outcome {
    let forwarder = SyncLogForwarder::new(Recording::default(), Arc::clone(suppressions), quiet);
    let result = executor.run(&forwarder);
    Outcome {
        result,
        report: forwarder.into_reporter(),
        progress: executor.progress(),
    }
}

#[test]
fn test_strategy_for_jobs() {
    assert_eq!(ExecutionStrategy::for_jobs(0), ExecutionStrategy::Sequential);
    assert_eq!(ExecutionStrategy::for_jobs(1), ExecutionStrategy::Sequential);
    assert_eq!(ExecutionStrategy::for_jobs(3), ExecutionStrategy::Parallel { workers: 3 });
    assert_eq!(ExecutionStrategy::for_jobs(3).workers(), 3);
    assert_eq!(ExecutionStrategy::Sequential.workers(), 1);
}

#[test]
fn test_resolve_jobs() {
    assert_eq!(ExecutionStrategy::resolve_jobs(3, 50), 3);
    assert!(ExecutionStrategy::resolve_jobs(0, 100) >= 1);
    assert_eq!(ExecutionStrategy::resolve_jobs(0, 1), std::cmp::max(1, num_cpus::get() / 100));
}

#[test]
fn test_every_unit_checked_once_for_any_worker_count() {
    let mut expected: Vec<String> = files(40)
        .into_iter()
        .map(|f| WorkItem::SourceFile(f).display_name())
        .chain(configs(5).into_iter().map(|c| WorkItem::ParsedConfig(c).display_name()))
        .collect();
    expected.sort();

    let mut totals = BTreeSet::new();
    for jobs in 1..=8 {
        let factory = FakeFactory::default();
        let suppressions = shared(Vec::new());
        let executor = ThreadExecutor::new(files(40), configs(5), Arc::clone(&suppressions), &factory, settings(jobs));
        let outcome = execute(executor, &suppressions, false);

        totals.insert(outcome.result.unwrap());
        assert_eq!(factory.seen_units(), expected, "jobs={}", jobs);
        assert_eq!(outcome.progress.units_processed, 45);
        assert_eq!(outcome.progress.bytes_processed, (0..40).sum::<u64>());
    }

    assert_eq!(totals.len(), 1, "error total must not depend on worker count");
}

#[test]
fn test_two_files_two_workers() {
    let factory = FakeFactory::default();
    let suppressions = shared(Vec::new());
    let queue = vec![SourceFile::new("fileA.c", 10), SourceFile::new("fileB.c", 20)];
    let executor = ThreadExecutor::new(queue, Vec::new(), Arc::clone(&suppressions), &factory, settings(2));
    let outcome = execute(executor, &suppressions, false);

    assert_eq!(outcome.result.unwrap(), 3 + 6);
    assert_eq!(factory.seen_units(), vec!["fileA.c".to_string(), "fileB.c".to_string()]);
    assert_eq!(outcome.progress.units_processed, 2);
    assert_eq!(outcome.progress.bytes_processed, 30);
    assert_eq!(outcome.report.statuses.len(), 2);
}

#[test]
fn test_empty_queue_launches_all_workers() {
    let factory = FakeFactory::default();
    let suppressions = shared(Vec::new());
    let executor = ThreadExecutor::new(Vec::new(), Vec::new(), Arc::clone(&suppressions), &factory, settings(4));
    let outcome = execute(executor, &suppressions, false);

    assert_eq!(outcome.result.unwrap(), 0);
    assert_eq!(factory.engines_created.load(Ordering::SeqCst), 4);
    assert!(outcome.report.findings.is_empty());
}

#[test]
fn test_workers_are_named_threads() {
    let factory = FakeFactory::default();
    let suppressions = shared(Vec::new());
    let executor = ThreadExecutor::new(files(30), Vec::new(), Arc::clone(&suppressions), &factory, settings(3));
    execute(executor, &suppressions, true).result.unwrap();

    for name in factory.thread_names() {
        assert!(name.starts_with("parcheck-worker-"), "unexpected thread {}", name);
    }
}

#[test]
fn test_launch_failure_is_fatal() {
    let factory = FakeFactory::default();
    let suppressions = shared(Vec::new());
    let executor = ThreadExecutor::new(files(50), Vec::new(), Arc::clone(&suppressions), &factory, settings(4))
        .with_launch_hook(Box::new(|worker| {
            if worker == 2 {
                Err(io::Error::other("thread limit reached"))
            } else {
                Ok(())
            }
        }));
    let outcome = execute(executor, &suppressions, false);

    let err = outcome.result.unwrap_err();
    assert!(matches!(
        err,
        ExecutorError::WorkerLaunch {
            worker: 2,
            requested: 4,
            ..
        }
    ));
    assert_eq!(err.to_string(), "Failed to launch worker 3 of 4: thread limit reached");
    assert!(std::error::Error::source(&err).is_some());
    assert_eq!(factory.engines_created.load(Ordering::SeqCst), 2, "only the launched workers ran");
}

#[test]
fn test_global_rule_matched_in_one_worker_is_visible() {
    let rule = SuppressionRule::parse("hit").unwrap();
    let key = rule.key();
    let factory = FakeFactory::default();
    let suppressions = shared(vec![rule]);
    let queue = vec![SourceFile::new("fileA-hit.c", 1), SourceFile::new("fileB.c", 1)];
    let executor = ThreadExecutor::new(queue, Vec::new(), Arc::clone(&suppressions), &factory, settings(2));
    let outcome = execute(executor, &suppressions, false);

    outcome.result.unwrap();
    assert!(suppressions.get(&key).unwrap().matched);
    assert!(outcome.report.findings.iter().all(|f| f.id != "hit"));
}

#[test]
fn test_inline_rules_are_folded_into_database() {
    let factory = FakeFactory::default();
    let suppressions = shared(Vec::new());
    let queue = vec![SourceFile::new("x-inline.c", 0), SourceFile::new("y.c", 0)];
    let executor = ThreadExecutor::new(queue, Vec::new(), Arc::clone(&suppressions), &factory, settings(2));
    execute(executor, &suppressions, false).result.unwrap();

    let rule = SuppressionRule::inline("inl", "x-inline.c", Some(3)).unwrap();
    let stored = suppressions.get(&rule.key()).unwrap();
    assert!(stored.is_inline);
    assert_eq!(suppressions.len(), 1);
}

#[test]
fn test_duplicate_inline_is_reported_but_not_counted() {
    let factory = FakeFactory::default();
    let suppressions = shared(Vec::new());
    let project = vec![FileSettings {
        path: PathBuf::from("dup-inline.c"),
        label: None,
        enable: Vec::new(),
    }];
    let executor = ThreadExecutor::new(
        vec![SourceFile::new("dup-inline.c", 0)],
        project,
        Arc::clone(&suppressions),
        &factory,
        settings(1),
    );
    let outcome = execute(executor, &suppressions, false);

    assert_eq!(outcome.result.unwrap(), 0);
    assert_eq!(suppressions.len(), 1);

    let conflicts: Vec<&Finding> = outcome
        .report
        .findings
        .iter()
        .filter(|f| f.id == "duplicateInlineSuppression")
        .collect();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].severity, Severity::Information);
    assert_eq!(conflicts[0].line, 3);

    let units = outcome.report.findings.iter().filter(|f| f.id == "unit").count();
    assert_eq!(units, 1, "identical findings are forwarded once");
}

#[test]
fn test_failures_and_panics_are_recovered_per_file() {
    let factory = FakeFactory::default();
    let suppressions = shared(Vec::new());
    let queue = vec![
        SourceFile::new("ok.c", 3),
        SourceFile::new("bad-fail.c", 0),
        SourceFile::new("bad-panic.c", 0),
        SourceFile::new("later.c", 2),
    ];
    let executor = ThreadExecutor::new(queue, Vec::new(), Arc::clone(&suppressions), &factory, settings(1));
    let outcome = execute(executor, &suppressions, false);

    assert_eq!(outcome.result.unwrap(), 3 + 1 + 1 + 2);
    assert_eq!(outcome.progress.units_processed, 4);
    assert_eq!(factory.engines_created.load(Ordering::SeqCst), 2, "engine rebuilt after panic");

    let internal: Vec<&Finding> = outcome
        .report
        .findings
        .iter()
        .filter(|f| f.id == "internalError")
        .collect();
    assert_eq!(internal.len(), 2);
    assert!(internal.iter().all(|f| f.severity == Severity::Error));
    assert!(internal.iter().any(|f| f.file == "bad-fail.c" && f.message.contains("cannot parse")));
    assert!(internal.iter().any(|f| f.file == "bad-panic.c" && f.message.contains("engine blew up")));
}

#[test]
fn test_quiet_run_skips_status() {
    let factory = FakeFactory::default();
    let suppressions = shared(Vec::new());
    let executor = ThreadExecutor::new(files(12), Vec::new(), Arc::clone(&suppressions), &factory, settings(3));
    let outcome = execute(executor, &suppressions, true);
    outcome.result.unwrap();
    assert!(outcome.report.statuses.is_empty());

    let factory = FakeFactory::default();
    let executor = ThreadExecutor::new(files(12), Vec::new(), Arc::clone(&suppressions), &factory, settings(3));
    let outcome = execute(executor, &suppressions, false);
    outcome.result.unwrap();
    assert_eq!(outcome.report.statuses.len(), 12);
    let last = outcome.report.statuses.iter().map(|s| s.units_processed).max();
    assert_eq!(last, Some(12));
}

#[test]
fn test_forwarder_drops_suppressed_findings() {
    let factory = FakeFactory::default();
    let suppressions = shared(vec![SuppressionRule::parse("unit:src/f001.c").unwrap()]);
    let executor = ThreadExecutor::new(files(3), Vec::new(), Arc::clone(&suppressions), &factory, settings(2));
    let outcome = execute(executor, &suppressions, true);
    outcome.result.unwrap();

    let reported: BTreeSet<&str> = outcome.report.findings.iter().map(|f| f.file.as_str()).collect();
    assert_eq!(reported, BTreeSet::from(["src/f000.c", "src/f002.c"]));
}

#[test]
fn test_timing_summary_after_join() {
    let factory = FakeFactory::default();
    let suppressions = shared(Vec::new());
    let timer = Arc::new(TimerResults::new());
    timer.add("check", Duration::from_millis(5));

    let mut run = settings(2);
    run.showtime = ShowTime::Summary;
    let executor = ThreadExecutor::new(files(4), Vec::new(), Arc::clone(&suppressions), &factory, run)
        .with_timer(Arc::clone(&timer));
    let outcome = execute(executor, &suppressions, true);
    outcome.result.unwrap();

    assert_eq!(outcome.report.out.len(), 2);
    assert!(outcome.report.out[0].starts_with("check: "));
    assert!(outcome.report.out[1].starts_with("Overall time:"));
}

/// Writes one character at a time, yielding in between
#[derive(Default)]
struct SlowWriter {
    text: String,
}

impl Reporter for SlowWriter {
    fn report_out(&mut self, text: &str) {
        for c in text.chars().chain(std::iter::once('\n')) {
            self.text.push(c);
            std::thread::yield_now();
        }
    }

    fn report_err(&mut self, finding: &Finding) {
        self.report_out(&finding.to_string());
    }

    fn report_metric(&mut self, text: &str) {
        self.report_out(text);
    }

    fn report_status(&mut self, progress: &ProgressCounters) {
        self.report_out(&progress.status_line());
    }
}

#[test]
fn test_concurrent_messages_are_not_interleaved() {
    let factory = FakeFactory::default();
    let suppressions = shared(Vec::new());
    let executor = ThreadExecutor::new(files(200), Vec::new(), Arc::clone(&suppressions), &factory, settings(8));
    let forwarder = SyncLogForwarder::new(SlowWriter::default(), Arc::clone(&suppressions), false);
    executor.run(&forwarder).unwrap();

    let text = forwarder.into_reporter().text;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 400);

    let expected: BTreeSet<String> = files(200)
        .iter()
        .map(|f| finding("unit", &f.path.display().to_string(), 1).to_string())
        .collect();
    let findings: BTreeSet<String> = lines
        .iter()
        .filter(|line| !line.contains("files checked"))
        .map(|line| line.to_string())
        .collect();
    assert_eq!(findings, expected);

    let statuses = lines.iter().filter(|line| line.contains("files checked")).count();
    assert_eq!(statuses, 200);
    assert!(lines.contains(&"200/200 files checked 100% done"));
}

/// Panics on the first status report
struct BrokenReporter;

impl Reporter for BrokenReporter {
    fn report_out(&mut self, _text: &str) {}
    fn report_err(&mut self, _finding: &Finding) {}
    fn report_metric(&mut self, _text: &str) {}

    fn report_status(&mut self, _progress: &ProgressCounters) {
        panic!("display went away");
    }
}

#[test]
fn test_panic_outside_engine_is_fatal() {
    let factory = FakeFactory::default();
    let suppressions = shared(Vec::new());
    let executor = ThreadExecutor::new(files(4), Vec::new(), Arc::clone(&suppressions), &factory, settings(2));
    let result = executor.run_all(BrokenReporter);
    assert!(matches!(result, Err(ExecutorError::WorkerPanicked { .. })));

    let executor = ThreadExecutor::new(files(1), Vec::new(), Arc::clone(&suppressions), &factory, settings(1));
    let result = executor.run_all(BrokenReporter);
    assert!(matches!(result, Err(ExecutorError::WorkerPanicked { worker: Some(0) })));
}
