use std::any::Any;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::ExecutionStrategy;
use super::forwarder::{Reporter, SyncLogForwarder};
use crate::engine::{CheckEngine, EngineFactory, ErrorLogger, Finding, Severity};
use crate::suppressions::{SharedSuppressions, SuppressionConflict, SuppressionRule};
use crate::timing::{ShowTime, TimerResults};
use crate::work::{FileSettings, ProgressCounters, SourceFile, WorkQueue};

/// Settings the scheduler reads for one run
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    /// Worker count; the threaded core is only engaged for more than one
    pub jobs: usize,
    /// Skip status reporting
    pub quiet: bool,
    /// Timing summary printed once all workers have finished
    pub showtime: ShowTime,
}

/// Called with the worker index right before that worker is launched.
/// Returning an error fails the launch.
pub type LaunchHook = Box<dyn Fn(usize) -> io::Result<()> + Send + Sync>;

/// Fatal scheduler outcome; no error total is produced
#[derive(Debug)]
pub enum ExecutorError {
    /// A worker thread could not be started. The run never continues with
    /// fewer workers than requested.
    WorkerLaunch {
        worker: usize,
        requested: usize,
        source: io::Error,
    },
    /// A worker died outside the per-file recovery (e.g. inside the reporter)
    WorkerPanicked { worker: Option<usize> },
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorError::WorkerLaunch {
                worker,
                requested,
                source,
            } => write!(
                f,
                "Failed to launch worker {} of {}: {}",
                worker + 1,
                requested,
                source
            ),
            ExecutorError::WorkerPanicked { worker: Some(worker) } => {
                write!(f, "Worker {} panicked", worker)
            }
            ExecutorError::WorkerPanicked { worker: None } => write!(f, "A worker thread panicked"),
        }
    }
}

impl std::error::Error for ExecutorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutorError::WorkerLaunch { source, .. } => Some(source),
            ExecutorError::WorkerPanicked { .. } => None,
        }
    }
}

/// One fetch/check/report loop with its own private engine
pub struct Worker<'a, F, R> {
    id: usize,
    queue: &'a WorkQueue,
    suppressions: &'a SharedSuppressions,
    forwarder: &'a SyncLogForwarder<R>,
    factory: &'a F,
}

impl<'a, F, R> Worker<'a, F, R>
where
    R: Reporter,
    F: EngineFactory<&'a SyncLogForwarder<R>>,
{
    pub fn new(
        id: usize,
        queue: &'a WorkQueue,
        suppressions: &'a SharedSuppressions,
        forwarder: &'a SyncLogForwarder<R>,
        factory: &'a F,
    ) -> Self {
        Self {
            id,
            queue,
            suppressions,
            forwarder,
            factory,
        }
    }

    fn new_engine(&self) -> F::Engine {
        self.factory
            .create(self.forwarder, self.suppressions.snapshot_global())
    }

    /// Run until the queue is exhausted; returns this worker's error total
    pub fn run(self) -> u32 {
        let mut engine = self.new_engine();
        let mut errors = 0u32;
        let mut units = 0usize;

        while let Some(item) = self.queue.next() {
            let name = item.display_name();
            let span = tracing::debug_span!("unit", worker = self.id, file = %name);
            let _enter = span.enter();
            tracing::debug!("Checking {}", name);

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| engine.check(&item)));
            let count = match outcome {
                Ok(Ok(count)) => count,
                Ok(Err(err)) => {
                    self.forwarder.report_err(&Finding::internal_error(
                        &item.path().display().to_string(),
                        format!("{:#}", err),
                    ));
                    1
                }
                Err(payload) => {
                    self.forwarder.report_err(&Finding::internal_error(
                        &item.path().display().to_string(),
                        format!("Checker panicked: {}", panic_message(payload.as_ref())),
                    ));
                    // Engine state is unknown after a panic
                    engine = self.new_engine();
                    1
                }
            };
            errors = errors.saturating_add(count);

            self.reconcile(engine.drain_suppressions());
            let progress = self.queue.complete(item.size());
            self.forwarder.report_status(&progress);
            units += 1;
        }

        tracing::debug!("Worker {} done: {} unit(s), {} error(s)", self.id, units, errors);
        errors
    }

    fn reconcile(&self, rules: Vec<SuppressionRule>) {
        for conflict in self.suppressions.reconcile(rules) {
            tracing::warn!("{}", conflict);
            self.forwarder.report_err(&conflict_finding(&conflict));
        }
    }
}

fn conflict_finding(conflict: &SuppressionConflict) -> Finding {
    Finding {
        id: "duplicateInlineSuppression".to_string(),
        severity: Severity::Information,
        message: conflict.to_string(),
        file: conflict.rule.file.clone().unwrap_or_default(),
        line: conflict.rule.line.unwrap_or(0),
        column: 0,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs a whole queue with a fixed number of workers and sums their totals.
///
/// The queue, the forwarder and the suppression handle are built once per run
/// and shared by reference with every worker. Each worker builds its own engine
/// from the factory.
pub struct ThreadExecutor<'f, F> {
    queue: WorkQueue,
    suppressions: Arc<SharedSuppressions>,
    factory: &'f F,
    settings: RunSettings,
    timer: Option<Arc<TimerResults>>,
    launch_hook: Option<LaunchHook>,
}

impl<'f, F> ThreadExecutor<'f, F> {
    pub fn new(
        files: Vec<SourceFile>,
        configs: Vec<FileSettings>,
        suppressions: Arc<SharedSuppressions>,
        factory: &'f F,
        settings: RunSettings,
    ) -> Self {
        Self {
            queue: WorkQueue::new(files, configs),
            suppressions,
            factory,
            settings,
            timer: None,
            launch_hook: None,
        }
    }

    /// Timing table to summarize after the run
    pub fn with_timer(mut self, timer: Arc<TimerResults>) -> Self {
        self.timer = Some(timer);
        self
    }

    pub fn with_launch_hook(mut self, hook: LaunchHook) -> Self {
        self.launch_hook = Some(hook);
        self
    }

    /// Progress of this executor's queue (an executor runs its queue once)
    pub fn progress(&self) -> ProgressCounters {
        self.queue.progress()
    }

    /// Build a forwarder over `reporter` and run every queued unit
    pub fn run_all<R>(&self, reporter: R) -> Result<u32, ExecutorError>
    where
        R: Reporter,
        F: for<'l> EngineFactory<&'l SyncLogForwarder<R>>,
    {
        let forwarder =
            SyncLogForwarder::new(reporter, Arc::clone(&self.suppressions), self.settings.quiet);
        self.run(&forwarder)
    }

    /// Run every queued unit, reporting through `forwarder`.
    ///
    /// `forwarder` should filter against the same suppression handle this
    /// executor was built with.
    pub fn run<R>(&self, forwarder: &SyncLogForwarder<R>) -> Result<u32, ExecutorError>
    where
        R: Reporter,
        F: for<'l> EngineFactory<&'l SyncLogForwarder<R>>,
    {
        let strategy = ExecutionStrategy::for_jobs(self.settings.jobs);
        tracing::info!(
            "Checking {} unit(s) with {} worker(s)",
            self.queue.total_units(),
            strategy.workers()
        );

        let total = match strategy {
            ExecutionStrategy::Sequential => self.run_sequential(forwarder)?,
            ExecutionStrategy::Parallel { workers } => self.run_parallel(forwarder, workers)?,
        };

        if self.settings.showtime.is_enabled()
            && let Some(timer) = &self.timer
        {
            timer.show(self.settings.showtime, forwarder);
        }

        let progress = self.queue.progress();
        tracing::info!(
            "Checked {}/{} unit(s), {} error(s)",
            progress.units_processed,
            progress.total_units,
            total
        );
        Ok(total)
    }

    fn run_sequential<R>(&self, forwarder: &SyncLogForwarder<R>) -> Result<u32, ExecutorError>
    where
        R: Reporter,
        F: for<'l> EngineFactory<&'l SyncLogForwarder<R>>,
    {
        let worker = Worker::new(0, &self.queue, &self.suppressions, forwarder, self.factory);
        panic::catch_unwind(AssertUnwindSafe(|| worker.run()))
            .map_err(|_| ExecutorError::WorkerPanicked { worker: Some(0) })
    }

    fn run_parallel<R>(
        &self,
        forwarder: &SyncLogForwarder<R>,
        requested: usize,
    ) -> Result<u32, ExecutorError>
    where
        R: Reporter,
        F: for<'l> EngineFactory<&'l SyncLogForwarder<R>>,
    {
        let outcome = crossbeam::thread::scope(|s| -> Result<u32, ExecutorError> {
            let mut handles = Vec::with_capacity(requested);

            for worker_id in 0..requested {
                let launched = self.before_launch(worker_id).and_then(|()| {
                    let worker = Worker::new(
                        worker_id,
                        &self.queue,
                        &self.suppressions,
                        forwarder,
                        self.factory,
                    );
                    s.builder()
                        .name(format!("parcheck-worker-{}", worker_id))
                        .spawn(move |_| worker.run())
                });

                match launched {
                    Ok(handle) => handles.push((worker_id, handle)),
                    Err(source) => {
                        let err = ExecutorError::WorkerLaunch {
                            worker: worker_id,
                            requested,
                            source,
                        };
                        tracing::error!("{}", err);

                        // Launched workers stop at their next fetch; their totals are dropped
                        self.queue.close();
                        for (_, handle) in handles {
                            let _ = handle.join();
                        }
                        return Err(err);
                    }
                }
            }

            let mut total = 0u32;
            let mut panicked = None;
            for (worker_id, handle) in handles {
                match handle.join() {
                    Ok(errors) => total = total.saturating_add(errors),
                    Err(_) => {
                        tracing::error!("Worker {} panicked", worker_id);
                        panicked.get_or_insert(worker_id);
                    }
                }
            }

            match panicked {
                Some(worker_id) => Err(ExecutorError::WorkerPanicked {
                    worker: Some(worker_id),
                }),
                None => Ok(total),
            }
        });

        match outcome {
            Ok(result) => result,
            Err(_) => Err(ExecutorError::WorkerPanicked { worker: None }),
        }
    }

    fn before_launch(&self, worker_id: usize) -> io::Result<()> {
        match &self.launch_hook {
            Some(hook) => hook(worker_id),
            None => Ok(()),
        }
    }
}
