//! `parcheck check`: discover files, run the scheduler, report the total

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::cli::Output;
use crate::config::{CliOverrides, ParcheckConfig, RunOverrides, SuppressionOverrides};
use crate::engine::pattern_engine::EngineSettings;
use crate::engine::patterns::patterns_from_config;
use crate::engine::{ErrorLogger, PatternEngineFactory};
use crate::parallel::{ExecutorError, RunSettings, SyncLogForwarder, ThreadExecutor};
use crate::report::{ConsoleReporter, OutputFormat};
use crate::suppressions::{SharedSuppressions, SuppressionDatabase, SuppressionRule};
use crate::timing::{ShowTime, TimerResults};
use crate::work::{FileDiscovery, ProgressCounters, load_project};

#[derive(Args, Debug, Default)]
pub struct CheckArgs {
    /// Files or directories to check (default: current directory)
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Number of worker threads (0 = auto)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// JSON project manifest of pre-parsed file entries
    #[arg(long, value_name = "FILE")]
    pub project: Option<PathBuf>,

    /// Extra suppression rule `id[:file[:line]]` (repeatable)
    #[arg(long = "suppress", value_name = "RULE")]
    pub suppress: Vec<String>,

    /// Print a timing summary after the run
    #[arg(long, value_enum)]
    pub showtime: Option<ShowTime>,

    /// Report format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Emit one metric line per checked file
    #[arg(long)]
    pub metrics: bool,

    /// Ignore parcheck:ignore comments
    #[arg(long)]
    pub no_inline_suppressions: bool,

    /// Report suppressions that never fired
    #[arg(long)]
    pub report_unmatched: bool,

    /// Exit status when errors are found
    #[arg(long, value_name = "N")]
    pub error_exitcode: Option<i32>,
}

impl CheckArgs {
    fn overrides(&self, quiet: bool) -> CliOverrides {
        CliOverrides {
            run: RunOverrides {
                jobs: self.jobs,
                quiet: quiet.then_some(true),
                showtime: self.showtime,
                error_exitcode: self.error_exitcode,
                metrics: self.metrics.then_some(true),
            },
            suppressions: SuppressionOverrides {
                inline: self.no_inline_suppressions.then_some(false),
                report_unmatched: self.report_unmatched.then_some(true),
            },
        }
    }
}

/// What a finished check produced
struct CheckOutcome {
    result: Result<u32, ExecutorError>,
    progress: ProgressCounters,
    findings: usize,
    workers: usize,
}

pub async fn execute(
    args: CheckArgs,
    verbose: u8,
    quiet: bool,
    custom_config: Option<&str>,
) -> Result<()> {
    let start_time = Instant::now();

    let config = ParcheckConfig::load(custom_config, Some(&args.overrides(quiet)))?;
    config.validate()?;

    let output = Output::new(
        verbose > 0,
        config.run.quiet || args.format == OutputFormat::Json,
    );
    let error_exitcode = config.run.error_exitcode;

    let outcome = tokio::task::spawn_blocking(move || run_check(&config, &args))
        .await
        .context("Check task failed")??;

    let total = match outcome.result {
        Ok(total) => total,
        Err(err) => {
            output.error(&format!("Check aborted: {}", err));
            std::process::exit(1);
        }
    };

    output.blank_line();
    output.summary_stats("Files checked:", outcome.progress.units_processed);
    output.summary_stats("Workers:", outcome.workers);
    output.summary_stats("Findings:", outcome.findings);
    output.summary_stats("Errors:", total as usize);
    output.verbose(&format!("Finished in {:.2}s", start_time.elapsed().as_secs_f64()));

    if total > 0 {
        output.error(&format!("{} error(s) found", total));
        std::process::exit(error_exitcode);
    }

    output.success("No errors found");
    Ok(())
}

fn run_check(config: &ParcheckConfig, args: &CheckArgs) -> Result<CheckOutcome> {
    let files = if args.paths.is_empty() && args.project.is_some() {
        Vec::new()
    } else {
        let paths = if args.paths.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            args.paths.clone()
        };
        FileDiscovery::new(&config.files)?.discover(&paths)?
    };

    let configs = match &args.project {
        Some(manifest) => load_project(manifest)?,
        None => Vec::new(),
    };

    let mut rules = config.suppression_rules()?;
    for rule in &args.suppress {
        rules.push(SuppressionRule::parse(rule)?);
    }
    let suppressions = Arc::new(SharedSuppressions::new(SuppressionDatabase::from_rules(
        rules,
    )));

    let patterns = patterns_from_config(&config.patterns)?;
    if patterns.is_empty() {
        tracing::warn!("No patterns enabled; nothing will be reported");
    }

    let timer = Arc::new(TimerResults::new());
    let mut factory = PatternEngineFactory::new(
        patterns,
        EngineSettings {
            inline_suppressions: config.suppressions.inline,
            metrics: config.run.metrics,
            max_file_size: config.max_file_size_bytes(),
            report_unmatched: config.suppressions.report_unmatched,
        },
    );
    if config.run.showtime.is_enabled() {
        factory = factory.with_timer(Arc::clone(&timer));
    }

    let workers = config.effective_jobs();
    let executor = ThreadExecutor::new(
        files,
        configs,
        Arc::clone(&suppressions),
        &factory,
        RunSettings {
            jobs: workers,
            quiet: config.run.quiet,
            showtime: config.run.showtime,
        },
    )
    .with_timer(timer);

    let forwarder = SyncLogForwarder::new(
        ConsoleReporter::stdout(args.format),
        Arc::clone(&suppressions),
        config.run.quiet,
    );
    let result = executor.run(&forwarder);

    if result.is_ok() && config.suppressions.report_unmatched {
        for rule in suppressions.unmatched() {
            forwarder.report_err(&rule.unmatched_finding());
        }
    }

    Ok(CheckOutcome {
        result,
        progress: executor.progress(),
        findings: forwarder.into_reporter().findings_reported(),
        workers,
    })
}
