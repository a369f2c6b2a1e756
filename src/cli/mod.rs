//! The `runner` command-line interface.
//!
//! Merges flags with the optional harness file, loads fixtures, drives the scheduler on
//! a multi-threaded tokio runtime, and streams the report to stdout. Logging goes to
//! stderr and is controlled by `RUNNER_LOG`.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::cancel::cancel_pair;
use crate::config::{default_jobs, CommandTable, HarnessFile, RunConfig, DEFAULT_COMPILER, DEFAULT_TIMEOUT};
use crate::diagnostics::HarnessError;
use crate::fixture::HeaderSyntax;
use crate::process::SystemDriver;
use crate::report::{Aggregator, Style};
use crate::runner::CaseRunner;
use crate::scheduler::Scheduler;
use crate::testing::{CaseLoader, GlobFilter};

pub mod args;
pub mod output;

use args::{Format, RunnerArgs};

/// Exit code for an unusable invocation.
pub const EXIT_INVOCATION: i32 = 2;

/// Runs the CLI and returns the process exit code.
pub fn run() -> i32 {
    let args = match RunnerArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() { EXIT_INVOCATION } else { 0 };
        }
    };
    init_tracing(args.verbose);

    match execute(&args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:?}", miette::Report::new(err));
            EXIT_INVOCATION
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "info" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUNNER_LOG").unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn execute(args: &RunnerArgs) -> Result<i32, HarnessError> {
    let file = match &args.config {
        Some(path) => HarnessFile::load(path)?,
        None => HarnessFile::default(),
    };
    let loader = case_loader(args, &file)?;
    let config = Arc::new(run_config(args, file));

    let loaded = loader.load(&args.paths)?;
    debug!(
        cases = loaded.cases.len(),
        load_errors = loaded.errors.len(),
        "fixtures loaded"
    );

    let style = match args.format {
        Format::Text => Style::Text {
            verbose: args.verbose,
        },
        Format::Json => Style::Json,
    };
    let stdout = output::report_stream(args.color, args.format);
    let mut aggregator = Aggregator::new(stdout.lock(), style);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(HarnessError::Runtime)?;

    let scheduler = Scheduler::new(config.jobs);
    let runner = Arc::new(CaseRunner::new(SystemDriver, config));
    let mut write_error = None;
    let slots = runtime.block_on(async {
        let (handle, signal) = cancel_pair();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; terminating in-flight cases");
                handle.cancel();
            }
        });
        scheduler
            .run(runner, &loaded.cases, signal, |outcome| {
                if let Err(err) = aggregator.case(outcome) {
                    write_error.get_or_insert(err);
                }
            })
            .await
    });
    // Reader tasks of killed processes must not keep the runtime alive.
    runtime.shutdown_timeout(Duration::from_secs(1));

    if let Some(err) = write_error {
        return Err(HarnessError::Report(err));
    }
    for error in &loaded.errors {
        aggregator.load_error(error).map_err(HarnessError::Report)?;
    }
    let summary = aggregator
        .finish(slots.not_run())
        .map_err(HarnessError::Report)?;
    Ok(summary.exit_code())
}

/// Builds the loader: CLI flags win over the harness file, which wins over defaults.
fn case_loader(args: &RunnerArgs, file: &HarnessFile) -> Result<CaseLoader, HarnessError> {
    let mut syntax = HeaderSyntax::default();
    if let Some(rule) = file.continuation {
        syntax = syntax.with_continuation(rule);
    }
    if let Some(prefix) = &args.comment {
        syntax = syntax.with_comment_prefix(prefix.clone());
    }

    let extensions = if !args.extensions.is_empty() {
        args.extensions.clone()
    } else if !file.extensions.is_empty() {
        file.extensions.clone()
    } else {
        vec!["c".to_string()]
    };
    let filter = args.filter.as_deref().map(GlobFilter::new).transpose()?;

    let mut loader = CaseLoader::new(syntax)
        .with_extensions(extensions)
        .with_filter(filter);
    // An explicit --comment applies to every file.
    if args.comment.is_none() {
        for (extension, prefix) in &file.comment_prefix {
            loader = loader.with_comment_prefix(extension, prefix.clone());
        }
    }
    Ok(loader)
}

fn run_config(args: &RunnerArgs, file: HarnessFile) -> RunConfig {
    let jobs = args
        .jobs
        .map(|n| n as usize)
        .or(file.jobs)
        .unwrap_or_else(default_jobs)
        .max(1);
    let timeout = args
        .timeout
        .or(file.timeout)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT);
    let default_compiler = args
        .compiler
        .clone()
        .or(file.default_compiler)
        .unwrap_or_else(|| DEFAULT_COMPILER.to_string());

    RunConfig {
        default_compiler,
        commands: CommandTable::new(file.commands),
        timeout,
        jobs,
        keep_artifacts: args.keep_artifacts,
    }
}
