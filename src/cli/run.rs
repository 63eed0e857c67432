//! Run command implementation

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Local};
use thiserror::Error;

use super::{RunArgs, EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};
use crate::config::{load_project, EnvOverrides, RunSettings};
use crate::exec::{ExecutorPool, ScriptRunner};
use crate::record::{ConsoleSink, MainLog};
use crate::report::{
    read_rerun_list, write_rerun_list, ConsoleProgress, JsonProgress, ProgressEvent,
    ProgressReporter, RerunError, RunReport,
};
use crate::scan::{format_tags, ScanError};
use crate::schedule::restrict_to;

/// Harness misuse that aborts a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Rerun(#[from] RerunError),
    #[error("cannot write logs to {}: {source}", path.display())]
    Logs {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Run the examples
pub fn run_examples(args: &RunArgs) -> ExitCode {
    let started = Local::now();

    let (config, project_root) = match load_project(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };
    tracing::debug!(root = %project_root.display(), "project root");

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            eprintln!("Error: cannot read current directory: {}", e);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };
    let overrides = args.overrides().relative_to(&cwd);

    let env = EnvOverrides::from_env();
    let settings = match RunSettings::resolve(config, project_root, &env, &overrides, started) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };

    if args.print_auto_skip {
        for relpath in settings.auto_skip.iter() {
            println!("{}", relpath);
        }
        return ExitCode::from(EXIT_SUCCESS);
    }

    let console = Arc::new(ConsoleSink::stdout());
    let progress: Box<dyn ProgressReporter> = if settings.json {
        Box::new(JsonProgress::new())
    } else {
        Box::new(
            ConsoleProgress::new(Arc::clone(&console))
                .with_colors(atty::is(atty::Stream::Stdout))
                .with_verbose(settings.verbose),
        )
    };

    let report = match execute(&settings, &console, progress.as_ref(), started) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };

    if report.results.is_empty() {
        console.line("No example entry points found that match the filters.");
    } else {
        let mut lines = vec![String::new()];
        lines.extend(report.summary().lines().map(String::from));
        lines.push(format!("Main log: {}", settings.main_log.display()));
        console.lines(lines);
        progress.report(ProgressEvent::completed(&report));
    }

    if settings.write_rerun {
        let failed = report.failed_relpaths();
        if let Err(e) = write_rerun_list(&settings.rerun_path, &failed) {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
        console.line(&format!(
            "Wrote {} failed script(s) to {}",
            failed.len(),
            settings.rerun_path.display()
        ));
    }

    if report.is_success() {
        ExitCode::from(EXIT_SUCCESS)
    } else {
        ExitCode::from(EXIT_ERROR)
    }
}

/// Discover, plan and run. Script failures are part of the report.
fn execute(
    settings: &RunSettings,
    console: &ConsoleSink,
    progress: &dyn ProgressReporter,
    started: DateTime<Local>,
) -> Result<RunReport, RunError> {
    let mut entries = settings.scanner().scan(&settings.filters)?;

    if let Some(path) = &settings.rerun_filter {
        let wanted = read_rerun_list(path)?;
        let (kept, missing) = restrict_to(entries, &wanted);
        for relpath in missing {
            progress.report(ProgressEvent::Warning {
                relpath: Some(relpath),
                message: "listed in the rerun file but not discovered".to_string(),
            });
        }
        entries = kept;
    }

    if entries.is_empty() {
        return Ok(RunReport::default());
    }

    for entry in &entries {
        progress.report(ProgressEvent::Discovered {
            relpath: entry.relpath.clone(),
            tags: format_tags(&entry.tags),
        });
    }

    let plan = settings.scheduler().plan(entries);
    if plan.fail_fast_ignored() {
        progress.report(ProgressEvent::Warning {
            relpath: None,
            message: "--fail-fast only applies to serial runs; ignoring it with more than one job"
                .to_string(),
        });
    }
    if plan.concurrency() < settings.jobs {
        progress.report(ProgressEvent::Warning {
            relpath: None,
            message: "interactive scripts selected; running one at a time".to_string(),
        });
    }

    let logs_error = |path: &PathBuf| {
        let path = path.clone();
        move |source: std::io::Error| RunError::Logs { path, source }
    };
    std::fs::create_dir_all(&settings.logs_dir).map_err(logs_error(&settings.logs_dir))?;
    let header = format!(
        "exrun started={} jobs={} automation={} dry_run={}",
        started.format("%Y-%m-%dT%H:%M:%S%:z"),
        plan.concurrency(),
        settings.automation,
        settings.dry_run
    );
    let main_log =
        MainLog::create(&settings.main_log, &header).map_err(logs_error(&settings.main_log))?;

    progress.report(ProgressEvent::RunStarted {
        total: plan.len(),
        to_run: plan.run_count(),
        skipped: plan.skip_count(),
        jobs: plan.concurrency(),
        automation: settings.automation,
        dry_run: settings.dry_run,
    });

    let env = settings.child_env();
    let runner = ScriptRunner::new(
        &settings.launcher,
        &settings.project_root,
        &settings.logs_dir,
        &env,
        console,
    );
    let report = ExecutorPool::new(runner, &main_log, progress)
        .with_dry_run(settings.dry_run)
        .run(&plan);

    tracing::debug!(
        passed = report.passed_count(),
        failed = report.failed_count(),
        skipped = report.skipped_count(),
        "run finished"
    );
    Ok(report)
}
