//! Run progress reporting.
//!
//! Every skip, pass, failure and dry-run is echoed as soon as it is known.
//! Console output goes through the shared [`ConsoleSink`] so status lines
//! never split a buffered output block.
//!
//! # Example
//!
//! ```ignore
//! use exrun::report::progress::{ConsoleProgress, ProgressEvent, ProgressReporter};
//!
//! let reporter = ConsoleProgress::new(console).with_verbose(true);
//! reporter.report(ProgressEvent::ScriptStarted {
//!     relpath: "examples/basic/hello.py".to_string(),
//!     command: "uv run python -m examples.basic.hello".to_string(),
//! });
//! ```

use crate::record::ConsoleSink;
use crate::report::{ExecutionResult, RunReport, RunStatus};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Events reported during a run.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// An entry was discovered (reported before planning output)
    Discovered {
        relpath: String,
        /// Comma-separated tags, `-` when untagged
        tags: String,
    },
    /// Planning finished
    RunStarted {
        total: usize,
        to_run: usize,
        skipped: usize,
        jobs: usize,
        automation: bool,
        dry_run: bool,
    },
    /// A script process is about to start
    ScriptStarted { relpath: String, command: String },
    /// A script's outcome is known
    ScriptFinished { result: ExecutionResult },
    /// All entries have results
    RunCompleted {
        success: bool,
        duration_ms: u64,
        passed: usize,
        failed: usize,
        skipped: usize,
        dry_run: usize,
    },
    /// A warning was generated
    Warning { relpath: Option<String>, message: String },
}

impl ProgressEvent {
    /// Completion event for a finished report.
    pub fn completed(report: &RunReport) -> Self {
        ProgressEvent::RunCompleted {
            success: report.is_success(),
            duration_ms: report.total_duration.as_millis() as u64,
            passed: report.passed_count(),
            failed: report.failed_count(),
            skipped: report.skipped_count(),
            dry_run: report.dry_run_count(),
        }
    }
}

/// Trait for progress reporters.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event.
    fn report(&self, event: ProgressEvent);
}

/// A progress reporter that discards all events.
#[derive(Debug, Default)]
pub struct NullProgress;

impl NullProgress {
    pub fn new() -> Self {
        Self
    }
}

impl ProgressReporter for NullProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Console progress reporter with optional colors.
#[derive(Debug)]
pub struct ConsoleProgress {
    use_colors: bool,
    verbose: bool,
    console: Arc<ConsoleSink>,
}

impl ConsoleProgress {
    /// Reporter writing through `console`, without colors.
    pub fn new(console: Arc<ConsoleSink>) -> Self {
        Self { use_colors: false, verbose: false, console }
    }

    /// Set whether to use colors.
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn color(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("{}{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    fn green(&self, text: &str) -> String {
        self.color(text, "\x1b[32m")
    }

    fn yellow(&self, text: &str) -> String {
        self.color(text, "\x1b[33m")
    }

    fn red(&self, text: &str) -> String {
        self.color(text, "\x1b[31m")
    }

    fn cyan(&self, text: &str) -> String {
        self.color(text, "\x1b[36m")
    }

    fn bold(&self, text: &str) -> String {
        self.color(text, "\x1b[1m")
    }

    fn finished_lines(&self, result: &ExecutionResult) -> Vec<String> {
        let mut lines = Vec::new();
        match result.status {
            RunStatus::Passed => lines.push(format!(
                "{} {} ({})",
                self.green("[ok]"),
                result.relpath,
                format_duration(result.duration.as_millis() as u64)
            )),
            RunStatus::Failed => {
                lines.push(format!(
                    "{} {} ({})",
                    self.red("[FAILED]"),
                    result.relpath,
                    result.reason.as_deref().unwrap_or("failed")
                ));
                if let Some(log) = &result.log_path {
                    lines.push(format!("        log: {}", log.display()));
                }
            }
            RunStatus::Skipped => lines.push(format!(
                "{} {} ({})",
                self.yellow("[skip]"),
                result.relpath,
                result.reason.as_deref().unwrap_or("-")
            )),
            RunStatus::DryRun => {
                lines.push(format!("{} would run {}", self.cyan("[dry-run]"), result.relpath));
                if let Some(command) = &result.command {
                    lines.push(format!("        cmd: {}", command));
                }
            }
        }
        lines
    }
}

impl ProgressReporter for ConsoleProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Discovered { relpath, tags } => {
                if self.verbose {
                    self.console.line(&format!("{} {} tags={}", self.cyan("[scan]"), relpath, tags));
                }
            }
            ProgressEvent::RunStarted { total, to_run, skipped, jobs, automation, dry_run } => {
                let mut line = format!(
                    "{} {} script{}: {} to run, {} skipped (jobs={})",
                    self.cyan("[run]"),
                    total,
                    if total == 1 { "" } else { "s" },
                    to_run,
                    skipped,
                    jobs
                );
                if automation {
                    line.push_str(", automation mode");
                }
                if dry_run {
                    line.push_str(", dry run");
                }
                self.console.line(&line);
            }
            ProgressEvent::ScriptStarted { relpath, command } => {
                let mut lines = vec![format!("{} {}", self.cyan("[run]"), relpath)];
                if self.verbose {
                    lines.push(format!("        cmd: {}", command));
                }
                self.console.lines(lines);
            }
            ProgressEvent::ScriptFinished { result } => {
                self.console.lines(self.finished_lines(&result));
            }
            ProgressEvent::RunCompleted { success, duration_ms, passed, failed, skipped, dry_run } => {
                let duration = format_duration(duration_ms);
                let line = if success {
                    format!(
                        "{} {} passed, {} skipped, {} dry-run in {}",
                        self.green("[done]"),
                        self.bold(&passed.to_string()),
                        skipped,
                        dry_run,
                        duration
                    )
                } else {
                    format!(
                        "{} {} {}, {} passed, {} skipped in {}",
                        self.red("[error]"),
                        self.bold(&failed.to_string()),
                        if failed == 1 { "failure" } else { "failures" },
                        passed,
                        skipped,
                        duration
                    )
                };
                self.console.line(&line);
            }
            ProgressEvent::Warning { relpath, message } => {
                let prefix = match relpath {
                    Some(relpath) => format!("{}: ", relpath),
                    None => String::new(),
                };
                self.console.line(&format!("{} {}{}", self.yellow("[warn]"), prefix, message));
            }
        }
    }
}

/// JSON-lines progress reporter for machine-readable output.
pub struct JsonProgress {
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for JsonProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonProgress").finish()
    }
}

impl JsonProgress {
    /// Create a JSON progress reporter writing to stderr.
    pub fn new() -> Self {
        Self::with_output(std::io::stderr())
    }

    /// Create a JSON progress reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self { output: Mutex::new(Box::new(output)) }
    }

    fn write_json(&self, value: &Value) {
        let mut output = self.output.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = writeln!(output, "{}", value);
        let _ = output.flush();
    }
}

impl Default for JsonProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// JSON object for a finished script.
pub fn result_json(result: &ExecutionResult) -> Value {
    json!({
        "event": "script_finished",
        "relpath": result.relpath,
        "status": result.status.to_string(),
        "reason": result.reason,
        "exit_code": result.exit_code,
        "signal": result.signal,
        "skip_reasons": result.skip_reasons.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "log": result.log_path.as_ref().map(|p| p.display().to_string()),
        "command": result.command,
        "duration_ms": result.duration.as_millis() as u64,
    })
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let value = match event {
            ProgressEvent::Discovered { relpath, tags } => {
                json!({"event": "discovered", "relpath": relpath, "tags": tags})
            }
            ProgressEvent::RunStarted { total, to_run, skipped, jobs, automation, dry_run } => json!({
                "event": "run_started",
                "total": total,
                "to_run": to_run,
                "skipped": skipped,
                "jobs": jobs,
                "automation": automation,
                "dry_run": dry_run,
            }),
            ProgressEvent::ScriptStarted { relpath, command } => {
                json!({"event": "script_started", "relpath": relpath, "command": command})
            }
            ProgressEvent::ScriptFinished { result } => result_json(&result),
            ProgressEvent::RunCompleted { success, duration_ms, passed, failed, skipped, dry_run } => {
                json!({
                    "event": "run_completed",
                    "success": success,
                    "duration_ms": duration_ms,
                    "passed": passed,
                    "failed": failed,
                    "skipped": skipped,
                    "dry_run": dry_run,
                })
            }
            ProgressEvent::Warning { relpath, message } => {
                json!({"event": "warning", "relpath": relpath, "message": message})
            }
        };
        self.write_json(&value);
    }
}

/// Format a duration in milliseconds to a human-readable string.
fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60_000;
        let seconds = (ms % 60_000) / 1000;
        format!("{}m {}s", minutes, seconds)
    }
}
