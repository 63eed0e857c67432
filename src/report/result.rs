//! Execution result types.
//!
//! One [`ExecutionResult`] exists per planned entry; a [`RunReport`] keeps
//! them in discovery order and renders the final summary.

use crate::schedule::{format_reasons, SkipReason};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Final status of a single script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Exited with code zero
    Passed,
    /// Nonzero exit, killed by a signal, or could not be started
    Failed,
    /// Not executed
    Skipped,
    /// Listed only
    DryRun,
}

impl RunStatus {
    /// Label used in the summary table.
    pub fn label(self) -> &'static str {
        match self {
            RunStatus::Passed => "PASSED",
            RunStatus::Failed => "FAILED",
            RunStatus::Skipped => "SKIPPED",
            RunStatus::DryRun => "DRY-RUN",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Passed => write!(f, "passed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Skipped => write!(f, "skipped"),
            RunStatus::DryRun => write!(f, "dry-run"),
        }
    }
}

/// Outcome of one planned entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub relpath: String,
    pub status: RunStatus,
    /// Human-readable explanation for failures and skips
    pub reason: Option<String>,
    /// Exit code when the process exited normally
    pub exit_code: Option<i32>,
    /// Terminating signal (unix)
    pub signal: Option<i32>,
    /// The process never started
    pub spawn_error: bool,
    pub skip_reasons: Vec<SkipReason>,
    /// Per-script output log
    pub log_path: Option<PathBuf>,
    /// Command line shown to the user
    pub command: Option<String>,
    pub duration: Duration,
}

impl ExecutionResult {
    fn new(relpath: impl Into<String>, status: RunStatus) -> Self {
        Self {
            relpath: relpath.into(),
            status,
            reason: None,
            exit_code: None,
            signal: None,
            spawn_error: false,
            skip_reasons: Vec::new(),
            log_path: None,
            command: None,
            duration: Duration::ZERO,
        }
    }

    /// Create a passed result.
    pub fn passed(relpath: impl Into<String>, log_path: Option<PathBuf>, duration: Duration) -> Self {
        Self { exit_code: Some(0), log_path, duration, ..Self::new(relpath, RunStatus::Passed) }
    }

    /// Create a result for a nonzero exit.
    pub fn failed_exit(
        relpath: impl Into<String>,
        code: i32,
        log_path: Option<PathBuf>,
        duration: Duration,
    ) -> Self {
        Self {
            reason: Some(format!("exit code {}", code)),
            exit_code: Some(code),
            log_path,
            duration,
            ..Self::new(relpath, RunStatus::Failed)
        }
    }

    /// Create a result for a process terminated by a signal.
    pub fn failed_signal(
        relpath: impl Into<String>,
        signal: i32,
        log_path: Option<PathBuf>,
        duration: Duration,
    ) -> Self {
        Self {
            reason: Some(format!("terminated by signal {} ({})", signal, signal_name(signal))),
            signal: Some(signal),
            log_path,
            duration,
            ..Self::new(relpath, RunStatus::Failed)
        }
    }

    /// Create a result for a process that could not be started.
    pub fn spawn_failed(
        relpath: impl Into<String>,
        error: impl std::fmt::Display,
        log_path: Option<PathBuf>,
    ) -> Self {
        Self {
            reason: Some(format!("failed to start: {}", error)),
            spawn_error: true,
            log_path,
            ..Self::new(relpath, RunStatus::Failed)
        }
    }

    /// Create a skipped result.
    pub fn skipped(relpath: impl Into<String>, reasons: Vec<SkipReason>) -> Self {
        Self {
            reason: Some(format_reasons(&reasons)),
            skip_reasons: reasons,
            ..Self::new(relpath, RunStatus::Skipped)
        }
    }

    /// Create a dry-run result.
    pub fn dry_run(relpath: impl Into<String>) -> Self {
        Self::new(relpath, RunStatus::DryRun)
    }

    /// Attach the displayed command line.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn is_failure(&self) -> bool {
        self.status == RunStatus::Failed
    }

    /// Short INFO column text.
    pub fn info(&self) -> String {
        match self.status {
            RunStatus::Passed => "exit=0".to_string(),
            RunStatus::Failed => match (self.exit_code, self.signal) {
                (Some(code), _) => format!("exit={}", code),
                (None, Some(signal)) => format!("signal={}", signal_name(signal)),
                (None, None) => self.reason.clone().unwrap_or_else(|| "failed".to_string()),
            },
            RunStatus::Skipped => format_reasons(&self.skip_reasons),
            RunStatus::DryRun => "would run".to_string(),
        }
    }
}

/// Conventional name of a unix signal number.
pub fn signal_name(signal: i32) -> String {
    let name = match signal {
        1 => "SIGHUP",
        2 => "SIGINT",
        3 => "SIGQUIT",
        4 => "SIGILL",
        6 => "SIGABRT",
        8 => "SIGFPE",
        9 => "SIGKILL",
        11 => "SIGSEGV",
        13 => "SIGPIPE",
        14 => "SIGALRM",
        15 => "SIGTERM",
        _ => return format!("SIG{}", signal),
    };
    name.to_string()
}

/// Results of a complete run, in discovery order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub results: Vec<ExecutionResult>,
    pub total_duration: Duration,
}

impl RunReport {
    pub fn new(results: Vec<ExecutionResult>) -> Self {
        Self { results, total_duration: Duration::ZERO }
    }

    /// Set the total duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.total_duration = duration;
        self
    }

    fn count(&self, status: RunStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn passed_count(&self) -> usize {
        self.count(RunStatus::Passed)
    }

    pub fn failed_count(&self) -> usize {
        self.count(RunStatus::Failed)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(RunStatus::Skipped)
    }

    pub fn dry_run_count(&self) -> usize {
        self.count(RunStatus::DryRun)
    }

    /// No executed script failed. Skips and dry runs never count.
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    /// Failed results, in discovery order.
    pub fn failures(&self) -> Vec<&ExecutionResult> {
        self.results.iter().filter(|r| r.is_failure()).collect()
    }

    /// Relpaths of failed scripts, in discovery order.
    pub fn failed_relpaths(&self) -> Vec<String> {
        self.failures().into_iter().map(|r| r.relpath.clone()).collect()
    }

    /// Render the summary table (STATUS, SCRIPT, INFO, LOG).
    pub fn render_table(&self) -> Vec<String> {
        let rows: Vec<[String; 4]> = self
            .results
            .iter()
            .map(|r| {
                [
                    r.status.label().to_string(),
                    r.relpath.clone(),
                    r.info(),
                    r.log_path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "-".into()),
                ]
            })
            .collect();

        let header = ["STATUS", "SCRIPT", "INFO", "LOG"].map(String::from);
        let mut widths = header.clone().map(|h| h.len());
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }

        let format_row = |row: &[String; 4]| {
            format!(
                "{:<w0$}  {:<w1$}  {:<w2$}  {}",
                row[0],
                row[1],
                row[2],
                row[3],
                w0 = widths[0],
                w1 = widths[1],
                w2 = widths[2]
            )
            .trim_end()
            .to_string()
        };

        std::iter::once(&header).chain(&rows).map(format_row).collect()
    }

    /// Count line shown under the table.
    pub fn counts_line(&self) -> String {
        format!(
            "{} total: {} passed, {} failed, {} skipped, {} dry-run",
            self.results.len(),
            self.passed_count(),
            self.failed_count(),
            self.skipped_count(),
            self.dry_run_count()
        )
    }

    /// Format the full summary.
    pub fn summary(&self) -> String {
        let mut lines = self.render_table();
        lines.push(String::new());
        lines.push(self.counts_line());
        lines.join("\n")
    }
}

/// Error reading or writing a rerun list.
#[derive(Debug, Error)]
pub enum RerunError {
    #[error("rerun file not found: {}", .0.display())]
    Missing(PathBuf),
    #[error("rerun file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Overwrite `path` with one relpath per line. An empty list truncates the
/// file so a stale list never survives a clean run.
pub fn write_rerun_list(path: &Path, relpaths: &[String]) -> Result<(), RerunError> {
    let io_err = |source| RerunError::Io { path: path.to_path_buf(), source };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut file = std::fs::File::create(path).map_err(io_err)?;
    for relpath in relpaths {
        writeln!(file, "{}", relpath).map_err(io_err)?;
    }
    file.flush().map_err(io_err)
}

/// Read a rerun list. Blank and `#` lines are ignored.
pub fn read_rerun_list(path: &Path) -> Result<Vec<String>, RerunError> {
    let content = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            RerunError::Missing(path.to_path_buf())
        } else {
            RerunError::Io { path: path.to_path_buf(), source }
        }
    })?;
    Ok(content
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.replace('\\', "/"))
        .collect())
}
