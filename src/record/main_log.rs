//! The structured main log.
//!
//! One line per completed, skipped or dry-run script, appended under a lock
//! and flushed immediately so an interrupted run leaves a readable prefix.
//!
//! Line grammar (single-space separated):
//!
//! ```text
//! PASSED  <relpath> exit=<code> log=<path>
//! FAILED  <relpath> exit=<code> log=<path>
//! FAILED  <relpath> signal=<n> log=<path>
//! ERROR   <relpath> log=<path>
//! SKIPPED <relpath> reasons=<r1,r2>
//! DRYRUN  <relpath>
//! # comment
//! ```
//!
//! Relpaths and log paths percent-encode `%` and any whitespace so a line
//! always splits back into the same fields.

use crate::report::{ExecutionResult, RunStatus};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Leading token of a main log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStatus {
    Passed,
    /// Nonzero exit or killed by a signal
    Failed,
    /// The process could not be started
    Error,
    Skipped,
    DryRun,
}

impl LogStatus {
    pub fn token(self) -> &'static str {
        match self {
            LogStatus::Passed => "PASSED",
            LogStatus::Failed => "FAILED",
            LogStatus::Error => "ERROR",
            LogStatus::Skipped => "SKIPPED",
            LogStatus::DryRun => "DRYRUN",
        }
    }

    pub fn from_token(token: &str) -> Option<LogStatus> {
        match token {
            "PASSED" => Some(LogStatus::Passed),
            "FAILED" => Some(LogStatus::Failed),
            "ERROR" => Some(LogStatus::Error),
            "SKIPPED" => Some(LogStatus::Skipped),
            "DRYRUN" => Some(LogStatus::DryRun),
            _ => None,
        }
    }

    /// Failure-class tokens are the ones collected into rerun lists.
    pub fn is_failure(self) -> bool {
        matches!(self, LogStatus::Failed | LogStatus::Error)
    }
}

/// A line that does not follow the grammar.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineError {
    #[error("unknown status token '{0}'")]
    UnknownStatus(String),
    #[error("missing relpath after '{0}'")]
    MissingRelpath(String),
    #[error("invalid value for '{0}': '{1}'")]
    InvalidField(String, String),
}

/// One structured record of the main log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainLogLine {
    pub status: LogStatus,
    pub relpath: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub log_path: Option<PathBuf>,
    /// Skip reasons (SKIPPED lines only)
    pub reasons: Vec<String>,
}

impl MainLogLine {
    /// The record for an execution result.
    pub fn from_result(result: &ExecutionResult) -> Self {
        let status = match result.status {
            RunStatus::Passed => LogStatus::Passed,
            RunStatus::Failed if result.spawn_error => LogStatus::Error,
            RunStatus::Failed => LogStatus::Failed,
            RunStatus::Skipped => LogStatus::Skipped,
            RunStatus::DryRun => LogStatus::DryRun,
        };
        Self {
            status,
            relpath: result.relpath.clone(),
            exit_code: result.exit_code,
            signal: result.signal,
            log_path: result.log_path.clone(),
            reasons: result.skip_reasons.iter().map(|r| r.as_str().to_string()).collect(),
        }
    }

    /// Render without a trailing newline.
    pub fn render(&self) -> String {
        let mut fields = vec![self.status.token().to_string(), escape(&self.relpath)];
        if let Some(code) = self.exit_code {
            fields.push(format!("exit={}", code));
        }
        if let Some(signal) = self.signal {
            fields.push(format!("signal={}", signal));
        }
        if let Some(path) = &self.log_path {
            fields.push(format!("log={}", escape(&path.to_string_lossy())));
        }
        if !self.reasons.is_empty() {
            fields.push(format!("reasons={}", self.reasons.join(",")));
        }
        fields.join(" ")
    }

    /// Parse one line. Blank and `#` lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, LineError> {
        let line = line.trim_matches(|c: char| c == ' ' || c == '\r' || c == '\n');
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let mut tokens = line.split(' ').filter(|s| !s.is_empty());
        let token = tokens.next().unwrap_or_default();
        let status =
            LogStatus::from_token(token).ok_or_else(|| LineError::UnknownStatus(token.to_string()))?;
        let relpath = tokens
            .next()
            .map(unescape)
            .ok_or_else(|| LineError::MissingRelpath(token.to_string()))?;

        let mut parsed = Self {
            status,
            relpath,
            exit_code: None,
            signal: None,
            log_path: None,
            reasons: Vec::new(),
        };

        for field in tokens {
            let Some((key, value)) = field.split_once('=') else {
                continue;
            };
            let invalid = || LineError::InvalidField(key.to_string(), value.to_string());
            match key {
                "exit" => parsed.exit_code = Some(value.parse().map_err(|_| invalid())?),
                "signal" => parsed.signal = Some(value.parse().map_err(|_| invalid())?),
                "log" => parsed.log_path = Some(PathBuf::from(unescape(value))),
                "reasons" => {
                    parsed.reasons =
                        value.split(',').filter(|r| !r.is_empty()).map(String::from).collect()
                }
                _ => {}
            }
        }

        Ok(Some(parsed))
    }
}

impl std::fmt::Display for MainLogLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// Escape characters that would break field splitting.
///
/// `%` and every whitespace character (Unicode included) are written as
/// percent-encoded UTF-8 bytes.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut buf = [0u8; 4];
    for c in value.chars() {
        if c == '%' || c.is_whitespace() {
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Reverse [`escape`]. Sequences that are not `%` plus two hex digits are
/// kept verbatim.
pub fn unescape(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let decoded = match (bytes[i], bytes.get(i + 1..i + 3)) {
            (b'%', Some(hex)) if hex.iter().all(u8::is_ascii_hexdigit) => std::str::from_utf8(hex)
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok()),
            _ => None,
        };
        match decoded {
            Some(byte) => {
                out.push(byte);
                i += 3;
            }
            None => {
                out.push(bytes[i]);
                i += 1;
            }
        }
    }
    match String::from_utf8(out) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    }
}

/// Append-only main log shared by all workers.
#[derive(Debug)]
pub struct MainLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl MainLog {
    /// Create (truncating) the log for this invocation and write a header.
    pub fn create(path: &Path, header: &str) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
        for line in header.lines() {
            writeln!(file, "# {}", line)?;
        }
        file.flush()?;
        Ok(Self { path: path.to_path_buf(), file: Mutex::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line and flush before releasing the lock.
    pub fn append(&self, line: &MainLogLine) -> std::io::Result<()> {
        let text = format!("{}\n", line.render());
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(text.as_bytes())?;
        file.flush()
    }

    /// Append the record for `result`.
    pub fn record(&self, result: &ExecutionResult) -> std::io::Result<()> {
        self.append(&MainLogLine::from_result(result))
    }
}
