//! Rerun collection from a main log.
//!
//! Parse-only: reads a main log and returns the relpaths of failure-class
//! lines, in log order, de-duplicated.

use crate::record::{LogStatus, MainLogLine};
use std::collections::HashSet;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error collecting failures from a main log.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A failure-class line without a relpath
    #[error("malformed main log line {line}: '{text}'")]
    Malformed { line: usize, text: String },
}

/// Collect failed relpaths from a main log stream.
///
/// Blank lines, `#` comments and non-failure lines are ignored. Unknown
/// status tokens are ignored too, so newer log lines stay readable.
pub fn collect_failures<R: BufRead>(reader: R) -> Result<Vec<String>, CollectError> {
    let mut seen = HashSet::new();
    let mut failures = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| CollectError::Read { path: PathBuf::from("-"), source })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let token = trimmed.split_whitespace().next().unwrap_or_default();
        if !LogStatus::from_token(token).is_some_and(LogStatus::is_failure) {
            continue;
        }

        let parsed = MainLogLine::parse(trimmed)
            .ok()
            .flatten()
            .ok_or_else(|| CollectError::Malformed { line: index + 1, text: line.clone() })?;

        if seen.insert(parsed.relpath.clone()) {
            failures.push(parsed.relpath);
        }
    }

    Ok(failures)
}

/// Collect failed relpaths from a main log file.
pub fn collect_file(path: &Path) -> Result<Vec<String>, CollectError> {
    let file = std::fs::File::open(path)
        .map_err(|source| CollectError::Read { path: path.to_path_buf(), source })?;
    collect_failures(BufReader::new(file)).map_err(|e| match e {
        CollectError::Read { source, .. } => CollectError::Read { path: path.to_path_buf(), source },
        other => other,
    })
}

/// Write collected relpaths to `output` (overwritten), or to stdout.
pub fn write_collected(relpaths: &[String], output: Option<&Path>) -> Result<(), CollectError> {
    match output {
        Some(path) => crate::report::write_rerun_list(path, relpaths).map_err(|e| match e {
            crate::report::RerunError::Io { path, source } => CollectError::Write { path, source },
            crate::report::RerunError::Missing(path) => CollectError::Write {
                path,
                source: std::io::ErrorKind::NotFound.into(),
            },
        }),
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let write_err = |source| CollectError::Write { path: PathBuf::from("<stdout>"), source };
            for relpath in relpaths {
                writeln!(out, "{}", relpath).map_err(write_err)?;
            }
            out.flush().map_err(write_err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MainLog;
    use crate::report::ExecutionResult;
    use crate::schedule::SkipReason;
    use std::io::Cursor;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_collect_only_failures() {
        let log = "PASSED a.py exit=0 log=/l/a.log\nFAILED b.py exit=1 log=/l/b.log\nSKIPPED c.py reasons=audio\n";
        assert_eq!(collect_failures(Cursor::new(log)).unwrap(), vec!["b.py".to_string()]);
    }

    #[test]
    fn test_collect_bare_status_lines() {
        let log = "PASSED a.py\nFAILED b.py\nSKIPPED c.py\n";
        assert_eq!(collect_failures(Cursor::new(log)).unwrap(), vec!["b.py".to_string()]);
    }

    #[test]
    fn test_collect_dedupes_in_log_order() {
        let log = "# header\n\nERROR z.py\nFAILED a.py exit=2\nFAILED z.py exit=1\n";
        assert_eq!(collect_failures(Cursor::new(log)).unwrap(), vec!["z.py", "a.py"]);
    }

    #[test]
    fn test_collect_unescapes_relpaths() {
        let log = "FAILED dir/with%20space.py exit=1\n";
        assert_eq!(collect_failures(Cursor::new(log)).unwrap(), vec!["dir/with space.py"]);
    }

    #[test]
    fn test_collect_ignores_unknown_tokens() {
        let log = "TIMEOUT a.py\nFAILED b.py\n";
        assert_eq!(collect_failures(Cursor::new(log)).unwrap(), vec!["b.py"]);
    }

    #[test]
    fn test_failure_without_relpath_is_malformed() {
        let log = "PASSED a.py\nFAILED\n";
        let err = collect_failures(Cursor::new(log)).unwrap_err();
        match err {
            CollectError::Malformed { line, text } => {
                assert_eq!(line, 2);
                assert_eq!(text, "FAILED");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_collect_round_trip_through_main_log() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("main.log");
        let log = MainLog::create(&path, "round trip").unwrap();
        let results = vec![
            ExecutionResult::passed("a.py", Some(temp.path().join("a.log")), Duration::ZERO),
            ExecutionResult::failed_exit("b c.py", 3, Some(temp.path().join("b.log")), Duration::ZERO),
            ExecutionResult::skipped("d.py", vec![SkipReason::AutoSkip]),
            ExecutionResult::failed_signal("e.py", 9, None, Duration::ZERO),
            ExecutionResult::spawn_failed("f.py", "not found", None),
            ExecutionResult::dry_run("g.py"),
        ];
        for result in &results {
            log.record(result).unwrap();
        }

        assert_eq!(collect_file(&path).unwrap(), vec!["b c.py", "e.py", "f.py"]);
    }

    #[test]
    fn test_collect_keeps_unicode_whitespace_in_relpaths() {
        let relpath = "examples/a\u{a0}b.py";
        let result = ExecutionResult::failed_exit(relpath, 3, None, Duration::ZERO);
        let log = format!("{}\n", MainLogLine::from_result(&result).render());
        assert_eq!(collect_failures(Cursor::new(log)).unwrap(), vec![relpath]);
    }

    #[test]
    fn test_collect_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = collect_file(&temp.path().join("missing.log")).unwrap_err();
        assert!(matches!(err, CollectError::Read { .. }));
    }

    #[test]
    fn test_write_collected_to_file() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out/rerun.txt");
        std::fs::create_dir_all(out.parent().unwrap()).unwrap();
        std::fs::write(&out, "stale.py\n").unwrap();

        write_collected(&["b.py".to_string()], Some(&out)).unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "b.py\n");
    }
}
