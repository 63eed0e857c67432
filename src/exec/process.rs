//! Running one script as a child process.
//!
//! stdout and stderr share a single OS pipe, so the captured stream keeps
//! the order the script wrote it in. Every byte goes to the per-script log;
//! the console gets either one block after exit or live prefixed chunks.

use crate::config::LaunchTarget;
use crate::record::ConsoleSink;
use crate::report::ExecutionResult;
use crate::scan::ScriptEntry;
use crate::schedule::{OutputMode, PlannedEntry};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Instant;

/// Command prefix used to start a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launcher {
    program: String,
    args: Vec<String>,
    target: LaunchTarget,
}

impl Launcher {
    /// Build from a configured command (program followed by leading args).
    pub fn new(command: &[String], target: LaunchTarget) -> Self {
        let (program, args) = match command.split_first() {
            Some((program, args)) => (program.clone(), args.to_vec()),
            None => (String::new(), Vec::new()),
        };
        Self { program, args, target }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the program for `entry`.
    pub fn argv(&self, entry: &ScriptEntry) -> Vec<String> {
        let mut argv = self.args.clone();
        argv.push(match self.target {
            LaunchTarget::Module => entry.module(),
            LaunchTarget::Path => entry.relpath.clone(),
        });
        argv
    }

    /// Shell-like rendering for display.
    pub fn display(&self, entry: &ScriptEntry) -> String {
        std::iter::once(self.program.clone())
            .chain(self.argv(entry))
            .map(|arg| quote(&arg))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Command for `entry`, run from `cwd` with `env` added to the
    /// inherited environment.
    pub fn command(&self, entry: &ScriptEntry, cwd: &Path, env: &BTreeMap<String, String>) -> Command {
        let mut command = Command::new(&self.program);
        command.args(self.argv(entry)).current_dir(cwd).envs(env);
        command
    }
}

fn quote(arg: &str) -> String {
    if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Owns a spawned child and reaps it on drop. Never kills it.
#[derive(Debug)]
pub struct ChildGuard {
    child: Option<Child>,
}

impl ChildGuard {
    pub fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(|c| c.id())
    }

    /// Wait for the child to exit.
    pub fn wait(mut self) -> std::io::Result<ExitStatus> {
        let status = match self.child.as_mut() {
            Some(child) => child.wait()?,
            None => return Err(std::io::Error::other("child already reaped")),
        };
        self.child = None;
        Ok(status)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.wait() {
                tracing::warn!(pid = child.id(), error = %e, "failed to reap child process");
            }
        }
    }
}

/// Runs planned entries as child processes.
#[derive(Debug, Clone, Copy)]
pub struct ScriptRunner<'a> {
    launcher: &'a Launcher,
    project_root: &'a Path,
    logs_dir: &'a Path,
    env: &'a BTreeMap<String, String>,
    console: &'a ConsoleSink,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(
        launcher: &'a Launcher,
        project_root: &'a Path,
        logs_dir: &'a Path,
        env: &'a BTreeMap<String, String>,
        console: &'a ConsoleSink,
    ) -> Self {
        Self { launcher, project_root, logs_dir, env, console }
    }

    pub fn launcher(&self) -> &Launcher {
        self.launcher
    }

    /// Per-script log location.
    pub fn log_path(&self, entry: &ScriptEntry) -> PathBuf {
        self.logs_dir.join(entry.log_file_name())
    }

    /// Run `planned` to completion and classify the outcome.
    ///
    /// Failures of any kind become result data, never errors.
    pub fn run(&self, planned: &PlannedEntry) -> ExecutionResult {
        let entry = &planned.entry;
        let command_line = self.launcher.display(entry);
        let log_path = self.log_path(entry);
        let start = Instant::now();

        let mut log_file = match File::create(&log_path) {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!(path = %log_path.display(), error = %e, "cannot create script log");
                return ExecutionResult::spawn_failed(
                    &entry.relpath,
                    format!("cannot create log {}: {}", log_path.display(), e),
                    None,
                )
                .with_command(command_line);
            }
        };

        let (guard, mut reader) = match self.spawn(planned) {
            Ok(spawned) => spawned,
            Err(e) => {
                tracing::debug!(relpath = %entry.relpath, error = %e, "spawn failed");
                if let Some(file) = log_file.as_mut() {
                    let _ = writeln!(file, "failed to start `{}`: {}", command_line, e);
                }
                return ExecutionResult::spawn_failed(&entry.relpath, e, Some(log_path))
                    .with_command(command_line);
            }
        };
        tracing::debug!(relpath = %entry.relpath, pid = ?guard.id(), "spawned");

        let mut captured = Vec::new();
        let mut at_line_start = true;
        let mut buf = [0u8; 8192];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(relpath = %entry.relpath, error = %e, "output read failed");
                    break;
                }
            };
            let chunk = &buf[..n];

            if let Some(file) = log_file.as_mut() {
                if let Err(e) = file.write_all(chunk) {
                    tracing::warn!(path = %log_path.display(), error = %e, "script log write failed");
                    log_file = None;
                }
            }

            match planned.output {
                OutputMode::Buffered => captured.extend_from_slice(chunk),
                OutputMode::Live => self.console.live(&entry.relpath, chunk, &mut at_line_start),
            }
        }
        drop(reader);

        if let Some(mut file) = log_file.take() {
            let _ = file.flush();
        }
        match planned.output {
            OutputMode::Buffered => self.console.block(&entry.relpath, &captured),
            OutputMode::Live => self.console.finish_live(&mut at_line_start),
        }

        let status = guard.wait();
        let duration = start.elapsed();
        let result = match status {
            Ok(status) => classify_exit(&entry.relpath, status, Some(log_path), duration),
            Err(e) => ExecutionResult::spawn_failed(&entry.relpath, e, Some(log_path)),
        };
        result.with_command(command_line)
    }

    fn spawn(&self, planned: &PlannedEntry) -> std::io::Result<(ChildGuard, std::io::PipeReader)> {
        let (reader, writer) = std::io::pipe()?;
        let stdin = if planned.attach_stdin { Stdio::inherit() } else { Stdio::null() };

        // The Command holds the write ends; it must be gone before reading
        // or the pipe never reaches EOF.
        let child = {
            let mut command = self.launcher.command(&planned.entry, self.project_root, self.env);
            command.stdin(stdin).stdout(writer.try_clone()?).stderr(writer);
            command.spawn()?
        };

        Ok((ChildGuard::new(child), reader))
    }
}

/// Map an exit status to a passed or failed result.
pub fn classify_exit(
    relpath: &str,
    status: ExitStatus,
    log_path: Option<PathBuf>,
    duration: std::time::Duration,
) -> ExecutionResult {
    match status.code() {
        Some(0) => ExecutionResult::passed(relpath, log_path, duration),
        Some(code) => ExecutionResult::failed_exit(relpath, code, log_path, duration),
        None => {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                if let Some(signal) = status.signal() {
                    return ExecutionResult::failed_signal(relpath, signal, log_path, duration);
                }
            }
            ExecutionResult::failed_exit(relpath, -1, log_path, duration)
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::report::RunStatus;
    use crate::schedule::Decision;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct TestWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl TestWriter {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn script(root: &Path, relpath: &str, body: &str) -> PlannedEntry {
        let path = root.join(relpath);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        PlannedEntry {
            entry: ScriptEntry { path, relpath: relpath.to_string(), tags: Default::default() },
            decision: Decision::Run,
            output: OutputMode::Buffered,
            attach_stdin: false,
        }
    }

    fn sh() -> Launcher {
        Launcher::new(&["sh".to_string()], LaunchTarget::Path)
    }

    #[test]
    fn test_launcher_module_target() {
        let launcher = Launcher::new(
            &["uv", "run", "python", "-m"].map(String::from),
            LaunchTarget::Module,
        );
        let entry = ScriptEntry {
            path: PathBuf::from("/p/examples/basic/hello.py"),
            relpath: "examples/basic/hello.py".to_string(),
            tags: Default::default(),
        };
        assert_eq!(launcher.program(), "uv");
        assert_eq!(launcher.argv(&entry), vec!["run", "python", "-m", "examples.basic.hello"]);
        assert_eq!(launcher.display(&entry), "uv run python -m examples.basic.hello");
    }

    #[test]
    fn test_launcher_display_quotes() {
        let entry = ScriptEntry {
            path: PathBuf::from("/p/my dir/a.sh"),
            relpath: "my dir/a.sh".to_string(),
            tags: Default::default(),
        };
        assert_eq!(sh().display(&entry), "sh 'my dir/a.sh'");
        assert_eq!(quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_run_passed_captures_combined_output() {
        let temp = TempDir::new().unwrap();
        let planned = script(temp.path(), "ok.sh", "echo out\necho err 1>&2\necho out2\n");
        let writer = TestWriter::default();
        let console = ConsoleSink::with_output(writer.clone());
        let launcher = sh();
        let env = BTreeMap::new();
        let runner = ScriptRunner::new(&launcher, temp.path(), temp.path(), &env, &console);

        let result = runner.run(&planned);
        assert_eq!(result.status, RunStatus::Passed);
        assert_eq!(result.exit_code, Some(0));

        let log = std::fs::read_to_string(result.log_path.unwrap()).unwrap();
        assert_eq!(log, "out\nerr\nout2\n");
        assert_eq!(writer.text(), "[ok.sh] out\n[ok.sh] err\n[ok.sh] out2\n");
    }

    #[test]
    fn test_run_nonzero_exit() {
        let temp = TempDir::new().unwrap();
        let planned = script(temp.path(), "bad.sh", "echo failing\nexit 3\n");
        let console = ConsoleSink::with_output(TestWriter::default());
        let launcher = sh();
        let env = BTreeMap::new();
        let runner = ScriptRunner::new(&launcher, temp.path(), temp.path(), &env, &console);

        let result = runner.run(&planned);
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.command.as_deref(), Some("sh bad.sh"));
    }

    #[test]
    fn test_run_killed_by_signal() {
        let temp = TempDir::new().unwrap();
        let planned = script(temp.path(), "kill.sh", "kill -9 $$\n");
        let console = ConsoleSink::with_output(TestWriter::default());
        let launcher = sh();
        let env = BTreeMap::new();
        let runner = ScriptRunner::new(&launcher, temp.path(), temp.path(), &env, &console);

        let result = runner.run(&planned);
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.signal, Some(9));
        assert_eq!(result.exit_code, None);
    }

    #[test]
    fn test_run_spawn_failure() {
        let temp = TempDir::new().unwrap();
        let planned = script(temp.path(), "a.sh", "true\n");
        let console = ConsoleSink::with_output(TestWriter::default());
        let launcher = Launcher::new(&["exrun-no-such-program".to_string()], LaunchTarget::Path);
        let env = BTreeMap::new();
        let runner = ScriptRunner::new(&launcher, temp.path(), temp.path(), &env, &console);

        let result = runner.run(&planned);
        assert_eq!(result.status, RunStatus::Failed);
        assert!(result.spawn_error);
        assert_eq!(result.exit_code, None);
        let log = std::fs::read_to_string(result.log_path.unwrap()).unwrap();
        assert!(log.starts_with("failed to start"));
    }

    #[test]
    fn test_run_env_cwd_and_null_stdin() {
        let temp = TempDir::new().unwrap();
        let planned = script(
            temp.path(),
            "env.sh",
            "echo \"mode=$EXAMPLES_INTERACTIVE_MODE\"\npwd\nif read line; then echo got; else echo eof; fi\n",
        );
        let console = ConsoleSink::with_output(TestWriter::default());
        let launcher = sh();
        let env: BTreeMap<String, String> =
            [("EXAMPLES_INTERACTIVE_MODE".to_string(), "auto".to_string())].into_iter().collect();
        let logs = temp.path().join("logs");
        std::fs::create_dir_all(&logs).unwrap();
        let runner = ScriptRunner::new(&launcher, temp.path(), &logs, &env, &console);

        let result = runner.run(&planned);
        let log = std::fs::read_to_string(result.log_path.unwrap()).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines[0], "mode=auto");
        assert_eq!(
            std::fs::canonicalize(lines[1]).unwrap(),
            std::fs::canonicalize(temp.path()).unwrap()
        );
        assert_eq!(lines[2], "eof");
    }

    #[test]
    fn test_live_output_prefixes_partial_lines() {
        let temp = TempDir::new().unwrap();
        let mut planned = script(temp.path(), "live.sh", "printf 'Approve? '\n");
        planned.output = OutputMode::Live;
        let writer = TestWriter::default();
        let console = ConsoleSink::with_output(writer.clone());
        let launcher = sh();
        let env = BTreeMap::new();
        let runner = ScriptRunner::new(&launcher, temp.path(), temp.path(), &env, &console);

        runner.run(&planned);
        assert_eq!(writer.text(), "[live.sh] Approve? \n");
    }

    #[test]
    fn test_log_file_name_flattens_dirs() {
        let temp = TempDir::new().unwrap();
        let planned = script(temp.path(), "examples/deep/x.sh", "true\n");
        let console = ConsoleSink::with_output(TestWriter::default());
        let launcher = sh();
        let env = BTreeMap::new();
        let runner = ScriptRunner::new(&launcher, temp.path(), temp.path(), &env, &console);

        let result = runner.run(&planned);
        assert_eq!(result.log_path.unwrap(), temp.path().join("examples__deep__x.sh.log"));
        assert!(result.duration < Duration::from_secs(60));
    }
}
