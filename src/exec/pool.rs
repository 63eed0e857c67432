//! Bounded worker pool.
//!
//! Workers are scoped threads pulling plan indices from a shared atomic
//! cursor. Each planned entry yields exactly one result; results are sorted
//! back into plan order before they are returned.

use crate::exec::ScriptRunner;
use crate::record::MainLog;
use crate::report::{ExecutionResult, ProgressEvent, ProgressReporter, RunReport};
use crate::schedule::{Decision, PlannedEntry, RunPlan, SkipReason};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Executes a run plan.
pub struct ExecutorPool<'a> {
    runner: ScriptRunner<'a>,
    main_log: &'a MainLog,
    progress: &'a dyn ProgressReporter,
    dry_run: bool,
}

impl<'a> ExecutorPool<'a> {
    pub fn new(
        runner: ScriptRunner<'a>,
        main_log: &'a MainLog,
        progress: &'a dyn ProgressReporter,
    ) -> Self {
        Self { runner, main_log, progress, dry_run: false }
    }

    /// List entries instead of running them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Execute every entry of `plan` and collect the results in plan order.
    pub fn run(&self, plan: &RunPlan) -> RunReport {
        let start = Instant::now();
        let entries = plan.entries();
        let fail_fast = plan.fail_fast();
        let workers = plan.concurrency().min(entries.len()).max(1);

        let next_idx = AtomicUsize::new(0);
        let failed = AtomicBool::new(false);
        let results = Mutex::new(Vec::with_capacity(entries.len()));

        tracing::debug!(entries = entries.len(), workers, fail_fast, "starting pool");

        std::thread::scope(|s| {
            for _ in 0..workers {
                s.spawn(|| loop {
                    let idx = next_idx.fetch_add(1, Ordering::SeqCst);
                    if idx >= entries.len() {
                        break;
                    }

                    let planned = &entries[idx];
                    let tripped = fail_fast && failed.load(Ordering::SeqCst);
                    let result = if tripped && planned.decision == Decision::Run {
                        cancelled(planned)
                    } else {
                        self.execute(planned)
                    };

                    if fail_fast && result.is_failure() {
                        failed.store(true, Ordering::SeqCst);
                    }

                    self.finish(&result);
                    results.lock().unwrap_or_else(|p| p.into_inner()).push((idx, result));
                });
            }
        });

        let mut results = results.into_inner().unwrap_or_else(|p| p.into_inner());
        results.sort_by_key(|(idx, _)| *idx);

        RunReport::new(results.into_iter().map(|(_, r)| r).collect()).with_duration(start.elapsed())
    }

    fn execute(&self, planned: &PlannedEntry) -> ExecutionResult {
        let entry = &planned.entry;
        match &planned.decision {
            Decision::Skip(reasons) => ExecutionResult::skipped(&entry.relpath, reasons.clone()),
            Decision::Run if self.dry_run => ExecutionResult::dry_run(&entry.relpath)
                .with_command(self.runner.launcher().display(entry)),
            Decision::Run => {
                self.progress.report(ProgressEvent::ScriptStarted {
                    relpath: entry.relpath.clone(),
                    command: self.runner.launcher().display(entry),
                });
                self.runner.run(planned)
            }
        }
    }

    /// Record a result in the main log and echo it.
    fn finish(&self, result: &ExecutionResult) {
        if let Err(e) = self.main_log.record(result) {
            tracing::warn!(path = %self.main_log.path().display(), error = %e, "main log write failed");
        }
        self.progress.report(ProgressEvent::ScriptFinished { result: result.clone() });
    }
}

/// Result for a runnable entry left unstarted after an earlier failure.
fn cancelled(planned: &PlannedEntry) -> ExecutionResult {
    ExecutionResult::skipped(&planned.entry.relpath, vec![SkipReason::FailFast])
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::LaunchTarget;
    use crate::exec::Launcher;
    use crate::record::{ConsoleSink, LogStatus, MainLogLine};
    use crate::report::{NullProgress, RunStatus};
    use crate::scan::{ScriptEntry, Tag};
    use crate::schedule::{AutoSkipList, RunOverrides, Scheduler};
    use std::collections::BTreeMap;
    use std::path::Path;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        launcher: Launcher,
        env: BTreeMap<String, String>,
        console: ConsoleSink,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                temp: TempDir::new().unwrap(),
                launcher: Launcher::new(&["sh".to_string()], LaunchTarget::Path),
                env: BTreeMap::new(),
                console: ConsoleSink::with_output(std::io::sink()),
            }
        }

        fn root(&self) -> &Path {
            self.temp.path()
        }

        fn entry(&self, relpath: &str, body: &str, tags: &[Tag]) -> ScriptEntry {
            let path = self.root().join(relpath);
            std::fs::write(&path, body).unwrap();
            ScriptEntry { path, relpath: relpath.to_string(), tags: tags.iter().copied().collect() }
        }

        fn run(&self, plan: &RunPlan, dry_run: bool) -> (RunReport, Vec<MainLogLine>) {
            let log_path = self.root().join("logs/main.log");
            let main_log = MainLog::create(&log_path, "test").unwrap();
            let logs_dir = self.root().join("logs");
            let runner = ScriptRunner::new(&self.launcher, self.root(), &logs_dir, &self.env, &self.console);
            let progress = NullProgress::new();
            let report = ExecutorPool::new(runner, &main_log, &progress).with_dry_run(dry_run).run(plan);

            let text = std::fs::read_to_string(&log_path).unwrap();
            let lines = text.lines().filter_map(|l| MainLogLine::parse(l).unwrap()).collect();
            (report, lines)
        }
    }

    fn scheduler(jobs: usize) -> Scheduler {
        Scheduler::new(RunOverrides::new(false), AutoSkipList::default()).with_jobs(jobs)
    }

    #[test]
    fn test_parallel_one_failure() {
        let fx = Fixture::new();
        let entries = vec![
            fx.entry("a.sh", "exit 0\n", &[]),
            fx.entry("b.sh", "exit 3\n", &[]),
            fx.entry("c.sh", "exit 0\n", &[]),
        ];
        let plan = scheduler(2).plan(entries);
        let (report, lines) = fx.run(&plan, false);

        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.passed_count(), 2);
        assert_eq!(report.failed_relpaths(), vec!["b.sh".to_string()]);
        assert_eq!(lines.len(), 3);
        let failed: Vec<_> = lines.iter().filter(|l| l.status.is_failure()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].exit_code, Some(3));
    }

    #[test]
    fn test_results_in_plan_order_regardless_of_completion() {
        let fx = Fixture::new();
        let entries = vec![
            fx.entry("a.sh", "sleep 0.3\n", &[]),
            fx.entry("b.sh", "sleep 0.1\n", &[]),
            fx.entry("c.sh", "true\n", &[]),
        ];
        let plan = scheduler(3).plan(entries);
        let (report, _) = fx.run(&plan, false);

        let relpaths: Vec<_> = report.results.iter().map(|r| r.relpath.as_str()).collect();
        assert_eq!(relpaths, vec!["a.sh", "b.sh", "c.sh"]);
    }

    #[test]
    fn test_dry_run_spawns_nothing() {
        let fx = Fixture::new();
        let marker = fx.root().join("ran");
        let body = format!("touch '{}'\n", marker.display());
        let entries: Vec<_> =
            (0..5).map(|i| fx.entry(&format!("s{}.sh", i), &body, &[])).collect();
        let plan = scheduler(2).plan(entries);
        let (report, lines) = fx.run(&plan, true);

        assert_eq!(report.dry_run_count(), 5);
        assert!(report.is_success());
        assert!(!marker.exists());
        assert!(lines.iter().all(|l| l.status == LogStatus::DryRun));
        assert_eq!(report.results[0].command.as_deref(), Some("sh s0.sh"));
    }

    #[test]
    fn test_skipped_entries_recorded_in_place() {
        let fx = Fixture::new();
        let entries = vec![
            fx.entry("a.sh", "true\n", &[Tag::Interactive]),
            fx.entry("b.sh", "true\n", &[]),
        ];
        let plan = scheduler(1).plan(entries);
        let (report, lines) = fx.run(&plan, false);

        assert_eq!(report.results[0].status, RunStatus::Skipped);
        assert_eq!(report.results[0].skip_reasons, vec![SkipReason::Blocked(Tag::Interactive)]);
        assert_eq!(report.results[1].status, RunStatus::Passed);
        assert_eq!(lines[0].reasons, vec!["interactive".to_string()]);
    }

    #[test]
    fn test_fail_fast_skips_remaining() {
        let fx = Fixture::new();
        let entries = vec![
            fx.entry("a.sh", "exit 1\n", &[]),
            fx.entry("b.sh", "true\n", &[]),
            fx.entry("c.sh", "true\n", &[Tag::Audio]),
        ];
        let plan = scheduler(1).with_fail_fast(true).plan(entries);
        let (report, lines) = fx.run(&plan, false);

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.results[0].status, RunStatus::Failed);
        assert_eq!(report.results[1].skip_reasons, vec![SkipReason::FailFast]);
        assert_eq!(report.results[2].skip_reasons, vec![SkipReason::Blocked(Tag::Audio)]);
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_failure_isolated_without_fail_fast() {
        let fx = Fixture::new();
        let entries = vec![fx.entry("a.sh", "exit 1\n", &[]), fx.entry("b.sh", "true\n", &[])];
        let plan = scheduler(1).plan(entries);
        let (report, _) = fx.run(&plan, false);
        assert_eq!(report.results[1].status, RunStatus::Passed);
    }

    #[test]
    fn test_many_workers_one_line_per_entry() {
        let fx = Fixture::new();
        let entries: Vec<_> = (0..12)
            .map(|i| fx.entry(&format!("w{:02}.sh", i), &format!("echo {}\nexit {}\n", i, i % 2), &[]))
            .collect();
        let plan = scheduler(4).plan(entries);
        let (report, lines) = fx.run(&plan, false);

        assert_eq!(report.results.len(), 12);
        assert_eq!(lines.len(), 12);
        let mut logged: Vec<_> = lines.iter().map(|l| l.relpath.clone()).collect();
        logged.sort();
        let expected: Vec<_> = (0..12).map(|i| format!("w{:02}.sh", i)).collect();
        assert_eq!(logged, expected);
        assert_eq!(report.failed_count(), 6);
    }
}
