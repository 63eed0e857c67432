//! Skip decisions, concurrency resolution and the resulting run plan.

use crate::scan::{ScriptEntry, Tag, TagSet};
use std::collections::{BTreeSet, HashSet};

/// Tag categories explicitly unblocked for this invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOverrides {
    /// Categories unblocked by flags or environment
    explicit: TagSet,
    /// Automation mode implicitly unblocks interactive scripts
    automation: bool,
}

impl RunOverrides {
    /// Create overrides with no explicit includes.
    pub fn new(automation: bool) -> Self {
        Self { explicit: TagSet::new(), automation }
    }

    /// Explicitly unblock a category.
    pub fn with_include(mut self, tag: Tag) -> Self {
        self.explicit.insert(tag);
        self
    }

    /// Explicitly unblock several categories.
    pub fn with_includes(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.explicit.extend(tags);
        self
    }

    /// Whether automation mode is active.
    pub fn automation(&self) -> bool {
        self.automation
    }

    /// Whether `tag` was unblocked by a flag or environment variable.
    pub fn is_explicit(&self, tag: Tag) -> bool {
        self.explicit.contains(&tag)
    }

    /// The effective set of unblocked categories.
    pub fn effective(&self) -> TagSet {
        let mut tags = self.explicit.clone();
        if self.automation {
            tags.insert(Tag::Interactive);
        }
        tags
    }

    /// Categories that still block a script.
    pub fn blocked(&self) -> TagSet {
        let effective = self.effective();
        Tag::ALL.into_iter().filter(|t| !effective.contains(t)).collect()
    }
}

/// Relpaths excluded only when automation mode is active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoSkipList(BTreeSet<String>);

impl AutoSkipList {
    /// Build a skip list from relpaths. Backslashes are normalized.
    pub fn new<I, S>(relpaths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            relpaths
                .into_iter()
                .map(|p| p.as_ref().trim().replace('\\', "/"))
                .filter(|p| !p.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, relpath: &str) -> bool {
        self.0.contains(relpath)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Relpaths in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }
}

/// Why a script did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SkipReason {
    /// The script carries a blocked tag
    Blocked(Tag),
    /// Listed in the automation skip list
    AutoSkip,
    /// Left unstarted after an earlier failure with fail-fast on
    FailFast,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::Blocked(tag) => tag.as_str(),
            SkipReason::AutoSkip => "auto-skip",
            SkipReason::FailFast => "fail-fast",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Join skip reasons with commas, the way the main log stores them.
pub fn format_reasons(reasons: &[SkipReason]) -> String {
    reasons.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(",")
}

/// What happens to a planned entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Run,
    /// Never empty
    Skip(Vec<SkipReason>),
}

impl Decision {
    pub fn is_run(&self) -> bool {
        matches!(self, Decision::Run)
    }
}

/// How a running script's output reaches the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Captured fully, then flushed as one block
    Buffered,
    /// Forwarded as read, prefixed at each line start
    Live,
}

/// A discovered script with its decision.
#[derive(Debug, Clone)]
pub struct PlannedEntry {
    pub entry: ScriptEntry,
    pub decision: Decision,
    /// Display mode when the entry runs
    pub output: OutputMode,
    /// Whether the script may read the harness's stdin
    pub attach_stdin: bool,
}

/// Decide whether a single entry runs.
///
/// Blocked tags are reported first (in tag order), then `auto-skip` when
/// automation is on and the relpath is listed.
pub fn decide(entry: &ScriptEntry, overrides: &RunOverrides, auto_skip: &AutoSkipList) -> Decision {
    let blocked = overrides.blocked();
    let mut reasons: Vec<SkipReason> =
        entry.tags.intersection(&blocked).map(|t| SkipReason::Blocked(*t)).collect();

    if overrides.automation() && auto_skip.contains(&entry.relpath) {
        reasons.push(SkipReason::AutoSkip);
    }

    if reasons.is_empty() {
        Decision::Run
    } else {
        Decision::Skip(reasons)
    }
}

/// Resolve the worker count.
///
/// A shared terminal cannot be multiplexed between interactive scripts, so
/// any interactive script selected to run (or an explicit interactive
/// include) outside automation mode forces serial execution.
pub fn resolve_concurrency<'a>(
    running: impl IntoIterator<Item = &'a ScriptEntry>,
    overrides: &RunOverrides,
    requested: usize,
) -> usize {
    if !overrides.automation() {
        let forced = overrides.is_explicit(Tag::Interactive)
            || running.into_iter().any(|e| e.tags.contains(&Tag::Interactive));
        if forced {
            return 1;
        }
    }
    requested.max(1)
}

/// Keep only entries whose relpath is listed.
///
/// Returns the kept entries (discovery order preserved) and the listed
/// relpaths that were not discovered.
pub fn restrict_to(
    entries: Vec<ScriptEntry>,
    relpaths: &[String],
) -> (Vec<ScriptEntry>, Vec<String>) {
    let wanted: HashSet<&str> = relpaths.iter().map(|s| s.as_str()).collect();
    let found: HashSet<String> = entries.iter().map(|e| e.relpath.clone()).collect();
    let missing =
        relpaths.iter().filter(|p| !found.contains(p.as_str())).cloned().collect::<Vec<_>>();
    let kept = entries.into_iter().filter(|e| wanted.contains(e.relpath.as_str())).collect();
    (kept, missing)
}

/// Builds a run plan from discovered entries.
#[derive(Debug, Clone)]
pub struct Scheduler {
    overrides: RunOverrides,
    auto_skip: AutoSkipList,
    jobs: usize,
    fail_fast: bool,
    buffer_output: bool,
}

impl Scheduler {
    pub fn new(overrides: RunOverrides, auto_skip: AutoSkipList) -> Self {
        Self { overrides, auto_skip, jobs: 1, fail_fast: false, buffer_output: true }
    }

    /// Set the requested worker count (clamped to at least 1).
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Request stop-after-first-failure.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Disable to stream every script live.
    pub fn with_buffer_output(mut self, buffer_output: bool) -> Self {
        self.buffer_output = buffer_output;
        self
    }

    /// Plan the run. Entry order is preserved.
    pub fn plan(&self, entries: Vec<ScriptEntry>) -> RunPlan {
        let decisions: Vec<Decision> =
            entries.iter().map(|e| decide(e, &self.overrides, &self.auto_skip)).collect();

        let running = entries.iter().zip(&decisions).filter(|(_, d)| d.is_run()).map(|(e, _)| e);
        let concurrency = resolve_concurrency(running, &self.overrides, self.jobs);

        let fail_fast_requested = self.fail_fast;
        let fail_fast = fail_fast_requested && concurrency == 1;

        let entries = entries
            .into_iter()
            .zip(decisions)
            .map(|(entry, decision)| {
                let foreground = concurrency == 1
                    && !self.overrides.automation()
                    && entry.tags.contains(&Tag::Interactive);
                let output = if !self.buffer_output || foreground {
                    OutputMode::Live
                } else {
                    OutputMode::Buffered
                };
                PlannedEntry { entry, decision, output, attach_stdin: foreground }
            })
            .collect();

        RunPlan { entries, concurrency, fail_fast, fail_fast_ignored: fail_fast_requested && !fail_fast }
    }
}

/// The outcome of planning: every entry with its decision, plus the
/// resolved concurrency. Read-only once built.
#[derive(Debug, Clone)]
pub struct RunPlan {
    entries: Vec<PlannedEntry>,
    concurrency: usize,
    fail_fast: bool,
    fail_fast_ignored: bool,
}

impl RunPlan {
    pub fn entries(&self) -> &[PlannedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolved worker count.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Whether fail-fast is in effect (serial runs only).
    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Whether fail-fast was requested but dropped because the run is parallel.
    pub fn fail_fast_ignored(&self) -> bool {
        self.fail_fast_ignored
    }

    /// Number of entries that will run.
    pub fn run_count(&self) -> usize {
        self.entries.iter().filter(|p| p.decision.is_run()).count()
    }

    /// Number of entries skipped at planning time.
    pub fn skip_count(&self) -> usize {
        self.len() - self.run_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(relpath: &str, tags: &[Tag]) -> ScriptEntry {
        ScriptEntry {
            path: PathBuf::from("/project").join(relpath),
            relpath: relpath.to_string(),
            tags: tags.iter().copied().collect(),
        }
    }

    #[test]
    fn test_interactive_skipped_without_overrides() {
        let entries = vec![entry("a.py", &[Tag::Interactive]), entry("b.py", &[])];
        let plan = Scheduler::new(RunOverrides::new(false), AutoSkipList::default()).plan(entries);

        assert_eq!(
            plan.entries()[0].decision,
            Decision::Skip(vec![SkipReason::Blocked(Tag::Interactive)])
        );
        assert_eq!(plan.entries()[1].decision, Decision::Run);
        assert_eq!(plan.run_count(), 1);
        assert_eq!(plan.skip_count(), 1);
    }

    #[test]
    fn test_auto_skip_reported_in_automation_mode() {
        let auto_skip = AutoSkipList::new(["x.py"]);
        let decision = decide(&entry("x.py", &[]), &RunOverrides::new(true), &auto_skip);
        assert_eq!(decision, Decision::Skip(vec![SkipReason::AutoSkip]));
    }

    #[test]
    fn test_auto_skip_ignored_without_automation() {
        let auto_skip = AutoSkipList::new(["x.py"]);
        let decision = decide(&entry("x.py", &[]), &RunOverrides::new(false), &auto_skip);
        assert_eq!(decision, Decision::Run);
    }

    #[test]
    fn test_auto_skip_is_an_additional_reason() {
        let auto_skip = AutoSkipList::new(["x.py"]);
        let decision =
            decide(&entry("x.py", &[Tag::Server, Tag::Audio]), &RunOverrides::new(true), &auto_skip);
        assert_eq!(
            decision,
            Decision::Skip(vec![
                SkipReason::Blocked(Tag::Server),
                SkipReason::Blocked(Tag::Audio),
                SkipReason::AutoSkip,
            ])
        );
    }

    #[test]
    fn test_automation_unblocks_interactive() {
        let overrides = RunOverrides::new(true);
        assert!(overrides.effective().contains(&Tag::Interactive));
        assert!(!overrides.is_explicit(Tag::Interactive));

        let decision = decide(&entry("a.py", &[Tag::Interactive]), &overrides, &AutoSkipList::default());
        assert_eq!(decision, Decision::Run);
    }

    #[test]
    fn test_includes_unblock_categories() {
        let overrides = RunOverrides::new(false).with_includes([Tag::Server, Tag::External]);
        let blocked = overrides.blocked();
        assert!(blocked.contains(&Tag::Interactive));
        assert!(blocked.contains(&Tag::Audio));
        assert!(!blocked.contains(&Tag::Server));
        assert!(!blocked.contains(&Tag::External));
    }

    #[test]
    fn test_concurrency_forced_serial_for_interactive() {
        let entries = vec![entry("a.py", &[Tag::Interactive]), entry("b.py", &[])];
        let overrides = RunOverrides::new(false).with_include(Tag::Interactive);
        let plan = Scheduler::new(overrides, AutoSkipList::default()).with_jobs(8).plan(entries);

        assert_eq!(plan.concurrency(), 1);
        assert_eq!(plan.entries()[0].output, OutputMode::Live);
        assert!(plan.entries()[0].attach_stdin);
        assert_eq!(plan.entries()[1].output, OutputMode::Buffered);
        assert!(!plan.entries()[1].attach_stdin);
    }

    #[test]
    fn test_explicit_interactive_include_forces_serial_even_without_interactive_entries() {
        let overrides = RunOverrides::new(false).with_include(Tag::Interactive);
        let running = [entry("b.py", &[])];
        assert_eq!(resolve_concurrency(&running, &overrides, 4), 1);
    }

    #[test]
    fn test_skipped_interactive_does_not_force_serial() {
        let entries = vec![entry("a.py", &[Tag::Interactive]), entry("b.py", &[])];
        let plan = Scheduler::new(RunOverrides::new(false), AutoSkipList::default())
            .with_jobs(3)
            .plan(entries);
        assert_eq!(plan.concurrency(), 3);
    }

    #[test]
    fn test_automation_keeps_requested_concurrency() {
        let entries = vec![entry("a.py", &[Tag::Interactive]), entry("b.py", &[])];
        let plan = Scheduler::new(RunOverrides::new(true), AutoSkipList::default())
            .with_jobs(4)
            .plan(entries);

        assert_eq!(plan.concurrency(), 4);
        assert!(plan.entries().iter().all(|p| p.output == OutputMode::Buffered));
        assert!(plan.entries().iter().all(|p| !p.attach_stdin));
    }

    #[test]
    fn test_jobs_minimum_is_one() {
        let plan = Scheduler::new(RunOverrides::new(false), AutoSkipList::default())
            .with_jobs(0)
            .plan(vec![entry("b.py", &[])]);
        assert_eq!(plan.concurrency(), 1);
    }

    #[test]
    fn test_fail_fast_only_in_serial_mode() {
        let entries = vec![entry("a.py", &[]), entry("b.py", &[])];
        let scheduler = Scheduler::new(RunOverrides::new(false), AutoSkipList::default())
            .with_fail_fast(true);

        let serial = scheduler.clone().plan(entries.clone());
        assert!(serial.fail_fast());
        assert!(!serial.fail_fast_ignored());

        let parallel = scheduler.with_jobs(2).plan(entries);
        assert!(!parallel.fail_fast());
        assert!(parallel.fail_fast_ignored());
    }

    #[test]
    fn test_unbuffered_output_is_live() {
        let plan = Scheduler::new(RunOverrides::new(false), AutoSkipList::default())
            .with_jobs(2)
            .with_buffer_output(false)
            .plan(vec![entry("a.py", &[]), entry("b.py", &[])]);
        assert!(plan.entries().iter().all(|p| p.output == OutputMode::Live));
        assert!(plan.entries().iter().all(|p| !p.attach_stdin));
    }

    #[test]
    fn test_restrict_to_keeps_discovery_order() {
        let entries = vec![entry("a.py", &[]), entry("b.py", &[]), entry("c.py", &[])];
        let wanted = vec!["c.py".to_string(), "a.py".to_string(), "gone.py".to_string()];
        let (kept, missing) = restrict_to(entries, &wanted);

        let relpaths: Vec<_> = kept.iter().map(|e| e.relpath.as_str()).collect();
        assert_eq!(relpaths, vec!["a.py", "c.py"]);
        assert_eq!(missing, vec!["gone.py".to_string()]);
    }

    #[test]
    fn test_plan_is_idempotent() {
        let entries = vec![entry("a.py", &[Tag::Audio]), entry("b.py", &[]), entry("x.py", &[])];
        let scheduler =
            Scheduler::new(RunOverrides::new(true), AutoSkipList::new(["x.py"])).with_jobs(2);

        let first: Vec<_> =
            scheduler.plan(entries.clone()).entries().iter().map(|p| p.decision.clone()).collect();
        let second: Vec<_> =
            scheduler.plan(entries).entries().iter().map(|p| p.decision.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_skip_reason_names() {
        assert_eq!(SkipReason::Blocked(Tag::Interactive).as_str(), "interactive");
        assert_eq!(SkipReason::FailFast.to_string(), "fail-fast");
        assert_eq!(
            format_reasons(&[SkipReason::Blocked(Tag::Server), SkipReason::AutoSkip]),
            "server,auto-skip"
        );
    }

    #[test]
    fn test_auto_skip_list_normalizes() {
        let list = AutoSkipList::new(["examples\\a.py", " ", "examples/b.py "]);
        assert_eq!(list.len(), 2);
        assert!(list.contains("examples/a.py"));
        assert!(list.contains("examples/b.py"));
    }
}
