//! Per-invocation settings.
//!
//! The config file, environment and CLI flags are merged exactly once into
//! an immutable [`RunSettings`] that is threaded through the scanner,
//! scheduler and executor.

use super::env::EnvOverrides;
use super::loader::{resolve_path, ConfigError};
use super::schema::RunnerConfig;
use crate::exec::Launcher;
use crate::scan::{Scanner, TagSet};
use crate::schedule::{AutoSkipList, RunOverrides, Scheduler};
use chrono::{DateTime, Local};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Options that come from command-line flags.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Relpath substring filters
    pub filters: Vec<String>,
    pub dry_run: bool,
    /// Categories unblocked by `--include-*`
    pub include: TagSet,
    pub fail_fast: bool,
    pub verbose: bool,
    pub logs_dir: Option<PathBuf>,
    pub main_log: Option<PathBuf>,
    /// Restrict the run to relpaths listed in this file
    pub rerun_file: Option<PathBuf>,
    pub write_rerun: bool,
    pub auto_mode: bool,
    pub jobs: Option<usize>,
    pub no_buffer: bool,
    pub json: bool,
}

impl CliOverrides {
    /// Anchor relative path flags to the directory the user ran from.
    pub fn relative_to(mut self, cwd: &Path) -> Self {
        for path in [&mut self.logs_dir, &mut self.main_log, &mut self.rerun_file].into_iter().flatten() {
            *path = resolve_path(cwd, path);
        }
        self
    }
}

/// Immutable settings for one invocation.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Working directory for every script and base for relpaths
    pub project_root: PathBuf,
    /// Directory scanned for entry points
    pub examples_dir: PathBuf,
    pub extensions: Vec<String>,
    pub excludes: Vec<String>,
    pub entry_marker: Regex,
    pub launcher: Launcher,
    pub filters: Vec<String>,
    pub overrides: RunOverrides,
    pub auto_skip: AutoSkipList,
    pub automation: bool,
    /// Variables added to child environments in automation mode
    pub automation_env: BTreeMap<String, String>,
    /// Requested worker count (before the interactive safety clamp)
    pub jobs: usize,
    pub fail_fast: bool,
    pub dry_run: bool,
    pub verbose: bool,
    pub buffer_output: bool,
    pub json: bool,
    pub logs_dir: PathBuf,
    pub main_log: PathBuf,
    /// Restrict the run to relpaths listed in this file
    pub rerun_filter: Option<PathBuf>,
    pub write_rerun: bool,
    /// Fixed location of the rerun list
    pub rerun_path: PathBuf,
}

impl RunSettings {
    /// Merge config, environment and CLI flags.
    ///
    /// Precedence is CLI > environment > config > built-in default. Include
    /// flags and the automation toggle only ever enable.
    pub fn resolve(
        config: RunnerConfig,
        project_root: PathBuf,
        env: &EnvOverrides,
        cli: &CliOverrides,
        started: DateTime<Local>,
    ) -> Result<Self, ConfigError> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
        }

        let entry_marker = Regex::new(&config.scan.entry_marker)
            .map_err(|e| ConfigError::Validation(vec![format!("scan.entry_marker: {}", e)]))?;

        let automation = cli.auto_mode || env.auto_mode;
        let include: TagSet = cli.include.union(&env.include).copied().collect();
        let overrides = RunOverrides::new(automation).with_includes(include);

        let auto_skip = match &env.auto_skip {
            Some(list) => AutoSkipList::new(list),
            None => AutoSkipList::new(&config.automation.auto_skip),
        };

        let jobs = cli.jobs.or(env.jobs).or(config.run.jobs).unwrap_or(1).max(1);
        let buffer_output = !cli.no_buffer && env.buffer_output.unwrap_or(config.run.buffer_output);

        let logs_dir = match cli.logs_dir.as_ref().or(config.run.logs_dir.as_ref()) {
            Some(dir) => resolve_path(&project_root, dir),
            None => default_logs_dir(started),
        };
        let main_log = match &cli.main_log {
            Some(path) => resolve_path(&project_root, path),
            None => logs_dir.join("main.log"),
        };

        let launcher = Launcher::new(&config.launcher.command, config.launcher.target);

        Ok(Self {
            examples_dir: resolve_path(&project_root, &config.project.examples),
            rerun_path: resolve_path(&project_root, &config.project.rerun_file),
            rerun_filter: cli.rerun_file.as_ref().map(|p| resolve_path(&project_root, p)),
            project_root,
            extensions: config.scan.extensions,
            excludes: config.scan.exclude,
            entry_marker,
            launcher,
            filters: cli.filters.clone(),
            overrides,
            auto_skip,
            automation,
            automation_env: config.automation.env,
            jobs,
            fail_fast: cli.fail_fast,
            dry_run: cli.dry_run,
            verbose: cli.verbose,
            buffer_output,
            json: cli.json,
            logs_dir,
            main_log,
            write_rerun: cli.write_rerun,
        })
    }

    /// Scanner configured for this invocation.
    pub fn scanner(&self) -> Scanner {
        Scanner::new(&self.project_root, &self.examples_dir)
            .with_extensions(self.extensions.clone())
            .with_excludes(self.excludes.clone())
            .with_entry_marker(self.entry_marker.clone())
    }

    /// Scheduler configured for this invocation.
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.overrides.clone(), self.auto_skip.clone())
            .with_jobs(self.jobs)
            .with_fail_fast(self.fail_fast)
            .with_buffer_output(self.buffer_output)
    }

    /// Environment additions for child processes (empty outside automation).
    pub fn child_env(&self) -> BTreeMap<String, String> {
        if self.automation {
            self.automation_env.clone()
        } else {
            BTreeMap::new()
        }
    }
}

/// `<tmp>/exrun-logs/<timestamp>`
pub fn default_logs_dir(started: DateTime<Local>) -> PathBuf {
    std::env::temp_dir().join("exrun-logs").join(started.format("%Y%m%d-%H%M%S").to_string())
}
