//! Command-line interface implementation
//!
//! Without a subcommand `exrun` discovers and runs example scripts;
//! `exrun collect` turns a main log back into a rerun list.

mod collect;
mod run;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::config::env::ENV_LOG;
use crate::config::CliOverrides;
use crate::scan::{Tag, TagSet};

pub use run::RunError;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// exrun - run example scripts concurrently and report failures
#[derive(Parser)]
#[command(name = "exrun")]
#[command(about = "Discover, run and report on example entry-point scripts")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect failed scripts from a main log into a rerun list
    Collect {
        /// Main log written by a previous run
        log: PathBuf,

        /// Output file (overwritten). Prints to stdout if omitted
        output: Option<PathBuf>,
    },
}

/// Flags for a run
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Only run scripts whose path contains this text (case-insensitive, repeatable)
    #[arg(short, long = "filter", value_name = "TEXT")]
    pub filter: Vec<String>,

    /// List what would run without starting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Run scripts that prompt for user input
    #[arg(long)]
    pub include_interactive: bool,

    /// Run scripts that start long-lived servers
    #[arg(long)]
    pub include_server: bool,

    /// Run scripts that need audio devices
    #[arg(long)]
    pub include_audio: bool,

    /// Run scripts that need external services or credentials
    #[arg(long)]
    pub include_external: bool,

    /// Stop starting new scripts after the first failure (serial runs only)
    #[arg(long)]
    pub fail_fast: bool,

    /// Print detected tags and commands
    #[arg(short, long)]
    pub verbose: bool,

    /// Directory for per-script logs and the main log
    #[arg(long, value_name = "DIR")]
    pub logs_dir: Option<PathBuf>,

    /// Main log location (default: <logs-dir>/main.log)
    #[arg(long, value_name = "PATH")]
    pub main_log: Option<PathBuf>,

    /// Only run scripts listed in this file
    #[arg(long, value_name = "PATH")]
    pub rerun_file: Option<PathBuf>,

    /// Write failed scripts to the rerun list
    #[arg(long)]
    pub write_rerun: bool,

    /// Print the automation skip list and exit
    #[arg(long)]
    pub print_auto_skip: bool,

    /// Automation mode: auto-approve prompts and apply the skip list
    #[arg(long)]
    pub auto_mode: bool,

    /// Number of scripts to run at once (default: EXAMPLES_JOBS, else 1)
    #[arg(short, long, value_parser = parse_jobs)]
    pub jobs: Option<usize>,

    /// Stream output as it arrives instead of in per-script blocks
    #[arg(long)]
    pub no_buffer: bool,

    /// Emit progress events as JSON lines on stderr
    #[arg(long)]
    pub json: bool,

    /// Use this config file instead of searching for exrun.toml
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl RunArgs {
    /// Categories unblocked by include flags.
    pub fn includes(&self) -> TagSet {
        [
            (self.include_interactive, Tag::Interactive),
            (self.include_server, Tag::Server),
            (self.include_audio, Tag::Audio),
            (self.include_external, Tag::External),
        ]
        .into_iter()
        .filter(|(on, _)| *on)
        .map(|(_, tag)| tag)
        .collect()
    }

    /// Flag-level overrides for settings resolution.
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            filters: self.filter.clone(),
            dry_run: self.dry_run,
            include: self.includes(),
            fail_fast: self.fail_fast,
            verbose: self.verbose,
            logs_dir: self.logs_dir.clone(),
            main_log: self.main_log.clone(),
            rerun_file: self.rerun_file.clone(),
            write_rerun: self.write_rerun,
            auto_mode: self.auto_mode,
            jobs: self.jobs,
            no_buffer: self.no_buffer,
            json: self.json,
        }
    }
}

fn parse_jobs(value: &str) -> Result<usize, String> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{}' is not a positive integer", value)),
    }
}

/// Install the diagnostics subscriber. `EXRUN_LOG` holds the filter.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env(ENV_LOG)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Collect { log, output }) => collect::run_collect(&log, output.as_deref()),
        None => run::run_examples(&cli.run),
    }
}
