//! Configuration schema types for `exrun.toml`
//!
//! Every section is optional; an empty file yields the defaults.

use crate::scan::discovery::{DEFAULT_ENTRY_MARKER, DEFAULT_EXCLUDES};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Scripts that hang or need credentials unattended runs never have.
/// Only consulted in automation mode.
pub const DEFAULT_AUTO_SKIP: &[&str] = &[
    "examples/hosted_mcp/approvals.py",
    "examples/hosted_mcp/human_in_the_loop.py",
    "examples/hosted_mcp/on_approval.py",
    "examples/hosted_mcp/simple.py",
    "examples/mcp/sse_remote_example/main.py",
    "examples/mcp/streamable_http_remote_example/main.py",
    "examples/model_providers/litellm_provider.py",
    "examples/tools/codex.py",
    "examples/tools/codex_same_thread.py",
    "examples/tools/computer_use.py",
    "examples/tools/container_shell_inline_skill.py",
    "examples/tools/container_shell_skill_reference.py",
];

/// How the script is named on the launcher command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LaunchTarget {
    /// Dotted module name (`python -m examples.basic.hello`)
    #[default]
    Module,
    /// Relative path (`sh examples/basic/hello.sh`)
    Path,
}

/// Project layout section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Directory scanned for entry points, relative to the project root
    #[serde(default = "default_examples")]
    pub examples: PathBuf,
    /// Where `--write-rerun` stores failed relpaths
    #[serde(default = "default_rerun_file")]
    pub rerun_file: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self { examples: default_examples(), rerun_file: default_rerun_file() }
    }
}

fn default_examples() -> PathBuf {
    PathBuf::from("examples")
}

fn default_rerun_file() -> PathBuf {
    PathBuf::from(".tmp/examples-rerun.txt")
}

/// Discovery section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// File extensions to scan, without the dot
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Directory names skipped anywhere in the tree
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
    /// Regex a file must match to count as an entry point
    #[serde(default = "default_entry_marker")]
    pub entry_marker: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            exclude: default_exclude(),
            entry_marker: default_entry_marker(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["py".to_string()]
}

fn default_exclude() -> Vec<String> {
    DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect()
}

fn default_entry_marker() -> String {
    DEFAULT_ENTRY_MARKER.to_string()
}

/// Launcher section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Program and leading arguments
    #[serde(default = "default_launcher_command")]
    pub command: Vec<String>,
    /// How the script is appended to the command
    #[serde(default)]
    pub target: LaunchTarget,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self { command: default_launcher_command(), target: LaunchTarget::default() }
    }
}

fn default_launcher_command() -> Vec<String> {
    ["uv", "run", "python", "-m"].iter().map(|s| s.to_string()).collect()
}

/// Automation mode section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Variables added to every child environment in automation mode
    #[serde(default = "default_automation_env")]
    pub env: BTreeMap<String, String>,
    /// Relpaths skipped in automation mode
    #[serde(default = "default_auto_skip")]
    pub auto_skip: Vec<String>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self { env: default_automation_env(), auto_skip: default_auto_skip() }
    }
}

fn default_automation_env() -> BTreeMap<String, String> {
    [
        ("EXAMPLES_INTERACTIVE_MODE", "auto"),
        ("APPLY_PATCH_AUTO_APPROVE", "1"),
        ("SHELL_AUTO_APPROVE", "1"),
        ("AUTO_APPROVE_MCP", "1"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_auto_skip() -> Vec<String> {
    DEFAULT_AUTO_SKIP.iter().map(|s| s.to_string()).collect()
}

/// Run section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Default worker count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
    /// Directory for per-script logs and the main log
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_dir: Option<PathBuf>,
    /// Buffer script output into contiguous blocks
    #[serde(default = "default_true")]
    pub buffer_output: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { jobs: None, logs_dir: None, buffer_output: true }
    }
}

fn default_true() -> bool {
    true
}

/// Complete `exrun.toml` configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub launcher: LauncherConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub run: RunConfig,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "launcher.command")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "exrun.toml: '{}' {}", self.field, self.message)
    }
}

impl RunnerConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.launcher.command.is_empty() || self.launcher.command[0].trim().is_empty() {
            errors.push(ConfigValidationError {
                field: "launcher.command".to_string(),
                message: "must name a program".to_string(),
            });
        }

        if self.scan.extensions.iter().all(|e| e.trim_start_matches('.').is_empty()) {
            errors.push(ConfigValidationError {
                field: "scan.extensions".to_string(),
                message: "must contain at least one extension".to_string(),
            });
        }

        if let Err(e) = regex::Regex::new(&self.scan.entry_marker) {
            errors.push(ConfigValidationError {
                field: "scan.entry_marker".to_string(),
                message: format!("is not a valid regex: {}", e),
            });
        }

        if self.run.jobs == Some(0) {
            errors.push(ConfigValidationError {
                field: "run.jobs".to_string(),
                message: "must be a positive integer".to_string(),
            });
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}
