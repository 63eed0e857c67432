//! Environment variable overrides.
//!
//! Read once at startup through a lookup function so tests never need to
//! touch the real process environment.

use crate::scan::{Tag, TagSet};

pub const ENV_INTERACTIVE_MODE: &str = "EXAMPLES_INTERACTIVE_MODE";
pub const ENV_INCLUDE_INTERACTIVE: &str = "EXAMPLES_INCLUDE_INTERACTIVE";
pub const ENV_INCLUDE_SERVER: &str = "EXAMPLES_INCLUDE_SERVER";
pub const ENV_INCLUDE_AUDIO: &str = "EXAMPLES_INCLUDE_AUDIO";
pub const ENV_INCLUDE_EXTERNAL: &str = "EXAMPLES_INCLUDE_EXTERNAL";
pub const ENV_AUTO_SKIP: &str = "EXAMPLES_AUTO_SKIP";
pub const ENV_BUFFER_OUTPUT: &str = "EXAMPLES_BUFFER_OUTPUT";
pub const ENV_JOBS: &str = "EXAMPLES_JOBS";
/// `tracing` filter for harness diagnostics
pub const ENV_LOG: &str = "EXRUN_LOG";

/// Values taken from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// `EXAMPLES_INTERACTIVE_MODE=auto`
    pub auto_mode: bool,
    /// Categories unblocked by `EXAMPLES_INCLUDE_*`
    pub include: TagSet,
    /// Replacement auto-skip list
    pub auto_skip: Option<Vec<String>>,
    pub buffer_output: Option<bool>,
    pub jobs: Option<usize>,
}

impl EnvOverrides {
    /// Read overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let auto_mode = lookup(ENV_INTERACTIVE_MODE)
            .map(|v| v.trim().eq_ignore_ascii_case("auto"))
            .unwrap_or(false);

        let include = [
            (ENV_INCLUDE_INTERACTIVE, Tag::Interactive),
            (ENV_INCLUDE_SERVER, Tag::Server),
            (ENV_INCLUDE_AUDIO, Tag::Audio),
            (ENV_INCLUDE_EXTERNAL, Tag::External),
        ]
        .into_iter()
        .filter(|(key, _)| lookup(key).and_then(|v| parse_bool(&v)).unwrap_or(false))
        .map(|(_, tag)| tag)
        .collect();

        let auto_skip = lookup(ENV_AUTO_SKIP).map(|v| parse_relpath_list(&v));

        let buffer_output = lookup(ENV_BUFFER_OUTPUT).and_then(|v| {
            let parsed = parse_bool(&v);
            if parsed.is_none() {
                tracing::warn!(value = %v, "ignoring unrecognized {}", ENV_BUFFER_OUTPUT);
            }
            parsed
        });

        let jobs = lookup(ENV_JOBS).and_then(|v| match v.trim().parse::<usize>() {
            Ok(n) => Some(n.max(1)),
            Err(_) => {
                tracing::warn!(value = %v, "ignoring non-numeric {}", ENV_JOBS);
                None
            }
        });

        Self { auto_mode, include, auto_skip, buffer_output, jobs }
    }
}

/// Parse a boolean environment value (`1/true/yes/on`, `0/false/no/off`).
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Split a whitespace or comma separated list of relpaths.
pub fn parse_relpath_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
