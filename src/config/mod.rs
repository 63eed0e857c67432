//! Configuration module for exrun
//!
//! Provides `exrun.toml` parsing, environment overrides and the merged
//! per-invocation settings.

pub mod env;
pub mod loader;
pub mod schema;
pub mod settings;

pub use env::EnvOverrides;
pub use loader::{load_project, ConfigError, CONFIG_FILE};
pub use schema::*;
pub use settings::{CliOverrides, RunSettings};
