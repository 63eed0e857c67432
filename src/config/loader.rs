//! Configuration loading and discovery for `exrun.toml`
//!
//! Provides functions to find and load the project configuration.

use super::schema::RunnerConfig;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file name searched for from the current directory upward.
pub const CONFIG_FILE: &str = "exrun.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse exrun.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// Find exrun.toml by walking up from the current working directory.
pub fn find_config() -> Option<PathBuf> {
    env::current_dir().ok().and_then(find_config_from)
}

/// Find exrun.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.is_file() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration from a specific file path.
pub fn load_config_file(path: &Path) -> Result<RunnerConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: RunnerConfig = toml::from_str(&contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    Ok(config)
}

/// Locate and load the configuration, returning it with the project root.
///
/// With an explicit path the project root is that file's directory. Without
/// one, `exrun.toml` is searched upward from the current directory; when no
/// file exists the defaults apply and the current directory is the root.
pub fn load_project(explicit: Option<&Path>) -> Result<(RunnerConfig, PathBuf), ConfigError> {
    let config_path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(path) => {
            let config = load_config_file(&path)?;
            let root = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => env::current_dir()?,
            };
            tracing::debug!(config = %path.display(), "loaded config");
            Ok((config, absolute(root)?))
        }
        None => Ok((RunnerConfig::default(), env::current_dir()?)),
    }
}

/// Make a path absolute against the current directory.
fn absolute(path: PathBuf) -> Result<PathBuf, std::io::Error> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(env::current_dir()?.join(path))
    }
}

/// Resolve a path relative to the project root.
///
/// If the path is absolute, returns it unchanged.
/// If relative, joins it with the project root.
pub fn resolve_path(project_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_config_in_current_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = temp.path().join(CONFIG_FILE);
        fs::write(&config_path, "").expect("should write config");

        assert_eq!(find_config_from(temp.path().to_path_buf()), Some(config_path));
    }

    #[test]
    fn test_find_config_in_parent_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = temp.path().join(CONFIG_FILE);
        fs::write(&config_path, "").expect("should write config");

        let subdir = temp.path().join("examples").join("basic");
        fs::create_dir_all(&subdir).expect("should create subdirectories");

        assert_eq!(find_config_from(subdir), Some(config_path));
    }

    #[test]
    fn test_find_config_not_found() {
        let temp = TempDir::new().expect("should create temp dir");
        assert_eq!(find_config_from(temp.path().to_path_buf()), None);
    }

    #[test]
    fn test_load_project_explicit_path() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = temp.path().join("custom.toml");
        fs::write(&config_path, "[project]\nexamples = \"demos\"\n").expect("should write config");

        let (config, root) = load_project(Some(&config_path)).expect("should load");
        assert_eq!(config.project.examples, PathBuf::from("demos"));
        assert_eq!(root, temp.path());
    }

    #[test]
    fn test_load_config_parse_error() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = temp.path().join(CONFIG_FILE);
        fs::write(&config_path, "[scan\nextensions = 1").expect("should write config");

        let err = load_config_file(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_validation_error() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = temp.path().join(CONFIG_FILE);
        fs::write(&config_path, "[launcher]\ncommand = []\n").expect("should write config");

        let err = load_config_file(&config_path).unwrap_err();
        match err {
            ConfigError::Validation(errors) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].contains("launcher.command"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_path() {
        let root = Path::new("/project");
        assert_eq!(resolve_path(root, Path::new("logs")), PathBuf::from("/project/logs"));
        assert_eq!(resolve_path(root, Path::new("/tmp/logs")), PathBuf::from("/tmp/logs"));
    }
}
