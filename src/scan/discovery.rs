//! Entry-point discovery.
//!
//! Walks the examples directory with a recursive glob, keeps files that
//! carry an entry-point marker, and tags them.

use crate::scan::classify::{detect_tags, TagSet};
use glob::glob;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Default entry-point marker: a `__main__` guard with either quote style.
pub const DEFAULT_ENTRY_MARKER: &str = r#"__name__\s*==\s*['"]__main__['"]"#;

/// Directory names that never contain runnable examples.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "__pycache__",
    ".git",
    ".venv",
    "venv",
    "node_modules",
    "build",
    "dist",
    "target",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
];

/// Error during discovery. Per-file problems are never errors.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The discovery root does not exist
    #[error("examples directory not found: {}", .0.display())]
    MissingRoot(PathBuf),
    /// Invalid glob pattern built from the configured extensions
    #[error("invalid glob pattern '{0}': {1}")]
    InvalidPattern(String, glob::PatternError),
}

/// A discovered entry-point script. Immutable after discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptEntry {
    /// Absolute path to the script
    pub path: PathBuf,
    /// Forward-slash path relative to the project root
    pub relpath: String,
    /// Resource tags detected from path and source
    pub tags: TagSet,
}

impl ScriptEntry {
    /// Dotted module name (`examples/basic/hello.py` -> `examples.basic.hello`).
    pub fn module(&self) -> String {
        let stem = match self.relpath.rfind('.') {
            Some(dot) if dot > self.relpath.rfind('/').map(|s| s + 1).unwrap_or(0) => {
                &self.relpath[..dot]
            }
            _ => self.relpath.as_str(),
        };
        stem.replace('/', ".")
    }

    /// File name for this script's raw output log.
    pub fn log_file_name(&self) -> String {
        format!("{}.log", self.relpath.replace('/', "__"))
    }
}

/// Discovery settings.
#[derive(Debug, Clone)]
pub struct Scanner {
    /// Project root; relpaths are computed against it
    project_root: PathBuf,
    /// Directory to scan (absolute or relative to the project root)
    examples_dir: PathBuf,
    /// File extensions to consider, without the dot
    extensions: Vec<String>,
    /// Directory names to skip anywhere in the tree
    excludes: Vec<String>,
    /// Entry-point marker
    entry_marker: Regex,
}

impl Scanner {
    /// Create a scanner with the default extension, excludes and marker.
    pub fn new(project_root: impl Into<PathBuf>, examples_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            examples_dir: examples_dir.into(),
            extensions: vec!["py".to_string()],
            excludes: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            entry_marker: Regex::new(DEFAULT_ENTRY_MARKER).expect("default marker is valid"),
        }
    }

    /// Set the file extensions to scan.
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Set the excluded directory names.
    pub fn with_excludes(mut self, excludes: Vec<String>) -> Self {
        self.excludes = excludes;
        self
    }

    /// Set the entry-point marker.
    pub fn with_entry_marker(mut self, marker: Regex) -> Self {
        self.entry_marker = marker;
        self
    }

    /// Absolute discovery root.
    pub fn root(&self) -> PathBuf {
        if self.examples_dir.is_absolute() {
            self.examples_dir.clone()
        } else {
            self.project_root.join(&self.examples_dir)
        }
    }

    /// Discover entry points whose relpath matches any of `filters`.
    ///
    /// Filters are case-insensitive substrings, OR'd; no filters matches
    /// everything. The result is sorted by relpath.
    pub fn scan(&self, filters: &[String]) -> Result<Vec<ScriptEntry>, ScanError> {
        let root = self.root();
        if !root.is_dir() {
            return Err(ScanError::MissingRoot(root));
        }

        let filters: Vec<String> = filters.iter().map(|f| f.to_lowercase()).collect();
        let mut entries = Vec::new();

        for path in self.candidate_files(&root)? {
            let relpath = relative_path(&self.project_root, &path);
            if !filters.is_empty() {
                let lower = relpath.to_lowercase();
                if !filters.iter().any(|f| lower.contains(f.as_str())) {
                    continue;
                }
            }

            let source = match std::fs::read_to_string(&path) {
                Ok(source) => source,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };

            if !self.entry_marker.is_match(&source) {
                continue;
            }

            let tags = detect_tags(&relpath, &source);
            entries.push(ScriptEntry { path, relpath, tags });
        }

        entries.sort_by(|a, b| a.relpath.cmp(&b.relpath));
        entries.dedup_by(|a, b| a.relpath == b.relpath);
        Ok(entries)
    }

    /// All files under `root` with a scanned extension, minus excluded ones.
    fn candidate_files(&self, root: &Path) -> Result<Vec<PathBuf>, ScanError> {
        let mut files = Vec::new();
        let root_str = glob::Pattern::escape(&root.to_string_lossy());

        for ext in &self.extensions {
            let pattern = format!("{}/**/*.{}", root_str, ext.trim_start_matches('.'));
            let paths = glob(&pattern).map_err(|e| ScanError::InvalidPattern(pattern.clone(), e))?;

            for entry in paths {
                match entry {
                    Ok(path) => {
                        if path.is_file() && !self.is_excluded(root, &path) {
                            files.push(path);
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping unreadable path");
                    }
                }
            }
        }

        Ok(files)
    }

    /// Whether a path sits under an excluded directory or is a dunder file.
    fn is_excluded(&self, root: &Path, path: &Path) -> bool {
        if path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with("__")) {
            return true;
        }
        let inner = path.strip_prefix(root).unwrap_or(path);
        let Some(parent) = inner.parent() else {
            return false;
        };
        parent
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => name.to_str(),
                _ => None,
            })
            .any(|name| self.excludes.iter().any(|ex| ex == name))
    }
}

/// Forward-slash path of `path` relative to `base`.
///
/// Falls back to the full path when `path` is not under `base`.
pub fn relative_path(base: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
