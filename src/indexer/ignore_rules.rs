//! Gitignore-style path exclusion rules.
//!
//! A [`RuleSet`] combines the built-in defaults with the project's own ignore
//! file, in that order, so project rules can override or re-include anything
//! the defaults exclude.

use anyhow::{Context, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Patterns excluded in every project regardless of local ignore files.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git/",
    "node_modules/",
    "__pycache__/",
    "*.pyc",
    "*.pyo",
    "*.pyd",
    "*.so",
    "build/",
    "dist/",
    "target/",
    "*.egg-info/",
    ".env",
    ".env.*",
    "venv/",
    ".venv/",
    ".mypy_cache/",
    ".pytest_cache/",
    ".idea/",
    ".vscode/",
    "*.swp",
    "*.swo",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "poetry.lock",
];

/// Compiled, ordered set of ignore rules anchored at a project root
pub struct RuleSet {
    root: PathBuf,
    matcher: Gitignore,
    rule_count: usize,
}

impl RuleSet {
    /// Compile the default rules plus the project's ignore file (if present).
    ///
    /// `ignore_file` is resolved relative to `root`. Extra patterns are
    /// appended last and therefore take precedence over both.
    pub fn compile(root: &Path, ignore_file: &str, extra_patterns: &[String]) -> Result<Self> {
        let mut lines: Vec<String> = DEFAULT_IGNORE_PATTERNS
            .iter()
            .map(|p| p.to_string())
            .collect();

        let ignore_path = root.join(ignore_file);
        if ignore_path.is_file() {
            match std::fs::read_to_string(&ignore_path) {
                Ok(content) => {
                    debug!(path = %ignore_path.display(), "Loading project ignore rules");
                    lines.extend(parse_ignore_lines(&content));
                }
                Err(e) => {
                    warn!(path = %ignore_path.display(), error = %e, "Failed to read ignore file");
                }
            }
        }

        lines.extend(extra_patterns.iter().cloned());
        Self::from_lines(root, lines)
    }

    /// Build a rule set from already-parsed pattern lines.
    pub fn from_lines<I, S>(root: &Path, lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GitignoreBuilder::new(root);
        let mut rule_count = 0;

        for line in lines {
            let line = line.as_ref();
            if let Err(e) = builder.add_line(None, line) {
                warn!(pattern = line, error = %e, "Skipping invalid ignore pattern");
                continue;
            }
            rule_count += 1;
        }

        let matcher = builder
            .build()
            .with_context(|| format!("Failed to compile ignore rules for {}", root.display()))?;

        Ok(Self {
            root: root.to_path_buf(),
            matcher,
            rule_count,
        })
    }

    /// Whether a file path is excluded.
    ///
    /// Absolute paths outside the root never match. Relative paths that
    /// escape the root (`..`) cannot be resolved and are treated as ignored.
    pub fn matches(&self, path: &Path) -> bool {
        self.matches_entry(path, false)
    }

    /// Whether a directory path is excluded.
    pub fn matches_dir(&self, path: &Path) -> bool {
        self.matches_entry(path, true)
    }

    fn matches_entry(&self, path: &Path, is_dir: bool) -> bool {
        let relative = if path.is_absolute() {
            match path.strip_prefix(&self.root) {
                Ok(relative) => relative,
                Err(_) => return false,
            }
        } else {
            path
        };

        let Some(normalized) = normalize_relative(relative) else {
            return true;
        };
        if normalized.as_os_str().is_empty() {
            return false;
        }

        self.matcher
            .matched_path_or_any_parents(&normalized, is_dir)
            .is_ignore()
    }

    /// Number of rules compiled into the matcher
    pub fn len(&self) -> usize {
        self.rule_count
    }

    pub fn is_empty(&self) -> bool {
        self.rule_count == 0
    }
}

/// Non-empty, non-comment lines of an ignore file
fn parse_ignore_lines(content: &str) -> impl Iterator<Item = String> + '_ {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
}

/// Drop `.` components; `None` when the path escapes upward or carries a root.
fn normalize_relative(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(normalized)
}
