use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::classifier::ClassificationVerdict;
use super::ignore_rules::RuleSet;
use crate::indexing::FileCandidate;

/// A regular file found under the project root, with the exclusion it hit
/// (if any) before content classification
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub candidate: FileCandidate,
    /// `Hidden` or `IgnoredByRule`; `None` when the file still needs classifying
    pub exclusion: Option<ClassificationVerdict>,
}

/// Walks a project tree and yields file candidates
///
/// Symbolic links are never followed, so link cycles cannot occur.
pub struct FileDiscoverer {
    root: PathBuf,
    rules: Arc<RuleSet>,
}

impl FileDiscoverer {
    pub fn new(root: PathBuf, rules: Arc<RuleSet>) -> Self {
        Self { root, rules }
    }

    /// Every regular file under the root, tagged with its exclusion.
    ///
    /// Hidden entries (any path component starting with `.`) are tagged
    /// `Hidden` before rules are consulted. Each call re-walks the tree.
    pub fn walk(&self) -> impl Iterator<Item = DiscoveredFile> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(move |entry| self.discovered(entry.into_path()))
    }

    /// Only the files that pass the hidden and ignore-rule checks
    pub fn discover(&self) -> impl Iterator<Item = FileCandidate> + '_ {
        self.walk()
            .filter(|file| file.exclusion.is_none())
            .map(|file| file.candidate)
    }

    /// Collect the full walk into a Vec
    pub fn collect_files(&self) -> Vec<DiscoveredFile> {
        self.walk().collect()
    }

    fn discovered(&self, absolute_path: PathBuf) -> Option<DiscoveredFile> {
        let relative_path = match absolute_path.strip_prefix(&self.root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => {
                warn!(path = %absolute_path.display(), "Entry outside project root");
                return None;
            }
        };

        let (size_bytes, modified) = match std::fs::metadata(&absolute_path) {
            Ok(metadata) => (
                metadata.len(),
                metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            ),
            Err(e) => {
                debug!(path = %absolute_path.display(), error = %e, "Failed to stat file");
                (0, SystemTime::UNIX_EPOCH)
            }
        };

        let exclusion = if is_hidden(&relative_path) {
            Some(ClassificationVerdict::Hidden)
        } else if self.rules.matches(&relative_path) {
            Some(ClassificationVerdict::IgnoredByRule)
        } else {
            None
        };

        Some(DiscoveredFile {
            candidate: FileCandidate {
                absolute_path,
                relative_path,
                size_bytes,
                modified,
            },
            exclusion,
        })
    }
}

/// Whether any component of a relative path starts with `.`
pub fn is_hidden(relative_path: &Path) -> bool {
    relative_path.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .map(|name| name.starts_with('.') && name != "." && name != "..")
            .unwrap_or(false)
    })
}
