//! Error collection and reporting for parallel indexing

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors that abort a whole indexing run
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Vector store unreachable, model not loadable, bad project root, etc.
    #[error("Setup failed: {0:#}")]
    Setup(#[source] anyhow::Error),

    /// The deployment is broken; retrying per file would not help
    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl IndexingError {
    pub fn setup(error: impl Into<anyhow::Error>) -> Self {
        Self::Setup(error.into())
    }
}

/// Stage where a per-file error occurred
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum ProcessingStage {
    FileRead,
    Identity,
    Embedding,
    Storage,
    Task,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::FileRead => write!(f, "File Read"),
            ProcessingStage::Identity => write!(f, "Identity"),
            ProcessingStage::Embedding => write!(f, "Embedding"),
            ProcessingStage::Storage => write!(f, "Storage"),
            ProcessingStage::Task => write!(f, "Task"),
        }
    }
}

/// Error that occurred while processing a file
#[derive(Debug, Clone)]
pub struct FileError {
    pub path: PathBuf,
    pub error: String,
    pub stage: ProcessingStage,
}

impl FileError {
    pub fn new(path: impl Into<PathBuf>, stage: ProcessingStage, error: impl std::fmt::Display) -> Self {
        Self {
            path: path.into(),
            error: error.to_string(),
            stage,
        }
    }
}

/// Collects per-file errors from concurrent workers
#[derive(Clone, Default)]
pub struct ErrorCollector {
    errors: Arc<Mutex<Vec<FileError>>>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FileError>> {
        self.errors.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record an error that occurred during processing
    pub fn record(&self, error: FileError) {
        self.lock().push(error);
    }

    /// Get the current error count
    pub fn error_count(&self) -> usize {
        self.lock().len()
    }

    /// Generate an error report
    pub fn get_report(&self) -> ErrorReport {
        ErrorReport::from_errors(&self.lock())
    }
}

/// Errors grouped by stage
#[derive(Debug)]
pub struct ErrorReport {
    pub total_errors: usize,
    pub by_stage: BTreeMap<ProcessingStage, Vec<FileError>>,
    pub summary: String,
}

impl ErrorReport {
    /// Create a report from a list of errors
    pub fn from_errors(errors: &[FileError]) -> Self {
        let mut by_stage: BTreeMap<ProcessingStage, Vec<FileError>> = BTreeMap::new();

        for error in errors {
            by_stage.entry(error.stage).or_default().push(error.clone());
        }

        let summary = if errors.is_empty() {
            "No errors occurred during processing".to_string()
        } else {
            format!("Processing completed with {} errors", errors.len())
        };

        Self {
            total_errors: errors.len(),
            by_stage,
            summary,
        }
    }

    /// Print a summary of the errors to stdout
    pub fn print_summary(&self) {
        if self.total_errors == 0 {
            println!("✅ {}", self.summary);
            return;
        }

        println!("⚠️  {}", self.summary);
        println!();

        for (stage, errors) in &self.by_stage {
            println!("  {}: {} errors", stage, errors.len());

            // Show up to 5 examples per stage
            for error in errors.iter().take(5) {
                println!("    - {}: {}", error.path.display(), error.error);
            }

            if errors.len() > 5 {
                println!("    ... and {} more", errors.len() - 5);
            }
        }
    }

    /// Check if any errors occurred
    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    pub fn count_for(&self, stage: ProcessingStage) -> usize {
        self.by_stage.get(&stage).map(Vec::len).unwrap_or(0)
    }
}
