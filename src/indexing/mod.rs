//! Per-file pipeline and the worker pool that drives it

pub mod errors;
pub mod parallel;
pub mod pipeline;
pub mod progress;

pub use errors::{ErrorCollector, ErrorReport, FileError, IndexingError, ProcessingStage};
pub use parallel::{scan_tree, IndexRun, IndexerOptions, ParallelIndexer};
pub use pipeline::{ContentRecord, FileCandidate, FileMetadata, TextEncoding};
pub use progress::{IndexStats, ProgressReporter};
