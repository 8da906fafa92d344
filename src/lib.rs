pub mod cli;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod indexer;
pub mod indexing;
pub mod logging;
pub mod metrics;
pub mod storage;

pub use config::Config;
pub use indexing::{IndexStats, IndexerOptions, ParallelIndexer, ProgressReporter};
