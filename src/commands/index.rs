//! Index command implementation.

use anyhow::Result;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::IndexArgs;
use crate::config::Config;
use crate::indexing::{IndexRun, IndexerOptions, IndexingError, ParallelIndexer, ProgressReporter};
use crate::metrics;
use crate::storage::open_store;

use super::search::{print_results, query_collection};

/// Exit status for a run stopped by an interrupt
pub const EXIT_INTERRUPTED: u8 = 130;

/// What to do about an interrupt signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Stop dispatching and let in-flight files finish
    Drain,
    /// Exit immediately
    ForceExit,
}

/// First interrupt drains the run, any later one forces the exit
pub struct InterruptHandler {
    cancel: CancellationToken,
}

impl InterruptHandler {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn on_signal(&self) -> InterruptAction {
        if self.cancel.is_cancelled() {
            InterruptAction::ForceExit
        } else {
            self.cancel.cancel();
            InterruptAction::Drain
        }
    }
}

/// Run the index command.
///
/// Setup failures return `Err`; a completed run returns success whatever its
/// per-file failure count, and an interrupted run returns 130.
pub async fn run(args: IndexArgs, mut config: Config, cancel: CancellationToken) -> Result<ExitCode> {
    args.apply(&mut config);

    let embedder = super::load_embedder(&config.embeddings)
        .await
        .map_err(IndexingError::Setup)?;
    let store = open_store(&config.storage).await.map_err(IndexingError::Setup)?;

    info!(
        project = %args.project,
        collection = %config.storage.collection,
        backend = store.backend_name(),
        model = %config.embeddings.model,
        "Starting indexing"
    );

    let options = IndexerOptions::from_config(&config, &args.project, &config.storage.collection);
    let indexer = ParallelIndexer::new(embedder.clone(), store.clone(), options)
        .with_cancellation(cancel);
    let reporter = Arc::new(ProgressReporter::new(config.indexer.show_progress));

    let IndexRun {
        stats,
        errors,
        vector_field,
    } = indexer.index_project(&args.path, reporter).await?;

    stats.print_summary();
    println!();
    errors.print_summary();

    if stats.interrupted {
        warn!("Run interrupted after {} of {} eligible files", stats.processed(), stats.eligible);
    } else if let Some(query) = &args.query {
        println!();
        let hits = query_collection(
            store.as_ref(),
            embedder.as_ref(),
            &config.storage.collection,
            &vector_field,
            query,
            args.limit,
        )
        .await?;
        print_results(query, &hits);
    }

    if args.metrics {
        println!();
        print!("{}", metrics::gather_metrics());
    }

    Ok(if stats.interrupted {
        ExitCode::from(EXIT_INTERRUPTED)
    } else {
        ExitCode::SUCCESS
    })
}
