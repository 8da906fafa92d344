//! Bounded worker pool that indexes a project tree
//!
//! Discovery and classification run first so the eligible total is known
//! before any file is embedded. Eligible files are then dispatched to a
//! fixed number of workers; each worker runs read, identity, embed and
//! upsert for one file before taking the next.

use anyhow::{anyhow, Context};
use futures::FutureExt;
use rayon::prelude::*;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::embeddings::EmbeddingProvider;
use crate::indexer::{
    ClassificationVerdict, ContentClassifier, DeterministicId, FileDiscoverer, IdentityGenerator,
    IdentityKey, Md5IdentityGenerator, RuleSet,
};
use crate::metrics::{FILES_FAILED, FILES_INDEXED, INDEX_LATENCY};
use crate::storage::{IndexPoint, Payload, VectorStore};

use super::errors::{ErrorCollector, ErrorReport, FileError, IndexingError, ProcessingStage};
use super::pipeline::{ContentRecord, FileCandidate, FileMetadata};
use super::progress::{IndexStats, ProgressReporter};

const SELF_CHECK_PROJECT: &str = "semindex-self-check";
const SELF_CHECK_PATH: &str = "/semindex/self-check";

/// Knobs for one indexing run
#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub project: String,
    pub collection: String,
    pub workers: usize,
    pub max_file_size: u64,
    pub max_document_chars: usize,
    pub ignore_file: String,
    pub extra_ignore_patterns: Vec<String>,
    /// Forces the vector field instead of using the collection's or the provider's
    pub vector_name: Option<String>,
}

impl IndexerOptions {
    pub fn new(project: impl Into<String>, collection: impl Into<String>) -> Self {
        let defaults = crate::config::IndexerConfig::default();
        Self {
            project: project.into(),
            collection: collection.into(),
            workers: defaults.workers,
            max_file_size: defaults.max_file_size,
            max_document_chars: defaults.max_document_chars,
            ignore_file: defaults.ignore_file,
            extra_ignore_patterns: defaults.extra_ignore_patterns,
            vector_name: None,
        }
    }

    pub fn from_config(
        config: &crate::config::Config,
        project: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            collection: collection.into(),
            workers: config.indexer.workers,
            max_file_size: config.indexer.max_file_size,
            max_document_chars: config.indexer.max_document_chars,
            ignore_file: config.indexer.ignore_file.clone(),
            extra_ignore_patterns: config.indexer.extra_ignore_patterns.clone(),
            vector_name: config.embeddings.vector_name.clone(),
        }
    }
}

/// Result of a completed (possibly interrupted) run
#[derive(Debug)]
pub struct IndexRun {
    pub stats: IndexStats,
    pub errors: ErrorReport,
    /// Vector field the points were written to
    pub vector_field: String,
}

/// Indexes eligible files concurrently into one collection
pub struct ParallelIndexer {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    identity: Arc<dyn IdentityGenerator>,
    options: IndexerOptions,
    cancel: CancellationToken,
}

impl ParallelIndexer {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        options: IndexerOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            identity: Arc::new(Md5IdentityGenerator),
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_identity_generator(mut self, identity: Arc<dyn IdentityGenerator>) -> Self {
        self.identity = identity;
        self
    }

    /// Share an externally owned token, e.g. one tied to Ctrl-C
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Cancelling this token stops dispatch; in-flight files still finish
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &IndexerOptions {
        &self.options
    }

    /// The identity generator must be a pure function of its input.
    pub fn check_identity(&self) -> Result<(), IndexingError> {
        let sample_key = IdentityKey::for_file(SELF_CHECK_PROJECT, SELF_CHECK_PATH);
        let first = self
            .identity
            .generate(&sample_key)
            .map_err(|e| IndexingError::Invariant(format!("identity self-check failed: {}", e)))?;
        let second = self
            .identity
            .generate(&sample_key)
            .map_err(|e| IndexingError::Invariant(format!("identity self-check failed: {}", e)))?;

        if first != second {
            return Err(IndexingError::Invariant(format!(
                "identity generator is not deterministic ({} != {})",
                first, second
            )));
        }
        Ok(())
    }

    /// Run the startup checks and make sure the collection exists.
    ///
    /// Returns the vector field name to write to.
    pub async fn prepare(&self) -> Result<String, IndexingError> {
        self.check_identity()?;

        self.store
            .ping()
            .await
            .with_context(|| format!("Cannot reach {} vector store", self.store.backend_name()))
            .map_err(IndexingError::Setup)?;

        let collection = &self.options.collection;
        let dimension = self.embedder.vector_dimension();

        let existing = self
            .store
            .describe_collection(collection)
            .await
            .with_context(|| format!("Failed to describe collection {}", collection))
            .map_err(IndexingError::Setup)?;

        match existing {
            Some(info) => {
                if info.dimension != dimension {
                    return Err(IndexingError::setup(anyhow!(
                        "Collection {} stores {}-dimensional vectors but model {} produces {}",
                        collection,
                        info.dimension,
                        self.embedder.provider_name(),
                        dimension
                    )));
                }
                let field = self.options.vector_name.clone().unwrap_or(info.vector_field);
                info!(collection = %collection, vector_field = %field, "Using existing collection");
                Ok(field)
            }
            None => {
                let field = self
                    .options
                    .vector_name
                    .clone()
                    .unwrap_or_else(|| self.embedder.vector_field_name());
                self.store
                    .ensure_collection(collection, &field, dimension)
                    .await
                    .with_context(|| format!("Failed to create collection {}", collection))
                    .map_err(IndexingError::Setup)?;
                info!(collection = %collection, vector_field = %field, dimension, "Created collection");
                Ok(field)
            }
        }
    }

    /// Index every eligible file under `root`
    pub async fn index_project(
        &self,
        root: &Path,
        reporter: Arc<ProgressReporter>,
    ) -> Result<IndexRun, IndexingError> {
        let start = Instant::now();
        let root = resolve_root(root)?;

        let vector_field = self.prepare().await?;

        let rules = RuleSet::compile(&root, &self.options.ignore_file, &self.options.extra_ignore_patterns)
            .map_err(IndexingError::Setup)?;
        let discoverer = FileDiscoverer::new(root.clone(), Arc::new(rules));
        let classifier = ContentClassifier::new(self.options.max_file_size);

        info!("Scanning {}", root.display());
        let scan_reporter = reporter.clone();
        let scan_cancel = self.cancel.clone();
        let candidates = tokio::task::spawn_blocking(move || {
            scan_tree(&discoverer, &classifier, &scan_reporter, &scan_cancel)
        })
        .await
        .map_err(|e| IndexingError::setup(anyhow!("File scan task failed: {}", e)))?;

        info!(
            "{} eligible files to index with {} workers",
            candidates.len(),
            self.options.workers.max(1)
        );

        let run = self.run(candidates, &vector_field, reporter).await;

        // Single-point writes leave many small fragments behind in some backends
        if run.stats.indexed > 0 {
            if let Err(e) = self.store.optimize(&self.options.collection).await {
                warn!("Failed to optimize collection {}: {:#}", self.options.collection, e);
            }
        }

        INDEX_LATENCY.observe(start.elapsed().as_secs_f64());
        Ok(run)
    }

    /// Process eligible candidates on the worker pool.
    ///
    /// Per-file failures are counted, never propagated. When the token is
    /// cancelled no new file is started and the partial counts are returned.
    /// The error report covers this call only.
    pub async fn run(
        &self,
        candidates: Vec<FileCandidate>,
        vector_field: &str,
        reporter: Arc<ProgressReporter>,
    ) -> IndexRun {
        let workers = self.options.workers.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let errors = ErrorCollector::new();
        let worker = Worker {
            embedder: self.embedder.clone(),
            store: self.store.clone(),
            identity: self.identity.clone(),
            errors: errors.clone(),
            project: self.options.project.as_str().into(),
            collection: self.options.collection.as_str().into(),
            vector_field: vector_field.into(),
            max_document_chars: self.options.max_document_chars,
        };

        reporter.begin(candidates.len());
        let mut tasks = JoinSet::new();

        for candidate in candidates {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    reporter.mark_interrupted();
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let worker = worker.clone();
            let reporter = reporter.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = match AssertUnwindSafe(worker.process(&candidate)).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        worker.errors.record(FileError::new(
                            &candidate.relative_path,
                            ProcessingStage::Task,
                            "worker panicked",
                        ));
                        FileOutcome::Failed
                    }
                };
                reporter_record(&reporter, outcome);
            });
        }

        if self.cancel.is_cancelled() {
            reporter.mark_interrupted();
            info!(
                "Cancellation requested at {:.1}% complete; waiting for {} in-flight files",
                reporter.completion_percent(),
                tasks.len()
            );
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Indexing task did not complete: {}", e);
                errors.record(FileError::new("<task>", ProcessingStage::Task, &e));
                reporter.record_outcome(false);
                FILES_FAILED.inc();
            }
        }

        reporter.finish();
        IndexRun {
            stats: reporter.summary(),
            errors: errors.get_report(),
            vector_field: vector_field.to_string(),
        }
    }
}

fn reporter_record(reporter: &ProgressReporter, outcome: FileOutcome) {
    match outcome {
        FileOutcome::Indexed => {
            FILES_INDEXED.inc();
            reporter.record_outcome(true);
        }
        FileOutcome::Skipped => reporter.record_skip(),
        FileOutcome::Failed => {
            FILES_FAILED.inc();
            reporter.record_outcome(false);
        }
    }
}

/// Canonical project root; missing or non-directory roots are setup errors
fn resolve_root(root: &Path) -> Result<PathBuf, IndexingError> {
    let canonical = root
        .canonicalize()
        .with_context(|| format!("Project root {} does not exist", root.display()))
        .map_err(IndexingError::Setup)?;
    if !canonical.is_dir() {
        return Err(IndexingError::setup(anyhow!(
            "Project root {} is not a directory",
            root.display()
        )));
    }
    Ok(canonical)
}

/// Walk and classify the tree, returning the eligible candidates.
///
/// Every discovered file gets exactly one verdict recorded on `reporter`.
/// Cancellation stops the walk early and returns no candidates; files
/// discovered by then keep their count but may lack a verdict.
pub fn scan_tree(
    discoverer: &FileDiscoverer,
    classifier: &ContentClassifier,
    reporter: &ProgressReporter,
    cancel: &CancellationToken,
) -> Vec<FileCandidate> {
    let mut to_classify = Vec::new();

    for file in discoverer.walk() {
        if cancel.is_cancelled() {
            reporter.mark_interrupted();
            info!("Scan cancelled after {} files", reporter.summary().discovered);
            return Vec::new();
        }
        reporter.record_discovered();
        match file.exclusion {
            Some(verdict) => {
                debug!(path = %file.candidate.display_path(), verdict = %verdict, "Excluded");
                reporter.record_verdict(verdict);
            }
            None => to_classify.push(file.candidate),
        }
    }

    if cancel.is_cancelled() {
        reporter.mark_interrupted();
        return Vec::new();
    }

    let verdicts: Vec<ClassificationVerdict> = to_classify
        .par_iter()
        .map(|candidate| classifier.classify(candidate))
        .collect();

    to_classify
        .into_iter()
        .zip(verdicts)
        .filter_map(|(candidate, verdict)| {
            reporter.record_verdict(verdict);
            if verdict.is_eligible() {
                Some(candidate)
            } else {
                debug!(path = %candidate.display_path(), verdict = %verdict, "Not eligible");
                None
            }
        })
        .collect()
}

enum FileOutcome {
    Indexed,
    Skipped,
    Failed,
}

struct StageError {
    stage: ProcessingStage,
    error: anyhow::Error,
}

trait AtStage<T> {
    fn at(self, stage: ProcessingStage) -> Result<T, StageError>;
}

impl<T, E: Into<anyhow::Error>> AtStage<T> for Result<T, E> {
    fn at(self, stage: ProcessingStage) -> Result<T, StageError> {
        self.map_err(|e| StageError {
            stage,
            error: e.into(),
        })
    }
}

/// Everything one file needs; cloned into each task
#[derive(Clone)]
struct Worker {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    identity: Arc<dyn IdentityGenerator>,
    errors: ErrorCollector,
    project: Arc<str>,
    collection: Arc<str>,
    vector_field: Arc<str>,
    max_document_chars: usize,
}

impl Worker {
    async fn process(&self, candidate: &FileCandidate) -> FileOutcome {
        let path = candidate.display_path();
        match self.index_file(candidate).await {
            Ok(Some(id)) => {
                debug!(path = %path, id = %id, "Indexed");
                FileOutcome::Indexed
            }
            Ok(None) => {
                debug!(path = %path, "Skipped blank file");
                FileOutcome::Skipped
            }
            Err(StageError { stage, error }) => {
                warn!(path = %path, stage = %stage, "Failed to index file: {:#}", error);
                self.errors.record(FileError::new(
                    &candidate.relative_path,
                    stage,
                    format!("{:#}", error),
                ));
                FileOutcome::Failed
            }
        }
    }

    /// `Ok(None)` when the file has no content worth embedding
    async fn index_file(&self, candidate: &FileCandidate) -> Result<Option<DeterministicId>, StageError> {
        let bytes = tokio::fs::read(&candidate.absolute_path)
            .await
            .with_context(|| format!("Failed to read {}", candidate.absolute_path.display()))
            .at(ProcessingStage::FileRead)?;

        let content = ContentRecord::decode(&bytes, self.max_document_chars)
            .ok_or_else(|| anyhow!("No supported encoding could decode the file"))
            .at(ProcessingStage::FileRead)?;
        if content.is_blank() {
            return Ok(None);
        }
        if content.truncated {
            debug!(path = %candidate.display_path(), "Content truncated to {} chars", self.max_document_chars);
        }

        let metadata = FileMetadata::new(&self.project, candidate).with_encoding(content.encoding);
        let id = self
            .identity
            .generate(&metadata.identity_key())
            .at(ProcessingStage::Identity)?;

        let vector = self
            .embedder
            .embed_document(&content.text)
            .await
            .at(ProcessingStage::Embedding)?;

        let metadata = serde_json::to_value(&metadata)
            .context("Failed to serialize metadata")
            .at(ProcessingStage::Storage)?;
        let point = IndexPoint {
            id,
            vector_field: self.vector_field.to_string(),
            vector,
            payload: Payload {
                document: content.text,
                metadata,
            },
        };

        self.store
            .upsert(&self.collection, point)
            .await
            .at(ProcessingStage::Storage)?;

        Ok(Some(id))
    }
}
