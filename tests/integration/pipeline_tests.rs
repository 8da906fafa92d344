use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use semindex::indexer::{ClassificationVerdict, IdentityGenerator, IdentityKey, Md5IdentityGenerator};
use semindex::indexing::{IndexingError, ProcessingStage, ProgressReporter};
use semindex::storage::{InMemoryStore, VectorStore};

use crate::helpers::test_harness::{COLLECTION, DIMENSION, PROJECT};
use crate::helpers::{CancellingEmbedder, FlakyStore, TestHarness};

#[tokio::test]
async fn test_mixed_tree_indexes_only_text() -> Result<()> {
    let harness = TestHarness::new()?;
    harness.create_mixed_project()?;
    let store = Arc::new(InMemoryStore::new());

    let run = harness.index(store.clone()).await?;
    let stats = &run.stats;

    assert_eq!(stats.discovered, 4);
    assert_eq!(stats.eligible, 1);
    assert_eq!(stats.indexed, 1);
    assert_eq!(stats.failed, 0);
    assert!(!stats.interrupted);
    assert_eq!(stats.verdict_count(ClassificationVerdict::Binary), 1);
    assert_eq!(stats.verdict_count(ClassificationVerdict::Oversized), 1);
    assert_eq!(stats.verdict_count(ClassificationVerdict::Hidden), 1);
    assert!(!run.errors.has_errors());

    let expected = Md5IdentityGenerator.generate(&IdentityKey::for_file(PROJECT, &harness.absolute("a.txt")))?;
    assert_eq!(store.ids(COLLECTION).await, vec![expected.to_hex()]);

    let payload = store
        .payload(COLLECTION, &expected.to_hex())
        .await
        .expect("point should be stored");
    assert_eq!(payload.document, "hello");
    assert_eq!(payload.metadata_str("project"), Some(PROJECT));
    assert_eq!(payload.metadata_str("relative_path"), Some("a.txt"));

    Ok(())
}

#[tokio::test]
async fn test_reindex_is_idempotent() -> Result<()> {
    let harness = TestHarness::new()?;
    harness.create_file("a.txt", "alpha")?;
    harness.create_file("nested/b.md", "# beta")?;
    harness.create_file("nested/deeper/c.rs", "fn gamma() {}")?;
    let store = Arc::new(InMemoryStore::new());

    let first = harness.index(store.clone()).await?;
    let ids_after_first = store.ids(COLLECTION).await;
    assert_eq!(first.stats.indexed, 3);
    assert_eq!(ids_after_first.len(), 3);

    // Edited content replaces the point under the same id
    harness.create_file("a.txt", "alpha, revised")?;
    let second = harness.index(store.clone()).await?;

    assert_eq!(second.stats.indexed, 3);
    assert_eq!(store.count(COLLECTION).await?, 3);
    assert_eq!(store.ids(COLLECTION).await, ids_after_first);

    let id = Md5IdentityGenerator.generate(&IdentityKey::for_file(PROJECT, &harness.absolute("a.txt")))?;
    let payload = store.payload(COLLECTION, &id.to_hex()).await.expect("point should be stored");
    assert_eq!(payload.document, "alpha, revised");

    Ok(())
}

#[tokio::test]
async fn test_storage_failure_is_isolated() -> Result<()> {
    let harness = TestHarness::new()?;
    harness.create_file("one.txt", "first file")?;
    harness.create_file("two.txt", "second file")?;
    harness.create_file("bad.txt", "contains POISON marker")?;
    let store = Arc::new(FlakyStore::new("POISON"));

    let indexer = harness.indexer(store.clone());
    let run = indexer
        .index_project(harness.root(), Arc::new(ProgressReporter::hidden()))
        .await?;

    assert_eq!(run.stats.eligible, 3);
    assert_eq!(run.stats.indexed, 2);
    assert_eq!(run.stats.failed, 1);
    assert_eq!(run.errors.total_errors, 1);
    assert_eq!(run.errors.count_for(ProcessingStage::Storage), 1);
    assert_eq!(store.count(COLLECTION).await?, 2);

    let failure = &run.errors.by_stage[&ProcessingStage::Storage][0];
    assert!(failure.path.ends_with("bad.txt"));

    Ok(())
}

#[tokio::test]
async fn test_collection_compacted_once_per_run() -> Result<()> {
    let harness = TestHarness::new()?;
    let store = Arc::new(FlakyStore::new("POISON"));
    let indexer = harness.indexer(store.clone());

    let empty = indexer
        .index_project(harness.root(), Arc::new(ProgressReporter::hidden()))
        .await?;
    assert_eq!(empty.stats.indexed, 0);
    assert_eq!(store.optimize_calls(), 0);

    harness.create_file("one.txt", "first file")?;
    harness.create_file("two.txt", "second file")?;
    let run = indexer
        .index_project(harness.root(), Arc::new(ProgressReporter::hidden()))
        .await?;

    assert_eq!(run.stats.indexed, 2);
    assert_eq!(store.optimize_calls(), 1);

    Ok(())
}

#[tokio::test]
async fn test_interrupt_returns_partial_summary() -> Result<()> {
    let harness = TestHarness::new()?;
    for i in 0..5 {
        harness.create_file(&format!("file_{}.txt", i), format!("content {}", i))?;
    }
    let store = Arc::new(InMemoryStore::new());
    let token = CancellationToken::new();

    let mut options = harness.options();
    options.workers = 1;
    let embedder = Arc::new(CancellingEmbedder::new(DIMENSION, token.clone(), 1));
    let indexer = harness
        .indexer_with(store.clone(), embedder, options)
        .with_cancellation(token);

    let run = indexer
        .index_project(harness.root(), Arc::new(ProgressReporter::hidden()))
        .await?;
    let stats = run.stats;

    assert!(stats.interrupted);
    assert_eq!(stats.eligible, 5);
    assert_eq!(stats.indexed, 1);
    assert_eq!(stats.failed, 0);
    assert!(stats.processed() < stats.eligible);
    assert_eq!(store.count(COLLECTION).await?, 1);

    Ok(())
}

#[tokio::test]
async fn test_ignore_file_and_extra_patterns() -> Result<()> {
    let harness = TestHarness::new()?;
    harness.create_file(".gitignore", "generated/\n*.tmp\n# comment\n")?;
    harness.create_file("src/main.rs", "fn main() {}")?;
    harness.create_file("generated/out.rs", "pub const X: u8 = 1;")?;
    harness.create_file("notes.tmp", "scratch")?;
    harness.create_file("docs/guide.md", "# Guide")?;
    harness.create_file("docs/draft.md", "# Draft")?;
    harness.create_file("target/debug/app.d", "deps")?;

    let store = Arc::new(InMemoryStore::new());
    let mut options = harness.options();
    options.extra_ignore_patterns = vec!["docs/draft.md".to_string()];
    let indexer = harness.indexer_with(
        store.clone(),
        Arc::new(semindex::embeddings::MockEmbedder::new(DIMENSION)),
        options,
    );

    let run = indexer
        .index_project(harness.root(), Arc::new(ProgressReporter::hidden()))
        .await?;
    let stats = run.stats;

    assert_eq!(stats.discovered, 7);
    assert_eq!(stats.verdict_count(ClassificationVerdict::Hidden), 1);
    assert_eq!(stats.verdict_count(ClassificationVerdict::IgnoredByRule), 4);
    assert_eq!(stats.eligible, 2);
    assert_eq!(stats.indexed, 2);

    let indexed: Vec<String> = {
        let mut paths = Vec::new();
        for id in store.ids(COLLECTION).await {
            if let Some(payload) = store.payload(COLLECTION, &id).await {
                paths.push(payload.metadata_str("relative_path").unwrap_or_default().to_string());
            }
        }
        paths.sort();
        paths
    };
    assert_eq!(indexed, vec!["docs/guide.md", "src/main.rs"]);

    Ok(())
}

#[tokio::test]
async fn test_verdicts_partition_discovered_files() -> Result<()> {
    let harness = TestHarness::new()?;
    harness.create_mixed_project()?;
    harness.create_file("node_modules/pkg/index.js", "module.exports = {}")?;
    harness.create_file("data.bin", [0u8, 1, 2, 3])?;
    harness.create_file("empty.txt", "")?;

    let run = harness.index(Arc::new(InMemoryStore::new())).await?;
    let stats = run.stats;

    let total: usize = stats.verdicts.iter().map(|(_, count)| count).sum();
    assert_eq!(total, stats.discovered);
    assert_eq!(stats.eligible, stats.verdict_count(ClassificationVerdict::Eligible));
    assert_eq!(stats.indexed + stats.skipped + stats.failed, stats.eligible);
    // The empty file is eligible but has nothing to embed
    assert_eq!(stats.skipped, 1);

    Ok(())
}

#[tokio::test]
async fn test_missing_root_fails_setup() -> Result<()> {
    let harness = TestHarness::new()?;
    let missing = harness.root().join("does-not-exist");
    let store = Arc::new(InMemoryStore::new());

    let result = harness
        .indexer(store.clone())
        .index_project(&missing, Arc::new(ProgressReporter::hidden()))
        .await;

    assert!(matches!(result, Err(IndexingError::Setup(_))));
    assert!(store.describe_collection(COLLECTION).await?.is_none());

    Ok(())
}
