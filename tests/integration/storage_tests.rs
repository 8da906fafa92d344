use anyhow::Result;
use std::sync::Arc;

use semindex::embeddings::{EmbeddingProvider, MockEmbedder};
use semindex::indexer::{IdentityGenerator, IdentityKey, Md5IdentityGenerator};
use semindex::storage::{LanceStore, VectorStore};

use crate::helpers::test_harness::{COLLECTION, DIMENSION, PROJECT};
use crate::helpers::TestHarness;

#[tokio::test]
async fn test_lance_end_to_end() -> Result<()> {
    let harness = TestHarness::new()?;
    harness.create_mixed_project()?;
    let store = Arc::new(LanceStore::open(&harness.lance_path()).await?);

    let run = harness.index(store.clone()).await?;

    assert_eq!(run.stats.discovered, 4);
    assert_eq!(run.stats.indexed, 1);
    assert_eq!(run.vector_field, "mock");
    assert_eq!(store.count(COLLECTION).await?, 1);

    let info = store
        .describe_collection(COLLECTION)
        .await?
        .expect("collection should exist");
    assert_eq!(info.dimension, DIMENSION);
    assert_eq!(info.vector_field, "mock");

    let query = MockEmbedder::new(DIMENSION).embed_query("hello").await?;
    let hits = store.search(COLLECTION, &run.vector_field, query, 3).await?;
    assert_eq!(hits.len(), 1);

    let expected = Md5IdentityGenerator.generate(&IdentityKey::for_file(PROJECT, &harness.absolute("a.txt")))?;
    assert_eq!(hits[0].id, expected.to_hex());
    assert_eq!(hits[0].payload.document, "hello");

    Ok(())
}

#[tokio::test]
async fn test_lance_reindex_keeps_point_count() -> Result<()> {
    let harness = TestHarness::new()?;
    harness.create_file("a.txt", "alpha")?;
    harness.create_file("b.txt", "beta")?;
    harness.create_file("c/d.txt", "delta")?;
    let store = Arc::new(LanceStore::open(&harness.lance_path()).await?);

    harness.index(store.clone()).await?;
    assert_eq!(store.count(COLLECTION).await?, 3);

    let second = harness.index(store.clone()).await?;
    assert_eq!(second.stats.indexed, 3);
    assert_eq!(store.count(COLLECTION).await?, 3);

    Ok(())
}

#[tokio::test]
async fn test_lance_store_survives_reopen() -> Result<()> {
    let harness = TestHarness::new()?;
    harness.create_file("a.txt", "alpha")?;

    {
        let store = Arc::new(LanceStore::open(&harness.lance_path()).await?);
        harness.index(store).await?;
    }

    let reopened = LanceStore::open(&harness.lance_path()).await?;
    assert_eq!(reopened.count(COLLECTION).await?, 1);
    let info = reopened.describe_collection(COLLECTION).await?;
    assert_eq!(info.map(|i| i.dimension), Some(DIMENSION));

    Ok(())
}
