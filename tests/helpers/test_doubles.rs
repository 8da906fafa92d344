use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use semindex::embeddings::{EmbeddingProvider, MockEmbedder};
use semindex::storage::{CollectionInfo, InMemoryStore, IndexPoint, ScoredPoint, VectorStore};

/// In-memory store that rejects any point whose document contains a marker
pub struct FlakyStore {
    pub inner: InMemoryStore,
    marker: String,
    optimized: AtomicUsize,
}

impl FlakyStore {
    pub fn new(marker: &str) -> Self {
        Self {
            inner: InMemoryStore::new(),
            marker: marker.to_string(),
            optimized: AtomicUsize::new(0),
        }
    }

    /// Number of times the collection was compacted
    pub fn optimize_calls(&self) -> usize {
        self.optimized.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for FlakyStore {
    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }

    async fn describe_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        self.inner.describe_collection(name).await
    }

    async fn ensure_collection(&self, name: &str, vector_field: &str, dimension: usize) -> Result<()> {
        self.inner.ensure_collection(name, vector_field, dimension).await
    }

    async fn upsert(&self, collection: &str, point: IndexPoint) -> Result<()> {
        if point.payload.document.contains(&self.marker) {
            bail!("simulated write timeout");
        }
        self.inner.upsert(collection, point).await
    }

    async fn search(
        &self,
        collection: &str,
        vector_field: &str,
        query: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        self.inner.search(collection, vector_field, query, limit).await
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.inner.count(collection).await
    }

    async fn optimize(&self, collection: &str) -> Result<()> {
        self.optimized.fetch_add(1, Ordering::SeqCst);
        self.inner.optimize(collection).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

/// Mock embedder that cancels a token once it has served `after` documents
pub struct CancellingEmbedder {
    inner: MockEmbedder,
    token: CancellationToken,
    after: usize,
    calls: AtomicUsize,
}

impl CancellingEmbedder {
    pub fn new(dimension: usize, token: CancellationToken, after: usize) -> Self {
        Self {
            inner: MockEmbedder::new(dimension),
            token,
            after,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for CancellingEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let served = self.calls.fetch_add(texts.len(), Ordering::SeqCst) + texts.len();
        if served >= self.after {
            self.token.cancel();
        }
        self.inner.embed_documents(texts).await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.inner.embed_query(query).await
    }

    fn vector_dimension(&self) -> usize {
        self.inner.vector_dimension()
    }

    fn vector_field_name(&self) -> String {
        self.inner.vector_field_name()
    }

    fn provider_name(&self) -> &'static str {
        "cancelling-mock"
    }
}
