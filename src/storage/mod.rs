//! Vector store backends
//!
//! A collection holds points keyed by a deterministic id. Writing a point
//! whose id already exists replaces it, which is what makes re-indexing
//! idempotent.

pub mod lancedb;
pub mod memory;
pub mod qdrant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::config::StorageConfig;
use crate::indexer::DeterministicId;

pub use self::lancedb::LanceStore;
pub use memory::InMemoryStore;
pub use qdrant::QdrantStore;

/// Document text plus its metadata, stored alongside the vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub document: String,
    pub metadata: Value,
}

impl Payload {
    pub fn metadata_str(&self, field: &str) -> Option<&str> {
        self.metadata.get(field).and_then(Value::as_str)
    }

    /// First `max_chars` characters of the document on one line
    pub fn preview(&self, max_chars: usize) -> String {
        let flat: String = self
            .document
            .chars()
            .map(|c| if c.is_whitespace() { ' ' } else { c })
            .take(max_chars)
            .collect();
        if self.document.chars().count() > max_chars {
            format!("{}...", flat.trim_end())
        } else {
            flat.trim_end().to_string()
        }
    }
}

/// A point ready to be written
#[derive(Debug, Clone)]
pub struct IndexPoint {
    pub id: DeterministicId,
    pub vector_field: String,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

/// One search hit; `id` is rendered the way the backend stores it
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: Payload,
}

/// Shape of an existing collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub vector_field: String,
    pub dimension: usize,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Fail fast when the backend cannot be reached
    async fn ping(&self) -> Result<()>;

    /// `None` when the collection does not exist
    async fn describe_collection(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// Create the collection if absent; an existing collection is left untouched
    async fn ensure_collection(&self, name: &str, vector_field: &str, dimension: usize) -> Result<()>;

    /// Insert or replace the point with the same id
    async fn upsert(&self, collection: &str, point: IndexPoint) -> Result<()>;

    /// Nearest points by cosine similarity, best first
    async fn search(
        &self,
        collection: &str,
        vector_field: &str,
        query: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;

    async fn count(&self, collection: &str) -> Result<usize>;

    /// Compact the collection after a run; backends that need no upkeep do nothing
    async fn optimize(&self, _collection: &str) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str;
}

/// Open the configured backend: Qdrant when a URL is set, LanceDB otherwise
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn VectorStore>> {
    match &config.url {
        Some(url) => {
            info!("Using Qdrant at {}", url);
            let store = QdrantStore::new(url, config.api_key.clone(), config.timeout_secs)
                .context("Failed to build Qdrant client")?;
            Ok(Arc::new(store))
        }
        None => {
            let store = LanceStore::open(&config.local_path).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Cosine similarity; zero when either vector has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
