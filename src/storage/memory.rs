use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{cosine_similarity, CollectionInfo, IndexPoint, Payload, ScoredPoint, VectorStore};

struct Collection {
    info: CollectionInfo,
    points: HashMap<String, (Vec<f32>, Payload)>,
}

/// Process-local store used by tests and benchmarks
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids currently stored in a collection, sorted
    pub async fn ids(&self, collection: &str) -> Vec<String> {
        let collections = self.collections.read().await;
        let mut ids: Vec<String> = collections
            .get(collection)
            .map(|c| c.points.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub async fn payload(&self, collection: &str, id: &str) -> Option<Payload> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .and_then(|c| c.points.get(id))
            .map(|(_, payload)| payload.clone())
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn describe_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        Ok(self.collections.read().await.get(name).map(|c| c.info.clone()))
    }

    async fn ensure_collection(&self, name: &str, vector_field: &str, dimension: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_insert_with(|| Collection {
            info: CollectionInfo {
                name: name.to_string(),
                vector_field: vector_field.to_string(),
                dimension,
            },
            points: HashMap::new(),
        });
        Ok(())
    }

    async fn upsert(&self, collection: &str, point: IndexPoint) -> Result<()> {
        let mut collections = self.collections.write().await;
        let Some(target) = collections.get_mut(collection) else {
            bail!("Collection '{}' does not exist", collection);
        };
        if point.vector_field != target.info.vector_field {
            bail!(
                "Collection '{}' has no vector field '{}'",
                collection,
                point.vector_field
            );
        }
        if point.vector.len() != target.info.dimension {
            bail!(
                "Vector dimension {} does not match collection dimension {}",
                point.vector.len(),
                target.info.dimension
            );
        }
        target
            .points
            .insert(point.id.to_hex(), (point.vector, point.payload));
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        _vector_field: &str,
        query: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().await;
        let Some(target) = collections.get(collection) else {
            bail!("Collection '{}' does not exist", collection);
        };

        let mut hits: Vec<ScoredPoint> = target
            .points
            .iter()
            .map(|(id, (vector, payload))| ScoredPoint {
                id: id.clone(),
                score: cosine_similarity(&query, vector),
                payload: payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|c| c.points.len())
            .unwrap_or(0))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
