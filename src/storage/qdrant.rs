use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{CollectionInfo, IndexPoint, Payload, ScoredPoint, VectorStore};
use crate::metrics::UPSERT_LATENCY;

/// Qdrant over its REST API, using named vectors
pub struct QdrantStore {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl QdrantStore {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.is_empty()),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .with_context(|| format!("Qdrant request failed: {}", what))?;
        Ok(response)
    }

    async fn expect_success(response: Response, what: &str) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Qdrant {} returned {}: {}", what, status, body);
        }
        response
            .json()
            .await
            .with_context(|| format!("Invalid JSON from Qdrant {}", what))
    }
}

/// Vector field and size from a collection's `config.params.vectors`.
///
/// Named vectors come back as a map; an unnamed vector is a bare
/// `{size, distance}` object and gets an empty name.
fn parse_vectors_config(vectors: &Value) -> Option<(String, usize)> {
    if let Some(size) = vectors.get("size").and_then(Value::as_u64) {
        return Some((String::new(), size as usize));
    }
    vectors.as_object()?.iter().find_map(|(name, params)| {
        params
            .get("size")
            .and_then(Value::as_u64)
            .map(|size| (name.clone(), size as usize))
    })
}

fn parse_hit(hit: &Value) -> ScoredPoint {
    let id = match hit.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let score = hit.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
    let document = hit
        .pointer("/payload/document")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let metadata = hit.pointer("/payload/metadata").cloned().unwrap_or(Value::Null);

    ScoredPoint {
        id,
        score,
        payload: Payload { document, metadata },
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ping(&self) -> Result<()> {
        let response = self
            .send(self.client.get(self.url("/collections")), "list collections")
            .await?;
        Self::expect_success(response, "list collections").await?;
        info!("Connected to Qdrant at {}", self.endpoint);
        Ok(())
    }

    async fn describe_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let what = "get collection";
        let response = self
            .send(self.client.get(self.url(&format!("/collections/{}", name))), what)
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = Self::expect_success(response, what).await?;

        let vectors = body
            .pointer("/result/config/params/vectors")
            .ok_or_else(|| anyhow!("Collection {} has no vectors config", name))?;
        let (vector_field, dimension) = parse_vectors_config(vectors)
            .ok_or_else(|| anyhow!("Could not read vector size of collection {}", name))?;

        debug!(collection = name, vector_field = %vector_field, dimension, "Described collection");

        Ok(Some(CollectionInfo {
            name: name.to_string(),
            vector_field,
            dimension,
        }))
    }

    async fn ensure_collection(&self, name: &str, vector_field: &str, dimension: usize) -> Result<()> {
        if self.describe_collection(name).await?.is_some() {
            return Ok(());
        }

        info!(collection = name, vector_field, dimension, "Creating Qdrant collection");

        let body = json!({
            "vectors": {
                vector_field: { "size": dimension, "distance": "Cosine" }
            }
        });
        let what = "create collection";
        let response = self
            .send(
                self.client
                    .put(self.url(&format!("/collections/{}", name)))
                    .json(&body),
                what,
            )
            .await?;
        Self::expect_success(response, what).await?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, point: IndexPoint) -> Result<()> {
        let start = Instant::now();
        let body = json!({
            "points": [{
                "id": point.id.to_uuid().to_string(),
                "vector": { point.vector_field.as_str(): point.vector },
                "payload": {
                    "document": point.payload.document,
                    "metadata": point.payload.metadata,
                },
            }]
        });

        let what = "upsert points";
        let response = self
            .send(
                self.client
                    .put(self.url(&format!("/collections/{}/points?wait=true", collection)))
                    .json(&body),
                what,
            )
            .await?;
        Self::expect_success(response, what).await?;

        UPSERT_LATENCY.observe(start.elapsed().as_secs_f64());
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector_field: &str,
        query: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let vector = if vector_field.is_empty() {
            json!(query)
        } else {
            json!({ "name": vector_field, "vector": query })
        };
        let body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });

        let what = "search points";
        let response = self
            .send(
                self.client
                    .post(self.url(&format!("/collections/{}/points/search", collection)))
                    .json(&body),
                what,
            )
            .await?;
        let parsed = Self::expect_success(response, what).await?;

        Ok(parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .map(|hits| hits.iter().map(parse_hit).collect())
            .unwrap_or_default())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let what = "count points";
        let response = self
            .send(
                self.client
                    .post(self.url(&format!("/collections/{}/points/count", collection)))
                    .json(&json!({ "exact": true })),
                what,
            )
            .await?;
        let parsed = Self::expect_success(response, what).await?;

        parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .map(|count| count as usize)
            .ok_or_else(|| anyhow!("Qdrant count response has no count"))
    }

    fn backend_name(&self) -> &'static str {
        "qdrant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_vectors() {
        let vectors = json!({
            "fast-all-minilm-l6-v2": { "size": 384, "distance": "Cosine" }
        });
        assert_eq!(
            parse_vectors_config(&vectors),
            Some(("fast-all-minilm-l6-v2".to_string(), 384))
        );
    }

    #[test]
    fn test_parse_unnamed_vector() {
        let vectors = json!({ "size": 768, "distance": "Cosine" });
        assert_eq!(parse_vectors_config(&vectors), Some((String::new(), 768)));
    }

    #[test]
    fn test_parse_hit() {
        let hit = json!({
            "id": "9e107d9d-372b-b682-6bd8-1a3a4a5d0c3e",
            "score": 0.87,
            "payload": {
                "document": "hello",
                "metadata": { "relative_path": "a.txt" }
            }
        });

        let point = parse_hit(&hit);
        assert_eq!(point.id, "9e107d9d-372b-b682-6bd8-1a3a4a5d0c3e");
        assert!((point.score - 0.87).abs() < 1e-6);
        assert_eq!(point.payload.document, "hello");
        assert_eq!(point.payload.metadata_str("relative_path"), Some("a.txt"));
    }

    #[test]
    fn test_endpoint_and_empty_key() {
        let store = QdrantStore::new("http://localhost:6333/", Some(String::new()), 5).unwrap();
        assert_eq!(store.url("/collections"), "http://localhost:6333/collections");
        assert!(store.api_key.is_none());
    }
}
