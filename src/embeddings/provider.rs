use anyhow::Result;
use async_trait::async_trait;

/// Turns text into fixed-length vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of documents, one vector per input, in input order
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single document
    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No embedding generated for document"))
    }

    /// Embed a search query (may differ from documents for some models)
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>>;

    /// Length of every vector this provider produces
    fn vector_dimension(&self) -> usize;

    /// Name of the vector field in the collection this provider writes to
    fn vector_field_name(&self) -> String;

    /// Provider name for logging and metrics
    fn provider_name(&self) -> &'static str;
}
