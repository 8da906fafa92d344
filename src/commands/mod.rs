pub mod index;
pub mod search;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::EmbeddingsConfig;
use crate::embeddings::{EmbeddingProvider, FastEmbedProvider};

/// Load the embedding model off the async runtime; it may download on first use
pub(crate) async fn load_embedder(config: &EmbeddingsConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let config = config.clone();
    let provider = tokio::task::spawn_blocking(move || FastEmbedProvider::new(&config))
        .await
        .context("Embedding model loader panicked")??;
    Ok(Arc::new(provider))
}
