use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use super::provider::EmbeddingProvider;
use crate::config::EmbeddingsConfig;
use crate::metrics::{EMBEDDING_LATENCY, EMBEDDING_REQUESTS};

/// Local ONNX embeddings through fastembed
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    dimension: usize,
    field_name: String,
    batch_size: usize,
}

impl FastEmbedProvider {
    /// Load the configured model, downloading it on first use.
    ///
    /// An unrecognised model identifier is an error.
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let (model_type, dimension) = Self::parse_model_name(&config.model)?;

        info!("Loading embedding model: {}", config.model);

        let model = TextEmbedding::try_new(
            InitOptions::new(model_type).with_show_download_progress(true),
        )
        .with_context(|| format!("Failed to initialize embedding model: {}", config.model))?;

        info!("Embedding model loaded successfully");

        Ok(Self {
            model: Arc::new(model),
            dimension,
            field_name: vector_field_for_model(&config.model),
            batch_size: config.batch_size.max(1),
        })
    }

    /// Parse a model identifier to the fastembed model and its vector size
    fn parse_model_name(name: &str) -> Result<(EmbeddingModel, usize)> {
        let parsed = match name {
            "sentence-transformers/all-MiniLM-L6-v2" | "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => {
                (EmbeddingModel::AllMiniLML6V2, 384)
            }
            "nomic-embed-text-v1.5" | "nomic-embed-text" | "nomic-ai/nomic-embed-text-v1.5" => {
                (EmbeddingModel::NomicEmbedTextV15, 768)
            }
            "bge-small-en-v1.5" | "bge-small" | "BAAI/bge-small-en-v1.5" => {
                (EmbeddingModel::BGESmallENV15, 384)
            }
            "bge-base-en-v1.5" | "bge-base" | "BAAI/bge-base-en-v1.5" => {
                (EmbeddingModel::BGEBaseENV15, 768)
            }
            "bge-large-en-v1.5" | "bge-large" | "BAAI/bge-large-en-v1.5" => {
                (EmbeddingModel::BGELargeENV15, 1024)
            }
            "intfloat/multilingual-e5-small" | "multilingual-e5-small" => {
                (EmbeddingModel::MultilingualE5Small, 384)
            }
            _ => bail!(
                "Unknown embedding model '{}'. Supported: {}",
                name,
                SUPPORTED_MODELS.join(", ")
            ),
        };
        Ok(parsed)
    }
}

const SUPPORTED_MODELS: &[&str] = &[
    "sentence-transformers/all-MiniLM-L6-v2",
    "nomic-ai/nomic-embed-text-v1.5",
    "BAAI/bge-small-en-v1.5",
    "BAAI/bge-base-en-v1.5",
    "BAAI/bge-large-en-v1.5",
    "intfloat/multilingual-e5-small",
];

/// `fast-` plus the lowercased last path segment of the model identifier
pub fn vector_field_for_model(model: &str) -> String {
    let short = model.rsplit('/').next().unwrap_or(model);
    format!("fast-{}", short.to_lowercase())
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        EMBEDDING_REQUESTS.inc();
        let start = Instant::now();

        // fastembed is synchronous; keep inference off the async workers
        let model = self.model.clone();
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        let embeddings = tokio::task::spawn_blocking(move || {
            let mut embeddings = Vec::with_capacity(texts.len());

            for chunk in texts.chunks(batch_size) {
                let batch: Vec<&str> = chunk.iter().map(|s| s.as_str()).collect();
                let batch_embeddings = model
                    .embed(batch, None)
                    .context("Failed to generate embeddings")?;
                embeddings.extend(batch_embeddings);
            }

            Ok::<Vec<Vec<f32>>, anyhow::Error>(embeddings)
        })
        .await
        .context("FastEmbed processing task failed")??;

        EMBEDDING_LATENCY.observe(start.elapsed().as_secs_f64());

        Ok(embeddings)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No embedding generated for query"))
    }

    fn vector_dimension(&self) -> usize {
        self.dimension
    }

    fn vector_field_name(&self) -> String {
        self.field_name.clone()
    }

    fn provider_name(&self) -> &'static str {
        "fastembed"
    }
}
