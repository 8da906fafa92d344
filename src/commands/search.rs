use anyhow::{anyhow, Result};
use std::time::Instant;
use tracing::debug;

use crate::cli::SearchArgs;
use crate::config::Config;
use crate::embeddings::EmbeddingProvider;
use crate::metrics::SEARCH_REQUESTS;
use crate::storage::{open_store, ScoredPoint, VectorStore};

const PREVIEW_CHARS: usize = 150;

/// Run the search command against an existing collection
pub async fn run(args: SearchArgs, mut config: Config) -> Result<()> {
    args.apply(&mut config);
    let collection = config.storage.collection.clone();

    let store = open_store(&config.storage).await?;
    let info = store
        .describe_collection(&collection)
        .await?
        .ok_or_else(|| {
            anyhow!(
                "Collection '{}' not found. Run 'semindex index' first",
                collection
            )
        })?;

    let embedder = super::load_embedder(&config.embeddings).await?;
    if embedder.vector_dimension() != info.dimension {
        return Err(anyhow!(
            "Collection '{}' stores {}-dimensional vectors but model {} produces {}",
            collection,
            info.dimension,
            config.embeddings.model,
            embedder.vector_dimension()
        ));
    }

    let vector_field = config.embeddings.vector_name.clone().unwrap_or(info.vector_field);
    let hits = query_collection(
        store.as_ref(),
        embedder.as_ref(),
        &collection,
        &vector_field,
        &args.query,
        args.limit,
    )
    .await?;

    print_results(&args.query, &hits);
    Ok(())
}

/// Embed a query and return the nearest points
pub async fn query_collection(
    store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    collection: &str,
    vector_field: &str,
    query: &str,
    limit: usize,
) -> Result<Vec<ScoredPoint>> {
    SEARCH_REQUESTS.inc();
    let start = Instant::now();

    let vector = embedder.embed_query(query).await?;
    let hits = store.search(collection, vector_field, vector, limit).await?;

    debug!(
        "Search returned {} hits in {:.1}ms",
        hits.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(hits)
}

/// Print hits as rank, score, path and a one-line preview
pub fn print_results(query: &str, hits: &[ScoredPoint]) {
    if hits.is_empty() {
        println!("No results found for: {}", query);
        return;
    }

    println!("Found {} results for: \"{}\"\n", hits.len(), query);

    for (rank, hit) in hits.iter().enumerate() {
        println!("{}", format_hit(rank + 1, hit));
        println!("   {}", hit.payload.preview(PREVIEW_CHARS));
        println!();
    }
}

fn format_hit(rank: usize, hit: &ScoredPoint) -> String {
    let path = hit
        .payload
        .metadata_str("relative_path")
        .or_else(|| hit.payload.metadata_str("absolute_path"))
        .unwrap_or("<unknown>");
    format!("{}. {} (score: {:.4})", rank, path, hit.score)
}
