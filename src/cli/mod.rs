use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

const MIB: u64 = 1024 * 1024;

#[derive(Parser)]
#[command(name = "semindex")]
#[command(author, version, about = "Index a project tree into a vector collection for semantic search")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn verbose(&self) -> bool {
        match &self.command {
            Commands::Index(args) => args.verbose,
            Commands::Search(args) => args.verbose,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Embed every eligible file under a directory and upsert it
    Index(IndexArgs),

    /// Query an indexed collection
    Search(SearchArgs),
}

/// Where points are stored
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Target collection name
    #[arg(short, long)]
    pub collection: Option<String>,

    /// Qdrant endpoint; without it the local LanceDB store is used
    #[arg(long, env = "QDRANT_URL")]
    pub qdrant_url: Option<String>,

    /// Qdrant API key
    #[arg(long, env = "QDRANT_API_KEY", hide_env_values = true)]
    pub qdrant_api_key: Option<String>,

    /// Directory of the local LanceDB store
    #[arg(long)]
    pub local_path: Option<PathBuf>,
}

impl StoreArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(collection) = &self.collection {
            config.storage.collection = collection.clone();
        }
        if let Some(url) = &self.qdrant_url {
            config.storage.url = Some(url.clone());
        }
        if let Some(key) = &self.qdrant_api_key {
            config.storage.api_key = Some(key.clone());
        }
        if let Some(path) = &self.local_path {
            config.storage.local_path = path.clone();
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    /// Project identifier stored with every point and used in point ids
    #[arg(short, long)]
    pub project: String,

    /// Project root directory
    #[arg(long)]
    pub path: PathBuf,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Embedding model identifier
    #[arg(short, long)]
    pub embedding_model: Option<String>,

    /// Vector field name, overriding detection
    #[arg(long)]
    pub vector_name: Option<String>,

    /// Number of parallel workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Largest file to index, in MiB
    #[arg(long)]
    pub max_file_size: Option<u64>,

    /// Run this query after indexing and print the hits
    #[arg(short, long)]
    pub query: Option<String>,

    /// Number of hits for --query
    #[arg(long, default_value = "5")]
    pub limit: usize,

    /// Log every file's id and outcome
    #[arg(short, long)]
    pub verbose: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Print Prometheus metrics after the summary
    #[arg(long)]
    pub metrics: bool,
}

impl IndexArgs {
    /// Layer command-line flags over the loaded config
    pub fn apply(&self, config: &mut Config) {
        self.store.apply(config);
        if let Some(model) = &self.embedding_model {
            config.embeddings.model = model.clone();
        }
        if let Some(name) = &self.vector_name {
            config.embeddings.vector_name = Some(name.clone());
        }
        if let Some(workers) = self.workers {
            config.indexer.workers = workers;
        }
        if let Some(mib) = self.max_file_size {
            config.indexer.max_file_size = mib.saturating_mul(MIB);
        }
        if self.no_progress {
            config.indexer.show_progress = false;
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Search query
    pub query: String,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Maximum number of results to return
    #[arg(short, long, default_value = "10")]
    pub limit: usize,

    /// Embedding model identifier; must match the one used for indexing
    #[arg(short, long)]
    pub embedding_model: Option<String>,

    /// Vector field name, overriding detection
    #[arg(long)]
    pub vector_name: Option<String>,

    #[arg(short, long)]
    pub verbose: bool,
}

impl SearchArgs {
    pub fn apply(&self, config: &mut Config) {
        self.store.apply(config);
        if let Some(model) = &self.embedding_model {
            config.embeddings.model = model.clone();
        }
        if let Some(name) = &self.vector_name {
            config.embeddings.vector_name = Some(name.clone());
        }
    }
}
