use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use semindex::embeddings::{EmbeddingProvider, MockEmbedder};
use semindex::indexing::{IndexRun, IndexerOptions, ParallelIndexer, ProgressReporter};
use semindex::storage::VectorStore;

pub const PROJECT: &str = "demo";
pub const COLLECTION: &str = "docs";
pub const DIMENSION: usize = 32;

/// A throwaway project tree
pub struct TestHarness {
    pub temp_dir: TempDir,
    root: PathBuf,
}

impl TestHarness {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join("project");
        std::fs::create_dir_all(&root)?;
        // Indexing canonicalizes the root, so ids are derived from this form
        let root = root.canonicalize()?;
        Ok(Self { temp_dir, root })
    }

    pub fn create_file(&self, path: &str, content: impl AsRef<[u8]>) -> Result<PathBuf> {
        let file_path = self.root.join(path);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&file_path, content)?;
        Ok(file_path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a project file as it appears in point metadata
    pub fn absolute(&self, path: &str) -> String {
        self.root.join(path).to_string_lossy().to_string()
    }

    /// A LanceDB location outside the project tree
    pub fn lance_path(&self) -> PathBuf {
        self.temp_dir.path().join("index.lance")
    }

    pub fn options(&self) -> IndexerOptions {
        IndexerOptions::new(PROJECT, COLLECTION)
    }

    pub fn indexer(&self, store: Arc<dyn VectorStore>) -> ParallelIndexer {
        self.indexer_with(store, Arc::new(MockEmbedder::new(DIMENSION)), self.options())
    }

    pub fn indexer_with(
        &self,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        options: IndexerOptions,
    ) -> ParallelIndexer {
        ParallelIndexer::new(embedder, store, options)
    }

    pub async fn index(&self, store: Arc<dyn VectorStore>) -> Result<IndexRun> {
        let run = self
            .indexer(store)
            .index_project(self.root(), Arc::new(ProgressReporter::hidden()))
            .await?;
        Ok(run)
    }

    /// The four-file tree: text, image, oversized log and a VCS file
    pub fn create_mixed_project(&self) -> Result<()> {
        self.create_file("a.txt", "hello")?;
        self.create_file("img.png", [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0])?;
        self.create_file("big.log", "log line\n".repeat(6 * 1024 * 1024 / 9 + 1))?;
        self.create_file(".git/config", "[core]\n\trepositoryformatversion = 0\n")?;
        Ok(())
    }
}
