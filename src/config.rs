use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".semindex";
const CONFIG_FILE: &str = "config.toml";

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub indexer: IndexerConfig,

    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Size of the worker pool
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Files larger than this many bytes are classified as oversized
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Document text is truncated to this many characters
    #[serde(default = "default_max_document_chars")]
    pub max_document_chars: usize,

    /// Project-local ignore file, relative to the project root
    #[serde(default = "default_ignore_file")]
    pub ignore_file: String,

    /// Patterns applied after the defaults and the ignore file
    #[serde(default)]
    pub extra_ignore_patterns: Vec<String>,

    #[serde(default = "default_true")]
    pub show_progress: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_file_size: default_max_file_size(),
            max_document_chars: default_max_document_chars(),
            ignore_file: default_ignore_file(),
            extra_ignore_patterns: Vec::new(),
            show_progress: true,
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_max_file_size() -> u64 {
    5 * MIB
}

fn default_max_document_chars() -> usize {
    100_000
}

fn default_ignore_file() -> String {
    ".gitignore".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// Embedding model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Texts per inference call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Overrides both the model-derived and the auto-detected vector field name
    #[serde(default)]
    pub vector_name: Option<String>,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            batch_size: default_batch_size(),
            vector_name: None,
        }
    }
}

fn default_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_batch_size() -> usize {
    32
}

#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Qdrant endpoint; when unset the local LanceDB store is used
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,

    /// HTTP timeout for remote stores
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            url: None,
            api_key: None,
            local_path: default_local_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// Keep the credential out of debug logs
impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("collection", &self.collection)
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("local_path", &self.local_path)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_collection() -> String {
    "semindex".to_string()
}

fn default_local_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("index.lance")
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write logs to rotating files
    #[serde(default)]
    pub enabled: bool,

    /// File log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log directory; relative paths resolve against the working directory
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// hourly, daily, minutely or never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Also log to stderr
    #[serde(default = "default_true")]
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: default_log_level(),
            directory: default_log_directory(),
            file_prefix: default_file_prefix(),
            rotation: default_rotation(),
            stderr: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("logs")
}

fn default_file_prefix() -> String {
    "semindex.log".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Config {
    /// Load configuration from the .semindex directory under `root`
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = Self::config_path(root);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config from {:?}", config_path))?;

            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", config_path))
        } else {
            Ok(Config::default())
        }
    }

    pub fn config_path(root: &Path) -> PathBuf {
        root.join(CONFIG_DIR).join(CONFIG_FILE)
    }
}
