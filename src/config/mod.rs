//! Configuration management for kbstore
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use crate::models::VectorStoreType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database connection settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Defaults applied to newly created knowledge bases
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseDefaults,

    /// Embedding job settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Query embedding cache settings
    #[serde(default)]
    pub query_cache: QueryCacheConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Maximum pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds a writer waits for a locked database before failing
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }
}

/// Defaults for new knowledge bases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseDefaults {
    /// Chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: i64,

    /// Overlap between adjacent chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: i64,

    /// Embedding model name
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding vector dimension
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: i64,

    /// Vector store backend (pgvector or qdrant)
    #[serde(default = "default_vector_store_type")]
    pub vector_store_type: String,
}

/// Embedding job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Chunks sent to the provider per request
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

/// Query embedding cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryCacheConfig {
    /// Keep at most this many cached query embeddings (unbounded when unset)
    #[serde(default)]
    pub max_entries: Option<usize>,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for kbstore data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,

    /// Root directory for uploaded document files
    pub files_dir: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

impl Default for KnowledgeBaseDefaults {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            embedding_model: default_embedding_model(),
            embedding_dimension: default_embedding_dimension(),
            vector_store_type: default_vector_store_type(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_embedding_batch_size(),
        }
    }
}

impl PathsConfig {
    fn under(base: &Path, config_file: PathBuf) -> Self {
        Self {
            config_file,
            db_file: base.join("kbstore.db"),
            files_dir: base.join("files"),
            base_dir: base.to_path_buf(),
        }
    }
}

impl Config {
    /// Get the default base directory for kbstore (~/.kbstore)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kbstore")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Default settings rooted at `base_dir` (or ~/.kbstore)
    pub fn with_base_dir(base_dir: Option<PathBuf>) -> Self {
        let mut config = Config::default();
        config.init_paths(base_dir);
        config
    }

    /// Initialize paths configuration
    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig::under(&base, base.join("config.toml"));
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new("."));
        config.paths = PathsConfig::under(base, config_path.to_path_buf());

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Check if kbstore is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        validate_chunking(
            self.knowledge_base.chunk_size,
            self.knowledge_base.chunk_overlap,
        )
        .map_err(|e| Error::Config(format!("knowledge_base: {}", e)))?;

        if self.knowledge_base.embedding_dimension <= 0 {
            return Err(Error::Config(
                "knowledge_base.embedding_dimension must be positive".to_string(),
            ));
        }

        self.knowledge_base
            .vector_store_type
            .parse::<VectorStoreType>()
            .map_err(|_| {
                Error::Config(format!(
                    "knowledge_base.vector_store_type must be 'pgvector' or 'qdrant', got '{}'",
                    self.knowledge_base.vector_store_type
                ))
            })?;

        if self.database.max_connections == 0 {
            return Err(Error::Config(
                "database.max_connections must be at least 1".to_string(),
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(Error::Config(
                "embedding.batch_size must be at least 1".to_string(),
            ));
        }

        if self.query_cache.max_entries == Some(0) {
            return Err(Error::Config(
                "query_cache.max_entries must be at least 1 when set".to_string(),
            ));
        }

        Ok(())
    }
}

/// Check chunk size and overlap bounds shared by config and knowledge bases
pub fn validate_chunking(chunk_size: i64, chunk_overlap: i64) -> Result<()> {
    if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
        return Err(Error::Validation(format!(
            "chunk_size must be between {} and {}, got {}",
            MIN_CHUNK_SIZE, MAX_CHUNK_SIZE, chunk_size
        )));
    }

    if !(0..=MAX_CHUNK_OVERLAP).contains(&chunk_overlap) {
        return Err(Error::Validation(format!(
            "chunk_overlap must be between 0 and {}, got {}",
            MAX_CHUNK_OVERLAP, chunk_overlap
        )));
    }

    if chunk_overlap >= chunk_size {
        return Err(Error::Validation(
            "chunk_overlap must be < chunk_size".to_string(),
        ));
    }

    Ok(())
}
