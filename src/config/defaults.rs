//! Default values for configuration

/// Default maximum pooled SQLite connections
pub fn default_max_connections() -> u32 {
    5
}

/// Default seconds a writer waits on a locked database
pub fn default_busy_timeout_secs() -> u64 {
    5
}

/// Default chunk size in characters
pub fn default_chunk_size() -> i64 {
    1000
}

/// Default overlap between adjacent chunks in characters
pub fn default_chunk_overlap() -> i64 {
    200
}

/// Smallest chunk size a knowledge base may use
pub const MIN_CHUNK_SIZE: i64 = 100;

/// Largest chunk size a knowledge base may use
pub const MAX_CHUNK_SIZE: i64 = 8000;

/// Largest chunk overlap a knowledge base may use
pub const MAX_CHUNK_OVERLAP: i64 = 500;

/// Default embedding model for new knowledge bases
pub fn default_embedding_model() -> String {
    std::env::var("KBSTORE_EMBEDDING_MODEL").unwrap_or_else(|_| "nomic-embed-text".to_string())
}

/// Default embedding dimension for new knowledge bases
pub fn default_embedding_dimension() -> i64 {
    768
}

/// Default vector store backend name
pub fn default_vector_store_type() -> String {
    "pgvector".to_string()
}

/// Default batch size for embedding jobs
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default maximum tokens a registered model accepts
pub fn default_model_max_tokens() -> i64 {
    512
}

/// Default preview length for chunk listings
pub fn default_preview_chars() -> usize {
    200
}
