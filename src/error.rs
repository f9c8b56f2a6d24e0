//! Custom error types for kbstore

use thiserror::Error;

/// Main error type for kbstore operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Knowledge base not found: {0}")]
    KnowledgeBaseNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Chunk not found: {0}")]
    ChunkNotFound(String),

    #[error("Embedding model not found: {0}")]
    EmbeddingModelNotFound(String),

    #[error("Embedding not found: {0}")]
    EmbeddingNotFound(String),

    #[error("Embedding job not found: {0}")]
    JobNotFound(String),

    #[error("Processing task not found: {0}")]
    TaskNotFound(String),

    #[error("Tag not found: {0}")]
    TagNotFound(String),

    #[error("Chunk {chunk_index} already exists for document {document_id}")]
    DuplicateChunk {
        document_id: String,
        chunk_index: i64,
    },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid status transition for {entity} {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("Embedding job {0} has no remaining items")]
    JobOverflow(String),

    #[error("{0} is still referenced and cannot be deleted")]
    InUse(String),

    #[error("Not initialized: run 'kbstore init' first")]
    NotInitialized,

    #[error("Embedding error: {0}")]
    Embedding(String),
}

/// Result type alias for kbstore
pub type Result<T> = std::result::Result<T, Error>;

/// True when a sqlx error is a UNIQUE constraint violation
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// True when a sqlx error is a FOREIGN KEY constraint violation
pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}
