//! Embedding provider seam and query hashing
//!
//! Embedding generation itself is out of scope; callers plug in an
//! [`EmbeddingProvider`]. This module only defines that seam plus the
//! normalization and hashing used to key the query-embedding cache.

use crate::error::Result;
use crate::models::{EmbeddingModel, EmbeddingVector};
use async_trait::async_trait;
use blake3::Hasher;

/// One embedded text
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingOutput {
    pub vector: EmbeddingVector,
    pub token_count: i64,
}

/// Trait for embedding providers
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts with `model`, one output per input, in order
    async fn embed(&self, texts: &[String], model: &EmbeddingModel) -> Result<Vec<EmbeddingOutput>>;
}

/// Trim, lowercase and collapse whitespace runs to single spaces
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hex blake3 digest of the normalized query text
pub fn query_hash(query: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(normalize_query(query).as_bytes());
    hasher.finalize().to_hex().to_string()
}
