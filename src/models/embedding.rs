//! Embedding model registry entries and stored embedding rows

use crate::error::{Error, Result};
use crate::lifecycle::{StatusFields, StatusTrackable, Timestamps};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// Who serves an embedding model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Provider {
    Ollama,
    Openai,
    Huggingface,
    SentenceTransformers,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Ollama => write!(f, "ollama"),
            Provider::Openai => write!(f, "openai"),
            Provider::Huggingface => write!(f, "huggingface"),
            Provider::SentenceTransformers => write!(f, "sentence_transformers"),
        }
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "openai" => Ok(Provider::Openai),
            "huggingface" => Ok(Provider::Huggingface),
            "sentence_transformers" => Ok(Provider::SentenceTransformers),
            _ => Err(Error::Validation(format!("Unknown provider: {}", s))),
        }
    }
}

/// Dense vector stored as little-endian f32 bytes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(pub Vec<f32>);

impl EmbeddingVector {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Fail unless the vector has exactly `dimension` components
    pub fn check_dimension(&self, dimension: i64) -> Result<()> {
        let expected = usize::try_from(dimension).unwrap_or(0);
        if self.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: self.len(),
            });
        }
        Ok(())
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

impl TryFrom<Vec<u8>> for EmbeddingVector {
    type Error = Error;

    fn try_from(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() % 4 != 0 {
            return Err(Error::Validation(format!(
                "embedding blob length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        Ok(Self(
            bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        ))
    }
}

/// A registered embedding model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmbeddingModel {
    pub id: String,
    pub name: String,
    pub provider: Provider,
    pub model_id: String,
    pub dimension: i64,
    pub max_tokens: i64,
    pub description: String,
    pub is_active: bool,
    /// Rolling average processing time per item in milliseconds
    pub avg_processing_time: f64,
    pub usage_count: i64,
    pub config_json: String,
    pub metadata_json: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

/// Parameters for registering an embedding model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEmbeddingModel {
    pub name: String,
    pub provider: Provider,
    pub model_id: String,
    pub dimension: i64,
    pub max_tokens: i64,
    pub description: String,
    pub config: serde_json::Value,
}

impl NewEmbeddingModel {
    pub fn new(name: impl Into<String>, provider: Provider, dimension: i64) -> Self {
        let name = name.into();
        Self {
            model_id: name.clone(),
            name,
            provider,
            dimension,
            max_tokens: crate::config::default_model_max_tokens(),
            description: String::new(),
            config: serde_json::json!({}),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("model name must not be empty".to_string()));
        }
        if self.dimension <= 0 {
            return Err(Error::Validation(format!(
                "dimension must be positive, got {}",
                self.dimension
            )));
        }
        if self.max_tokens <= 0 {
            return Err(Error::Validation(format!(
                "max_tokens must be positive, got {}",
                self.max_tokens
            )));
        }
        Ok(())
    }
}

/// Stored embedding of one chunk of a document under one model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DocumentEmbedding {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub embedding_model_id: String,
    pub text_content: String,
    #[sqlx(try_from = "Vec<u8>")]
    pub embedding_vector: EmbeddingVector,
    pub chunk_metadata_json: String,
    /// Milliseconds spent producing the vector
    pub processing_time: Option<f64>,
    pub token_count: Option<i64>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub status: StatusFields,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl StatusTrackable for DocumentEmbedding {
    const TABLE: &'static str = "document_embeddings";
    const ENTITY: &'static str = "document embedding";

    fn id(&self) -> &str {
        &self.id
    }

    fn status_fields(&self) -> &StatusFields {
        &self.status
    }

    fn not_found(id: &str) -> Error {
        Error::EmbeddingNotFound(id.to_string())
    }
}

/// Input for storing a document embedding
#[derive(Debug, Clone)]
pub struct NewDocumentEmbedding {
    pub document_id: String,
    pub chunk_index: i64,
    pub embedding_model_id: String,
    pub text_content: String,
    pub embedding_vector: EmbeddingVector,
    pub processing_time: Option<f64>,
    pub token_count: Option<i64>,
}

/// Cached embedding of a query
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QueryEmbedding {
    pub id: String,
    pub query_text: String,
    pub query_hash: String,
    pub embedding_model_id: String,
    #[sqlx(try_from = "Vec<u8>")]
    pub embedding_vector: EmbeddingVector,
    pub hit_count: i64,
    pub last_used: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_bytes_roundtrip() {
        let vector = EmbeddingVector(vec![0.5, -1.25, 3.0]);
        let bytes = vector.to_bytes();
        assert_eq!(bytes.len(), 12);
        assert_eq!(EmbeddingVector::try_from(bytes).unwrap(), vector);
    }

    #[test]
    fn test_vector_rejects_ragged_blob() {
        assert!(EmbeddingVector::try_from(vec![0u8; 7]).is_err());
    }

    #[test]
    fn test_check_dimension() {
        let vector = EmbeddingVector(vec![0.0; 4]);
        assert!(vector.check_dimension(4).is_ok());
        assert!(matches!(
            vector.check_dimension(8),
            Err(Error::DimensionMismatch {
                expected: 8,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_new_model_validation() {
        assert!(NewEmbeddingModel::new("nomic", Provider::Ollama, 768)
            .validate()
            .is_ok());
        assert!(NewEmbeddingModel::new("nomic", Provider::Ollama, 0)
            .validate()
            .is_err());
        assert_eq!(
            "sentence_transformers".parse::<Provider>().unwrap(),
            Provider::SentenceTransformers
        );
    }
}
