//! Document chunks

use crate::error::{Error, Result};
use crate::lifecycle::{new_id, Metadata, Timestamps};
use crate::models::document::{validate_score, ContentMetrics};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A positioned slice of a document's text
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub chunk_index: i64,
    pub start_char: i64,
    pub end_char: i64,
    pub char_count: i64,
    pub word_count: i64,
    pub token_count: i64,
    pub quality_score: f64,
    pub coherence_score: f64,
    pub is_embedded: bool,
    pub embedding_model: String,
    pub summary: String,
    pub keywords_json: String,
    pub entities_json: String,
    pub metadata_json: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl DocumentChunk {
    pub fn new(
        document_id: impl Into<String>,
        chunk_index: i64,
        content: impl Into<String>,
        start_char: i64,
        end_char: i64,
    ) -> Self {
        let mut chunk = Self {
            id: new_id(),
            document_id: document_id.into(),
            content: content.into(),
            chunk_index,
            start_char,
            end_char,
            char_count: 0,
            word_count: 0,
            token_count: 0,
            quality_score: 0.0,
            coherence_score: 0.0,
            is_embedded: false,
            embedding_model: String::new(),
            summary: String::new(),
            keywords_json: "[]".to_string(),
            entities_json: "[]".to_string(),
            metadata_json: "{}".to_string(),
            timestamps: Timestamps::now(),
        };
        chunk.calculate_metrics();
        chunk
    }

    /// Recompute char/word/token counts from `content`. Idempotent.
    pub fn calculate_metrics(&mut self) {
        let metrics = ContentMetrics::measure(&self.content);
        self.char_count = metrics.char_count;
        self.word_count = metrics.word_count;
        self.token_count = metrics.token_count;
    }

    pub fn validate(&self) -> Result<()> {
        if self.content.is_empty() {
            return Err(Error::Validation("chunk content must not be empty".to_string()));
        }
        if self.chunk_index < 0 {
            return Err(Error::Validation(format!(
                "chunk_index must be non-negative, got {}",
                self.chunk_index
            )));
        }
        if self.start_char < 0 || self.start_char > self.end_char {
            return Err(Error::Validation(format!(
                "invalid chunk span {}..{}",
                self.start_char, self.end_char
            )));
        }
        validate_score("quality_score", self.quality_score)?;
        validate_score("coherence_score", self.coherence_score)
    }

    /// Content cut to `max_length` characters, with "..." appended when cut
    pub fn get_preview(&self, max_length: usize) -> String {
        if self.content.chars().count() <= max_length {
            return self.content.clone();
        }
        let mut preview: String = self.content.chars().take(max_length).collect();
        preview.push_str("...");
        preview
    }

    pub fn keywords(&self) -> Vec<String> {
        serde_json::from_str(&self.keywords_json).unwrap_or_default()
    }

    pub fn set_keywords(&mut self, keywords: &[String]) -> Result<()> {
        self.keywords_json = serde_json::to_string(keywords)?;
        Ok(())
    }

    pub fn entities(&self) -> Vec<String> {
        serde_json::from_str(&self.entities_json).unwrap_or_default()
    }

    pub fn set_entities(&mut self, entities: &[String]) -> Result<()> {
        self.entities_json = serde_json::to_string(entities)?;
        Ok(())
    }

    pub fn metadata(&self) -> Metadata {
        Metadata::from_json(&self.metadata_json)
    }

    /// Inclusive index range covered by a context window of `window_size`
    pub fn context_range(&self, window_size: i64) -> (i64, i64) {
        let window_size = window_size.max(0);
        (
            (self.chunk_index - window_size).max(0),
            self.chunk_index.saturating_add(window_size),
        )
    }
}
