//! Embedding jobs and document processing tasks

use crate::error::{Error, Result};
use crate::lifecycle::{StatusFields, StatusTrackable, Timestamps};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::str::FromStr;

/// Kind of batch embedding work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum JobType {
    Document,
    Query,
    Reindex,
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobType::Document => write!(f, "document"),
            JobType::Query => write!(f, "query"),
            JobType::Reindex => write!(f, "reindex"),
        }
    }
}

impl FromStr for JobType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "document" => Ok(JobType::Document),
            "query" => Ok(JobType::Query),
            "reindex" => Ok(JobType::Reindex),
            _ => Err(Error::Validation(format!("Unknown job type: {}", s))),
        }
    }
}

/// A batch of embedding work with per-item progress counters
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmbeddingJob {
    pub id: String,
    pub job_type: JobType,
    pub embedding_model_id: String,
    pub parameters_json: String,
    pub total_items: i64,
    pub processed_items: i64,
    pub failed_items: i64,
    pub result_data_json: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub status: StatusFields,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl EmbeddingJob {
    /// Processed share of all items, 0 when there are no items
    pub fn progress_percentage(&self) -> f64 {
        progress_percentage(self.processed_items, self.total_items)
    }

    /// Items neither processed nor failed yet
    pub fn remaining_items(&self) -> i64 {
        (self.total_items - self.processed_items - self.failed_items).max(0)
    }

    pub fn parameters(&self) -> Value {
        serde_json::from_str(&self.parameters_json).unwrap_or(Value::Null)
    }

    pub fn result_data(&self) -> Value {
        serde_json::from_str(&self.result_data_json).unwrap_or(Value::Null)
    }
}

/// `processed / total * 100`, defined as 0 for an empty job
pub fn progress_percentage(processed: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    processed as f64 / total as f64 * 100.0
}

impl StatusTrackable for EmbeddingJob {
    const TABLE: &'static str = "embedding_jobs";
    const ENTITY: &'static str = "embedding job";

    fn id(&self) -> &str {
        &self.id
    }

    fn status_fields(&self) -> &StatusFields {
        &self.status
    }

    fn not_found(id: &str) -> Error {
        Error::JobNotFound(id.to_string())
    }
}

/// Pipeline step tracked per document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TaskType {
    ExtractText,
    ChunkText,
    GenerateEmbeddings,
    ExtractEntities,
    GenerateSummary,
    QualityAssessment,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskType::ExtractText => "extract_text",
            TaskType::ChunkText => "chunk_text",
            TaskType::GenerateEmbeddings => "generate_embeddings",
            TaskType::ExtractEntities => "extract_entities",
            TaskType::GenerateSummary => "generate_summary",
            TaskType::QualityAssessment => "quality_assessment",
        };
        f.write_str(name)
    }
}

/// One processing step of one document, driven by an external task runner
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DocumentProcessingTask {
    pub id: String,
    pub document_id: String,
    pub task_type: TaskType,
    /// Identifier assigned by the external runner
    pub task_id: String,
    /// Fraction done in [0, 1]
    pub progress: f64,
    pub result_json: String,
    pub error_details: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub status: StatusFields,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl StatusTrackable for DocumentProcessingTask {
    const TABLE: &'static str = "processing_tasks";
    const ENTITY: &'static str = "processing task";

    fn id(&self) -> &str {
        &self.id
    }

    fn status_fields(&self) -> &StatusFields {
        &self.status
    }

    fn not_found(id: &str) -> Error {
        Error::TaskNotFound(id.to_string())
    }
}
