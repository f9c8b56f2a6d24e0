//! Embedding jobs and document processing tasks

use super::Database;
use crate::error::{is_foreign_key_violation, Error, Result};
use crate::lifecycle::{new_id, now_timestamp, ProcessingStatus};
use crate::models::{DocumentProcessingTask, EmbeddingJob, JobType, TaskType};
use serde_json::Value;
use tracing::{debug, info};

impl Database {
    // ===== Embedding Jobs =====

    /// Queue a job over `total_items` items
    pub async fn create_embedding_job(
        &self,
        job_type: JobType,
        embedding_model_id: &str,
        total_items: i64,
        parameters: &Value,
    ) -> Result<EmbeddingJob> {
        if total_items < 0 {
            return Err(Error::Validation(format!(
                "total_items must be non-negative, got {}",
                total_items
            )));
        }
        let now = now_timestamp();

        let result = sqlx::query_as::<_, EmbeddingJob>(
            r#"
            INSERT INTO embedding_jobs (
                id, job_type, embedding_model_id, parameters_json, total_items,
                processed_items, failed_items, result_data_json,
                status, status_message, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, '{}', ?6, '', ?7, ?7)
            RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(job_type)
        .bind(embedding_model_id)
        .bind(serde_json::to_string(parameters)?)
        .bind(total_items)
        .bind(ProcessingStatus::Pending)
        .bind(&now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(job) => {
                info!("Created {} job {} with {} items", job.job_type, job.id, total_items);
                Ok(job)
            }
            Err(e) if is_foreign_key_violation(&e) => {
                Err(Error::EmbeddingModelNotFound(embedding_model_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get embedding job by ID
    pub async fn get_embedding_job(&self, id: &str) -> Result<EmbeddingJob> {
        sqlx::query_as::<_, EmbeddingJob>("SELECT * FROM embedding_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::JobNotFound(id.to_string()))
    }

    /// List jobs, newest first, optionally filtered by status
    pub async fn list_embedding_jobs(&self, status: Option<ProcessingStatus>) -> Result<Vec<EmbeddingJob>> {
        let jobs = sqlx::query_as::<_, EmbeddingJob>(
            r#"
            SELECT * FROM embedding_jobs
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    /// Count one item as processed
    pub async fn mark_item_processed(&self, id: &str) -> Result<EmbeddingJob> {
        self.advance_job(id, "processed_items").await
    }

    /// Count one item as failed
    pub async fn mark_item_failed(&self, id: &str) -> Result<EmbeddingJob> {
        self.advance_job(id, "failed_items").await
    }

    /// Atomic `column += 1` on a live job, refused once every item is accounted for
    async fn advance_job(&self, id: &str, column: &'static str) -> Result<EmbeddingJob> {
        let sql = format!(
            r#"
            UPDATE embedding_jobs SET {column} = {column} + 1, updated_at = ?1
            WHERE id = ?2
              AND status IN ('pending', 'processing')
              AND processed_items + failed_items < total_items
            RETURNING *
            "#,
        );

        let updated = sqlx::query_as::<_, EmbeddingJob>(&sql)
            .bind(now_timestamp())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(job) => Ok(job),
            None => {
                let job = self.get_embedding_job(id).await?;
                if job.status.status.is_terminal() {
                    Err(self
                        .rejected_transition::<EmbeddingJob>(id, ProcessingStatus::Processing)
                        .await?)
                } else {
                    Err(Error::JobOverflow(id.to_string()))
                }
            }
        }
    }

    /// Store result data and move the job to completed in one statement
    pub async fn complete_job(&self, id: &str, result_data: &Value) -> Result<EmbeddingJob> {
        let now = now_timestamp();
        let completed = sqlx::query_as::<_, EmbeddingJob>(
            r#"
            UPDATE embedding_jobs SET
                result_data_json = ?1, status = ?2, processing_completed_at = ?3, updated_at = ?3
            WHERE id = ?4 AND status IN ('pending', 'processing')
            RETURNING *
            "#,
        )
        .bind(serde_json::to_string(result_data)?)
        .bind(ProcessingStatus::Completed)
        .bind(&now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match completed {
            Some(job) => {
                info!(
                    "Job {} completed: {} processed, {} failed",
                    job.id, job.processed_items, job.failed_items
                );
                Ok(job)
            }
            None => Err(self
                .rejected_transition::<EmbeddingJob>(id, ProcessingStatus::Completed)
                .await?),
        }
    }

    // ===== Processing Tasks =====

    /// Record a pipeline step for a document
    pub async fn create_processing_task(
        &self,
        document_id: &str,
        task_type: TaskType,
        task_id: &str,
    ) -> Result<DocumentProcessingTask> {
        let now = now_timestamp();
        let result = sqlx::query_as::<_, DocumentProcessingTask>(
            r#"
            INSERT INTO processing_tasks (
                id, document_id, task_type, task_id, progress, result_json, error_details,
                status, status_message, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, 0.0, '{}', '', ?5, '', ?6, ?6)
            RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(document_id)
        .bind(task_type)
        .bind(task_id)
        .bind(ProcessingStatus::Pending)
        .bind(&now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(task) => {
                debug!("Created {} task {} for document {}", task.task_type, task.id, document_id);
                Ok(task)
            }
            Err(e) if is_foreign_key_violation(&e) => Err(Error::DocumentNotFound(document_id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Get processing task by ID
    pub async fn get_processing_task(&self, id: &str) -> Result<DocumentProcessingTask> {
        sqlx::query_as::<_, DocumentProcessingTask>("SELECT * FROM processing_tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    /// Tasks of a document in creation order
    pub async fn list_processing_tasks(&self, document_id: &str) -> Result<Vec<DocumentProcessingTask>> {
        let tasks = sqlx::query_as::<_, DocumentProcessingTask>(
            "SELECT * FROM processing_tasks WHERE document_id = ? ORDER BY created_at, id",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    /// Set the fraction done, which must lie in [0, 1]
    pub async fn update_task_progress(&self, id: &str, progress: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&progress) {
            return Err(Error::Validation(format!(
                "progress must be between 0.0 and 1.0, got {}",
                progress
            )));
        }
        let result = sqlx::query("UPDATE processing_tasks SET progress = ?, updated_at = ? WHERE id = ?")
            .bind(progress)
            .bind(now_timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::TaskNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Store a task's result payload
    pub async fn set_task_result(&self, id: &str, result_data: &Value) -> Result<()> {
        let result = sqlx::query("UPDATE processing_tasks SET result_json = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(result_data)?)
            .bind(now_timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::TaskNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Store error details and move the task to failed in one statement
    pub async fn record_task_error(&self, id: &str, error_details: &str) -> Result<DocumentProcessingTask> {
        let now = now_timestamp();
        let failed = sqlx::query_as::<_, DocumentProcessingTask>(
            r#"
            UPDATE processing_tasks SET
                error_details = ?1, status = ?2, status_message = ?1,
                processing_completed_at = ?3, updated_at = ?3
            WHERE id = ?4 AND status IN ('pending', 'processing')
            RETURNING *
            "#,
        )
        .bind(error_details)
        .bind(ProcessingStatus::Failed)
        .bind(&now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match failed {
            Some(task) => Ok(task),
            None => Err(self
                .rejected_transition::<DocumentProcessingTask>(id, ProcessingStatus::Failed)
                .await?),
        }
    }
}
