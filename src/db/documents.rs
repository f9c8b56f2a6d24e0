//! Document persistence; creation and deletion keep `document_count` in step

use super::knowledge_bases::adjust_document_count;
use super::Database;
use crate::error::{is_foreign_key_violation, Error, Result};
use crate::lifecycle::now_timestamp;
use crate::models::Document;
use tracing::{debug, info};

impl Database {
    // ===== Document Operations =====

    /// Insert a document and bump its knowledge base's `document_count` in one transaction
    pub async fn create_document(&self, mut doc: Document) -> Result<Document> {
        doc.calculate_content_metrics();
        doc.validate()?;

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO documents (
                id, knowledge_base_id, title, content, file_path, file_type, file_size, mime_type,
                char_count, word_count, token_count, language, quality_score, chunk_count,
                uploaded_by, metadata_json, status, status_message, processing_started_at,
                processing_completed_at, is_deleted, deleted_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?, 0, NULL, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.knowledge_base_id)
        .bind(&doc.title)
        .bind(&doc.content)
        .bind(&doc.file_path)
        .bind(&doc.file_type)
        .bind(doc.file_size)
        .bind(&doc.mime_type)
        .bind(doc.char_count)
        .bind(doc.word_count)
        .bind(doc.token_count)
        .bind(doc.language)
        .bind(doc.quality_score)
        .bind(&doc.uploaded_by)
        .bind(&doc.metadata_json)
        .bind(doc.status.status)
        .bind(&doc.status.status_message)
        .bind(&doc.status.processing_started_at)
        .bind(&doc.status.processing_completed_at)
        .bind(&doc.timestamps.created_at)
        .bind(&doc.timestamps.updated_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_foreign_key_violation(&e) => {
                return Err(Error::KnowledgeBaseNotFound(doc.knowledge_base_id.clone()))
            }
            Err(e) => return Err(e.into()),
        }

        if adjust_document_count(&mut tx, &doc.knowledge_base_id, 1).await? == 0 {
            // Soft-deleted knowledge base; dropping the transaction rolls the insert back
            return Err(Error::KnowledgeBaseNotFound(doc.knowledge_base_id.clone()));
        }

        tx.commit().await?;

        doc.chunk_count = 0;
        doc.deletion = Default::default();
        debug!("Created document '{}' ({}) in {}", doc.title, doc.id, doc.knowledge_base_id);
        Ok(doc)
    }

    /// Get a document by ID; soft-deleted rows only with `include_deleted`
    pub async fn get_document(&self, id: &str, include_deleted: bool) -> Result<Document> {
        sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = ? AND (is_deleted = 0 OR ?)")
            .bind(id)
            .bind(include_deleted)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))
    }

    /// List documents of a knowledge base, oldest first
    pub async fn list_documents(
        &self,
        knowledge_base_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<Document>> {
        let docs = sqlx::query_as::<_, Document>(
            r#"
            SELECT * FROM documents
            WHERE knowledge_base_id = ? AND (is_deleted = 0 OR ?)
            ORDER BY created_at, id
            "#,
        )
        .bind(knowledge_base_id)
        .bind(include_deleted)
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    /// Persist content, file and metadata fields, recomputing content metrics first
    pub async fn save_document(&self, doc: &Document) -> Result<Document> {
        let mut doc = doc.clone();
        doc.calculate_content_metrics();
        doc.validate()?;

        sqlx::query_as::<_, Document>(
            r#"
            UPDATE documents SET
                title = ?, content = ?, file_path = ?, file_type = ?, file_size = ?, mime_type = ?,
                char_count = ?, word_count = ?, token_count = ?, language = ?, quality_score = ?,
                uploaded_by = ?, metadata_json = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&doc.title)
        .bind(&doc.content)
        .bind(&doc.file_path)
        .bind(&doc.file_type)
        .bind(doc.file_size)
        .bind(&doc.mime_type)
        .bind(doc.char_count)
        .bind(doc.word_count)
        .bind(doc.token_count)
        .bind(doc.language)
        .bind(doc.quality_score)
        .bind(&doc.uploaded_by)
        .bind(&doc.metadata_json)
        .bind(now_timestamp())
        .bind(&doc.id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(doc.id.clone()))
    }

    /// Soft-delete a document and decrement its knowledge base's counter
    pub async fn soft_delete_document(&self, id: &str) -> Result<()> {
        let now = now_timestamp();
        let mut tx = self.pool.begin().await?;

        let kb_id: String = sqlx::query_scalar(
            r#"
            UPDATE documents SET is_deleted = 1, deleted_at = ?1, updated_at = ?1
            WHERE id = ?2 AND is_deleted = 0
            RETURNING knowledge_base_id
            "#,
        )
        .bind(&now)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;

        adjust_document_count(&mut tx, &kb_id, -1).await?;
        tx.commit().await?;

        info!("Soft-deleted document {}", id);
        Ok(())
    }

    /// Undo a soft delete and increment the knowledge base's counter again
    pub async fn restore_document(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let kb_id: String = sqlx::query_scalar(
            r#"
            UPDATE documents SET is_deleted = 0, deleted_at = NULL, updated_at = ?1
            WHERE id = ?2 AND is_deleted = 1
            RETURNING knowledge_base_id
            "#,
        )
        .bind(now_timestamp())
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;

        if adjust_document_count(&mut tx, &kb_id, 1).await? == 0 {
            return Err(Error::KnowledgeBaseNotFound(kb_id));
        }
        tx.commit().await?;

        info!("Restored document {}", id);
        Ok(())
    }

    /// Delete a document with its chunks, embeddings and tasks.
    /// A live document also decrements the knowledge base's counter.
    /// Returns the deleted row so callers can clean up its stored file.
    pub async fn hard_delete_document(&self, id: &str) -> Result<Document> {
        let mut tx = self.pool.begin().await?;

        let doc = sqlx::query_as::<_, Document>("DELETE FROM documents WHERE id = ? RETURNING *")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;

        if !doc.deletion.is_deleted {
            adjust_document_count(&mut tx, &doc.knowledge_base_id, -1).await?;
        }
        tx.commit().await?;

        info!("Deleted document {} and its chunks", id);
        Ok(doc)
    }
}
