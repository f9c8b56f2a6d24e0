//! Embedding model registry and stored document embeddings

use super::chunks::set_chunk_embedded;
use super::Database;
use crate::error::{is_foreign_key_violation, is_unique_violation, Error, Result};
use crate::lifecycle::{new_id, now_timestamp, ProcessingStatus};
use crate::models::{DocumentEmbedding, EmbeddingModel, NewDocumentEmbedding, NewEmbeddingModel};
use tracing::{debug, info};

impl Database {
    // ===== Embedding Model Registry =====

    /// Register a model; names are unique
    pub async fn register_embedding_model(&self, new: NewEmbeddingModel) -> Result<EmbeddingModel> {
        new.validate()?;
        let now = now_timestamp();

        let result = sqlx::query_as::<_, EmbeddingModel>(
            r#"
            INSERT INTO embedding_models (
                id, name, provider, model_id, dimension, max_tokens, description, is_active,
                avg_processing_time, usage_count, config_json, metadata_json, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, 1, 0.0, 0, ?, '{}', ?, ?)
            RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(&new.name)
        .bind(new.provider)
        .bind(&new.model_id)
        .bind(new.dimension)
        .bind(new.max_tokens)
        .bind(&new.description)
        .bind(serde_json::to_string(&new.config)?)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(model) => {
                info!("Registered embedding model '{}' ({})", model.name, model.provider);
                Ok(model)
            }
            Err(e) if is_unique_violation(&e) => Err(Error::Validation(format!(
                "embedding model '{}' already exists",
                new.name
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Get embedding model by ID
    pub async fn get_embedding_model(&self, id: &str) -> Result<EmbeddingModel> {
        sqlx::query_as::<_, EmbeddingModel>("SELECT * FROM embedding_models WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::EmbeddingModelNotFound(id.to_string()))
    }

    /// Get embedding model by its unique name
    pub async fn get_embedding_model_by_name(&self, name: &str) -> Result<EmbeddingModel> {
        sqlx::query_as::<_, EmbeddingModel>("SELECT * FROM embedding_models WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::EmbeddingModelNotFound(name.to_string()))
    }

    /// List registered models by name
    pub async fn list_embedding_models(&self, active_only: bool) -> Result<Vec<EmbeddingModel>> {
        let models = sqlx::query_as::<_, EmbeddingModel>(
            "SELECT * FROM embedding_models WHERE (is_active = 1 OR NOT ?) ORDER BY name",
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(models)
    }

    /// Enable or disable a model
    pub async fn set_embedding_model_active(&self, id: &str, is_active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE embedding_models SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(is_active)
            .bind(now_timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::EmbeddingModelNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Atomically add one to `usage_count`
    pub async fn increment_usage(&self, id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE embedding_models SET usage_count = usage_count + 1, updated_at = ? WHERE id = ?",
        )
        .bind(now_timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::EmbeddingModelNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Fold one observation into the rolling average and count it as a use
    pub async fn record_processing_time(&self, id: &str, processing_time_ms: f64) -> Result<EmbeddingModel> {
        if !processing_time_ms.is_finite() || processing_time_ms < 0.0 {
            return Err(Error::Validation(format!(
                "processing time must be a non-negative number, got {}",
                processing_time_ms
            )));
        }

        sqlx::query_as::<_, EmbeddingModel>(
            r#"
            UPDATE embedding_models SET
                avg_processing_time = CASE
                    WHEN usage_count = 0 THEN ?1
                    ELSE (avg_processing_time * usage_count + ?1) / (usage_count + 1)
                END,
                usage_count = usage_count + 1,
                updated_at = ?2
            WHERE id = ?3
            RETURNING *
            "#,
        )
        .bind(processing_time_ms)
        .bind(now_timestamp())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::EmbeddingModelNotFound(id.to_string()))
    }

    /// Delete a model that nothing references any more
    pub async fn delete_embedding_model(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM embedding_models WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(r) if r.rows_affected() == 0 => Err(Error::EmbeddingModelNotFound(id.to_string())),
            Ok(_) => {
                info!("Deleted embedding model {}", id);
                Ok(())
            }
            Err(e) if is_foreign_key_violation(&e) => {
                Err(Error::InUse(format!("embedding model {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    // ===== Document Embeddings =====

    /// Store (or replace) the embedding of one chunk under one model and flag the chunk embedded
    pub async fn store_document_embedding(&self, new: NewDocumentEmbedding) -> Result<DocumentEmbedding> {
        let model = self.get_embedding_model(&new.embedding_model_id).await?;
        new.embedding_vector.check_dimension(model.dimension)?;

        let now = now_timestamp();
        let mut tx = self.pool.begin().await?;

        let stored = sqlx::query_as::<_, DocumentEmbedding>(
            r#"
            INSERT OR REPLACE INTO document_embeddings (
                id, document_id, chunk_index, embedding_model_id, text_content, embedding_vector,
                chunk_metadata_json, processing_time, token_count,
                status, status_message, processing_started_at, processing_completed_at,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, '{}', ?7, ?8, ?9, '', NULL, ?10, ?10, ?10)
            RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(&new.document_id)
        .bind(new.chunk_index)
        .bind(&new.embedding_model_id)
        .bind(&new.text_content)
        .bind(new.embedding_vector.to_bytes())
        .bind(new.processing_time)
        .bind(new.token_count)
        .bind(ProcessingStatus::Completed)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await;

        let stored = match stored {
            Ok(row) => row,
            Err(e) if is_foreign_key_violation(&e) => {
                return Err(Error::DocumentNotFound(new.document_id.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let chunk_id: Option<String> = sqlx::query_scalar(
            "SELECT id FROM document_chunks WHERE document_id = ? AND chunk_index = ?",
        )
        .bind(&new.document_id)
        .bind(new.chunk_index)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(chunk_id) = chunk_id {
            set_chunk_embedded(&mut tx, &chunk_id, &model.name).await?;
        }

        tx.commit().await?;
        debug!(
            "Stored embedding for chunk {} of {} ({} dims)",
            new.chunk_index,
            new.document_id,
            new.embedding_vector.len()
        );
        Ok(stored)
    }

    /// Get the embedding of one chunk under one model
    pub async fn get_document_embedding(
        &self,
        document_id: &str,
        chunk_index: i64,
        embedding_model_id: &str,
    ) -> Result<DocumentEmbedding> {
        sqlx::query_as::<_, DocumentEmbedding>(
            r#"
            SELECT * FROM document_embeddings
            WHERE document_id = ? AND chunk_index = ? AND embedding_model_id = ?
            "#,
        )
        .bind(document_id)
        .bind(chunk_index)
        .bind(embedding_model_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::EmbeddingNotFound(format!("{}#{}", document_id, chunk_index)))
    }

    /// Embeddings of a document, optionally for one model, ordered by chunk index
    pub async fn list_document_embeddings(
        &self,
        document_id: &str,
        embedding_model_id: Option<&str>,
    ) -> Result<Vec<DocumentEmbedding>> {
        let embeddings = sqlx::query_as::<_, DocumentEmbedding>(
            r#"
            SELECT * FROM document_embeddings
            WHERE document_id = ?1 AND (?2 IS NULL OR embedding_model_id = ?2)
            ORDER BY chunk_index, embedding_model_id
            "#,
        )
        .bind(document_id)
        .bind(embedding_model_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::models::{DocumentChunk, EmbeddingVector, Provider};

    async fn register(db: &Database, name: &str, dimension: i64) -> EmbeddingModel {
        db.register_embedding_model(NewEmbeddingModel::new(name, Provider::Ollama, dimension))
            .await
            .unwrap()
    }

    fn embedding(document_id: &str, chunk_index: i64, model_id: &str, dims: usize) -> NewDocumentEmbedding {
        NewDocumentEmbedding {
            document_id: document_id.to_string(),
            chunk_index,
            embedding_model_id: model_id.to_string(),
            text_content: "text".to_string(),
            embedding_vector: EmbeddingVector(vec![0.25; dims]),
            processing_time: Some(12.0),
            token_count: Some(1),
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let (db, _tmp) = setup_test_db().await;
        let model = register(&db, "nomic-embed-text", 768).await;
        assert_eq!(model.usage_count, 0);
        assert!(model.is_active);

        assert_eq!(db.get_embedding_model(&model.id).await.unwrap().name, "nomic-embed-text");
        assert_eq!(
            db.get_embedding_model_by_name("nomic-embed-text").await.unwrap().id,
            model.id
        );

        let dup = db
            .register_embedding_model(NewEmbeddingModel::new("nomic-embed-text", Provider::Openai, 10))
            .await;
        assert!(matches!(dup, Err(Error::Validation(_))));

        db.set_embedding_model_active(&model.id, false).await.unwrap();
        assert!(db.list_embedding_models(true).await.unwrap().is_empty());
        assert_eq!(db.list_embedding_models(false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rolling_average() {
        let (db, _tmp) = setup_test_db().await;
        let model = register(&db, "mini", 4).await;

        db.record_processing_time(&model.id, 10.0).await.unwrap();
        db.record_processing_time(&model.id, 20.0).await.unwrap();
        let model = db.record_processing_time(&model.id, 30.0).await.unwrap();

        assert_eq!(model.usage_count, 3);
        assert!((model.avg_processing_time - 20.0).abs() < 1e-9);

        db.increment_usage(&model.id).await.unwrap();
        assert_eq!(db.get_embedding_model(&model.id).await.unwrap().usage_count, 4);

        assert!(db.record_processing_time(&model.id, -1.0).await.is_err());
        assert!(matches!(
            db.record_processing_time("missing", 1.0).await,
            Err(Error::EmbeddingModelNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_store_embedding_marks_chunk() {
        let (db, _tmp) = setup_test_db().await;
        let kb = create_kb(&db).await;
        let doc = create_doc(&db, &kb, "Vectors").await;
        let chunk = db.insert_chunk(DocumentChunk::new(&doc.id, 0, "text", 0, 4)).await.unwrap();
        let model = register(&db, "mini", 4).await;

        let stored = db
            .store_document_embedding(embedding(&doc.id, 0, &model.id, 4))
            .await
            .unwrap();
        assert_eq!(stored.embedding_vector.len(), 4);
        assert_eq!(stored.status.status, ProcessingStatus::Completed);

        let loaded = db.get_document_embedding(&doc.id, 0, &model.id).await.unwrap();
        assert_eq!(loaded.embedding_vector, EmbeddingVector(vec![0.25; 4]));

        let chunk = db.get_chunk(&chunk.id).await.unwrap();
        assert!(chunk.is_embedded);
        assert_eq!(chunk.embedding_model, "mini");

        // Replacing keeps one row per (document, chunk, model)
        db.store_document_embedding(embedding(&doc.id, 0, &model.id, 4))
            .await
            .unwrap();
        assert_eq!(db.list_document_embeddings(&doc.id, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let (db, _tmp) = setup_test_db().await;
        let kb = create_kb(&db).await;
        let doc = create_doc(&db, &kb, "Vectors").await;
        let model = register(&db, "mini", 4).await;

        let err = db
            .store_document_embedding(embedding(&doc.id, 0, &model.id, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 3 }));
    }

    #[tokio::test]
    async fn test_referenced_model_cannot_be_deleted() {
        let (db, _tmp) = setup_test_db().await;
        let kb = create_kb(&db).await;
        let doc = create_doc(&db, &kb, "Vectors").await;
        let model = register(&db, "mini", 4).await;
        let unused = register(&db, "unused", 4).await;

        db.store_document_embedding(embedding(&doc.id, 0, &model.id, 4))
            .await
            .unwrap();

        assert!(matches!(db.delete_embedding_model(&model.id).await, Err(Error::InUse(_))));
        db.delete_embedding_model(&unused.id).await.unwrap();
        assert!(matches!(
            db.delete_embedding_model(&unused.id).await,
            Err(Error::EmbeddingModelNotFound(_))
        ));

        // Once the document is gone its embeddings go too and the model is free
        db.hard_delete_document(&doc.id).await.unwrap();
        db.delete_embedding_model(&model.id).await.unwrap();
    }
}
