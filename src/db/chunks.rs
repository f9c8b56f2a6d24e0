//! Chunk persistence

use super::Database;
use crate::chunk::TextChunk;
use crate::error::{is_foreign_key_violation, is_unique_violation, Error, Result};
use crate::lifecycle::now_timestamp;
use crate::models::DocumentChunk;
use sqlx::SqliteConnection;
use tracing::{debug, info};

impl Database {
    // ===== Chunk Operations =====

    /// Insert a chunk, recomputing its metrics first, and bump the document's `chunk_count`
    pub async fn insert_chunk(&self, mut chunk: DocumentChunk) -> Result<DocumentChunk> {
        chunk.calculate_metrics();
        chunk.validate()?;

        let mut tx = self.pool.begin().await?;
        insert_chunk_row(&mut tx, &chunk).await?;

        sqlx::query("UPDATE documents SET chunk_count = chunk_count + 1, updated_at = ? WHERE id = ?")
            .bind(now_timestamp())
            .bind(&chunk.document_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("Inserted chunk {} of document {}", chunk.chunk_index, chunk.document_id);
        Ok(chunk)
    }

    /// Persist a chunk's content and annotations. The index is immutable.
    pub async fn update_chunk(&self, chunk: &DocumentChunk) -> Result<DocumentChunk> {
        let mut chunk = chunk.clone();
        chunk.calculate_metrics();
        chunk.validate()?;

        sqlx::query_as::<_, DocumentChunk>(
            r#"
            UPDATE document_chunks SET
                content = ?, start_char = ?, end_char = ?,
                char_count = ?, word_count = ?, token_count = ?,
                quality_score = ?, coherence_score = ?, summary = ?,
                keywords_json = ?, entities_json = ?, metadata_json = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&chunk.content)
        .bind(chunk.start_char)
        .bind(chunk.end_char)
        .bind(chunk.char_count)
        .bind(chunk.word_count)
        .bind(chunk.token_count)
        .bind(chunk.quality_score)
        .bind(chunk.coherence_score)
        .bind(&chunk.summary)
        .bind(&chunk.keywords_json)
        .bind(&chunk.entities_json)
        .bind(&chunk.metadata_json)
        .bind(now_timestamp())
        .bind(&chunk.id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::ChunkNotFound(chunk.id.clone()))
    }

    /// Get chunk by ID
    pub async fn get_chunk(&self, id: &str) -> Result<DocumentChunk> {
        sqlx::query_as::<_, DocumentChunk>("SELECT * FROM document_chunks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::ChunkNotFound(id.to_string()))
    }

    /// Get chunk by its position in a document
    pub async fn get_chunk_by_index(&self, document_id: &str, chunk_index: i64) -> Result<DocumentChunk> {
        sqlx::query_as::<_, DocumentChunk>(
            "SELECT * FROM document_chunks WHERE document_id = ? AND chunk_index = ?",
        )
        .bind(document_id)
        .bind(chunk_index)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::ChunkNotFound(format!("{}#{}", document_id, chunk_index)))
    }

    /// All chunks of a document ordered by index
    pub async fn list_chunks(&self, document_id: &str) -> Result<Vec<DocumentChunk>> {
        let chunks = sqlx::query_as::<_, DocumentChunk>(
            "SELECT * FROM document_chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    /// Sibling chunks with index in `[max(0, index - window), index + window]`, the chunk itself included
    pub async fn get_context_window(
        &self,
        chunk: &DocumentChunk,
        window_size: i64,
    ) -> Result<Vec<DocumentChunk>> {
        let (low, high) = chunk.context_range(window_size);
        let chunks = sqlx::query_as::<_, DocumentChunk>(
            r#"
            SELECT * FROM document_chunks
            WHERE document_id = ? AND chunk_index BETWEEN ? AND ?
            ORDER BY chunk_index
            "#,
        )
        .bind(&chunk.document_id)
        .bind(low)
        .bind(high)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    /// Delete chunks with index >= `from_index`, plus their embeddings.
    /// Returns the number of chunks removed.
    pub async fn delete_chunks_from_index(&self, document_id: &str, from_index: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM document_chunks WHERE document_id = ? AND chunk_index >= ?")
            .bind(document_id)
            .bind(from_index)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM document_embeddings WHERE document_id = ? AND chunk_index >= ?")
            .bind(document_id)
            .bind(from_index)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE documents SET chunk_count = MAX(chunk_count - ?, 0), updated_at = ? WHERE id = ?",
        )
        .bind(removed as i64)
        .bind(now_timestamp())
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Removed {} chunks of {} from index {}", removed, document_id, from_index);
        Ok(removed)
    }

    /// Swap a document's entire chunk set (and drop its embeddings) in one transaction
    pub async fn replace_chunks(
        &self,
        document_id: &str,
        chunks: &[TextChunk],
    ) -> Result<Vec<DocumentChunk>> {
        let records = chunks
            .iter()
            .map(|c| {
                let mut record = DocumentChunk::new(document_id, c.index, c.text.as_str(), c.start_char, c.end_char);
                record.calculate_metrics();
                record.validate()?;
                Ok(record)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE documents SET chunk_count = ?, updated_at = ? WHERE id = ?")
            .bind(records.len() as i64)
            .bind(now_timestamp())
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(document_id.to_string()));
        }

        sqlx::query("DELETE FROM document_embeddings WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM document_chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for record in &records {
            insert_chunk_row(&mut tx, record).await?;
        }

        tx.commit().await?;
        info!("Replaced chunks of document {} ({} chunks)", document_id, records.len());
        Ok(records)
    }

    /// Flag a chunk as embedded by `model_name`
    pub async fn mark_chunk_embedded(&self, id: &str, model_name: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        if set_chunk_embedded(&mut conn, id, model_name).await? == 0 {
            return Err(Error::ChunkNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Chunks of a document not yet embedded, ordered by index
    pub async fn list_unembedded_chunks(&self, document_id: &str) -> Result<Vec<DocumentChunk>> {
        let chunks = sqlx::query_as::<_, DocumentChunk>(
            r#"
            SELECT * FROM document_chunks
            WHERE document_id = ? AND is_embedded = 0
            ORDER BY chunk_index
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }
}

async fn insert_chunk_row(conn: &mut SqliteConnection, chunk: &DocumentChunk) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO document_chunks (
            id, document_id, content, chunk_index, start_char, end_char,
            char_count, word_count, token_count, quality_score, coherence_score,
            is_embedded, embedding_model, summary, keywords_json, entities_json, metadata_json,
            created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&chunk.id)
    .bind(&chunk.document_id)
    .bind(&chunk.content)
    .bind(chunk.chunk_index)
    .bind(chunk.start_char)
    .bind(chunk.end_char)
    .bind(chunk.char_count)
    .bind(chunk.word_count)
    .bind(chunk.token_count)
    .bind(chunk.quality_score)
    .bind(chunk.coherence_score)
    .bind(chunk.is_embedded)
    .bind(&chunk.embedding_model)
    .bind(&chunk.summary)
    .bind(&chunk.keywords_json)
    .bind(&chunk.entities_json)
    .bind(&chunk.metadata_json)
    .bind(&chunk.timestamps.created_at)
    .bind(&chunk.timestamps.updated_at)
    .execute(conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(Error::DuplicateChunk {
            document_id: chunk.document_id.clone(),
            chunk_index: chunk.chunk_index,
        }),
        Err(e) if is_foreign_key_violation(&e) => Err(Error::DocumentNotFound(chunk.document_id.clone())),
        Err(e) => Err(e.into()),
    }
}

pub(super) async fn set_chunk_embedded(
    conn: &mut SqliteConnection,
    id: &str,
    model_name: &str,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE document_chunks SET is_embedded = 1, embedding_model = ?, updated_at = ? WHERE id = ?",
    )
    .bind(model_name)
    .bind(now_timestamp())
    .bind(id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_insert_recomputes_metrics_and_counts() {
        let (db, _tmp) = setup_test_db().await;
        let kb = create_kb(&db).await;
        let doc = create_doc(&db, &kb, "Long").await;

        let mut chunk = DocumentChunk::new(&doc.id, 0, "a".repeat(801), 0, 801);
        chunk.char_count = 3;
        chunk.token_count = 99;
        let chunk = db.insert_chunk(chunk).await.unwrap();
        assert_eq!(chunk.char_count, 801);
        assert_eq!(chunk.token_count, 200);

        let stored = db.get_chunk(&chunk.id).await.unwrap();
        assert_eq!(stored.char_count, 801);
        assert_eq!(db.get_document(&doc.id, false).await.unwrap().chunk_count, 1);
    }

    #[tokio::test]
    async fn test_duplicate_index_rejected() {
        let (db, _tmp) = setup_test_db().await;
        let kb = create_kb(&db).await;
        let doc = create_doc(&db, &kb, "Dup").await;

        db.insert_chunk(DocumentChunk::new(&doc.id, 0, "first", 0, 5)).await.unwrap();
        let err = db
            .insert_chunk(DocumentChunk::new(&doc.id, 0, "second", 5, 11))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateChunk { chunk_index: 0, .. }));
        assert_eq!(db.get_document(&doc.id, false).await.unwrap().chunk_count, 1);
        assert_eq!(db.list_chunks(&doc.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_into_missing_document() {
        let (db, _tmp) = setup_test_db().await;
        let err = db
            .insert_chunk(DocumentChunk::new("missing", 0, "text", 0, 4))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn test_context_window() {
        let (db, _tmp) = setup_test_db().await;
        let kb = create_kb(&db).await;
        let doc = create_doc(&db, &kb, "Ten").await;

        for i in 0..10 {
            let text = format!("chunk number {}", i);
            let len = text.len() as i64;
            db.insert_chunk(DocumentChunk::new(&doc.id, i, text, i * 20, i * 20 + len))
                .await
                .unwrap();
        }

        let middle = db.get_chunk_by_index(&doc.id, 5).await.unwrap();
        let window = db.get_context_window(&middle, 1).await.unwrap();
        let indices: Vec<i64> = window.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![4, 5, 6]);

        let first = db.get_chunk_by_index(&doc.id, 0).await.unwrap();
        let window = db.get_context_window(&first, 2).await.unwrap();
        let indices: Vec<i64> = window.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_update_chunk_keeps_index() {
        let (db, _tmp) = setup_test_db().await;
        let kb = create_kb(&db).await;
        let doc = create_doc(&db, &kb, "Edit").await;
        let mut chunk = db
            .insert_chunk(DocumentChunk::new(&doc.id, 2, "old text", 0, 8))
            .await
            .unwrap();

        chunk.content = "new longer text here".to_string();
        chunk.end_char = 20;
        chunk.quality_score = 0.75;
        chunk.chunk_index = 9;
        let updated = db.update_chunk(&chunk).await.unwrap();

        assert_eq!(updated.chunk_index, 2);
        assert_eq!(updated.char_count, 20);
        assert_eq!(updated.word_count, 4);
        assert_eq!(updated.quality_score, 0.75);

        chunk.quality_score = 1.5;
        assert!(matches!(db.update_chunk(&chunk).await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_from_index_and_replace() {
        let (db, _tmp) = setup_test_db().await;
        let kb = create_kb(&db).await;
        let doc = create_doc(&db, &kb, "Rechunk").await;

        for i in 0..4 {
            db.insert_chunk(DocumentChunk::new(&doc.id, i, format!("part {}", i), 0, 6))
                .await
                .unwrap();
        }

        assert_eq!(db.delete_chunks_from_index(&doc.id, 2).await.unwrap(), 2);
        assert_eq!(db.get_document(&doc.id, false).await.unwrap().chunk_count, 2);

        let replacement = vec![
            TextChunk { index: 0, start_char: 0, end_char: 5, text: "alpha".to_string() },
            TextChunk { index: 1, start_char: 4, end_char: 9, text: "a beta".to_string() },
            TextChunk { index: 2, start_char: 9, end_char: 14, text: "gamma".to_string() },
        ];
        let stored = db.replace_chunks(&doc.id, &replacement).await.unwrap();
        assert_eq!(stored.len(), 3);

        let chunks = db.list_chunks(&doc.id).await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].content, "a beta");
        assert_eq!(db.get_document(&doc.id, false).await.unwrap().chunk_count, 3);

        assert!(matches!(
            db.replace_chunks("missing", &replacement).await,
            Err(Error::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_embedded_and_list_unembedded() {
        let (db, _tmp) = setup_test_db().await;
        let kb = create_kb(&db).await;
        let doc = create_doc(&db, &kb, "Embed").await;

        let first = db.insert_chunk(DocumentChunk::new(&doc.id, 0, "one", 0, 3)).await.unwrap();
        db.insert_chunk(DocumentChunk::new(&doc.id, 1, "two", 3, 6)).await.unwrap();

        db.mark_chunk_embedded(&first.id, "nomic-embed-text").await.unwrap();
        let pending = db.list_unembedded_chunks(&doc.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].chunk_index, 1);

        let embedded = db.get_chunk(&first.id).await.unwrap();
        assert!(embedded.is_embedded);
        assert_eq!(embedded.embedding_model, "nomic-embed-text");

        assert!(matches!(
            db.mark_chunk_embedded("missing", "m").await,
            Err(Error::ChunkNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_chunks_cascade_with_document() {
        let (db, _tmp) = setup_test_db().await;
        let kb = create_kb(&db).await;
        let doc = create_doc(&db, &kb, "Cascade").await;
        let chunk = db.insert_chunk(DocumentChunk::new(&doc.id, 0, "text", 0, 4)).await.unwrap();

        db.hard_delete_document(&doc.id).await.unwrap();
        assert!(matches!(db.get_chunk(&chunk.id).await, Err(Error::ChunkNotFound(_))));
    }
}
