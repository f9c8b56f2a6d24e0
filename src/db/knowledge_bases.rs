//! Knowledge base persistence, aggregate counters, sharing and versions

use super::Database;
use crate::config::validate_chunking;
use crate::error::{is_foreign_key_violation, Error, Result};
use crate::lifecycle::{new_id, now_timestamp, Principal, Shared};
use crate::models::{KnowledgeBase, KnowledgeBaseStats, KnowledgeBaseVersion, NewKnowledgeBase};
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

impl Database {
    // ===== Knowledge Base Operations =====

    /// Validate and insert a new knowledge base
    pub async fn create_knowledge_base(&self, new: NewKnowledgeBase) -> Result<KnowledgeBase> {
        let kb = new.into_record()?;
        sqlx::query(
            r#"
            INSERT INTO knowledge_bases (
                id, owner_id, name, description, embedding_model, embedding_dimension,
                chunk_size, chunk_overlap, vector_store_type, is_public,
                document_count, chunk_count, total_tokens, avg_chunk_quality, last_indexed_at,
                metadata_json, status, status_message, is_deleted, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, 0, 0.0, NULL, ?, ?, '', 0, ?, ?)
            "#,
        )
        .bind(&kb.id)
        .bind(&kb.owner_id)
        .bind(&kb.name)
        .bind(&kb.description)
        .bind(&kb.embedding_model)
        .bind(kb.embedding_dimension)
        .bind(kb.chunk_size)
        .bind(kb.chunk_overlap)
        .bind(kb.vector_store_type)
        .bind(kb.is_public)
        .bind(&kb.metadata_json)
        .bind(kb.status.status)
        .bind(&kb.timestamps.created_at)
        .bind(&kb.timestamps.updated_at)
        .execute(&self.pool)
        .await?;

        info!("Created knowledge base '{}' ({})", kb.name, kb.id);
        Ok(kb)
    }

    /// Get a knowledge base by ID; soft-deleted rows only with `include_deleted`
    pub async fn get_knowledge_base(&self, id: &str, include_deleted: bool) -> Result<KnowledgeBase> {
        sqlx::query_as::<_, KnowledgeBase>(
            "SELECT * FROM knowledge_bases WHERE id = ? AND (is_deleted = 0 OR ?)",
        )
        .bind(id)
        .bind(include_deleted)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::KnowledgeBaseNotFound(id.to_string()))
    }

    /// List knowledge bases, optionally for one owner
    pub async fn list_knowledge_bases(
        &self,
        owner_id: Option<&str>,
        include_deleted: bool,
    ) -> Result<Vec<KnowledgeBase>> {
        let kbs = sqlx::query_as::<_, KnowledgeBase>(
            r#"
            SELECT * FROM knowledge_bases
            WHERE (?1 IS NULL OR owner_id = ?1) AND (is_deleted = 0 OR ?2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner_id)
        .bind(include_deleted)
        .fetch_all(&self.pool)
        .await?;
        Ok(kbs)
    }

    /// Live knowledge bases the principal may read
    pub async fn list_accessible_knowledge_bases(
        &self,
        principal: &Principal,
    ) -> Result<Vec<KnowledgeBase>> {
        if principal.is_superuser {
            return self.list_knowledge_bases(None, false).await;
        }

        let kbs = sqlx::query_as::<_, KnowledgeBase>(
            r#"
            SELECT * FROM knowledge_bases kb
            WHERE kb.is_deleted = 0 AND (
                kb.is_public = 1
                OR (?1 IS NOT NULL AND (
                    kb.owner_id = ?1
                    OR EXISTS (SELECT 1 FROM kb_shares s WHERE s.knowledge_base_id = kb.id AND s.user_id = ?1)
                ))
            )
            ORDER BY kb.created_at DESC
            "#,
        )
        .bind(principal.user_id.as_deref())
        .fetch_all(&self.pool)
        .await?;
        Ok(kbs)
    }

    /// Persist the editable fields of a knowledge base
    pub async fn update_knowledge_base(&self, kb: &KnowledgeBase) -> Result<KnowledgeBase> {
        if kb.name.trim().is_empty() {
            return Err(Error::Validation("name must not be empty".to_string()));
        }
        validate_chunking(kb.chunk_size, kb.chunk_overlap)?;

        sqlx::query_as::<_, KnowledgeBase>(
            r#"
            UPDATE knowledge_bases SET
                name = ?, description = ?, embedding_model = ?, embedding_dimension = ?,
                chunk_size = ?, chunk_overlap = ?, vector_store_type = ?, is_public = ?,
                metadata_json = ?, updated_at = ?
            WHERE id = ? AND is_deleted = 0
            RETURNING *
            "#,
        )
        .bind(&kb.name)
        .bind(&kb.description)
        .bind(&kb.embedding_model)
        .bind(kb.embedding_dimension)
        .bind(kb.chunk_size)
        .bind(kb.chunk_overlap)
        .bind(kb.vector_store_type)
        .bind(kb.is_public)
        .bind(&kb.metadata_json)
        .bind(now_timestamp())
        .bind(&kb.id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::KnowledgeBaseNotFound(kb.id.clone()))
    }

    /// Hide a knowledge base from default reads
    pub async fn soft_delete_knowledge_base(&self, id: &str) -> Result<()> {
        let now = now_timestamp();
        let result = sqlx::query(
            "UPDATE knowledge_bases SET is_deleted = 1, deleted_at = ?, updated_at = ? WHERE id = ? AND is_deleted = 0",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::KnowledgeBaseNotFound(id.to_string()));
        }
        info!("Soft-deleted knowledge base {}", id);
        Ok(())
    }

    /// Undo a soft delete
    pub async fn restore_knowledge_base(&self, id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE knowledge_bases SET is_deleted = 0, deleted_at = NULL, updated_at = ? WHERE id = ? AND is_deleted = 1",
        )
        .bind(now_timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::KnowledgeBaseNotFound(id.to_string()));
        }
        info!("Restored knowledge base {}", id);
        Ok(())
    }

    /// Delete a knowledge base with its documents, chunks, embeddings, shares and versions
    pub async fn hard_delete_knowledge_base(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM knowledge_bases WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::KnowledgeBaseNotFound(id.to_string()));
        }
        info!("Deleted knowledge base {} and its contents", id);
        Ok(())
    }

    // ===== Aggregate Counters =====

    /// Atomically add one to `document_count`
    pub async fn increment_document_count(&self, id: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        if adjust_document_count(&mut conn, id, 1).await? == 0 {
            return Err(Error::KnowledgeBaseNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Atomically subtract one from `document_count`, never below zero
    pub async fn decrement_document_count(&self, id: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        if adjust_document_count(&mut conn, id, -1).await? == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM knowledge_bases WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;
            if exists.is_none() {
                return Err(Error::KnowledgeBaseNotFound(id.to_string()));
            }
            warn!("document_count of knowledge base {} is already zero", id);
        }
        Ok(())
    }

    /// Recompute all four counters from live documents and their chunks in one statement
    pub async fn update_statistics(&self, id: &str) -> Result<KnowledgeBaseStats> {
        let row: Option<(i64, i64, i64, f64)> = sqlx::query_as(
            r#"
            UPDATE knowledge_bases SET
                document_count = (
                    SELECT COUNT(*) FROM documents
                    WHERE knowledge_base_id = ?1 AND is_deleted = 0
                ),
                chunk_count = (
                    SELECT COUNT(*) FROM document_chunks c
                    JOIN documents d ON c.document_id = d.id
                    WHERE d.knowledge_base_id = ?1 AND d.is_deleted = 0
                ),
                total_tokens = (
                    SELECT COALESCE(SUM(c.token_count), 0) FROM document_chunks c
                    JOIN documents d ON c.document_id = d.id
                    WHERE d.knowledge_base_id = ?1 AND d.is_deleted = 0
                ),
                avg_chunk_quality = (
                    SELECT COALESCE(AVG(c.quality_score), 0.0) FROM document_chunks c
                    JOIN documents d ON c.document_id = d.id
                    WHERE d.knowledge_base_id = ?1 AND d.is_deleted = 0
                ),
                updated_at = ?2
            WHERE id = ?1
            RETURNING document_count, chunk_count, total_tokens, avg_chunk_quality
            "#,
        )
        .bind(id)
        .bind(now_timestamp())
        .fetch_optional(&self.pool)
        .await?;

        let (document_count, chunk_count, total_tokens, avg_chunk_quality) =
            row.ok_or_else(|| Error::KnowledgeBaseNotFound(id.to_string()))?;

        debug!(
            "Statistics for {}: {} documents, {} chunks, {} tokens",
            id, document_count, chunk_count, total_tokens
        );

        Ok(KnowledgeBaseStats {
            document_count,
            chunk_count,
            total_tokens,
            avg_chunk_quality,
        })
    }

    /// Stamp `last_indexed_at` with the current time
    pub async fn mark_indexed(&self, id: &str) -> Result<()> {
        let now = now_timestamp();
        let result = sqlx::query(
            "UPDATE knowledge_bases SET last_indexed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::KnowledgeBaseNotFound(id.to_string()));
        }
        Ok(())
    }

    // ===== Sharing =====

    /// Grant a user read access; sharing twice is a no-op
    pub async fn share_knowledge_base(&self, id: &str, user_id: &str) -> Result<()> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO kb_shares (knowledge_base_id, user_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(id)
        .bind(user_id)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("Shared knowledge base {} with {}", id, user_id);
                Ok(())
            }
            Err(e) if is_foreign_key_violation(&e) => Err(Error::KnowledgeBaseNotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Revoke a share; returns whether one existed
    pub async fn unshare_knowledge_base(&self, id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kb_shares WHERE knowledge_base_id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Users a knowledge base is shared with
    pub async fn list_shares(&self, id: &str) -> Result<Vec<String>> {
        let users: Vec<String> = sqlx::query_scalar(
            "SELECT user_id FROM kb_shares WHERE knowledge_base_id = ? ORDER BY user_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    /// Read access check: public, owner, shared with the caller, or superuser
    pub async fn can_access(&self, id: &str, principal: &Principal) -> Result<bool> {
        let kb = self.get_knowledge_base(id, false).await?;
        let shared = match principal.user_id.as_deref() {
            Some(user_id) => {
                let row: Option<i64> = sqlx::query_scalar(
                    "SELECT 1 FROM kb_shares WHERE knowledge_base_id = ? AND user_id = ?",
                )
                .bind(id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
                row.is_some()
            }
            None => false,
        };
        Ok(kb.can_access(principal, shared))
    }

    /// Write access check: owner or superuser
    pub async fn can_edit(&self, id: &str, principal: &Principal) -> Result<bool> {
        let kb = self.get_knowledge_base(id, false).await?;
        Ok(kb.can_edit(principal))
    }

    // ===== Versions =====

    /// Append version n+1 carrying the current counters and deactivate older versions
    pub async fn snapshot_version(
        &self,
        id: &str,
        changes: &str,
        created_by: Option<&str>,
    ) -> Result<KnowledgeBaseVersion> {
        let now = now_timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE kb_versions SET is_active = 0, updated_at = ? WHERE knowledge_base_id = ? AND is_active = 1",
        )
        .bind(&now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let version = sqlx::query_as::<_, KnowledgeBaseVersion>(
            r#"
            INSERT INTO kb_versions (
                id, knowledge_base_id, version, is_active, name, description, changes,
                document_count_snapshot, chunk_count_snapshot, created_by, metadata_json,
                created_at, updated_at
            )
            SELECT
                ?1, kb.id,
                COALESCE((SELECT MAX(v.version) FROM kb_versions v WHERE v.knowledge_base_id = kb.id), 0) + 1,
                1, kb.name, kb.description, ?2, kb.document_count, kb.chunk_count, ?3, '{}', ?4, ?4
            FROM knowledge_bases kb
            WHERE kb.id = ?5 AND kb.is_deleted = 0
            RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(changes)
        .bind(created_by)
        .bind(&now)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::KnowledgeBaseNotFound(id.to_string()))?;

        tx.commit().await?;
        info!("Snapshotted knowledge base {} as version {}", id, version.version);
        Ok(version)
    }

    /// All versions of a knowledge base, newest first
    pub async fn list_versions(&self, id: &str) -> Result<Vec<KnowledgeBaseVersion>> {
        let versions = sqlx::query_as::<_, KnowledgeBaseVersion>(
            "SELECT * FROM kb_versions WHERE knowledge_base_id = ? ORDER BY version DESC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(versions)
    }
}

/// `document_count += delta` as one statement. Increments only apply to live
/// knowledge bases; decrements never take the counter below zero.
/// Returns rows affected.
pub(super) async fn adjust_document_count(
    conn: &mut SqliteConnection,
    id: &str,
    delta: i64,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE knowledge_bases
        SET document_count = document_count + ?1, updated_at = ?2
        WHERE id = ?3 AND (?1 < 0 OR is_deleted = 0) AND document_count + ?1 >= 0
        "#,
    )
    .bind(delta)
    .bind(now_timestamp())
    .bind(id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
