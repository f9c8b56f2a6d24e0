//! Query embedding cache keyed by normalized-query hash and model

use super::Database;
use crate::embed::{query_hash, EmbeddingProvider};
use crate::error::{is_foreign_key_violation, Error, Result};
use crate::lifecycle::{new_id, now_timestamp};
use crate::models::{EmbeddingModel, EmbeddingVector, QueryEmbedding};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Cache size summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryCacheStats {
    pub entries: i64,
    pub total_hits: i64,
}

impl Database {
    // ===== Query Cache =====

    /// Look up a cached query embedding; a found row counts as a hit
    pub async fn lookup_query_embedding(
        &self,
        query_text: &str,
        embedding_model_id: &str,
    ) -> Result<Option<QueryEmbedding>> {
        let now = now_timestamp();
        let cached = sqlx::query_as::<_, QueryEmbedding>(
            r#"
            UPDATE query_embeddings
            SET hit_count = hit_count + 1, last_used = ?1, updated_at = ?1
            WHERE query_hash = ?2 AND embedding_model_id = ?3
            RETURNING *
            "#,
        )
        .bind(&now)
        .bind(query_hash(query_text))
        .bind(embedding_model_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(cached)
    }

    /// Cache a freshly computed query embedding with `hit_count = 1`.
    /// A concurrent insert of the same key keeps one row and counts as a hit.
    pub async fn cache_query_embedding(
        &self,
        query_text: &str,
        model: &EmbeddingModel,
        vector: &EmbeddingVector,
    ) -> Result<QueryEmbedding> {
        vector.check_dimension(model.dimension)?;
        let now = now_timestamp();

        let result = sqlx::query_as::<_, QueryEmbedding>(
            r#"
            INSERT INTO query_embeddings (
                id, query_text, query_hash, embedding_model_id, embedding_vector,
                hit_count, last_used, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6, ?6)
            ON CONFLICT(query_hash, embedding_model_id) DO UPDATE SET
                embedding_vector = excluded.embedding_vector,
                hit_count = hit_count + 1,
                last_used = excluded.last_used,
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(query_text)
        .bind(query_hash(query_text))
        .bind(&model.id)
        .bind(vector.to_bytes())
        .bind(&now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(cached) => Ok(cached),
            Err(e) if is_foreign_key_violation(&e) => Err(Error::EmbeddingModelNotFound(model.id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically bump `hit_count` and refresh `last_used`
    pub async fn increment_hit_count(&self, id: &str) -> Result<()> {
        let now = now_timestamp();
        let result = sqlx::query(
            "UPDATE query_embeddings SET hit_count = hit_count + 1, last_used = ?1, updated_at = ?1 WHERE id = ?2",
        )
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::EmbeddingNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Return the cached embedding of a query, embedding and caching it on a miss.
    /// The flag reports whether the cache was hit.
    pub async fn get_or_embed(
        &self,
        query_text: &str,
        model: &EmbeddingModel,
        provider: &dyn EmbeddingProvider,
        max_entries: Option<usize>,
    ) -> Result<(QueryEmbedding, bool)> {
        if let Some(cached) = self.lookup_query_embedding(query_text, &model.id).await? {
            debug!("Query cache hit ({} hits)", cached.hit_count);
            return Ok((cached, true));
        }

        let mut outputs = provider.embed(&[query_text.to_string()], model).await?;
        let output = outputs
            .pop()
            .ok_or_else(|| Error::Embedding("provider returned no embedding".to_string()))?;

        let cached = self.cache_query_embedding(query_text, model, &output.vector).await?;
        debug!("Query cache miss, cached {}", cached.id);

        if let Some(max_entries) = max_entries {
            self.prune_query_cache(max_entries).await?;
        }

        Ok((cached, false))
    }

    /// Keep only the `max_entries` most recently used rows. Returns rows evicted.
    pub async fn prune_query_cache(&self, max_entries: usize) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM query_embeddings WHERE id NOT IN (
                SELECT id FROM query_embeddings ORDER BY last_used DESC, id LIMIT ?
            )
            "#,
        )
        .bind(i64::try_from(max_entries).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await?;

        let evicted = result.rows_affected();
        if evicted > 0 {
            info!("Evicted {} query cache entries", evicted);
        }
        Ok(evicted)
    }

    /// Number of cached queries and their summed hits
    pub async fn query_cache_stats(&self) -> Result<QueryCacheStats> {
        let (entries, total_hits): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(hit_count), 0) FROM query_embeddings")
                .fetch_one(&self.pool)
                .await?;
        Ok(QueryCacheStats { entries, total_hits })
    }
}
