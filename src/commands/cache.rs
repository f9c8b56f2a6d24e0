//! Query embedding cache commands

use crate::config::Config;
use crate::db::{Database, QueryCacheStats};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Result of a cache prune
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePruneStats {
    pub max_entries: usize,
    pub evicted: u64,
    pub remaining: QueryCacheStats,
}

pub async fn cmd_cache_stats(db: &Database) -> Result<QueryCacheStats> {
    db.query_cache_stats().await
}

/// Evict least recently used entries down to `max_entries`, or the configured bound
pub async fn cmd_cache_prune(
    config: &Config,
    db: &Database,
    max_entries: Option<usize>,
) -> Result<CachePruneStats> {
    let max_entries = max_entries.or(config.query_cache.max_entries).ok_or_else(|| {
        Error::Validation(
            "no cache bound: pass --max-entries or set query_cache.max_entries".to_string(),
        )
    })?;

    let evicted = db.prune_query_cache(max_entries).await?;
    let remaining = db.query_cache_stats().await?;
    Ok(CachePruneStats {
        max_entries,
        evicted,
        remaining,
    })
}

pub fn print_cache_stats(stats: &QueryCacheStats) {
    println!("\n🗂  Query Cache\n");
    println!("  Entries: {}", stats.entries);
    println!("  Total Hits: {}", stats.total_hits);
}

pub fn print_cache_prune_stats(stats: &CachePruneStats) {
    println!("✓ Query cache pruned to {} entries", stats.max_entries);
    println!("  Evicted: {}", stats.evicted);
    println!("  Remaining: {}", stats.remaining.entries);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmbeddingVector, NewEmbeddingModel, Provider};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_prune_uses_configured_bound() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("cache.db");
        let db = Database::new(&config.paths.db_file).await.unwrap();
        let model = db
            .register_embedding_model(NewEmbeddingModel::new("m", Provider::Ollama, 2))
            .await
            .unwrap();
        for query in ["a", "b", "c"] {
            db.cache_query_embedding(query, &model, &EmbeddingVector(vec![0.0, 1.0]))
                .await
                .unwrap();
        }

        assert!(cmd_cache_prune(&config, &db, None).await.is_err());

        config.query_cache.max_entries = Some(1);
        let stats = cmd_cache_prune(&config, &db, None).await.unwrap();
        assert_eq!(stats.evicted, 2);
        assert_eq!(stats.remaining.entries, 1);

        let stats = cmd_cache_prune(&config, &db, Some(5)).await.unwrap();
        assert_eq!(stats.evicted, 0);
    }
}
