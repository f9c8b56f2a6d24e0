//! Persistent storage using SQLite
//!
//! This module owns every query against the kbstore database:
//! - Knowledge bases (aggregate counters, sharing, version snapshots)
//! - Tags and the access log of knowledge bases
//! - Documents (creation and deletion keep the knowledge base counter in step)
//! - Chunks (unique per document and index)
//! - Embedding models, document embeddings and the query cache
//! - Embedding jobs and per-document processing tasks
//!
//! Shared counters are only ever changed by single `UPDATE ... SET x = x + 1`
//! statements. Multi-statement operations run in one transaction whose first
//! statement is a write, so SQLite takes the write lock up front.

mod access_log;
mod chunks;
mod documents;
mod embeddings;
mod jobs;
mod knowledge_bases;
mod query_cache;
mod schema;
mod status;
mod tags;

pub use query_cache::QueryCacheStats;
pub use schema::*;

use crate::config::{Config, DatabaseConfig};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use tracing::{debug, info};

/// Database handle
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to the database named in the config
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file, &config.database).await
    }

    /// Connect to a database file with explicit connection settings
    pub async fn open(db_path: &Path, settings: &DatabaseConfig) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(settings.busy_timeout());

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Open a database file, creating the schema when missing
    pub async fn new(db_path: &Path) -> Result<Self> {
        let db = Self::open(db_path, &DatabaseConfig::default()).await?;

        if !db.is_initialized().await? {
            db.init_schema().await?;
        }

        Ok(db)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='knowledge_bases'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ===== Statistics =====

    /// Row counts across the whole database
    pub async fn global_stats(&self) -> Result<GlobalStats> {
        let (knowledge_base_count, document_count, chunk_count, embedding_count, model_count, active_job_count): (
            i64,
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM knowledge_bases WHERE is_deleted = 0),
                (SELECT COUNT(*) FROM documents WHERE is_deleted = 0),
                (SELECT COUNT(*) FROM document_chunks),
                (SELECT COUNT(*) FROM document_embeddings),
                (SELECT COUNT(*) FROM embedding_models),
                (SELECT COUNT(*) FROM embedding_jobs WHERE status IN ('pending', 'processing'))
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(GlobalStats {
            knowledge_base_count,
            document_count,
            chunk_count,
            embedding_count,
            model_count,
            active_job_count,
        })
    }
}

/// Global statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStats {
    pub knowledge_base_count: i64,
    pub document_count: i64,
    pub chunk_count: i64,
    pub embedding_count: i64,
    pub model_count: i64,
    pub active_job_count: i64,
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_schema_init_is_idempotent() {
        let (db, _tmp) = setup_test_db().await;
        assert!(db.is_initialized().await.unwrap());
        db.init_schema().await.unwrap();
        assert!(db.is_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn test_new_creates_schema() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db = Database::new(&tmp.path().join("nested").join("kb.db")).await.unwrap();
        assert!(db.is_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn test_global_stats() {
        let (db, _tmp) = setup_test_db().await;
        let kb = create_kb(&db).await;
        create_doc(&db, &kb, "One").await;
        create_doc(&db, &kb, "Two").await;

        let stats = db.global_stats().await.unwrap();
        assert_eq!(stats.knowledge_base_count, 1);
        assert_eq!(stats.document_count, 2);
        assert_eq!(stats.chunk_count, 0);
        assert_eq!(stats.active_job_count, 0);
    }
}
