//! Status command implementation

use crate::config::Config;
use crate::db::{Database, GlobalStats, QueryCacheStats};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub files_dir: String,
    pub default_embedding_model: String,
    pub default_chunk_size: i64,
    pub default_chunk_overlap: i64,
    pub db_stats: GlobalStats,
    pub query_cache: QueryCacheStats,
    pub query_cache_limit: Option<usize>,
}

/// Get system status
pub async fn cmd_status(config: &Config, db: &Database) -> Result<StatusInfo> {
    info!("Getting status");

    let db_stats = db.global_stats().await?;
    let query_cache = db.query_cache_stats().await?;

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        files_dir: config.paths.files_dir.display().to_string(),
        default_embedding_model: config.knowledge_base.embedding_model.clone(),
        default_chunk_size: config.knowledge_base.chunk_size,
        default_chunk_overlap: config.knowledge_base.chunk_overlap,
        db_stats,
        query_cache,
        query_cache_limit: config.query_cache.max_entries,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 kbstore Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("Files: {}", status.files_dir);
    println!("\nDefaults:");
    println!("  Embedding Model: {}", status.default_embedding_model);
    println!(
        "  Chunking: {} chars, {} overlap",
        status.default_chunk_size, status.default_chunk_overlap
    );
    println!("\nDatabase Stats:");
    println!("  Knowledge Bases: {}", status.db_stats.knowledge_base_count);
    println!("  Documents: {}", status.db_stats.document_count);
    println!("  Chunks: {}", status.db_stats.chunk_count);
    println!("  Embeddings: {}", status.db_stats.embedding_count);
    println!("  Models: {}", status.db_stats.model_count);
    println!("  Active Jobs: {}", status.db_stats.active_job_count);
    println!("\nQuery Cache:");
    println!("  Entries: {}", status.query_cache.entries);
    println!("  Hits: {}", status.query_cache.total_hits);
    match status.query_cache_limit {
        Some(limit) => println!("  Limit: {}", limit),
        None => println!("  Limit: unbounded"),
    }
}
