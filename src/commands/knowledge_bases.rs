//! Knowledge base commands

use super::documents::chunk_document;
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::files::{FileStore, LocalFileStore};
use crate::lifecycle::Principal;
use crate::models::{
    AccessType, KnowledgeBase, KnowledgeBaseAccess, KnowledgeBaseStats, KnowledgeBaseTag,
    KnowledgeBaseVersion, NewKnowledgeBase,
};
use crate::progress::progress_bar;
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Options for creating a knowledge base; unset fields use config defaults
#[derive(Debug, Clone, Default)]
pub struct CreateKnowledgeBaseOptions {
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub embedding_model: Option<String>,
    pub embedding_dimension: Option<i64>,
    pub chunk_size: Option<i64>,
    pub chunk_overlap: Option<i64>,
    pub is_public: bool,
}

/// Field changes for an existing knowledge base
#[derive(Debug, Clone, Default)]
pub struct UpdateKnowledgeBaseOptions {
    pub name: Option<String>,
    pub description: Option<String>,
    pub chunk_size: Option<i64>,
    pub chunk_overlap: Option<i64>,
    pub is_public: Option<bool>,
}

/// A knowledge base with its shares, tags and version history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseDetails {
    pub knowledge_base: KnowledgeBase,
    pub shared_with: Vec<String>,
    pub tags: Vec<KnowledgeBaseTag>,
    pub versions: Vec<KnowledgeBaseVersion>,
}

/// Result of re-chunking every document of a knowledge base
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RechunkStats {
    pub documents_processed: usize,
    pub documents_failed: usize,
    pub chunks_created: usize,
    pub stats: Option<KnowledgeBaseStats>,
}

pub async fn cmd_create_knowledge_base(
    config: &Config,
    db: &Database,
    options: CreateKnowledgeBaseOptions,
) -> Result<KnowledgeBase> {
    let mut new = NewKnowledgeBase::new(options.owner_id, options.name, &config.knowledge_base)?;
    if let Some(description) = options.description {
        new.description = description;
    }
    if let Some(model) = options.embedding_model {
        new.embedding_model = model;
    }
    if let Some(dimension) = options.embedding_dimension {
        new.embedding_dimension = dimension;
    }
    if let Some(size) = options.chunk_size {
        new.chunk_size = size;
    }
    if let Some(overlap) = options.chunk_overlap {
        new.chunk_overlap = overlap;
    }
    new.is_public = options.is_public;

    db.create_knowledge_base(new).await
}

/// Apply field changes. Chunk setting changes take effect on the next rechunk.
pub async fn cmd_update_knowledge_base(
    db: &Database,
    id: &str,
    options: UpdateKnowledgeBaseOptions,
) -> Result<KnowledgeBase> {
    let mut kb = db.get_knowledge_base(id, false).await?;
    if let Some(name) = options.name {
        kb.name = name;
    }
    if let Some(description) = options.description {
        kb.description = description;
    }
    if let Some(size) = options.chunk_size {
        kb.chunk_size = size;
    }
    if let Some(overlap) = options.chunk_overlap {
        kb.chunk_overlap = overlap;
    }
    if let Some(is_public) = options.is_public {
        kb.is_public = is_public;
    }
    db.update_knowledge_base(&kb).await
}

/// List knowledge bases; with a user, only those the user may read
pub async fn cmd_list_knowledge_bases(
    db: &Database,
    user: Option<&str>,
    include_deleted: bool,
) -> Result<Vec<KnowledgeBase>> {
    match user {
        Some(user) => db.list_accessible_knowledge_bases(&Principal::user(user)).await,
        None => db.list_knowledge_bases(None, include_deleted).await,
    }
}

/// Load a knowledge base with its related rows. A known viewer is recorded
/// in the access log.
pub async fn cmd_show_knowledge_base(
    db: &Database,
    id: &str,
    viewer: Option<&str>,
) -> Result<KnowledgeBaseDetails> {
    let knowledge_base = db.get_knowledge_base(id, true).await?;
    let shared_with = db.list_shares(id).await?;
    let tags = db.list_knowledge_base_tags(id).await?;
    let versions = db.list_versions(id).await?;

    if let Some(user) = viewer {
        db.record_access(id, user, AccessType::View, None, "kbstore").await?;
    }

    Ok(KnowledgeBaseDetails {
        knowledge_base,
        shared_with,
        tags,
        versions,
    })
}

/// Attach a tag, creating it on first use; returns the knowledge base's tags
pub async fn cmd_tag_knowledge_base(
    db: &Database,
    id: &str,
    tag: &str,
    color: Option<&str>,
) -> Result<Vec<KnowledgeBaseTag>> {
    db.get_knowledge_base(id, false).await?;
    db.tag_knowledge_base(id, tag, color).await?;
    db.list_knowledge_base_tags(id).await
}

/// Detach a tag; returns whether it was attached
pub async fn cmd_untag_knowledge_base(db: &Database, id: &str, tag: &str) -> Result<bool> {
    db.untag_knowledge_base(id, tag).await
}

/// Tags of one knowledge base, or every tag
pub async fn cmd_list_tags(db: &Database, knowledge_base_id: Option<&str>) -> Result<Vec<KnowledgeBaseTag>> {
    match knowledge_base_id {
        Some(id) => {
            db.get_knowledge_base(id, true).await?;
            db.list_knowledge_base_tags(id).await
        }
        None => db.list_tags().await,
    }
}

/// Recent access log entries of a knowledge base
pub async fn cmd_list_access(db: &Database, id: &str, limit: i64) -> Result<Vec<KnowledgeBaseAccess>> {
    db.get_knowledge_base(id, true).await?;
    db.list_recent_access(id, limit).await
}

/// Recompute the rolled-up counters from the live rows
pub async fn cmd_refresh_statistics(db: &Database, id: &str) -> Result<KnowledgeBaseStats> {
    db.update_statistics(id).await
}

/// Soft delete, or hard delete together with the stored files of its documents
pub async fn cmd_delete_knowledge_base(config: &Config, db: &Database, id: &str, hard: bool) -> Result<()> {
    if !hard {
        return db.soft_delete_knowledge_base(id).await;
    }

    let docs = db.list_documents(id, true).await?;
    db.hard_delete_knowledge_base(id).await?;

    let store = LocalFileStore::new(&config.paths.files_dir);
    for doc in docs {
        if let Some(path) = &doc.file_path {
            if let Err(e) = store.remove(path).await {
                warn!("Could not remove stored file {}: {}", path, e);
            }
        }
    }
    Ok(())
}

pub async fn cmd_restore_knowledge_base(db: &Database, id: &str) -> Result<KnowledgeBase> {
    db.restore_knowledge_base(id).await?;
    db.get_knowledge_base(id, false).await
}

/// Grant a user read access
pub async fn cmd_share_knowledge_base(db: &Database, id: &str, user_id: &str) -> Result<Vec<String>> {
    db.share_knowledge_base(id, user_id).await?;
    db.list_shares(id).await
}

/// Revoke a user's read access; returns whether a share existed
pub async fn cmd_unshare_knowledge_base(db: &Database, id: &str, user_id: &str) -> Result<bool> {
    db.unshare_knowledge_base(id, user_id).await
}

pub async fn cmd_snapshot_knowledge_base(
    db: &Database,
    id: &str,
    changes: &str,
    created_by: Option<&str>,
) -> Result<KnowledgeBaseVersion> {
    db.snapshot_version(id, changes, created_by).await
}

/// Re-split every live document with the knowledge base's current chunk
/// settings, then refresh its statistics. Existing embeddings are dropped.
pub async fn cmd_rechunk_knowledge_base(db: &Database, id: &str, show_progress: bool) -> Result<RechunkStats> {
    let kb = db.get_knowledge_base(id, false).await?;
    let docs = db.list_documents(id, false).await?;

    let pb = show_progress.then(|| progress_bar(docs.len() as u64, "documents"));
    let mut stats = RechunkStats::default();

    for doc in &docs {
        if let Some(pb) = &pb {
            pb.set_message(doc.title.clone());
        }

        if doc.content.trim().is_empty() {
            stats.documents_processed += 1;
        } else {
            match chunk_document(db, &kb, doc).await {
                Ok(count) => {
                    stats.documents_processed += 1;
                    stats.chunks_created += count;
                }
                Err(e) => {
                    warn!("Failed to chunk document {}: {}", doc.id, e);
                    stats.documents_failed += 1;
                }
            }
        }

        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    stats.stats = Some(db.update_statistics(id).await?);
    info!(
        "Rechunked {} documents of {} into {} chunks",
        stats.documents_processed, id, stats.chunks_created
    );
    Ok(stats)
}

pub fn print_knowledge_bases(kbs: &[KnowledgeBase]) {
    println!("\n📚 Knowledge Bases\n");

    if kbs.is_empty() {
        println!("No knowledge bases. Use 'kbstore kb create' to add one.");
        return;
    }

    for kb in kbs {
        let visibility = if kb.is_public { "public" } else { "private" };
        let deleted = if kb.deletion.is_deleted { " (deleted)" } else { "" };
        println!("• {} [{}, {}]{}", kb.name, kb.status.status, visibility, deleted);
        println!("  ID: {}", kb.id);
        println!("  Owner: {}", kb.owner_id);
        println!(
            "  Documents: {}, Chunks: {}, Tokens: {}",
            kb.document_count, kb.chunk_count, kb.total_tokens
        );
        println!("  Created: {}", kb.timestamps.created_at);
        println!();
    }
}

pub fn print_knowledge_base_details(details: &KnowledgeBaseDetails) {
    let kb = &details.knowledge_base;
    println!("\n📚 {}\n", kb.name);
    println!("ID: {}", kb.id);
    println!("Owner: {}", kb.owner_id);
    if !kb.description.is_empty() {
        println!("Description: {}", kb.description);
    }
    println!("Status: {}", kb.status.status);
    if kb.deletion.is_deleted {
        println!(
            "Deleted: {}",
            kb.deletion.deleted_at.as_deref().unwrap_or("yes")
        );
    }
    println!("\nConfiguration:");
    println!("  Embedding: {} ({} dims)", kb.embedding_model, kb.embedding_dimension);
    println!("  Chunking: {} chars, {} overlap", kb.chunk_size, kb.chunk_overlap);
    println!("  Vector Store: {}", kb.vector_store_type);
    println!("\nStatistics:");
    print_stats(&KnowledgeBaseStats::from(kb));
    println!(
        "  Last Indexed: {}",
        kb.last_indexed_at.as_deref().unwrap_or("never")
    );

    println!("\nAccess:");
    println!("  Public: {}", if kb.is_public { "yes" } else { "no" });
    if details.shared_with.is_empty() {
        println!("  Shared with: nobody");
    } else {
        println!("  Shared with: {}", details.shared_with.join(", "));
    }

    if !details.tags.is_empty() {
        let names: Vec<&str> = details.tags.iter().map(|t| t.name.as_str()).collect();
        println!("  Tags: {}", names.join(", "));
    }

    if !details.versions.is_empty() {
        println!("\nVersions:");
        print_versions(&details.versions);
    }
}

pub fn print_stats(stats: &KnowledgeBaseStats) {
    println!("  Documents: {}", stats.document_count);
    println!("  Chunks: {}", stats.chunk_count);
    println!("  Tokens: {}", stats.total_tokens);
    println!("  Avg Chunk Quality: {:.2}", stats.avg_chunk_quality);
}

pub fn print_versions(versions: &[KnowledgeBaseVersion]) {
    for version in versions {
        let active = if version.is_active { " (active)" } else { "" };
        println!(
            "  v{}{} {} docs, {} chunks, {}",
            version.version,
            active,
            version.document_count_snapshot,
            version.chunk_count_snapshot,
            version.timestamps.created_at
        );
        if !version.changes.is_empty() {
            println!("    {}", version.changes);
        }
    }
}

pub fn print_tags(tags: &[KnowledgeBaseTag]) {
    if tags.is_empty() {
        println!("No tags.");
        return;
    }
    for tag in tags {
        println!("• {} ({})", tag.name, tag.color);
    }
}

pub fn print_access_log(entries: &[KnowledgeBaseAccess]) {
    if entries.is_empty() {
        println!("No recorded access.");
        return;
    }
    for entry in entries {
        let ip = entry.ip_address.as_deref().unwrap_or("-");
        println!(
            "{} {:<6} {} from {}",
            entry.created_at, entry.access_type, entry.user_id, ip
        );
    }
}

pub fn print_rechunk_stats(stats: &RechunkStats) {
    println!("\n✓ Rechunk complete");
    println!("  Documents processed: {}", stats.documents_processed);
    if stats.documents_failed > 0 {
        println!("  Documents failed: {}", stats.documents_failed);
    }
    println!("  Chunks created: {}", stats.chunks_created);
    if let Some(kb_stats) = &stats.stats {
        print_stats(kb_stats);
    }
}

/// Print knowledge base IDs with descriptions for shell completions
pub fn print_knowledge_base_completions(kbs: &[KnowledgeBase], shell: Shell) {
    for kb in kbs {
        let description = format!("{} ({} docs), owner {}", kb.name, kb.document_count, kb.owner_id)
            .replace('\n', " ");

        match shell {
            Shell::Zsh => println!("{}:{}", kb.id, description.replace(':', "\\:")),
            Shell::Fish => println!("{}\t{}", kb.id, description.replace('\t', " ")),
            _ => println!("{}", kb.id),
        }
    }
}
