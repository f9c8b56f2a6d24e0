//! Document commands: add, list, delete, restore, chunk listing

use crate::chunk::{chunk_text, ChunkSettings};
use crate::config::{default_preview_chars, Config};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::files::{FileStore, LocalFileStore};
use crate::models::{Document, DocumentChunk, KnowledgeBase};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Options for adding a document from a local file
#[derive(Debug, Clone, Default)]
pub struct AddDocumentOptions {
    /// Title (defaults to the file name)
    pub title: Option<String>,
    /// User recorded as the uploader
    pub uploaded_by: Option<String>,
}

/// Result of adding a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddedDocument {
    pub document: Document,
    pub chunks_created: usize,
}

/// One chunk line in a chunk listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub chunk_index: i64,
    pub start_char: i64,
    pub end_char: i64,
    pub token_count: i64,
    pub is_embedded: bool,
    pub preview: String,
}

/// Re-split a document's content with its knowledge base's chunk settings,
/// replacing any existing chunks. Returns the number of chunks written.
pub async fn chunk_document(db: &Database, kb: &KnowledgeBase, doc: &Document) -> Result<usize> {
    let settings = ChunkSettings::for_knowledge_base(kb)?;
    let pieces = chunk_text(&doc.content, &settings);
    let chunks = db.replace_chunks(&doc.id, &pieces).await?;
    Ok(chunks.len())
}

/// Store a file, create its document and chunk the text content.
/// Binary files are stored with empty content and no chunks.
pub async fn cmd_add_document(
    config: &Config,
    db: &Database,
    knowledge_base_id: &str,
    path: &Path,
    options: AddDocumentOptions,
) -> Result<AddedDocument> {
    let kb = db.get_knowledge_base(knowledge_base_id, false).await?;

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Validation(format!("invalid file path: {}", path.display())))?
        .to_string();
    let bytes = tokio::fs::read(path).await?;

    let content = match std::str::from_utf8(&bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            warn!("{} is not UTF-8 text, storing without content", filename);
            String::new()
        }
    };

    let title = options.title.unwrap_or_else(|| filename.clone());
    let mut doc = Document::new(&kb.id, title, content);
    doc.uploaded_by = options.uploaded_by;
    let doc = db.create_document(doc).await?;

    let store = LocalFileStore::new(&config.paths.files_dir);
    let mut doc = match store.put(&kb.id, &doc.id, &filename, &bytes).await {
        Ok(stored) => {
            let mut doc = doc;
            doc.attach_file(&stored);
            db.save_document(&doc).await?
        }
        Err(e) => {
            db.hard_delete_document(&doc.id).await?;
            return Err(e);
        }
    };

    let chunks_created = if doc.content.trim().is_empty() {
        0
    } else {
        chunk_or_mark_failed(db, &kb, &doc).await?
    };
    doc.chunk_count = chunks_created as i64;

    info!("Added document {} ({} chunks)", doc.id, chunks_created);
    Ok(AddedDocument {
        document: doc,
        chunks_created,
    })
}

/// Chunk a freshly stored document. On failure the document and its file
/// stay in place and the document is marked failed with the error.
async fn chunk_or_mark_failed(db: &Database, kb: &KnowledgeBase, doc: &Document) -> Result<usize> {
    match chunk_document(db, kb, doc).await {
        Ok(count) => Ok(count),
        Err(e) => {
            warn!("Chunking document {} failed: {}", doc.id, e);
            let message = format!("chunking failed: {}", e);
            if let Err(mark_err) = db.mark_failed::<Document>(&doc.id, &message).await {
                warn!("Could not mark document {} failed: {}", doc.id, mark_err);
            }
            Err(e)
        }
    }
}

/// List documents of a knowledge base
pub async fn cmd_list_documents(
    db: &Database,
    knowledge_base_id: &str,
    include_deleted: bool,
) -> Result<Vec<Document>> {
    db.get_knowledge_base(knowledge_base_id, include_deleted).await?;
    db.list_documents(knowledge_base_id, include_deleted).await
}

/// Soft delete a document, or remove it and its stored file for good
pub async fn cmd_delete_document(config: &Config, db: &Database, id: &str, hard: bool) -> Result<()> {
    if !hard {
        return db.soft_delete_document(id).await;
    }

    let doc = db.hard_delete_document(id).await?;
    if let Some(path) = &doc.file_path {
        LocalFileStore::new(&config.paths.files_dir).remove(path).await?;
    }
    Ok(())
}

/// Undo a soft delete
pub async fn cmd_restore_document(db: &Database, id: &str) -> Result<Document> {
    db.restore_document(id).await?;
    db.get_document(id, false).await
}

/// Chunks of a document with content previews
pub async fn cmd_list_chunks(
    db: &Database,
    document_id: &str,
    preview_chars: Option<usize>,
) -> Result<Vec<ChunkSummary>> {
    db.get_document(document_id, true).await?;
    let max = preview_chars.unwrap_or_else(default_preview_chars);

    Ok(db
        .list_chunks(document_id)
        .await?
        .iter()
        .map(|chunk| summarize(chunk, max))
        .collect())
}

fn summarize(chunk: &DocumentChunk, max: usize) -> ChunkSummary {
    ChunkSummary {
        chunk_index: chunk.chunk_index,
        start_char: chunk.start_char,
        end_char: chunk.end_char,
        token_count: chunk.token_count,
        is_embedded: chunk.is_embedded,
        preview: chunk.get_preview(max).replace('\n', " "),
    }
}

pub fn print_added_document(added: &AddedDocument) {
    let doc = &added.document;
    println!("✓ Added document '{}'", doc.title);
    println!("  ID: {}", doc.id);
    if let Some(path) = &doc.file_path {
        println!("  File: {} ({} bytes, {})", path, doc.file_size, doc.mime_type);
    }
    println!(
        "  Content: {} chars, {} words, ~{} tokens",
        doc.char_count, doc.word_count, doc.token_count
    );
    println!("  Chunks created: {}", added.chunks_created);
}

pub fn print_documents(docs: &[Document]) {
    println!("\n📄 Documents\n");

    if docs.is_empty() {
        println!("No documents. Use 'kbstore doc add' to add one.");
        return;
    }

    for doc in docs {
        let deleted = if doc.deletion.is_deleted { " (deleted)" } else { "" };
        println!("• {} [{}]{}", doc.title, doc.status.status, deleted);
        println!("  ID: {}", doc.id);
        println!(
            "  Chunks: {}, Tokens: ~{}, Language: {}",
            doc.chunk_count, doc.token_count, doc.language
        );
        if !doc.status.status_message.is_empty() {
            println!("  Message: {}", doc.status.status_message);
        }
        println!("  Created: {}", doc.timestamps.created_at);
        println!();
    }
}

pub fn print_chunks(chunks: &[ChunkSummary]) {
    if chunks.is_empty() {
        println!("No chunks.");
        return;
    }

    for chunk in chunks {
        let marker = if chunk.is_embedded { "✓" } else { " " };
        println!(
            "{} #{} [{}..{}] ~{} tokens",
            marker, chunk.chunk_index, chunk.start_char, chunk.end_char, chunk.token_count
        );
        println!("    {}", chunk.preview);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::init::cmd_init;
    use crate::config::KnowledgeBaseDefaults;
    use crate::lifecycle::StatusTrackable;
    use crate::models::NewKnowledgeBase;
    use tempfile::TempDir;

    async fn setup() -> (Config, Database, KnowledgeBase, TempDir) {
        let tmp = TempDir::new().unwrap();
        let result = cmd_init(Some(tmp.path().to_path_buf()), false).await.unwrap();
        let config = Config::load(Path::new(&result.config_path)).unwrap();
        let db = Database::connect(&config).await.unwrap();

        let mut new = NewKnowledgeBase::new("alice", "Notes", &KnowledgeBaseDefaults::default()).unwrap();
        new.chunk_size = 100;
        new.chunk_overlap = 20;
        let kb = db.create_knowledge_base(new).await.unwrap();
        (config, db, kb, tmp)
    }

    #[tokio::test]
    async fn test_add_document_stores_file_and_chunks() {
        let (config, db, kb, tmp) = setup().await;
        let file = tmp.path().join("guide.md");
        std::fs::write(&file, "Intro paragraph. ".repeat(30)).unwrap();

        let added = cmd_add_document(&config, &db, &kb.id, &file, AddDocumentOptions::default())
            .await
            .unwrap();
        assert_eq!(added.document.title, "guide.md");
        assert_eq!(added.document.file_type, "md");
        assert_eq!(added.document.file_size, 510);
        assert!(added.chunks_created > 1);

        let stored = config
            .paths
            .files_dir
            .join(added.document.file_path.as_deref().unwrap());
        assert!(stored.exists());

        let kb = db.get_knowledge_base(&kb.id, false).await.unwrap();
        assert_eq!(kb.document_count, 1);

        let chunks = cmd_list_chunks(&db, &added.document.id, Some(10)).await.unwrap();
        assert_eq!(chunks.len(), added.chunks_created);
        assert!(chunks[0].preview.ends_with("..."));
    }

    #[tokio::test]
    async fn test_binary_file_has_no_chunks() {
        let (config, db, kb, tmp) = setup().await;
        let file = tmp.path().join("logo.png");
        std::fs::write(&file, [0x89u8, 0x50, 0xff, 0xfe]).unwrap();

        let added = cmd_add_document(&config, &db, &kb.id, &file, AddDocumentOptions::default())
            .await
            .unwrap();
        assert_eq!(added.chunks_created, 0);
        assert_eq!(added.document.char_count, 0);
        assert!(added.document.is_image());
    }

    #[tokio::test]
    async fn test_chunking_failure_marks_document_failed() {
        let (_config, db, mut kb, _tmp) = setup().await;
        let doc = db
            .create_document(Document::new(&kb.id, "Broken", "some text to split"))
            .await
            .unwrap();
        kb.chunk_overlap = kb.chunk_size;

        let err = chunk_or_mark_failed(&db, &kb, &doc).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let doc = db.get_document(&doc.id, false).await.unwrap();
        assert!(doc.has_failed());
        assert!(doc.status.status_message.starts_with("chunking failed"));
        assert_eq!(db.get_knowledge_base(&kb.id, false).await.unwrap().document_count, 1);
    }

    #[tokio::test]
    async fn test_hard_delete_removes_stored_file() {
        let (config, db, kb, tmp) = setup().await;
        let file = tmp.path().join("a.txt");
        std::fs::write(&file, "short text").unwrap();
        let added = cmd_add_document(&config, &db, &kb.id, &file, AddDocumentOptions::default())
            .await
            .unwrap();
        let stored = config
            .paths
            .files_dir
            .join(added.document.file_path.as_deref().unwrap());

        cmd_delete_document(&config, &db, &added.document.id, true).await.unwrap();
        assert!(!stored.exists());
        assert_eq!(db.get_knowledge_base(&kb.id, false).await.unwrap().document_count, 0);
    }

    #[tokio::test]
    async fn test_soft_delete_and_restore() {
        let (config, db, kb, tmp) = setup().await;
        let file = tmp.path().join("b.txt");
        std::fs::write(&file, "more text").unwrap();
        let added = cmd_add_document(&config, &db, &kb.id, &file, AddDocumentOptions::default())
            .await
            .unwrap();

        cmd_delete_document(&config, &db, &added.document.id, false).await.unwrap();
        assert!(cmd_list_documents(&db, &kb.id, false).await.unwrap().is_empty());
        assert_eq!(cmd_list_documents(&db, &kb.id, true).await.unwrap().len(), 1);

        let restored = cmd_restore_document(&db, &added.document.id).await.unwrap();
        assert!(!restored.deletion.is_deleted);
    }
}
