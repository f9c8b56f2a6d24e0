//! End-to-end store scenarios through the public API

use async_trait::async_trait;
use futures::future::join_all;
use kbstore::chunk::{chunk_text, ChunkSettings};
use kbstore::config::{Config, KnowledgeBaseDefaults};
use kbstore::db::Database;
use kbstore::embed::{EmbeddingOutput, EmbeddingProvider};
use kbstore::error::{Error, Result};
use kbstore::lifecycle::StatusTrackable;
use kbstore::models::document::estimate_tokens;
use kbstore::models::{
    Document, DocumentChunk, EmbeddingModel, EmbeddingVector, JobType, KnowledgeBase,
    NewDocumentEmbedding, NewEmbeddingModel, NewKnowledgeBase, Provider,
};
use kbstore::runner::run_document_embedding;
use serde_json::json;
use tempfile::TempDir;

async fn open_store() -> (Database, TempDir) {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.paths.db_file = tmp.path().join("workflow.db");
    config.database.max_connections = 8;

    let db = Database::connect(&config).await.unwrap();
    db.init_schema().await.unwrap();
    (db, tmp)
}

async fn knowledge_base(db: &Database, name: &str) -> KnowledgeBase {
    let new = NewKnowledgeBase::new("alice", name, &KnowledgeBaseDefaults::default()).unwrap();
    db.create_knowledge_base(new).await.unwrap()
}

async fn add_chunks(db: &Database, doc: &Document, count: i64) {
    for i in 0..count {
        let text = format!("chunk number {} of {}", i, doc.title);
        let len = text.chars().count() as i64;
        db.insert_chunk(DocumentChunk::new(&doc.id, i, text, i * 100, i * 100 + len))
            .await
            .unwrap();
    }
}

struct ConstantProvider;

#[async_trait]
impl EmbeddingProvider for ConstantProvider {
    async fn embed(&self, texts: &[String], model: &EmbeddingModel) -> Result<Vec<EmbeddingOutput>> {
        Ok(texts
            .iter()
            .map(|_| EmbeddingOutput {
                vector: EmbeddingVector(vec![0.25; model.dimension as usize]),
                token_count: 4,
            })
            .collect())
    }
}

#[tokio::test]
async fn concurrent_document_creation_counts_every_document() {
    let (db, _tmp) = open_store().await;
    let kb = knowledge_base(&db, "Busy").await;

    let creates = (0..50).map(|i| {
        let db = db.clone();
        let kb_id = kb.id.clone();
        async move {
            db.create_document(Document::new(kb_id, format!("Doc {}", i), "body"))
                .await
        }
    });
    let results = join_all(creates).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let kb = db.get_knowledge_base(&kb.id, false).await.unwrap();
    assert_eq!(kb.document_count, 50);
    assert_eq!(db.list_documents(&kb.id, false).await.unwrap().len(), 50);
}

#[tokio::test]
async fn concurrent_chunk_inserts_keep_chunk_count_exact() {
    let (db, _tmp) = open_store().await;
    let kb = knowledge_base(&db, "Chunks").await;
    let doc = db
        .create_document(Document::new(&kb.id, "Long", "text"))
        .await
        .unwrap();

    let inserts = (0..20i64).map(|i| {
        let db = db.clone();
        let doc_id = doc.id.clone();
        async move {
            db.insert_chunk(DocumentChunk::new(doc_id, i, format!("piece {}", i), i, i + 1))
                .await
        }
    });
    assert!(join_all(inserts).await.iter().all(|r| r.is_ok()));

    let doc = db.get_document(&doc.id, false).await.unwrap();
    assert_eq!(doc.chunk_count, 20);
}

async fn set_quality(db: &Database, doc: &Document, scores: &[f64]) -> i64 {
    let mut tokens = 0;
    for (chunk, score) in db.list_chunks(&doc.id).await.unwrap().iter().zip(scores) {
        let mut chunk = chunk.clone();
        chunk.quality_score = *score;
        let chunk = db.update_chunk(&chunk).await.unwrap();
        assert_eq!(chunk.token_count, estimate_tokens(chunk.content.chars().count() as i64));
        tokens += chunk.token_count;
    }
    tokens
}

fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-9, "{} != {}", actual, expected);
}

#[tokio::test]
async fn statistics_roll_up_live_documents() {
    let (db, _tmp) = open_store().await;
    let kb = knowledge_base(&db, "Stats").await;

    let first = db.create_document(Document::new(&kb.id, "A", "a")).await.unwrap();
    let second = db.create_document(Document::new(&kb.id, "B", "b")).await.unwrap();
    db.create_document(Document::new(&kb.id, "C", "c")).await.unwrap();
    add_chunks(&db, &first, 2).await;
    add_chunks(&db, &second, 3).await;
    let first_tokens = set_quality(&db, &first, &[0.25, 0.75]).await;
    let second_tokens = set_quality(&db, &second, &[0.5, 0.5, 1.0]).await;

    let stats = db.update_statistics(&kb.id).await.unwrap();
    assert_eq!(stats.document_count, 3);
    assert_eq!(stats.chunk_count, 5);
    assert_eq!(stats.total_tokens, first_tokens + second_tokens);
    assert_close(stats.avg_chunk_quality, 0.6);

    let again = db.update_statistics(&kb.id).await.unwrap();
    assert_eq!(again, stats);

    let stored = db.get_knowledge_base(&kb.id, false).await.unwrap();
    assert_eq!(stored.total_tokens, stats.total_tokens);
    assert_close(stored.avg_chunk_quality, 0.6);

    db.soft_delete_document(&second.id).await.unwrap();
    let stats = db.update_statistics(&kb.id).await.unwrap();
    assert_eq!(stats.document_count, 2);
    assert_eq!(stats.chunk_count, 2);
    assert_eq!(stats.total_tokens, first_tokens);
    assert_close(stats.avg_chunk_quality, 0.5);
}

#[tokio::test]
async fn duplicate_chunk_index_is_rejected() {
    let (db, _tmp) = open_store().await;
    let kb = knowledge_base(&db, "Dup").await;
    let doc = db.create_document(Document::new(&kb.id, "D", "d")).await.unwrap();
    add_chunks(&db, &doc, 1).await;

    let err = db
        .insert_chunk(DocumentChunk::new(&doc.id, 0, "again", 0, 5))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateChunk { chunk_index: 0, .. }));
    assert_eq!(db.get_document(&doc.id, false).await.unwrap().chunk_count, 1);
}

#[tokio::test]
async fn job_counters_never_pass_total_under_contention() {
    let (db, _tmp) = open_store().await;
    let model = db
        .register_embedding_model(NewEmbeddingModel::new("contended", Provider::Ollama, 4))
        .await
        .unwrap();
    let job = db
        .create_embedding_job(JobType::Reindex, &model.id, 10, &json!({}))
        .await
        .unwrap();

    let marks = (0..15).map(|i| {
        let db = db.clone();
        let job_id = job.id.clone();
        async move {
            if i % 3 == 0 {
                db.mark_item_failed(&job_id).await
            } else {
                db.mark_item_processed(&job_id).await
            }
        }
    });
    let results = join_all(marks).await;

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let overflowed = results
        .iter()
        .filter(|r| matches!(r, Err(Error::JobOverflow(_))))
        .count();
    assert_eq!(accepted, 10);
    assert_eq!(overflowed, 5);

    let job = db.get_embedding_job(&job.id).await.unwrap();
    assert_eq!(job.processed_items + job.failed_items, 10);
    assert_eq!(job.remaining_items(), 0);
}

#[tokio::test]
async fn hard_delete_cascades_and_releases_model() {
    let (db, _tmp) = open_store().await;
    let kb = knowledge_base(&db, "Cascade").await;
    let doc = db.create_document(Document::new(&kb.id, "D", "d")).await.unwrap();
    add_chunks(&db, &doc, 2).await;

    let model = db
        .register_embedding_model(NewEmbeddingModel::new("held", Provider::Openai, 2))
        .await
        .unwrap();
    db.store_document_embedding(NewDocumentEmbedding {
        document_id: doc.id.clone(),
        chunk_index: 0,
        embedding_model_id: model.id.clone(),
        text_content: "chunk".to_string(),
        embedding_vector: EmbeddingVector(vec![1.0, 0.0]),
        processing_time: None,
        token_count: Some(1),
    })
    .await
    .unwrap();

    let err = db.delete_embedding_model(&model.id).await.unwrap_err();
    assert!(matches!(err, Error::InUse(_)));

    db.hard_delete_knowledge_base(&kb.id).await.unwrap();
    assert!(matches!(
        db.get_document(&doc.id, true).await.unwrap_err(),
        Error::DocumentNotFound(_)
    ));
    assert!(db.list_chunks(&doc.id).await.unwrap().is_empty());
    assert!(db.list_document_embeddings(&doc.id, None).await.unwrap().is_empty());

    db.delete_embedding_model(&model.id).await.unwrap();
}

#[tokio::test]
async fn chunk_then_embed_document() {
    let (db, _tmp) = open_store().await;
    let mut new = NewKnowledgeBase::new("alice", "Pipeline", &KnowledgeBaseDefaults::default()).unwrap();
    new.chunk_size = 200;
    new.chunk_overlap = 40;
    let kb = db.create_knowledge_base(new).await.unwrap();

    let content = "Retrieval augmented generation pairs search with a language model. ".repeat(12);
    let doc = db
        .create_document(Document::new(&kb.id, "RAG", content.as_str()))
        .await
        .unwrap();

    let settings = ChunkSettings::for_knowledge_base(&kb).unwrap();
    let pieces = chunk_text(&doc.content, &settings);
    let chunks = db.replace_chunks(&doc.id, &pieces).await.unwrap();
    assert!(chunks.len() > 1);

    let model = db
        .register_embedding_model(NewEmbeddingModel::new("const", Provider::Huggingface, 6))
        .await
        .unwrap();
    let job = run_document_embedding(&db, &ConstantProvider, &doc.id, &model, 3, None)
        .await
        .unwrap();

    assert!(job.is_completed());
    assert_eq!(job.total_items, chunks.len() as i64);
    assert_eq!(job.processed_items, chunks.len() as i64);
    assert!(db.get_document(&doc.id, false).await.unwrap().is_completed());
    assert!(db
        .get_knowledge_base(&kb.id, false)
        .await
        .unwrap()
        .last_indexed_at
        .is_some());

    let window = db.get_context_window(&chunks[1], 1).await.unwrap();
    assert_eq!(window.len(), 3.min(chunks.len()));
    assert!(window.iter().all(|c| c.is_embedded && c.embedding_model == "const"));
}
