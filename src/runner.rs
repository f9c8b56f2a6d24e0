//! Reference embedding task runner
//!
//! Embeds a document's unembedded chunks in batches through an
//! [`EmbeddingProvider`], recording each item on an [`EmbeddingJob`].
//! Provider failures mark the batch's items failed and move on; nothing is
//! retried here.

use crate::config::Config;
use crate::db::Database;
use crate::embed::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::lifecycle::ProcessingStatus;
use crate::models::{
    Document, DocumentChunk, EmbeddingJob, EmbeddingModel, EmbeddingVector, JobType,
    NewDocumentEmbedding,
};
use crate::progress::progress_bar;
use indicatif::ProgressBar;
use serde_json::json;
use std::time::Instant;
use tracing::{info, warn};

/// Embed every unembedded chunk of a document with `model`.
///
/// The job completes unless every item failed, in which case it is marked
/// failed. A document still `pending` is moved through `processing` to the
/// matching terminal state.
pub async fn run_document_embedding(
    db: &Database,
    provider: &dyn EmbeddingProvider,
    document_id: &str,
    model: &EmbeddingModel,
    batch_size: usize,
    progress: Option<&ProgressBar>,
) -> Result<EmbeddingJob> {
    if batch_size == 0 {
        return Err(Error::Validation("batch_size must be at least 1".to_string()));
    }

    let doc = db.get_document(document_id, false).await?;
    let chunks = db.list_unembedded_chunks(document_id).await?;

    let job = db
        .create_embedding_job(
            JobType::Document,
            &model.id,
            chunks.len() as i64,
            &json!({
                "document_id": document_id,
                "knowledge_base_id": doc.knowledge_base_id,
                "batch_size": batch_size,
            }),
        )
        .await?;
    db.mark_processing::<EmbeddingJob>(&job.id, "embedding chunks").await?;

    let owns_document_status = doc.status.status == ProcessingStatus::Pending;
    if owns_document_status {
        db.mark_processing::<Document>(document_id, "generating embeddings")
            .await?;
    }

    if let Some(pb) = progress {
        pb.set_length(chunks.len() as u64);
        pb.set_message(doc.title.clone());
    }

    let outcome = embed_batches(db, provider, &job, model, &chunks, batch_size, progress).await;
    let (processed, failed) = match outcome {
        Ok(counts) => counts,
        Err(e) => {
            warn!("Embedding job {} aborted: {}", job.id, e);
            if let Err(mark_err) = db.mark_failed::<EmbeddingJob>(&job.id, &e.to_string()).await {
                warn!("Could not mark job {} failed: {}", job.id, mark_err);
            }
            if owns_document_status {
                if let Err(mark_err) = db.mark_failed::<Document>(document_id, &e.to_string()).await {
                    warn!("Could not mark document {} failed: {}", document_id, mark_err);
                }
            }
            if let Some(pb) = progress {
                pb.abandon();
            }
            return Err(e);
        }
    };

    let total = chunks.len() as i64;
    let job = if total > 0 && failed == total {
        let message = format!("all {} items failed", total);
        if owns_document_status {
            db.mark_failed::<Document>(document_id, &message).await?;
        }
        db.mark_failed::<EmbeddingJob>(&job.id, &message).await?
    } else {
        if owns_document_status {
            db.mark_completed::<Document>(document_id, "embedded").await?;
        }
        db.mark_indexed(&doc.knowledge_base_id).await?;
        db.complete_job(&job.id, &json!({ "embedded": processed, "failed": failed }))
            .await?
    };

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    info!(
        "Embedded document {}: {} processed, {} failed",
        document_id, processed, failed
    );
    Ok(job)
}

/// Embed a document with a registered model by name, using the configured batch size.
/// Draws a progress bar when `show_progress` is set.
pub async fn embed_document(
    db: &Database,
    config: &Config,
    provider: &dyn EmbeddingProvider,
    document_id: &str,
    model_name: &str,
    show_progress: bool,
) -> Result<EmbeddingJob> {
    let model = db.get_embedding_model_by_name(model_name).await?;
    if !model.is_active {
        return Err(Error::Validation(format!("embedding model {} is inactive", model.name)));
    }

    let pb = show_progress.then(|| progress_bar(0, "chunks"));
    run_document_embedding(db, provider, document_id, &model, config.embedding.batch_size, pb.as_ref()).await
}

async fn embed_batches(
    db: &Database,
    provider: &dyn EmbeddingProvider,
    job: &EmbeddingJob,
    model: &EmbeddingModel,
    chunks: &[DocumentChunk],
    batch_size: usize,
    progress: Option<&ProgressBar>,
) -> Result<(i64, i64)> {
    let mut processed = 0i64;
    let mut failed = 0i64;

    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let started = Instant::now();

        let outputs = match provider.embed(&texts, model).await {
            Ok(outputs) if outputs.len() == batch.len() => outputs,
            Ok(outputs) => {
                warn!(
                    "Provider returned {} embeddings for {} texts",
                    outputs.len(),
                    batch.len()
                );
                Vec::new()
            }
            Err(e) => {
                warn!("Embedding batch failed: {}", e);
                Vec::new()
            }
        };

        if outputs.is_empty() {
            for _ in batch {
                db.mark_item_failed(&job.id).await?;
                failed += 1;
            }
        } else {
            let per_item_ms = started.elapsed().as_secs_f64() * 1000.0 / batch.len() as f64;
            db.record_processing_time(&model.id, per_item_ms).await?;

            for (chunk, output) in batch.iter().zip(outputs) {
                match store(db, chunk, model, output.vector, output.token_count, per_item_ms).await {
                    Ok(()) => {
                        db.mark_item_processed(&job.id).await?;
                        processed += 1;
                    }
                    Err(e) => {
                        warn!("Chunk {} not stored: {}", chunk.chunk_index, e);
                        db.mark_item_failed(&job.id).await?;
                        failed += 1;
                    }
                }
            }
        }

        if let Some(pb) = progress {
            pb.inc(batch.len() as u64);
        }
    }

    Ok((processed, failed))
}

async fn store(
    db: &Database,
    chunk: &DocumentChunk,
    model: &EmbeddingModel,
    vector: EmbeddingVector,
    token_count: i64,
    processing_time_ms: f64,
) -> Result<()> {
    db.store_document_embedding(NewDocumentEmbedding {
        document_id: chunk.document_id.clone(),
        chunk_index: chunk.chunk_index,
        embedding_model_id: model.id.clone(),
        text_content: chunk.content.clone(),
        embedding_vector: vector,
        processing_time: Some(processing_time_ms),
        token_count: Some(token_count),
    })
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, KnowledgeBaseDefaults};
    use crate::embed::EmbeddingOutput;
    use crate::lifecycle::StatusTrackable;
    use crate::models::{NewEmbeddingModel, NewKnowledgeBase, Provider};
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Fails any batch containing the word "poison"; otherwise returns fixed vectors
    struct FakeProvider {
        dimension: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for FakeProvider {
        async fn embed(&self, texts: &[String], _model: &EmbeddingModel) -> Result<Vec<EmbeddingOutput>> {
            if texts.iter().any(|t| t.contains("poison")) {
                return Err(Error::Embedding("provider unavailable".to_string()));
            }
            Ok(texts
                .iter()
                .map(|t| EmbeddingOutput {
                    vector: EmbeddingVector(vec![0.5; self.dimension]),
                    token_count: t.split_whitespace().count() as i64,
                })
                .collect())
        }
    }

    async fn setup(contents: &[&str]) -> (Database, TempDir, Document, EmbeddingModel) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("test.db");
        let db = Database::connect(&config).await.unwrap();
        db.init_schema().await.unwrap();

        let kb = db
            .create_knowledge_base(
                NewKnowledgeBase::new("alice", "Runner", &KnowledgeBaseDefaults::default()).unwrap(),
            )
            .await
            .unwrap();
        let doc = db
            .create_document(Document::new(&kb.id, "Doc", contents.join(" ")))
            .await
            .unwrap();
        for (i, text) in contents.iter().enumerate() {
            db.insert_chunk(DocumentChunk::new(&doc.id, i as i64, *text, 0, text.len() as i64))
                .await
                .unwrap();
        }
        let model = db
            .register_embedding_model(NewEmbeddingModel::new("fake", Provider::Ollama, 3))
            .await
            .unwrap();
        (db, tmp, doc, model)
    }

    #[tokio::test]
    async fn test_all_chunks_embedded() {
        let (db, _tmp, doc, model) = setup(&["alpha beta", "gamma", "delta epsilon"]).await;
        let provider = FakeProvider { dimension: 3 };

        let job = run_document_embedding(&db, &provider, &doc.id, &model, 2, None)
            .await
            .unwrap();
        assert!(job.is_completed());
        assert_eq!(job.total_items, 3);
        assert_eq!(job.processed_items, 3);
        assert_eq!(job.progress_percentage(), 100.0);

        assert!(db.list_unembedded_chunks(&doc.id).await.unwrap().is_empty());
        assert_eq!(db.list_document_embeddings(&doc.id, None).await.unwrap().len(), 3);

        let doc = db.get_document(&doc.id, false).await.unwrap();
        assert!(doc.is_completed());

        let model = db.get_embedding_model(&model.id).await.unwrap();
        assert_eq!(model.usage_count, 2);
    }

    #[tokio::test]
    async fn test_failed_batch_counts_items_failed() {
        let (db, _tmp, doc, model) = setup(&["fine", "poison pill", "also fine"]).await;
        let provider = FakeProvider { dimension: 3 };

        let job = run_document_embedding(&db, &provider, &doc.id, &model, 1, None)
            .await
            .unwrap();
        assert!(job.is_completed());
        assert_eq!(job.processed_items, 2);
        assert_eq!(job.failed_items, 1);

        let pending = db.list_unembedded_chunks(&doc.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].chunk_index, 1);
    }

    #[tokio::test]
    async fn test_every_item_failing_fails_job_and_document() {
        let (db, _tmp, doc, model) = setup(&["poison", "poison again"]).await;
        let provider = FakeProvider { dimension: 3 };

        let job = run_document_embedding(&db, &provider, &doc.id, &model, 8, None)
            .await
            .unwrap();
        assert!(job.has_failed());
        assert_eq!(job.failed_items, 2);
        assert!(db.get_document(&doc.id, false).await.unwrap().has_failed());
    }

    #[tokio::test]
    async fn test_wrong_dimension_marks_items_failed() {
        let (db, _tmp, doc, model) = setup(&["one", "two"]).await;
        let provider = FakeProvider { dimension: 5 };

        let job = run_document_embedding(&db, &provider, &doc.id, &model, 2, None)
            .await
            .unwrap();
        assert!(job.has_failed());
        assert_eq!(job.failed_items, 2);
    }

    #[tokio::test]
    async fn test_embed_document_by_name_uses_config_batch_size() {
        let (db, _tmp, doc, model) = setup(&["a", "b", "c", "d", "e"]).await;
        let provider = FakeProvider { dimension: 3 };
        let mut config = Config::default();
        config.embedding.batch_size = 2;

        let job = embed_document(&db, &config, &provider, &doc.id, "fake", false)
            .await
            .unwrap();
        assert_eq!(job.processed_items, 5);
        assert_eq!(job.parameters()["batch_size"], 2);
        assert_eq!(db.get_embedding_model(&model.id).await.unwrap().usage_count, 3);

        db.set_embedding_model_active(&model.id, false).await.unwrap();
        let err = embed_document(&db, &config, &provider, &doc.id, "fake", false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    /// Cancels the job from inside the first batch so its counters are refused
    struct CancellingProvider {
        db: Database,
    }

    #[async_trait]
    impl EmbeddingProvider for CancellingProvider {
        async fn embed(&self, texts: &[String], _model: &EmbeddingModel) -> Result<Vec<EmbeddingOutput>> {
            for job in self.db.list_embedding_jobs(Some(ProcessingStatus::Processing)).await? {
                self.db.mark_cancelled::<EmbeddingJob>(&job.id, "user").await?;
            }
            Ok(texts
                .iter()
                .map(|_| EmbeddingOutput {
                    vector: EmbeddingVector(vec![0.5; 3]),
                    token_count: 1,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_aborted_run_fails_document() {
        let (db, _tmp, doc, model) = setup(&["one", "two"]).await;
        let provider = CancellingProvider { db: db.clone() };

        let err = run_document_embedding(&db, &provider, &doc.id, &model, 2, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));

        let doc = db.get_document(&doc.id, false).await.unwrap();
        assert!(doc.has_failed());
        assert!(!doc.is_processing());
    }

    #[tokio::test]
    async fn test_rerun_only_embeds_remaining() {
        let (db, _tmp, doc, model) = setup(&["first", "second"]).await;
        let provider = FakeProvider { dimension: 3 };

        run_document_embedding(&db, &provider, &doc.id, &model, 4, None)
            .await
            .unwrap();
        let again = run_document_embedding(&db, &provider, &doc.id, &model, 4, None)
            .await
            .unwrap();
        assert_eq!(again.total_items, 0);
        assert!(again.is_completed());
    }
}
