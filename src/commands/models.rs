//! Embedding model registry commands

use crate::db::Database;
use crate::error::Result;
use crate::models::{EmbeddingModel, NewEmbeddingModel, Provider};

/// Options for registering an embedding model
#[derive(Debug, Clone)]
pub struct RegisterModelOptions {
    pub name: String,
    pub provider: Provider,
    pub dimension: i64,
    /// Provider-side model identifier (defaults to the name)
    pub model_id: Option<String>,
    pub max_tokens: Option<i64>,
    pub description: Option<String>,
}

pub async fn cmd_register_model(db: &Database, options: RegisterModelOptions) -> Result<EmbeddingModel> {
    let mut new = NewEmbeddingModel::new(options.name, options.provider, options.dimension);
    if let Some(model_id) = options.model_id {
        new.model_id = model_id;
    }
    if let Some(max_tokens) = options.max_tokens {
        new.max_tokens = max_tokens;
    }
    if let Some(description) = options.description {
        new.description = description;
    }
    db.register_embedding_model(new).await
}

pub async fn cmd_list_models(db: &Database, active_only: bool) -> Result<Vec<EmbeddingModel>> {
    db.list_embedding_models(active_only).await
}

/// Look a model up by name, falling back to its ID
pub async fn resolve_model(db: &Database, name_or_id: &str) -> Result<EmbeddingModel> {
    match db.get_embedding_model_by_name(name_or_id).await {
        Ok(model) => Ok(model),
        Err(_) => db.get_embedding_model(name_or_id).await,
    }
}

pub async fn cmd_set_model_active(db: &Database, name_or_id: &str, is_active: bool) -> Result<EmbeddingModel> {
    let model = resolve_model(db, name_or_id).await?;
    db.set_embedding_model_active(&model.id, is_active).await?;
    db.get_embedding_model(&model.id).await
}

/// Delete a model that no embedding, cached query or job references
pub async fn cmd_delete_model(db: &Database, name_or_id: &str) -> Result<EmbeddingModel> {
    let model = resolve_model(db, name_or_id).await?;
    db.delete_embedding_model(&model.id).await?;
    Ok(model)
}

pub fn print_models(models: &[EmbeddingModel]) {
    println!("\n🧠 Embedding Models\n");

    if models.is_empty() {
        println!("No models registered. Use 'kbstore model register' to add one.");
        return;
    }

    for model in models {
        let active = if model.is_active { "active" } else { "inactive" };
        println!("• {} [{}, {}]", model.name, model.provider, active);
        println!("  ID: {}", model.id);
        println!("  Model: {} ({} dims, {} max tokens)", model.model_id, model.dimension, model.max_tokens);
        println!(
            "  Usage: {} batches, avg {:.1} ms/item",
            model.usage_count, model.avg_processing_time
        );
        println!();
    }
}
