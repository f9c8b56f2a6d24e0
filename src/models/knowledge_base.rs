//! Knowledge base aggregate

use crate::config::{validate_chunking, KnowledgeBaseDefaults};
use crate::error::{Error, Result};
use crate::lifecycle::{
    new_id, now_timestamp, Metadata, ProcessingStatus, Shared, SoftDeleteFields, StatusFields,
    StatusTrackable, Timestamps,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;
use std::str::FromStr;

/// Vector store backend a knowledge base is indexed into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum VectorStoreType {
    Pgvector,
    Qdrant,
}

impl std::fmt::Display for VectorStoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorStoreType::Pgvector => write!(f, "pgvector"),
            VectorStoreType::Qdrant => write!(f, "qdrant"),
        }
    }
}

impl FromStr for VectorStoreType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pgvector" => Ok(VectorStoreType::Pgvector),
            "qdrant" => Ok(VectorStoreType::Qdrant),
            _ => Err(Error::Validation(format!("Unknown vector store type: {}", s))),
        }
    }
}

/// A named collection of documents with shared processing configuration
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub embedding_model: String,
    pub embedding_dimension: i64,
    pub chunk_size: i64,
    pub chunk_overlap: i64,
    pub vector_store_type: VectorStoreType,
    pub is_public: bool,
    pub document_count: i64,
    pub chunk_count: i64,
    pub total_tokens: i64,
    pub avg_chunk_quality: f64,
    pub last_indexed_at: Option<String>,
    pub metadata_json: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub status: StatusFields,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub deletion: SoftDeleteFields,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl KnowledgeBase {
    pub fn metadata(&self) -> Metadata {
        Metadata::from_json(&self.metadata_json)
    }

    /// Settings handed to an embedding provider for this knowledge base
    pub fn embedding_config(&self) -> Value {
        json!({
            "model": self.embedding_model,
            "dimension": self.embedding_dimension,
        })
    }

    /// Settings for the vector store collection backing this knowledge base
    pub fn vector_store_config(&self) -> Value {
        json!({
            "type": self.vector_store_type.to_string(),
            "collection_name": format!("kb_{}", self.id),
            "dimension": self.embedding_dimension,
        })
    }
}

impl StatusTrackable for KnowledgeBase {
    const TABLE: &'static str = "knowledge_bases";
    const ENTITY: &'static str = "knowledge base";

    fn id(&self) -> &str {
        &self.id
    }

    fn status_fields(&self) -> &StatusFields {
        &self.status
    }

    fn not_found(id: &str) -> Error {
        Error::KnowledgeBaseNotFound(id.to_string())
    }
}

impl Shared for KnowledgeBase {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn is_public(&self) -> bool {
        self.is_public
    }
}

/// Parameters for creating a knowledge base
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewKnowledgeBase {
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub embedding_model: String,
    pub embedding_dimension: i64,
    pub chunk_size: i64,
    pub chunk_overlap: i64,
    pub vector_store_type: VectorStoreType,
    pub is_public: bool,
    pub metadata: Metadata,
}

impl NewKnowledgeBase {
    /// Start from configured defaults
    pub fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        defaults: &KnowledgeBaseDefaults,
    ) -> Result<Self> {
        Ok(Self {
            owner_id: owner_id.into(),
            name: name.into(),
            description: String::new(),
            embedding_model: defaults.embedding_model.clone(),
            embedding_dimension: defaults.embedding_dimension,
            chunk_size: defaults.chunk_size,
            chunk_overlap: defaults.chunk_overlap,
            vector_store_type: defaults.vector_store_type.parse()?,
            is_public: false,
            metadata: Metadata::new(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("name must not be empty".to_string()));
        }
        if self.name.chars().count() > 200 {
            return Err(Error::Validation(
                "name must be at most 200 characters".to_string(),
            ));
        }
        if self.owner_id.trim().is_empty() {
            return Err(Error::Validation("owner_id must not be empty".to_string()));
        }
        if self.embedding_dimension <= 0 {
            return Err(Error::Validation(
                "embedding_dimension must be positive".to_string(),
            ));
        }
        validate_chunking(self.chunk_size, self.chunk_overlap)
    }

    pub(crate) fn into_record(self) -> Result<KnowledgeBase> {
        self.validate()?;
        Ok(KnowledgeBase {
            id: new_id(),
            owner_id: self.owner_id,
            name: self.name,
            description: self.description,
            embedding_model: self.embedding_model,
            embedding_dimension: self.embedding_dimension,
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            vector_store_type: self.vector_store_type,
            is_public: self.is_public,
            document_count: 0,
            chunk_count: 0,
            total_tokens: 0,
            avg_chunk_quality: 0.0,
            last_indexed_at: None,
            metadata_json: self.metadata.to_json()?,
            status: StatusFields {
                status: ProcessingStatus::Pending,
                ..StatusFields::default()
            },
            deletion: SoftDeleteFields::default(),
            timestamps: Timestamps::now(),
        })
    }
}

/// A snapshot of a knowledge base at a point in time
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct KnowledgeBaseVersion {
    pub id: String,
    pub knowledge_base_id: String,
    pub version: i64,
    pub is_active: bool,
    pub name: String,
    pub description: String,
    pub changes: String,
    pub document_count_snapshot: i64,
    pub chunk_count_snapshot: i64,
    pub created_by: Option<String>,
    pub metadata_json: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

/// Color given to tags created without one
pub const DEFAULT_TAG_COLOR: &str = "#007bff";

/// A uniquely named label attachable to many knowledge bases
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct KnowledgeBaseTag {
    pub id: String,
    pub name: String,
    /// `#rrggbb`
    pub color: String,
    pub created_at: String,
}

impl KnowledgeBaseTag {
    pub fn new(name: impl Into<String>, color: Option<&str>) -> Result<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() || name.chars().count() > 50 {
            return Err(Error::Validation(format!(
                "tag name must be 1-50 characters, got {:?}",
                name
            )));
        }
        let color = color.unwrap_or(DEFAULT_TAG_COLOR).to_lowercase();
        if !is_hex_color(&color) {
            return Err(Error::Validation(format!(
                "tag color must look like #rrggbb, got {}",
                color
            )));
        }
        Ok(Self {
            id: new_id(),
            name,
            color,
            created_at: now_timestamp(),
        })
    }
}

fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Kind of interaction recorded in the access log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AccessType {
    View,
    Search,
    Query,
    Edit,
    Delete,
}

impl std::fmt::Display for AccessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccessType::View => "view",
            AccessType::Search => "search",
            AccessType::Query => "query",
            AccessType::Edit => "edit",
            AccessType::Delete => "delete",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for AccessType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "view" => Ok(AccessType::View),
            "search" => Ok(AccessType::Search),
            "query" => Ok(AccessType::Query),
            "edit" => Ok(AccessType::Edit),
            "delete" => Ok(AccessType::Delete),
            _ => Err(Error::Validation(format!("Unknown access type: {}", s))),
        }
    }
}

/// One access log entry. Users are opaque ids.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct KnowledgeBaseAccess {
    pub id: String,
    pub knowledge_base_id: String,
    pub user_id: String,
    pub access_type: AccessType,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub created_at: String,
}

/// Rolled-up counters of a knowledge base
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseStats {
    pub document_count: i64,
    pub chunk_count: i64,
    pub total_tokens: i64,
    pub avg_chunk_quality: f64,
}

impl From<&KnowledgeBase> for KnowledgeBaseStats {
    fn from(kb: &KnowledgeBase) -> Self {
        Self {
            document_count: kb.document_count,
            chunk_count: kb.chunk_count,
            total_tokens: kb.total_tokens,
            avg_chunk_quality: kb.avg_chunk_quality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_kb() -> NewKnowledgeBase {
        NewKnowledgeBase::new("alice", "Docs", &KnowledgeBaseDefaults::default()).unwrap()
    }

    #[test]
    fn test_new_knowledge_base_defaults() {
        let kb = new_kb().into_record().unwrap();
        assert_eq!(kb.chunk_size, 1000);
        assert_eq!(kb.chunk_overlap, 200);
        assert_eq!(kb.vector_store_type, VectorStoreType::Pgvector);
        assert_eq!(kb.document_count, 0);
        assert_eq!(kb.status.status, ProcessingStatus::Pending);
        assert!(!kb.deletion.is_deleted);
    }

    #[test]
    fn test_validation_rejects_bad_chunking() {
        let mut kb = new_kb();
        kb.chunk_size = 99;
        assert!(kb.validate().is_err());

        let mut kb = new_kb();
        kb.chunk_overlap = 600;
        assert!(kb.validate().is_err());

        let mut kb = new_kb();
        kb.name = "  ".to_string();
        assert!(kb.validate().is_err());
    }

    #[test]
    fn test_tag_validation() {
        let tag = KnowledgeBaseTag::new("  research ", None).unwrap();
        assert_eq!(tag.name, "research");
        assert_eq!(tag.color, DEFAULT_TAG_COLOR);
        assert_eq!(KnowledgeBaseTag::new("x", Some("#FFAA00")).unwrap().color, "#ffaa00");

        assert!(KnowledgeBaseTag::new("", None).is_err());
        assert!(KnowledgeBaseTag::new("n".repeat(51), None).is_err());
        assert!(KnowledgeBaseTag::new("x", Some("red")).is_err());
        assert!(KnowledgeBaseTag::new("x", Some("#12345g")).is_err());
    }

    #[test]
    fn test_access_type_parse() {
        assert_eq!("Search".parse::<AccessType>().unwrap(), AccessType::Search);
        assert_eq!(AccessType::Delete.to_string(), "delete");
        assert!("download".parse::<AccessType>().is_err());
    }

    #[test]
    fn test_vector_store_config() {
        let kb = new_kb().into_record().unwrap();
        let config = kb.vector_store_config();
        assert_eq!(config["collection_name"], format!("kb_{}", kb.id));
        assert_eq!(config["dimension"], 768);
        assert_eq!(kb.embedding_config()["model"], "nomic-embed-text");
    }
}
