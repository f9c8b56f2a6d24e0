//! Documents and their content metrics

use crate::error::{Error, Result};
use crate::files::StoredFile;
use crate::lifecycle::{
    new_id, Metadata, SoftDeleteFields, StatusFields, StatusTrackable, Timestamps,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;

/// Character, word and estimated token counts of a piece of text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMetrics {
    pub char_count: i64,
    pub word_count: i64,
    pub token_count: i64,
}

impl ContentMetrics {
    /// Measure `text`. Tokens are estimated as one per four characters, at
    /// least one for any non-empty text. Empty text measures all zero.
    pub fn measure(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }
        let char_count = text.chars().count() as i64;
        Self {
            char_count,
            word_count: text.split_whitespace().count() as i64,
            token_count: estimate_tokens(char_count),
        }
    }
}

/// `max(1, char_count / 4)`
pub fn estimate_tokens(char_count: i64) -> i64 {
    std::cmp::max(1, char_count / 4)
}

/// Known uploaded file types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Docx,
    Txt,
    Md,
    Xlsx,
    Png,
    Jpg,
    Jpeg,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
            FileType::Txt => "txt",
            FileType::Md => "md",
            FileType::Xlsx => "xlsx",
            FileType::Png => "png",
            FileType::Jpg => "jpg",
            FileType::Jpeg => "jpeg",
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, FileType::Png | FileType::Jpg | FileType::Jpeg)
    }

    pub fn is_text_based(&self) -> bool {
        matches!(self, FileType::Txt | FileType::Md)
    }

    pub fn can_extract_text(&self) -> bool {
        !matches!(self, FileType::Xlsx)
    }
}

impl FromStr for FileType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pdf" => Ok(FileType::Pdf),
            "docx" => Ok(FileType::Docx),
            "txt" => Ok(FileType::Txt),
            "md" => Ok(FileType::Md),
            "xlsx" => Ok(FileType::Xlsx),
            "png" => Ok(FileType::Png),
            "jpg" => Ok(FileType::Jpg),
            "jpeg" => Ok(FileType::Jpeg),
            _ => Err(Error::Validation(format!("Unsupported file type: {}", s))),
        }
    }
}

/// Content language
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Fr,
    De,
    Nl,
    Auto,
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            Language::En => "en",
            Language::Fr => "fr",
            Language::De => "de",
            Language::Nl => "nl",
            Language::Auto => "auto",
        };
        write!(f, "{}", code)
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "en" => Ok(Language::En),
            "fr" => Ok(Language::Fr),
            "de" => Ok(Language::De),
            "nl" => Ok(Language::Nl),
            "auto" => Ok(Language::Auto),
            _ => Err(Error::Validation(format!("Unknown language: {}", s))),
        }
    }
}

/// A document belonging to one knowledge base
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub knowledge_base_id: String,
    pub title: String,
    pub content: String,
    pub file_path: Option<String>,
    /// Lowercase extension of the stored file, empty when there is no file
    pub file_type: String,
    pub file_size: i64,
    pub mime_type: String,
    pub char_count: i64,
    pub word_count: i64,
    pub token_count: i64,
    pub language: Language,
    pub quality_score: f64,
    pub chunk_count: i64,
    pub uploaded_by: Option<String>,
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

impl Document {
    pub fn new(
        knowledge_base_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut doc = Self {
            id: new_id(),
            knowledge_base_id: knowledge_base_id.into(),
            title: title.into(),
            content: content.into(),
            file_path: None,
            file_type: String::new(),
            file_size: 0,
            mime_type: String::new(),
            char_count: 0,
            word_count: 0,
            token_count: 0,
            language: Language::default(),
            quality_score: 0.0,
            chunk_count: 0,
            uploaded_by: None,
            metadata_json: "{}".to_string(),
            status: StatusFields::default(),
            deletion: SoftDeleteFields::default(),
            timestamps: Timestamps::now(),
        };
        doc.calculate_content_metrics();
        doc
    }

    /// Recompute char/word/token counts from `content`
    pub fn calculate_content_metrics(&mut self) {
        let metrics = ContentMetrics::measure(&self.content);
        self.char_count = metrics.char_count;
        self.word_count = metrics.word_count;
        self.token_count = metrics.token_count;
    }

    /// Record file information reported by the file store
    pub fn attach_file(&mut self, stored: &StoredFile) {
        self.file_path = Some(stored.path.clone());
        self.file_size = stored.size as i64;
        if let Some(ext) = Path::new(&stored.path).extension().and_then(|e| e.to_str()) {
            self.file_type = ext.to_lowercase();
        }
        self.mime_type = mime_guess::from_path(&stored.path)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_default();
    }

    /// Extension of the stored file including the dot, lowercased; empty without a file
    pub fn file_extension(&self) -> String {
        self.file_path
            .as_deref()
            .and_then(|p| Path::new(p).extension())
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default()
    }

    pub fn file_kind(&self) -> Option<FileType> {
        self.file_type.parse().ok()
    }

    pub fn is_image(&self) -> bool {
        self.file_kind().is_some_and(|t| t.is_image())
    }

    pub fn is_text_based(&self) -> bool {
        self.file_kind().is_some_and(|t| t.is_text_based())
    }

    pub fn can_extract_text(&self) -> bool {
        self.file_kind().is_some_and(|t| t.can_extract_text())
    }

    pub fn metadata(&self) -> Metadata {
        Metadata::from_json(&self.metadata_json)
    }

    pub fn set_metadata(&mut self, metadata: &Metadata) -> Result<()> {
        self.metadata_json = metadata.to_json()?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("title must not be empty".to_string()));
        }
        if self.title.chars().count() > 500 {
            return Err(Error::Validation(
                "title must be at most 500 characters".to_string(),
            ));
        }
        validate_score("quality_score", self.quality_score)
    }
}

impl StatusTrackable for Document {
    const TABLE: &'static str = "documents";
    const ENTITY: &'static str = "document";

    fn id(&self) -> &str {
        &self.id
    }

    fn status_fields(&self) -> &StatusFields {
        &self.status
    }

    fn not_found(id: &str) -> Error {
        Error::DocumentNotFound(id.to_string())
    }
}

/// Reject scores outside [0, 1]
pub fn validate_score(name: &str, score: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&score) {
        return Err(Error::Validation(format!(
            "{} must be between 0.0 and 1.0, got {}",
            name, score
        )));
    }
    Ok(())
}
