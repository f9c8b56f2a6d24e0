//! Document file storage
//!
//! The core only needs a stored file's size and reference path; the
//! [`FileStore`] trait keeps the actual byte storage swappable.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where a document's bytes ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    /// Stable reference path, relative to the store root
    pub path: String,
    pub size: u64,
}

/// Byte storage for uploaded documents
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store `bytes` for a document and report the stored location
    async fn put(
        &self,
        knowledge_base_id: &str,
        document_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<StoredFile>;

    /// Read a previously stored file back
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Remove a stored file; missing files are ignored
    async fn remove(&self, path: &str) -> Result<()>;
}

/// Filesystem store laying files out as `documents/<kb>/<doc>/<filename>`
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(Error::Validation(format!("invalid stored path: {}", path)));
        }
        Ok(self.root.join(relative))
    }
}

/// Relative upload path for a document file
pub fn document_upload_path(knowledge_base_id: &str, document_id: &str, filename: &str) -> Result<String> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::Validation(format!("invalid filename: {}", filename)))?;
    Ok(format!("documents/{}/{}/{}", knowledge_base_id, document_id, name))
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn put(
        &self,
        knowledge_base_id: &str,
        document_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<StoredFile> {
        let path = document_upload_path(knowledge_base_id, document_id, filename)?;
        let full = self.resolve(&path)?;

        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        debug!("Stored {} bytes at {:?}", bytes.len(), full);

        Ok(StoredFile {
            path,
            size: bytes.len() as u64,
        })
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.resolve(path)?).await?)
    }

    async fn remove(&self, path: &str) -> Result<()> {
        match tokio::fs::remove_file(self.resolve(path)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_upload_path_strips_directories() {
        assert_eq!(
            document_upload_path("kb1", "doc1", "../../etc/notes.md").unwrap(),
            "documents/kb1/doc1/notes.md"
        );
        assert!(document_upload_path("kb1", "doc1", "..").is_err());
    }

    #[tokio::test]
    async fn test_local_store_put_read_remove() {
        let tmp = TempDir::new().unwrap();
        let store = LocalFileStore::new(tmp.path());

        let stored = store.put("kb1", "doc1", "guide.md", b"# Guide").await.unwrap();
        assert_eq!(stored.size, 7);
        assert_eq!(stored.path, "documents/kb1/doc1/guide.md");
        assert_eq!(store.read(&stored.path).await.unwrap(), b"# Guide");

        store.remove(&stored.path).await.unwrap();
        store.remove(&stored.path).await.unwrap();
        assert!(store.read(&stored.path).await.is_err());
    }

    #[tokio::test]
    async fn test_local_store_rejects_escaping_paths() {
        let tmp = TempDir::new().unwrap();
        let store = LocalFileStore::new(tmp.path());
        assert!(store.read("../outside").await.is_err());
    }
}
