//! Init command implementation

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Where init put things
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitResult {
    pub config_path: String,
    pub db_path: String,
    pub files_dir: String,
}

/// Write a default config, create the database schema and the file store root
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<InitResult> {
    let config = Config::with_base_dir(base_dir);

    if config.paths.config_file.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config.paths.config_file.display()
        )));
    }

    std::fs::create_dir_all(&config.paths.base_dir)?;
    std::fs::create_dir_all(&config.paths.files_dir)?;
    config.save()?;

    let db = Database::connect(&config).await?;
    db.init_schema().await?;
    info!("Initialized database at {:?}", config.paths.db_file);

    Ok(InitResult {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        files_dir: config.paths.files_dir.display().to_string(),
    })
}

pub fn print_init(result: &InitResult) {
    println!("✓ kbstore initialized successfully");
    println!("  Config: {}", result.config_path);
    println!("  Database: {}", result.db_path);
    println!("  Files: {}", result.files_dir);
    println!("\nNext steps:");
    println!("  1. Register an embedding model: kbstore model register <name> --dimension <n>");
    println!("  2. Create a knowledge base: kbstore kb create <name> --owner <user>");
    println!("  3. Add documents: kbstore doc add <kb-id> /path/to/file.md");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_config_and_schema() {
        let tmp = TempDir::new().unwrap();
        let result = cmd_init(Some(tmp.path().to_path_buf()), false).await.unwrap();

        let config = Config::load(std::path::Path::new(&result.config_path)).unwrap();
        assert!(config.is_initialized());
        assert!(config.paths.files_dir.is_dir());

        let db = Database::connect(&config).await.unwrap();
        assert!(db.is_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn test_init_refuses_overwrite_without_force() {
        let tmp = TempDir::new().unwrap();
        cmd_init(Some(tmp.path().to_path_buf()), false).await.unwrap();

        let err = cmd_init(Some(tmp.path().to_path_buf()), false).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        cmd_init(Some(tmp.path().to_path_buf()), true).await.unwrap();
    }
}
