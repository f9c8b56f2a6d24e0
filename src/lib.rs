//! kbstore - knowledge base bookkeeping for RAG backends
//!
//! This crate provides:
//! - Knowledge bases with sharing, soft deletion and version snapshots
//! - Documents, positioned chunks and their rolled-up counters
//! - Embedding model registry, stored embeddings and a query embedding cache
//! - Embedding jobs with atomic per-item progress
//! - A CLI over a local SQLite store

pub mod chunk;
pub mod commands;
pub mod config;
pub mod db;
pub mod embed;
pub mod error;
pub mod files;
pub mod lifecycle;
pub mod models;
pub mod progress;
pub mod runner;

pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
