//! Entity records
//!
//! Plain data types with the invariants that do not need the database:
//! content metrics, score bounds, chunk spans, file typing, job progress.
//! Persistence lives in [`crate::db`].

pub mod chunk;
pub mod document;
pub mod embedding;
pub mod job;
pub mod knowledge_base;

pub use chunk::*;
pub use document::*;
pub use embedding::*;
pub use job::*;
pub use knowledge_base::*;
