//! CLI commands implementation

pub mod cache;
pub mod documents;
pub mod init;
pub mod jobs;
pub mod knowledge_bases;
pub mod models;
pub mod status;

pub use cache::*;
pub use documents::*;
pub use init::*;
pub use jobs::*;
pub use knowledge_bases::*;
pub use models::*;
pub use status::*;
