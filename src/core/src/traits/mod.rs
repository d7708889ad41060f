//! Traits for the external sources attributes are resolved from

pub mod directory;
pub mod backend;

// Re-export commonly used traits
pub use directory::{DirectoryClient, DirectoryConnection};
pub use backend::BackendClient;
