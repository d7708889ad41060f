//! Shared types for attribute resolution

pub mod value;
pub mod directory;
pub mod backend;

// Re-export commonly used types
pub use value::AttributeValue;
pub use directory::{AttributeData, ConnectionSettings, DirectoryEntry, SearchPage};
pub use backend::{BackendImports, BackendResponse, BackendRow, BackendTable};
