//! # attrbridge core
//!
//! Shared value types, collaborator traits and the error taxonomy used by the
//! attribute resolver. The directory and backend wire protocols live behind
//! [`DirectoryClient`] and [`BackendClient`]; this crate never speaks them.

pub mod types;
pub mod traits;
pub mod error;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use traits::{BackendClient, DirectoryClient, DirectoryConnection};
pub use types::{
    AttributeData, AttributeValue, BackendImports, BackendResponse, BackendRow, BackendTable,
    ConnectionSettings, DirectoryEntry, SearchPage,
};

/// Flat string-keyed property set supplied by the host
pub type Properties = std::collections::HashMap<String, String>;
