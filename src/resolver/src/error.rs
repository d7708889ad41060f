//! Error types for the attribute resolver

use attrbridge_core::CoreError;
use thiserror::Error;

/// Profile validation failures.
///
/// A profile that fails validation is excluded; its siblings still load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    /// Required property absent or blank
    #[error("{domain}: required property '{field}' is undefined")]
    MissingField { domain: String, field: String },

    /// Property present but unusable
    #[error("{domain}: property '{field}' is invalid: {reason}")]
    InvalidField {
        domain: String,
        field: String,
        reason: String,
    },
}

impl ProfileError {
    pub fn missing(domain: &str, field: &str) -> Self {
        ProfileError::MissingField {
            domain: domain.to_string(),
            field: field.to_string(),
        }
    }

    pub fn invalid(domain: &str, field: &str, reason: impl Into<String>) -> Self {
        ProfileError::InvalidField {
            domain: domain.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Name of the offending property
    pub fn field(&self) -> &str {
        match self {
            ProfileError::MissingField { field, .. } | ProfileError::InvalidField { field, .. } => {
                field
            }
        }
    }
}

/// Attribute resolver errors
#[derive(Debug, Error)]
pub enum ResolverError {
    /// Failure reported by a collaborator or the core model
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Invalid profile configuration
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    /// Scheduler could not be started
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

/// Result type for resolver operations
pub type Result<T> = std::result::Result<T, ResolverError>;
