//! Error taxonomy shared by the attribute resolution crates
//!
//! Absence of data is never an error here: lookups return `Option` and the
//! orchestrator degrades to its configured null value.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for attribute resolution
#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing or invalid configuration (fatal to the owning profile only)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Directory or backend call failure, eligible for retry
    #[error("Transient source error: {0}")]
    TransientSource(String),

    /// Malformed binary identifier or unexpected response shape
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// Backend server prefix has no registered destination
    #[error("Unknown backend server: {0}")]
    UnknownServer(String),

    /// Backend function name is not registered on the server
    #[error("Unknown backend function: {0}")]
    UnknownFunction(String),
}

impl CoreError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        CoreError::Configuration(msg.into())
    }

    /// Create a transient source error
    pub fn transient<S: Into<String>>(msg: S) -> Self {
        CoreError::TransientSource(msg.into())
    }

    /// Create a decoding error
    pub fn decoding<S: Into<String>>(msg: S) -> Self {
        CoreError::Decoding(msg.into())
    }

    /// Whether a retry loop should attempt the operation again.
    ///
    /// Configuration problems do not heal between attempts.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            CoreError::Configuration(_) | CoreError::UnknownServer(_) | CoreError::UnknownFunction(_)
        )
    }
}
