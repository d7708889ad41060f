//! Enterprise backend abstraction

use crate::error::Result;
use crate::types::{BackendImports, BackendResponse};
use async_trait::async_trait;

/// Invokes remote functions on the enterprise backend
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Call `function` on the destination registered under `server_prefix`.
    ///
    /// Returns `CoreError::UnknownServer` / `CoreError::UnknownFunction` when
    /// the destination or function is not registered.
    async fn invoke(
        &self,
        server_prefix: &str,
        function: &str,
        imports: &BackendImports,
    ) -> Result<BackendResponse>;
}
