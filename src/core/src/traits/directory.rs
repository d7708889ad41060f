//! Directory service abstraction

use crate::error::Result;
use crate::types::{ConnectionSettings, DirectoryEntry, SearchPage};
use async_trait::async_trait;

/// Opens connections to a directory service
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Open a connection context for one domain
    async fn connect(&self, settings: &ConnectionSettings) -> Result<Box<dyn DirectoryConnection>>;
}

/// An open directory connection.
///
/// One connection is reused for every search of a domain refresh.
#[async_trait]
pub trait DirectoryConnection: Send + Sync {
    /// Issue one bounded page of a subtree search.
    ///
    /// `cookie` is `None` for the first page and the previous page's cookie
    /// afterwards.
    async fn search(
        &self,
        base: &str,
        filter: &str,
        attributes: &[String],
        page_size: u32,
        cookie: Option<&[u8]>,
    ) -> Result<SearchPage>;

    /// Unpaged subtree search
    async fn search_once(
        &self,
        base: &str,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<DirectoryEntry>>;

    /// Release the connection
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
