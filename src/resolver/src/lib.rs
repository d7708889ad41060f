//! # attrbridge resolver
//!
//! Attribute resolution for a policy engine, federating a directory service
//! and an enterprise backend behind a two-region cache.
//!
//! ## Components
//!
//! - **Cache store**: principal and organizational-unit regions with TTL,
//!   capacity bounds and an identifier alias index
//! - **Directory pipeline**: paged bulk refresh per domain with retries, plus
//!   single-identity queries on cache miss
//! - **Backend pipeline**: scoped and full-refresh batch calls with
//!   negative-result caching
//! - **Orchestrator**: per-request attribute resolution and source routing
//! - **Scheduler**: daily full backend refresh and optional periodic
//!   directory refresh
//!
//! ## Example
//!
//! ```rust,no_run
//! use attrbridge_resolver::{AttributeService, Subject};
//! use attrbridge_resolver::testing::{InMemoryBackend, InMemoryDirectory};
//! use attrbridge_core::Properties;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let properties = Properties::new();
//!     let service = AttributeService::builder(properties)
//!         .directory_client(Arc::new(InMemoryDirectory::new()))
//!         .backend_client(Arc::new(InMemoryBackend::new("SERV1_", "Z_AOR")))
//!         .build()
//!         .expect("clients are set");
//!     service.start().await.expect("inside a runtime");
//!
//!     let subject = Subject::new("jdoe").with_attribute("employeenumber", "jake");
//!     let mail = service.resolve_attribute(&subject, "mail").await;
//!     println!("mail = {mail}");
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod orchestrator;
pub mod profile;
pub mod record;
pub mod retry;
pub mod scheduler;
pub mod service;
pub mod testing;

// Re-export commonly used types
pub use backend::{BackendPipeline, BackendRequest};
pub use cache::{CacheRegion, CacheStats, CacheStore};
pub use config::{OrgUnitMode, RegionSettings, ResolverConfig, RetryPolicy, TimeToLive};
pub use directory::DirectoryPipeline;
pub use error::{ProfileError, ResolverError, Result};
pub use orchestrator::{AttributeOrchestrator, AttributeSource, Subject};
pub use profile::{BackendProfile, DirectoryProfile, DirectoryProfiles};
pub use record::{DirectoryRecord, OrgUnitColumn, OrgUnitRecord, RecordKind};
pub use metrics::{MetricsCollector, ResolverMetrics};
pub use scheduler::SchedulerHandle;
pub use service::{AttributeService, AttributeServiceBuilder};
