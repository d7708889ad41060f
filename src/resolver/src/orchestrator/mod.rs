//! Per-request attribute resolution
//!
//! Finds the subject's principal record through the alias index (falling back
//! to a directory query), routes the attribute to its source and composes the
//! value. Every failure degrades to the configured null value.

mod routing;

pub use routing::{AttributeRoutes, AttributeSource};

use attrbridge_core::AttributeValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::backend::BackendPipeline;
use crate::cache::CacheStore;
use crate::config::ResolverConfig;
use crate::directory::DirectoryPipeline;
use crate::metrics::{MetricsCollector, ResolutionPath};
use crate::record::{DirectoryRecord, OrgUnitRecord};

/// The entity an attribute is requested for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subject {
    pub uid: String,
    /// Keyed by lower-cased attribute name
    attributes: HashMap<String, String>,
}

impl Subject {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(name.to_lowercase(), value.into());
        self
    }

    /// Case-insensitive attribute lookup
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Returned whenever an attribute cannot be resolved
    pub null_value: AttributeValue,
    pub correlation_key: String,
    pub org_unit_key_attribute: String,
    pub refresh_poll_interval: Duration,
    pub refresh_wait_timeout: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            null_value: config
                .null_string
                .clone()
                .map_or(AttributeValue::Null, AttributeValue::Single),
            correlation_key: config.correlation_key.clone(),
            org_unit_key_attribute: config.org_unit_key_attribute.clone(),
            refresh_poll_interval: config.refresh_poll_interval(),
            refresh_wait_timeout: config.refresh_wait_timeout(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}

pub struct AttributeOrchestrator {
    cache: Arc<CacheStore>,
    directory: Arc<DirectoryPipeline>,
    backend: Arc<BackendPipeline>,
    routes: AttributeRoutes,
    settings: OrchestratorSettings,
    metrics: Arc<MetricsCollector>,
}

impl AttributeOrchestrator {
    pub fn new(
        cache: Arc<CacheStore>,
        directory: Arc<DirectoryPipeline>,
        backend: Arc<BackendPipeline>,
        settings: OrchestratorSettings,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let routes = AttributeRoutes::build(
            directory.profiles(),
            backend.profile().map(|p| p.as_ref()),
        );
        Self {
            cache,
            directory,
            backend,
            routes,
            settings,
            metrics,
        }
    }

    pub fn routes(&self) -> &AttributeRoutes {
        &self.routes
    }

    pub fn null_value(&self) -> &AttributeValue {
        &self.settings.null_value
    }

    /// Resolve `attribute` for `subject`.
    ///
    /// Never fails: anything unresolvable yields the configured null value.
    pub async fn resolve_attribute(&self, subject: &Subject, attribute: &str) -> AttributeValue {
        let started = Instant::now();

        let (path, resolved) = self.resolve(subject, attribute).await;
        let value = resolved.unwrap_or_else(|| self.settings.null_value.clone());

        let elapsed = started.elapsed();
        self.metrics.record_resolution(path, value == self.settings.null_value);
        self.metrics.record_latency(elapsed);
        info!(
            "Resolved {} for {} via {:?} in {:?}",
            attribute, subject.uid, path, elapsed
        );
        value
    }

    async fn resolve(&self, subject: &Subject, attribute: &str) -> (ResolutionPath, Option<AttributeValue>) {
        let Some(key) = subject.attribute(&self.settings.correlation_key) else {
            warn!(
                "Subject {} has no {} attribute",
                subject.uid, self.settings.correlation_key
            );
            return (ResolutionPath::Unresolved, None);
        };

        let Some(record) = self.find_principal(key, attribute).await else {
            return (ResolutionPath::Unresolved, None);
        };

        match self.routes.route(&record, attribute) {
            AttributeSource::Directory => {
                let value = record
                    .attribute(attribute)
                    .filter(|v| !v.is_null())
                    .cloned();
                if value.is_none() {
                    debug!("{} has no value for {}", record.id, attribute);
                }
                (ResolutionPath::Directory, value)
            }
            AttributeSource::Backend => (
                ResolutionPath::Backend,
                self.compose_org_unit_attribute(&record, attribute).await,
            ),
            AttributeSource::Unknown => {
                error!("Attribute {} is not provided by any source", attribute);
                (ResolutionPath::Unknown, None)
            }
        }
    }

    /// Alias lookup, then its lower-cased form, then a directory query
    async fn find_principal(&self, key: &str, attribute: &str) -> Option<DirectoryRecord> {
        let cached = self.cache.get_principal_by_alias(key).or_else(|| {
            let lowered = key.to_lowercase();
            (lowered != key)
                .then(|| self.cache.get_principal_by_alias(&lowered))
                .flatten()
        });
        self.metrics.record_principal_lookup(cached.is_some());
        if cached.is_some() {
            return cached;
        }

        debug!("{} not cached, querying the directory", key);
        match self.directory.query_identity(key, attribute).await {
            Ok(record) => record,
            Err(e) => {
                error!("Directory query for {} failed: {}", key, e);
                self.metrics.record_error();
                None
            }
        }
    }

    /// Concatenate the attribute's column across the principal's org units.
    ///
    /// Cached units contribute first, then one scoped backend call fetches
    /// the rest. Values are not deduplicated.
    async fn compose_org_unit_attribute(
        &self,
        record: &DirectoryRecord,
        attribute: &str,
    ) -> Option<AttributeValue> {
        if self.backend.is_refreshing() {
            self.metrics.record_refresh_wait();
            info!("Org unit refresh in progress, waiting to read {}", attribute);
        }

        let ids = match record.attribute(&self.settings.org_unit_key_attribute) {
            Some(AttributeValue::Multi(ids)) => ids,
            _ => {
                warn!(
                    "{} has no multivalued {} attribute",
                    record.id, self.settings.org_unit_key_attribute
                );
                return None;
            }
        };

        let (mut values, misses) = self
            .backend
            .gate()
            .read_when_idle(
                self.settings.refresh_poll_interval,
                self.settings.refresh_wait_timeout,
                || self.collect_cached(ids, attribute),
            )
            .await;

        if !misses.is_empty() {
            self.metrics.record_backend_query();
            for unit in self.backend.query_org_units(&misses).await {
                extend_with_column(&mut values, &unit, attribute);
            }
        }

        if values.is_empty() {
            None
        } else {
            Some(AttributeValue::Multi(values))
        }
    }

    /// Values from cached units plus the ids that missed
    fn collect_cached(&self, ids: &[String], attribute: &str) -> (Vec<String>, Vec<String>) {
        let mut values = Vec::new();
        let mut misses = Vec::new();

        for id in ids {
            let cached = self
                .cache
                .get_org_unit(id)
                .or_else(|| self.cache.get_org_unit(&id.to_lowercase()));
            match cached {
                Some(unit) => {
                    if unit.is_negative() {
                        debug!("Org unit {} is known to be absent", id);
                    }
                    extend_with_column(&mut values, &unit, attribute);
                }
                None => misses.push(id.clone()),
            }
        }
        (values, misses)
    }
}

fn extend_with_column(values: &mut Vec<String>, unit: &OrgUnitRecord, attribute: &str) {
    if let Some(column) = unit.column_by_name(attribute) {
        values.extend(column.iter().cloned());
    }
}
