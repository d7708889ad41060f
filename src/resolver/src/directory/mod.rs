//! Directory refresh pipeline
//!
//! Bulk-enumerates principals and groups of every valid domain into the
//! principal region, and answers single-identity queries on cache miss.

mod filter;
mod normalize;
mod sid;

pub use filter::{enumeration_filter, escape_filter_value, identity_filter, DISABLED_ACCOUNTS_FILTER};
pub use normalize::{normalize_entry, NormalizedEntry};
pub use sid::{decode_sid, OBJECT_SID};

use attrbridge_core::{DirectoryClient, DirectoryConnection, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::CacheStore;
use crate::config::{ResolverConfig, RetryPolicy};
use crate::gate::RefreshGate;
use crate::profile::{DirectoryProfile, DirectoryProfiles};
use crate::record::{DirectoryRecord, RecordKind};

/// Directory pipeline settings
#[derive(Debug, Clone)]
pub struct DirectorySettings {
    pub page_size: u32,
    pub retry: RetryPolicy,
    /// Bulk refresh runs only when a refresh period is configured
    pub refresh_enabled: bool,
}

impl DirectorySettings {
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            page_size: config.paging_size,
            retry: config.retry,
            refresh_enabled: config.directory_refresh_period.is_some(),
        }
    }
}

/// Objects loaded from one domain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DomainCounts {
    pub principals: usize,
    pub groups: usize,
    /// Entries dropped because they could not be decoded
    pub skipped: usize,
}

/// Outcome of a bulk refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub refreshed: Vec<(String, DomainCounts)>,
    /// Domains abandoned after exhausting retries
    pub failed: Vec<String>,
}

pub struct DirectoryPipeline {
    client: Arc<dyn DirectoryClient>,
    profiles: DirectoryProfiles,
    cache: Arc<CacheStore>,
    settings: DirectorySettings,
    gate: RefreshGate,
    refresh_lock: Mutex<()>,
}

impl DirectoryPipeline {
    pub fn new(
        client: Arc<dyn DirectoryClient>,
        profiles: DirectoryProfiles,
        cache: Arc<CacheStore>,
        settings: DirectorySettings,
    ) -> Self {
        Self {
            client,
            profiles,
            cache,
            settings,
            gate: RefreshGate::new(),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn profiles(&self) -> &DirectoryProfiles {
        &self.profiles
    }

    pub fn is_refreshing(&self) -> bool {
        self.gate.is_refreshing()
    }

    /// Enumerate every domain into the cache.
    ///
    /// Each domain is retried on its own; a domain that keeps failing is
    /// abandoned for this cycle without affecting its siblings. Concurrent
    /// calls run one after another.
    #[instrument(skip(self))]
    pub async fn refresh_all(&self) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        if !self.settings.refresh_enabled {
            info!("Skip directory refresh since the cache refresh period is 0");
            return summary;
        }

        let _serial = self.refresh_lock.lock().await;
        let _guard = self.gate.begin(|| ());
        let started = Instant::now();
        info!(
            "Directory refresh started for {} domain(s), page size {}",
            self.profiles.len(),
            self.settings.page_size
        );

        for profile in self.profiles.iter() {
            let result = self
                .settings
                .retry
                .execute(&profile.name, || self.refresh_domain(profile))
                .await;

            match result {
                Ok(counts) => {
                    info!(
                        "Domain {} refreshed: {} principals, {} groups, {} skipped",
                        profile.name, counts.principals, counts.groups, counts.skipped
                    );
                    summary.refreshed.push((profile.name.clone(), counts));
                }
                Err(e) => {
                    error!("Domain {} abandoned for this cycle: {}", profile.name, e);
                    summary.failed.push(profile.name.clone());
                }
            }
        }

        info!("Directory refresh completed in {:?}", started.elapsed());
        summary
    }

    /// Refresh one domain over a single connection
    async fn refresh_domain(&self, profile: &DirectoryProfile) -> Result<DomainCounts> {
        info!("Started refreshing domain {}", profile.name);
        let connection = self.client.connect(&profile.connection_settings()).await?;

        let result = self.enumerate_domain(connection.as_ref(), profile).await;

        if let Err(e) = connection.close().await {
            warn!("Closing connection to {} failed: {}", profile.name, e);
        }
        result
    }

    async fn enumerate_domain(
        &self,
        connection: &dyn DirectoryConnection,
        profile: &DirectoryProfile,
    ) -> Result<DomainCounts> {
        let mut counts = DomainCounts::default();

        let (principals, skipped) = self
            .enumerate(connection, profile, RecordKind::Principal)
            .await?;
        counts.principals = principals;
        counts.skipped += skipped;

        if profile.groups.is_some() {
            let (groups, skipped) = self.enumerate(connection, profile, RecordKind::Group).await?;
            counts.groups = groups;
            counts.skipped += skipped;
        }

        Ok(counts)
    }

    /// Page through every search base of an object class.
    ///
    /// Returns the number of stored and skipped entries.
    async fn enumerate(
        &self,
        connection: &dyn DirectoryConnection,
        profile: &DirectoryProfile,
        kind: RecordKind,
    ) -> Result<(usize, usize)> {
        let Some(class) = profile.object_class(kind) else {
            return Ok((0, 0));
        };

        let filter = enumeration_filter(class, profile.include_disabled_accounts);
        let attributes = class.requested_attributes();
        let (mut stored, mut skipped) = (0, 0);

        for base in &class.search_bases {
            debug!("Searching {} with {} for {:?}", base, filter, attributes);
            let mut cookie: Option<Vec<u8>> = None;

            loop {
                let page = connection
                    .search(base, &filter, &attributes, self.settings.page_size, cookie.as_deref())
                    .await?;

                if let Some(total) = page.total {
                    debug!("Server reports {} {:?} entries under {}", total, kind, base);
                }

                for entry in &page.entries {
                    match normalize_entry(&profile.name, class, kind, entry) {
                        Ok(normalized) => {
                            self.store(normalized, kind);
                            stored += 1;
                        }
                        Err(e) => {
                            warn!("Skipping {} in {}: {}", entry.dn, profile.name, e);
                            skipped += 1;
                        }
                    }
                }

                if !page.has_more() {
                    break;
                }
                cookie = page.cookie;
            }
        }

        info!("{:?} cache count for {} is {}", kind, profile.name, stored);
        Ok((stored, skipped))
    }

    /// Look up one identity without retrying.
    ///
    /// The alias index decides whether `id` names a principal or a group;
    /// unknown ids are treated as principals. In multi-domain mode only the
    /// domains that pull `attribute` are searched, in configuration order.
    #[instrument(skip(self))]
    pub async fn query_identity(&self, id: &str, attribute: &str) -> Result<Option<DirectoryRecord>> {
        let kind = self.cache.alias_kind(id).unwrap_or(RecordKind::Principal);
        let candidates = self.profiles.providers_of(attribute, kind);
        if candidates.is_empty() {
            error!("Attribute {} isn't provided by any domain", attribute);
            return Ok(None);
        }

        let started = Instant::now();
        for profile in candidates {
            debug!("Querying domain {} for {}", profile.name, id);
            if let Some(record) = self.query_domain(&profile, kind, id).await? {
                info!("Query for {} took {:?}", id, started.elapsed());
                return Ok(Some(record));
            }
        }

        error!("Object {} cannot be queried from the directory", id);
        Ok(None)
    }

    async fn query_domain(
        &self,
        profile: &DirectoryProfile,
        kind: RecordKind,
        id: &str,
    ) -> Result<Option<DirectoryRecord>> {
        let Some(class) = profile.object_class(kind) else {
            return Ok(None);
        };

        let filter = identity_filter(class, profile.include_disabled_accounts, id);
        let attributes = class.requested_attributes();
        let connection = self.client.connect(&profile.connection_settings()).await?;

        let mut found = Ok(None);
        for base in &class.search_bases {
            let entries = match connection.search_once(base, &filter, &attributes).await {
                Ok(entries) => entries,
                Err(e) => {
                    found = Err(e);
                    break;
                }
            };

            if let Some(entry) = entries.first() {
                found = normalize_entry(&profile.name, class, kind, entry).map(|normalized| {
                    let record = normalized.record.clone();
                    self.store(normalized, kind);
                    Some(record)
                });
                break;
            }
        }

        if let Err(e) = connection.close().await {
            warn!("Closing connection to {} failed: {}", profile.name, e);
        }
        found
    }

    /// Write a record, then point each of its aliases at it
    fn store(&self, normalized: NormalizedEntry, kind: RecordKind) {
        let NormalizedEntry { record, aliases } = normalized;
        let combined_id = record.id.clone();
        debug!("Caching {} from {}", combined_id, record.domain);

        self.cache.put_principal(record);
        for alias in aliases {
            self.cache.add_alias(alias, combined_id.clone(), kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryDirectory;
    use attrbridge_core::{AttributeValue, DirectoryEntry, Properties};

    fn props(name: &str) -> Properties {
        [
            ("host", "dc.local"),
            ("port", "389"),
            ("authentication", "none"),
            ("user_search_base", "ou=people,dc=local"),
            ("user_filter", "objectClass=person"),
            ("user_key_attributes", "cs:uid,ci:employeeNumber"),
            ("user_attributes_to_pull", "multi:mail,single:cn"),
        ]
        .into_iter()
        .map(|(k, v)| (format!("{name}_{k}"), v.to_string()))
        .collect()
    }

    fn settings(page_size: u32) -> DirectorySettings {
        DirectorySettings {
            page_size,
            retry: RetryPolicy {
                retries: 0,
                interval_secs: 0,
            },
            refresh_enabled: true,
        }
    }

    fn pipeline(directory: Arc<InMemoryDirectory>, page_size: u32) -> (DirectoryPipeline, Arc<CacheStore>) {
        let cache = Arc::new(CacheStore::new(&ResolverConfig::default()));
        let profiles = DirectoryProfiles::load(&props("DOMAIN_1"), &[]);
        (
            DirectoryPipeline::new(directory, profiles, cache.clone(), settings(page_size)),
            cache,
        )
    }

    fn person(uid: &str, number: &str) -> DirectoryEntry {
        DirectoryEntry::new(format!("uid={uid},ou=people,dc=local"))
            .with_attribute("uid", uid)
            .with_attribute("employeeNumber", number)
            .with_values("mail", [format!("{uid}@x")])
    }

    #[tokio::test]
    async fn test_refresh_pages_through_results() {
        let directory = Arc::new(InMemoryDirectory::new());
        for i in 0..5 {
            directory.add_entry("DOMAIN_1", "ou=people,dc=local", person(&format!("u{i}"), &format!("E{i}")));
        }
        let (pipeline, cache) = pipeline(directory.clone(), 2);

        let summary = pipeline.refresh_all().await;

        assert_eq!(summary.refreshed.len(), 1);
        assert_eq!(summary.refreshed[0].1.principals, 5);
        assert_eq!(directory.page_requests("DOMAIN_1"), 3);
        assert!(!pipeline.is_refreshing());

        let record = cache.get_principal_by_alias("e3").unwrap();
        assert_eq!(record.id, "DOMAIN_1#e3#u3");
        assert_eq!(record.attribute("mail"), Some(&AttributeValue::Multi(vec!["u3@x".into()])));
        assert_eq!(cache.resolve_alias("u3").as_deref(), Some("DOMAIN_1#e3#u3"));
    }

    #[tokio::test]
    async fn test_refresh_skipped_when_disabled() {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.add_entry("DOMAIN_1", "ou=people,dc=local", person("u1", "E1"));
        let cache = Arc::new(CacheStore::new(&ResolverConfig::default()));
        let pipeline = DirectoryPipeline::new(
            directory.clone(),
            DirectoryProfiles::load(&props("DOMAIN_1"), &[]),
            cache.clone(),
            DirectorySettings {
                refresh_enabled: false,
                ..settings(10)
            },
        );

        let summary = pipeline.refresh_all().await;
        assert!(summary.refreshed.is_empty());
        assert_eq!(directory.page_requests("DOMAIN_1"), 0);
    }

    #[tokio::test]
    async fn test_query_identity_caches_match() {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.add_entry("DOMAIN_1", "ou=people,dc=local", person("amy", "E7"));
        let (pipeline, cache) = pipeline(directory.clone(), 10);

        let record = pipeline.query_identity("E7", "mail").await.unwrap().unwrap();
        assert_eq!(record.id, "DOMAIN_1#amy#e7");
        assert_eq!(cache.alias_kind("amy"), Some(RecordKind::Principal));
        assert!(cache.get_principal("DOMAIN_1#amy#e7").is_some());

        let filter = directory.last_filter("DOMAIN_1").unwrap();
        assert!(filter.contains("(uid=E7)(employeeNumber=E7)"));
    }

    #[tokio::test]
    async fn test_query_identity_miss() {
        let directory = Arc::new(InMemoryDirectory::new());
        let (pipeline, _cache) = pipeline(directory, 10);

        assert!(pipeline.query_identity("ghost", "mail").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_identity_does_not_retry() {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.fail_domain("DOMAIN_1");
        let (pipeline, _cache) = pipeline(directory.clone(), 10);

        assert!(pipeline.query_identity("amy", "mail").await.is_err());
        assert_eq!(directory.connect_attempts("DOMAIN_1"), 1);
    }
}
