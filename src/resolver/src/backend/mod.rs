//! Backend batch pipeline
//!
//! Scoped calls fetch organizational-unit details for the ids a request
//! missed; the full refresh purges and reloads the whole region.

mod decode;

pub use decode::{
    decode_response, DecodedBatch, COLUMN_AOR_ID, COLUMN_KEY, COLUMN_VALUE, EXPORT_AOR_DETAILS,
    EXPORT_RETURN, GET_ALL_NO, GET_ALL_YES, IMPORT_AOR_ID, IMPORT_GET_ALL, RETURN_ID,
    RETURN_MESSAGE, RETURN_NUMBER, RETURN_TYPE,
};

use attrbridge_core::{
    BackendClient, BackendImports, BackendResponse, BackendTable, CoreError, Result,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::{CacheRegion, CacheStore};
use crate::config::{ResolverConfig, RetryPolicy};
use crate::gate::RefreshGate;
use crate::profile::BackendProfile;
use crate::record::OrgUnitRecord;

/// The two call shapes of the backend function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendRequest {
    /// Every entity the backend knows
    FullRefresh,
    /// Only the listed ids
    Scoped(Vec<String>),
}

impl BackendRequest {
    pub fn imports(&self) -> BackendImports {
        match self {
            BackendRequest::FullRefresh => BackendImports::new()
                .with_table(IMPORT_AOR_ID, BackendTable::new())
                .with_scalar(IMPORT_GET_ALL, GET_ALL_YES),
            BackendRequest::Scoped(ids) => BackendImports::new()
                .with_table(
                    IMPORT_AOR_ID,
                    BackendTable::single_column(COLUMN_AOR_ID, ids.iter().cloned()),
                )
                .with_scalar(IMPORT_GET_ALL, GET_ALL_NO),
        }
    }

    /// Ids that must end up cached, positive or negative
    pub fn requested(&self) -> &[String] {
        match self {
            BackendRequest::FullRefresh => &[],
            BackendRequest::Scoped(ids) => ids,
        }
    }
}

/// Backend pipeline settings
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub retry: RetryPolicy,
    /// Whether the full refresh reloads after purging
    pub reload_enabled: bool,
}

impl BackendSettings {
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            retry: config.retry,
            reload_enabled: config.backend_refresh_enabled,
        }
    }
}

/// Outcome of a full refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendRefreshOutcome {
    /// Records written to the region
    pub loaded: usize,
    pub reloaded: bool,
    pub elapsed: Duration,
}

pub struct BackendPipeline {
    client: Arc<dyn BackendClient>,
    profile: Option<Arc<BackendProfile>>,
    cache: Arc<CacheStore>,
    gate: Arc<RefreshGate>,
    settings: BackendSettings,
    refresh_lock: Mutex<()>,
}

impl BackendPipeline {
    pub fn new(
        client: Arc<dyn BackendClient>,
        profile: Option<BackendProfile>,
        cache: Arc<CacheStore>,
        gate: Arc<RefreshGate>,
        settings: BackendSettings,
    ) -> Self {
        Self {
            client,
            profile: profile.map(Arc::new),
            cache,
            gate,
            settings,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn profile(&self) -> Option<&Arc<BackendProfile>> {
        self.profile.as_ref()
    }

    pub fn gate(&self) -> &Arc<RefreshGate> {
        &self.gate
    }

    pub fn is_refreshing(&self) -> bool {
        self.gate.is_refreshing()
    }

    /// Invoke the configured handler.
    ///
    /// An unrecognized server prefix or function is logged and answered with
    /// an empty response. Transport failures are returned to the caller.
    pub async fn call_backend(&self, request: &BackendRequest) -> Result<BackendResponse> {
        let Some(profile) = &self.profile else {
            error!("No valid backend profile, returning empty data");
            return Ok(BackendResponse::empty());
        };

        info!(
            "Calling backend function with server prefix [{}] and handler [{}]",
            profile.server_prefix, profile.handler
        );

        match self
            .client
            .invoke(&profile.server_prefix, &profile.handler, &request.imports())
            .await
        {
            Ok(response) => Ok(response),
            Err(CoreError::UnknownServer(prefix)) => {
                error!("Server handler [{}] is unrecognized, returning empty data", prefix);
                Ok(BackendResponse::empty())
            }
            Err(CoreError::UnknownFunction(function)) => {
                error!("Function name [{}] is unrecognized, returning empty data", function);
                Ok(BackendResponse::empty())
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch details for `ids` in one call and cache every outcome.
    ///
    /// Ids the backend does not know are cached as negative records. Returns
    /// only the positive records; failures degrade to an empty list.
    #[instrument(skip(self))]
    pub async fn query_org_units(&self, ids: &[String]) -> Vec<OrgUnitRecord> {
        if ids.is_empty() {
            return Vec::new();
        }

        let request = BackendRequest::Scoped(ids.to_vec());
        let started = Instant::now();
        let response = match self.call_backend(&request).await {
            Ok(response) => response,
            Err(e) => {
                error!("Backend query for {:?} failed: {}", ids, e);
                return Vec::new();
            }
        };
        info!("Query for org units {:?} took {:?}", ids, started.elapsed());

        let batch = decode_response(&response, request.requested());
        let records = self.write_batch(batch);
        if records.is_empty() {
            warn!("Unable to get org unit details for {:?}", ids);
        }
        records
    }

    /// Purge the org-unit region and reload it from the backend.
    ///
    /// The purge happens under the refresh gate even when reloading is
    /// disabled. Concurrent calls run one after another.
    #[instrument(skip(self))]
    pub async fn refresh_all(&self) -> BackendRefreshOutcome {
        let _serial = self.refresh_lock.lock().await;
        let started = Instant::now();

        let _guard = self
            .gate
            .begin(|| self.cache.clear(CacheRegion::OrgUnit));

        if !self.settings.reload_enabled {
            info!("Skip reload since backend refresh is disabled");
            return BackendRefreshOutcome {
                elapsed: started.elapsed(),
                ..Default::default()
            };
        }

        let result = self
            .settings
            .retry
            .execute("backend refresh", || self.refresh_once())
            .await;

        let loaded = match result {
            Ok(loaded) => loaded,
            Err(e) => {
                error!("Backend refresh abandoned: {}", e);
                0
            }
        };

        let elapsed = started.elapsed();
        info!("Backend refresh completed: {} records in {:?}", loaded, elapsed);
        BackendRefreshOutcome {
            loaded,
            reloaded: true,
            elapsed,
        }
    }

    async fn refresh_once(&self) -> Result<usize> {
        let Some(profile) = &self.profile else {
            error!("Backend profile is invalid, skip refreshing");
            return Ok(0);
        };
        info!("Started refreshing server [{}]", profile.name());

        let started = Instant::now();
        let response = self.call_backend(&BackendRequest::FullRefresh).await?;
        info!("Query for all org units took {:?}", started.elapsed());

        let records = self.write_batch(decode_response(&response, &[]));
        if records.is_empty() {
            error!("Unable to get result from backend [{}]", profile.name());
        }
        Ok(records.len())
    }

    fn write_batch(&self, batch: DecodedBatch) -> Vec<OrgUnitRecord> {
        for negative in batch.negatives {
            debug!("Caching negative org unit {}", negative.id);
            self.cache.put_org_unit(negative);
        }
        for record in &batch.records {
            self.cache.put_org_unit(record.clone());
        }
        batch.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::OrgUnitColumn;
    use crate::testing::InMemoryBackend;

    fn profile() -> BackendProfile {
        BackendProfile {
            server_prefix: "SERV1_".into(),
            handler: "Z_AOR".into(),
            pull_attributes: crate::profile::parse_pull_attributes("SERV1_", "f", "multi:sloc"),
        }
    }

    fn pipeline(backend: Arc<InMemoryBackend>) -> (BackendPipeline, Arc<CacheStore>) {
        let cache = Arc::new(CacheStore::new(&ResolverConfig::default()));
        let pipeline = BackendPipeline::new(
            backend,
            Some(profile()),
            cache.clone(),
            Arc::new(RefreshGate::new()),
            BackendSettings {
                retry: RetryPolicy {
                    retries: 2,
                    interval_secs: 1,
                },
                reload_enabled: true,
            },
        );
        (pipeline, cache)
    }

    #[test]
    fn test_request_imports() {
        let full = BackendRequest::FullRefresh.imports();
        assert_eq!(full.scalars.get(IMPORT_GET_ALL).map(String::as_str), Some("X"));
        assert!(full.tables[IMPORT_AOR_ID].is_empty());

        let scoped = BackendRequest::Scoped(vec!["A".into(), "B".into()]).imports();
        assert_eq!(scoped.scalars.get(IMPORT_GET_ALL).map(String::as_str), Some(""));
        assert_eq!(scoped.tables[IMPORT_AOR_ID].len(), 2);
    }

    #[tokio::test]
    async fn test_scoped_query_writes_negative_records() {
        let backend = Arc::new(InMemoryBackend::new("SERV1_", "Z_AOR"));
        backend.add_detail("A", "sloc", "L1");
        let (pipeline, cache) = pipeline(backend.clone());

        let records = pipeline.query_org_units(&["A".into(), "B".into()]).await;

        assert_eq!(records.len(), 1);
        assert_eq!(
            cache.get_org_unit("A").unwrap().column(OrgUnitColumn::StorageLocation),
            Some(&["L1".to_string()][..])
        );
        assert!(cache.get_org_unit("B").unwrap().is_negative());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_function_yields_empty() {
        let backend = Arc::new(InMemoryBackend::new("SERV1_", "Z_OTHER"));
        backend.add_detail("A", "sloc", "L1");
        let (pipeline, cache) = pipeline(backend);

        let response = pipeline
            .call_backend(&BackendRequest::Scoped(vec!["A".into()]))
            .await
            .unwrap();
        assert!(response.is_empty());

        assert!(pipeline.query_org_units(&["A".into()]).await.is_empty());
        assert!(cache.get_org_unit("A").is_none());
    }

    #[tokio::test]
    async fn test_scoped_failure_degrades_to_empty() {
        let backend = Arc::new(InMemoryBackend::new("SERV1_", "Z_AOR"));
        backend.fail_next(1);
        let (pipeline, _cache) = pipeline(backend.clone());

        assert!(pipeline.query_org_units(&["A".into()]).await.is_empty());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_full_refresh_purges_and_reloads() {
        let backend = Arc::new(InMemoryBackend::new("SERV1_", "Z_AOR"));
        backend.add_detail("A", "sloc", "L1");
        backend.add_detail("C", "fe", "F1");
        let (pipeline, cache) = pipeline(backend);
        cache.put_org_unit(OrgUnitRecord::negative("STALE"));

        let outcome = pipeline.refresh_all().await;

        assert!(outcome.reloaded);
        assert_eq!(outcome.loaded, 2);
        assert!(cache.get_org_unit("STALE").is_none());
        assert!(cache.get_org_unit("C").is_some());
        assert!(!pipeline.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_refresh_retries_transient_failures() {
        let backend = Arc::new(InMemoryBackend::new("SERV1_", "Z_AOR"));
        backend.add_detail("A", "sloc", "L1");
        backend.fail_next(2);
        let (pipeline, cache) = pipeline(backend.clone());

        let outcome = pipeline.refresh_all().await;

        assert_eq!(outcome.loaded, 1);
        assert_eq!(backend.calls(), 3);
        assert!(cache.get_org_unit("A").is_some());
    }

    #[tokio::test]
    async fn test_reload_disabled_still_purges() {
        let backend = Arc::new(InMemoryBackend::new("SERV1_", "Z_AOR"));
        backend.add_detail("A", "sloc", "L1");
        let cache = Arc::new(CacheStore::new(&ResolverConfig::default()));
        cache.put_org_unit(OrgUnitRecord::new("OLD"));
        let pipeline = BackendPipeline::new(
            backend.clone(),
            Some(profile()),
            cache.clone(),
            Arc::new(RefreshGate::new()),
            BackendSettings {
                retry: RetryPolicy::default(),
                reload_enabled: false,
            },
        );

        let outcome = pipeline.refresh_all().await;

        assert!(!outcome.reloaded);
        assert_eq!(cache.len(CacheRegion::OrgUnit), 0);
        assert_eq!(backend.calls(), 0);
    }
}
