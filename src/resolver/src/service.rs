//! Service facade wiring caches, pipelines, orchestrator and scheduler

use attrbridge_core::{AttributeValue, BackendClient, CoreError, DirectoryClient, Properties};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::backend::{BackendPipeline, BackendRefreshOutcome, BackendSettings};
use crate::cache::{CacheRegion, CacheStats, CacheStore};
use crate::config::{OrgUnitMode, ResolverConfig};
use crate::directory::{DirectoryPipeline, DirectorySettings, RefreshSummary};
use crate::error::{ProfileError, Result};
use crate::gate::RefreshGate;
use crate::metrics::MetricsCollector;
use crate::orchestrator::{AttributeOrchestrator, OrchestratorSettings, Subject};
use crate::profile::{BackendProfile, DirectoryProfiles};
use crate::scheduler::SchedulerHandle;

/// Attribute resolution service
pub struct AttributeService {
    config: ResolverConfig,
    cache: Arc<CacheStore>,
    directory: Arc<DirectoryPipeline>,
    backend: Arc<BackendPipeline>,
    orchestrator: AttributeOrchestrator,
    metrics: Arc<MetricsCollector>,
    /// Claimed by the first `start`, released by `shutdown`
    started: AtomicBool,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl AttributeService {
    pub fn builder(properties: Properties) -> AttributeServiceBuilder {
        AttributeServiceBuilder {
            properties,
            directory_client: None,
            backend_client: None,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn directory(&self) -> &Arc<DirectoryPipeline> {
        &self.directory
    }

    pub fn backend(&self) -> &Arc<BackendPipeline> {
        &self.backend
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn cache_stats(&self, region: CacheRegion) -> CacheStats {
        self.cache.stats(region)
    }

    /// Begin background refreshing.
    ///
    /// In purge mode the org-unit region is loaded once before the daily
    /// refresh is scheduled. Calling `start` on a started service, or while
    /// another `start` is still loading, is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Attribute service already started");
            return Ok(());
        }

        if self.config.org_unit_mode == OrgUnitMode::Purge {
            let outcome = self.backend.refresh_all().await;
            info!(
                "Initial org unit load: {} records in {:?}",
                outcome.loaded, outcome.elapsed
            );
        }

        let handle =
            match SchedulerHandle::start(&self.config, self.backend.clone(), self.directory.clone()) {
                Ok(handle) => handle,
                Err(e) => {
                    self.started.store(false, Ordering::Release);
                    return Err(e);
                }
            };

        let mut scheduler = self.scheduler.lock();
        if !self.started.load(Ordering::Acquire) {
            // shut down while loading; dropping the handle aborts its tasks
            info!("Attribute service stopped before its scheduler was installed");
            return Ok(());
        }
        *scheduler = Some(handle);
        info!("Attribute service started");
        Ok(())
    }

    /// Stop background refreshing; cached data stays readable
    pub fn shutdown(&self) {
        let mut scheduler = self.scheduler.lock();
        self.started.store(false, Ordering::Release);
        if let Some(mut handle) = scheduler.take() {
            handle.shutdown();
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Resolve `attribute` for `subject`, degrading to the null value
    pub async fn resolve_attribute(&self, subject: &Subject, attribute: &str) -> AttributeValue {
        self.orchestrator.resolve_attribute(subject, attribute).await
    }

    pub async fn refresh_directory(&self) -> RefreshSummary {
        self.directory.refresh_all().await
    }

    pub async fn refresh_backend(&self) -> BackendRefreshOutcome {
        self.backend.refresh_all().await
    }
}

/// Builder for [`AttributeService`]
pub struct AttributeServiceBuilder {
    properties: Properties,
    directory_client: Option<Arc<dyn DirectoryClient>>,
    backend_client: Option<Arc<dyn BackendClient>>,
}

impl AttributeServiceBuilder {
    pub fn directory_client(mut self, client: Arc<dyn DirectoryClient>) -> Self {
        self.directory_client = Some(client);
        self
    }

    pub fn backend_client(mut self, client: Arc<dyn BackendClient>) -> Self {
        self.backend_client = Some(client);
        self
    }

    /// Load configuration and profiles, then assemble the service.
    ///
    /// Invalid profiles are logged and left out. Fails only when a client
    /// was not supplied.
    pub fn build(self) -> Result<AttributeService> {
        let directory_client = self
            .directory_client
            .ok_or_else(|| CoreError::configuration("directory client not set"))?;
        let backend_client = self
            .backend_client
            .ok_or_else(|| CoreError::configuration("backend client not set"))?;

        let config = ResolverConfig::from_properties(&self.properties);
        let cache = Arc::new(CacheStore::new(&config));
        let metrics = Arc::new(MetricsCollector::new());

        let profiles = DirectoryProfiles::load(&self.properties, &config.profile_names);
        if profiles.is_empty() {
            error!("No valid directory profile, principals cannot be resolved");
        }

        let backend_profile = match BackendProfile::parse(&self.properties) {
            Ok(profile) => {
                info!("Backend profile {} loaded", profile.name());
                Some(profile)
            }
            Err(ProfileError::MissingField { ref field, .. }) if field == "sap_server_prefix" => {
                info!("No backend configured");
                None
            }
            Err(e) => {
                error!("Backend profile excluded: {}", e);
                None
            }
        };

        let directory = Arc::new(DirectoryPipeline::new(
            directory_client,
            profiles,
            cache.clone(),
            DirectorySettings::from_config(&config),
        ));
        let backend = Arc::new(BackendPipeline::new(
            backend_client,
            backend_profile,
            cache.clone(),
            Arc::new(RefreshGate::new()),
            BackendSettings::from_config(&config),
        ));
        let orchestrator = AttributeOrchestrator::new(
            cache.clone(),
            directory.clone(),
            backend.clone(),
            OrchestratorSettings::from_config(&config),
            metrics.clone(),
        );

        Ok(AttributeService {
            config,
            cache,
            directory,
            backend,
            orchestrator,
            metrics,
            started: AtomicBool::new(false),
            scheduler: Mutex::new(None),
        })
    }
}
