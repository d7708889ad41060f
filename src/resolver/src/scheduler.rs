//! Background refresh scheduling
//!
//! The full backend refresh fires once a day at the configured purge time.
//! The directory refresh, when a period is configured, fires at that period
//! starting immediately.

use chrono::{Local, NaiveDateTime, NaiveTime, Timelike};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

use crate::backend::BackendPipeline;
use crate::config::{OrgUnitMode, ResolverConfig};
use crate::directory::DirectoryPipeline;
use crate::error::{ResolverError, Result};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Delay until the first full refresh.
///
/// Only the hour is compared: while the current hour is at or before the
/// purge hour the refresh is due today at `purge_time`, firing at once if
/// that minute has already gone by. Later in the day it is due tomorrow.
/// Without a purge time the refresh fires immediately.
pub fn first_fire_delay(now: NaiveDateTime, purge_time: Option<NaiveTime>) -> Duration {
    let Some(time) = purge_time else {
        return Duration::ZERO;
    };

    let today = now.date().and_time(time);
    let target = if now.hour() <= time.hour() {
        today
    } else {
        today + chrono::Duration::days(1)
    };
    // negative once the minute has passed within the purge hour
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

/// Running refresh tasks; aborted on shutdown or drop
#[derive(Debug, Default)]
pub struct SchedulerHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Spawn the refresh tasks the configuration asks for.
    ///
    /// The daily backend task runs in purge mode only. Must be called from
    /// within a Tokio runtime.
    pub fn start(
        config: &ResolverConfig,
        backend: Arc<BackendPipeline>,
        directory: Arc<DirectoryPipeline>,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| ResolverError::Scheduler(format!("no async runtime available: {e}")))?;
        let mut tasks = Vec::new();

        if config.org_unit_mode == OrgUnitMode::Purge {
            let delay = first_fire_delay(Local::now().naive_local(), config.purge_time);
            info!("First org unit refresh in {:?}, then every 24h", delay);
            tasks.push(runtime.spawn(run_backend_refresh(backend, delay)));
        }

        if let Some(period) = config.directory_refresh_period {
            info!("Directory refresh every {:?}", period);
            tasks.push(runtime.spawn(run_directory_refresh(directory, period)));
        }

        Ok(Self { tasks })
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }

    /// Abort every refresh task
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("Refresh scheduler stopped");
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn run_backend_refresh(backend: Arc<BackendPipeline>, delay: Duration) {
    let mut ticks = interval_at(Instant::now() + delay, DAY);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Burst);
    loop {
        ticks.tick().await;
        let outcome = backend.refresh_all().await;
        info!(
            "Scheduled org unit refresh loaded {} records in {:?}",
            outcome.loaded, outcome.elapsed
        );
    }
}

async fn run_directory_refresh(directory: Arc<DirectoryPipeline>, period: Duration) {
    let mut ticks = tokio::time::interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticks.tick().await;
        let summary = directory.refresh_all().await;
        info!(
            "Scheduled directory refresh: {} domains refreshed, {} failed",
            summary.refreshed.len(),
            summary.failed.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendSettings;
    use crate::cache::CacheStore;
    use crate::config::RetryPolicy;
    use crate::directory::DirectorySettings;
    use crate::gate::RefreshGate;
    use crate::profile::{parse_pull_attributes, BackendProfile, DirectoryProfiles};
    use crate::testing::{InMemoryBackend, InMemoryDirectory};
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .unwrap()
    }

    fn time(h: u32, m: u32) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(h, m, 0)
    }

    #[test]
    fn test_first_fire_later_today() {
        assert_eq!(first_fire_delay(at(1, 0), time(2, 30)), Duration::from_secs(90 * 60));
    }

    #[test]
    fn test_first_fire_tomorrow_when_passed() {
        assert_eq!(
            first_fire_delay(at(3, 0), time(2, 0)),
            Duration::from_secs(23 * 60 * 60)
        );
        assert_eq!(
            first_fire_delay(at(23, 59), time(0, 0)),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_first_fire_within_purge_hour() {
        assert_eq!(first_fire_delay(at(2, 0), time(2, 45)), Duration::from_secs(45 * 60));
        assert_eq!(first_fire_delay(at(2, 0), time(2, 0)), Duration::ZERO);
        // minute already passed, still the purge hour: fire at once
        assert_eq!(first_fire_delay(at(2, 30), time(2, 0)), Duration::ZERO);
        assert_eq!(first_fire_delay(at(2, 59), time(2, 15)), Duration::ZERO);
    }

    #[test]
    fn test_first_fire_immediate_without_time() {
        assert_eq!(first_fire_delay(at(12, 0), None), Duration::ZERO);
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let config = ResolverConfig::default();
        let (backend, directory, _) = pipelines();
        let err = SchedulerHandle::start(&config, backend, directory).unwrap_err();
        assert!(matches!(err, ResolverError::Scheduler(_)));
    }

    fn pipelines() -> (Arc<BackendPipeline>, Arc<DirectoryPipeline>, Arc<InMemoryBackend>) {
        let cache = Arc::new(CacheStore::new(&ResolverConfig::default()));
        let retry = RetryPolicy {
            retries: 0,
            interval_secs: 0,
        };
        let client = Arc::new(InMemoryBackend::new("SERV1_", "Z_AOR"));
        let backend = Arc::new(BackendPipeline::new(
            client.clone(),
            Some(BackendProfile {
                server_prefix: "SERV1_".into(),
                handler: "Z_AOR".into(),
                pull_attributes: parse_pull_attributes("SERV1_", "aor_attributes_to_pull", "multi:sloc"),
            }),
            cache.clone(),
            Arc::new(RefreshGate::new()),
            BackendSettings {
                retry,
                reload_enabled: true,
            },
        ));
        let directory = Arc::new(DirectoryPipeline::new(
            Arc::new(InMemoryDirectory::new()),
            DirectoryProfiles::from_profiles(Vec::new()),
            cache,
            DirectorySettings {
                page_size: 10,
                retry,
                refresh_enabled: false,
            },
        ));
        (backend, directory, client)
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_refresh_fires_daily() {
        let (backend, directory, client) = pipelines();
        let handle = SchedulerHandle::start(&ResolverConfig::default(), backend, directory).unwrap();
        assert_eq!(handle.task_count(), 1);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(client.calls(), 1);

        tokio::time::sleep(DAY).await;
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_mode_schedules_nothing() {
        let (backend, directory, client) = pipelines();
        let config = ResolverConfig {
            org_unit_mode: OrgUnitMode::Ttl,
            ..ResolverConfig::default()
        };

        let handle = SchedulerHandle::start(&config, backend, directory).unwrap();
        assert_eq!(handle.task_count(), 0);

        tokio::time::sleep(DAY).await;
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_refreshes() {
        let (backend, directory, client) = pipelines();
        let config = ResolverConfig {
            directory_refresh_period: Some(Duration::from_secs(60)),
            ..ResolverConfig::default()
        };

        let mut handle = SchedulerHandle::start(&config, backend, directory).unwrap();
        assert_eq!(handle.task_count(), 2);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(handle.is_running());

        handle.shutdown();
        assert!(!handle.is_running());

        tokio::time::sleep(DAY * 2).await;
        assert_eq!(client.calls(), 1);
    }
}
