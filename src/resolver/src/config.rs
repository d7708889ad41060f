//! Resolver configuration
//!
//! Settings are read from the host's flat property set. Every malformed value
//! is logged and replaced by its default; configuration never fails start-up.

use attrbridge_core::Properties;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, warn};

/// Expiry policy of a cache region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeToLive {
    Infinite,
    Finite(Duration),
}

impl TimeToLive {
    /// Parse `INFINITE` or `<N>_<SECS|MINS|HRS|DAYS>`.
    ///
    /// An unparsable count becomes 1 and an unknown unit becomes DAYS, so
    /// `"x_HRS"` is one hour and `"5_WEEKS"` is five days.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("INFINITE") {
            return TimeToLive::Infinite;
        }

        let Some((count, unit)) = raw.split_once('_') else {
            error!("Invalid time to live '{}', using 1_DAYS", raw);
            return TimeToLive::Finite(Duration::from_secs(DAY_SECS));
        };

        let count = count.trim().parse::<u64>().unwrap_or_else(|_| {
            error!("Invalid time to live count in '{}', using 1", raw);
            1
        });

        let unit_secs = match unit.trim().to_ascii_uppercase().as_str() {
            "SECS" => 1,
            "MINS" => 60,
            "HRS" => 3600,
            "DAYS" => DAY_SECS,
            other => {
                error!("Invalid time to live unit '{}', using DAYS", other);
                DAY_SECS
            }
        };

        TimeToLive::Finite(Duration::from_secs(count.saturating_mul(unit_secs)))
    }

    /// Lifetime of an entry, `None` when entries never expire
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            TimeToLive::Infinite => None,
            TimeToLive::Finite(d) => Some(*d),
        }
    }
}

impl Default for TimeToLive {
    fn default() -> Self {
        TimeToLive::Finite(Duration::from_secs(DAY_SECS))
    }
}

const DAY_SECS: u64 = 24 * 60 * 60;

/// Bounds of one cache region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSettings {
    /// Approximate memory budget in megabytes
    #[serde(default = "default_heap_mb")]
    pub heap_mb: usize,

    /// Maximum number of entries
    #[serde(default = "default_max_objects")]
    pub max_objects: usize,

    #[serde(default)]
    pub ttl: TimeToLive,
}

impl RegionSettings {
    pub fn heap_bytes(&self) -> usize {
        self.heap_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            heap_mb: default_heap_mb(),
            max_objects: default_max_objects(),
            ttl: TimeToLive::default(),
        }
    }
}

/// How the organizational-unit region is kept fresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgUnitMode {
    /// Entries never expire; the daily full refresh wipes and reloads the region
    #[default]
    Purge,
    /// Entries expire individually after the configured TTL
    Ttl,
}

/// Retry behaviour of the bulk refresh pipelines.
///
/// One initial attempt, then up to `retries` more, each preceded by a sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_interval_secs")]
    pub interval_secs: u64,
}

impl RetryPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Total number of attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            interval_secs: default_retry_interval_secs(),
        }
    }
}

/// Complete resolver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub principal_cache: RegionSettings,

    #[serde(default = "default_org_unit_cache")]
    pub org_unit_cache: RegionSettings,

    #[serde(default)]
    pub org_unit_mode: OrgUnitMode,

    /// Time of day of the full backend refresh, fire immediately when unset
    #[serde(default)]
    pub purge_time: Option<NaiveTime>,

    /// Whether the full backend refresh reloads after purging
    #[serde(default = "default_true")]
    pub backend_refresh_enabled: bool,

    /// Period of the directory refresh, disabled when unset
    #[serde(default)]
    pub directory_refresh_period: Option<Duration>,

    #[serde(default = "default_paging_size")]
    pub paging_size: u32,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Value returned when an attribute cannot be resolved, `Null` when unset
    #[serde(default)]
    pub null_string: Option<String>,

    /// Subject attribute used to find the principal
    #[serde(default = "default_correlation_key")]
    pub correlation_key: String,

    /// Principal attribute holding organizational-unit ids
    #[serde(default = "default_org_unit_key_attribute")]
    pub org_unit_key_attribute: String,

    /// Longest a reader waits for a full backend refresh to finish
    #[serde(default = "default_refresh_wait_timeout_ms")]
    pub refresh_wait_timeout_ms: u64,

    #[serde(default = "default_refresh_poll_interval_ms")]
    pub refresh_poll_interval_ms: u64,

    /// Directory profile names; a single `DOMAIN_1` profile when empty
    #[serde(default)]
    pub profile_names: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            principal_cache: RegionSettings::default(),
            org_unit_cache: default_org_unit_cache(),
            org_unit_mode: OrgUnitMode::Purge,
            purge_time: None,
            backend_refresh_enabled: true,
            directory_refresh_period: None,
            paging_size: default_paging_size(),
            retry: RetryPolicy::default(),
            null_string: None,
            correlation_key: default_correlation_key(),
            org_unit_key_attribute: default_org_unit_key_attribute(),
            refresh_wait_timeout_ms: default_refresh_wait_timeout_ms(),
            refresh_poll_interval_ms: default_refresh_poll_interval_ms(),
            profile_names: Vec::new(),
        }
    }
}

impl ResolverConfig {
    /// Build the configuration from host properties
    pub fn from_properties(props: &Properties) -> Self {
        let defaults = Self::default();

        let heap_mb = parse_or(props, "cache_heap_in_mb", default_heap_mb());
        let max_objects = parse_or(props, "cache_max_object", default_max_objects());

        let principal_cache = RegionSettings {
            heap_mb,
            max_objects,
            ttl: property(props, "user_time_to_live")
                .map(TimeToLive::parse)
                .unwrap_or_default(),
        };

        let org_unit_mode = match property(props, "aor_expired_mode") {
            None => OrgUnitMode::Purge,
            Some(mode) if mode.eq_ignore_ascii_case("purge") => OrgUnitMode::Purge,
            Some(_) => OrgUnitMode::Ttl,
        };

        let org_unit_ttl = match org_unit_mode {
            OrgUnitMode::Purge => TimeToLive::Infinite,
            OrgUnitMode::Ttl => property(props, "aor_time_to_live")
                .map(TimeToLive::parse)
                .unwrap_or_default(),
        };

        let org_unit_cache = RegionSettings {
            heap_mb: parse_or(props, "aor_cache_heap_in_mb", heap_mb),
            max_objects: parse_or(props, "aor_cache_max_object", max_objects),
            ttl: org_unit_ttl,
        };

        let purge_time = property(props, "aor_purge_time").and_then(|raw| {
            NaiveTime::parse_from_str(raw, "%H:%M")
                .map_err(|e| warn!("Invalid aor_purge_time '{}': {}, firing immediately", raw, e))
                .ok()
        });

        let directory_refresh_period = property(props, "cache_refresh_period").and_then(|raw| {
            if raw == "0" {
                None
            } else {
                TimeToLive::parse(raw).as_duration()
            }
        });

        let retry = RetryPolicy {
            retries: parse_or(props, "number_of_retries", default_retries()),
            interval_secs: parse_or(props, "interval_between_retries", default_retry_interval_secs()),
        };

        let profile_names = property(props, "profile_names")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            principal_cache,
            org_unit_cache,
            org_unit_mode,
            purge_time,
            backend_refresh_enabled: property(props, "aor_refresh")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(true),
            directory_refresh_period,
            paging_size: parse_or(props, "paging_size", defaults.paging_size),
            retry,
            null_string: property(props, "null_string").map(str::to_string),
            correlation_key: property(props, "correlation_key")
                .map(str::to_lowercase)
                .unwrap_or(defaults.correlation_key),
            org_unit_key_attribute: property(props, "aor_key_attribute")
                .map(str::to_lowercase)
                .unwrap_or(defaults.org_unit_key_attribute),
            refresh_wait_timeout_ms: parse_or(
                props,
                "refresh_wait_timeout_ms",
                defaults.refresh_wait_timeout_ms,
            ),
            refresh_poll_interval_ms: parse_or(
                props,
                "refresh_poll_interval_ms",
                defaults.refresh_poll_interval_ms,
            ),
            profile_names,
        }
    }

    pub fn refresh_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_wait_timeout_ms)
    }

    pub fn refresh_poll_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_poll_interval_ms)
    }
}

/// Non-blank property value, trimmed
pub(crate) fn property<'a>(props: &'a Properties, key: &str) -> Option<&'a str> {
    props
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: FromStr>(props: &Properties, key: &str, default: T) -> T {
    match property(props, key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            error!("Invalid value '{}' for {}, using default", raw, key);
            default
        }),
    }
}

fn default_heap_mb() -> usize {
    128
}

fn default_max_objects() -> usize {
    5000
}

fn default_org_unit_cache() -> RegionSettings {
    RegionSettings {
        ttl: TimeToLive::Infinite,
        ..Default::default()
    }
}

fn default_true() -> bool {
    true
}

fn default_paging_size() -> u32 {
    1000
}

fn default_retries() -> u32 {
    3
}

fn default_retry_interval_secs() -> u64 {
    30
}

fn default_correlation_key() -> String {
    "employeenumber".to_string()
}

fn default_org_unit_key_attribute() -> String {
    "ammoarea".to_string()
}

fn default_refresh_wait_timeout_ms() -> u64 {
    60_000
}

fn default_refresh_poll_interval_ms() -> u64 {
    20
}
