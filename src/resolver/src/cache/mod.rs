//! Two-region attribute cache
//!
//! Principal and group records live in the principal region under their
//! combined identifier; organizational-unit records live in their own region
//! under their natural id. The alias index maps raw key values to combined
//! identifiers.

mod alias;
mod region;

pub use alias::AliasIndex;
pub use region::{Cacheable, RegionCache};

use tracing::{debug, error, info, warn};

use crate::config::ResolverConfig;
use crate::record::{DirectoryRecord, OrgUnitRecord, RecordKind};

/// Cache region selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheRegion {
    Principal,
    OrgUnit,
}

impl CacheRegion {
    pub fn name(&self) -> &'static str {
        match self {
            CacheRegion::Principal => "principal",
            CacheRegion::OrgUnit => "org_unit",
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub evictions: usize,
    pub entries: usize,
    pub max_entries: usize,
    pub approx_bytes: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Attribute cache shared by the pipelines and the orchestrator
pub struct CacheStore {
    principals: Option<RegionCache<DirectoryRecord>>,
    org_units: Option<RegionCache<OrgUnitRecord>>,
    aliases: AliasIndex,
}

impl CacheStore {
    /// Create both regions from the resolver configuration
    pub fn new(config: &ResolverConfig) -> Self {
        info!(
            "Initializing cache: principal {:?}, org unit {:?}",
            config.principal_cache, config.org_unit_cache
        );
        Self {
            principals: Some(RegionCache::new(
                CacheRegion::Principal.name(),
                config.principal_cache,
            )),
            org_units: Some(RegionCache::new(
                CacheRegion::OrgUnit.name(),
                config.org_unit_cache,
            )),
            aliases: AliasIndex::new(),
        }
    }

    /// Store with no regions; every lookup is a logged miss
    pub fn uninitialized() -> Self {
        Self {
            principals: None,
            org_units: None,
            aliases: AliasIndex::new(),
        }
    }

    pub fn is_initialized(&self, region: CacheRegion) -> bool {
        match region {
            CacheRegion::Principal => self.principals.is_some(),
            CacheRegion::OrgUnit => self.org_units.is_some(),
        }
    }

    /// Store a principal or group record under its combined identifier
    pub fn put_principal(&self, record: DirectoryRecord) {
        if let Some(region) = self.principal_region() {
            region.put(record.id.clone(), record);
        }
    }

    /// Store an organizational-unit record under its natural id
    pub fn put_org_unit(&self, record: OrgUnitRecord) {
        if let Some(region) = self.org_unit_region() {
            region.put(record.id.clone(), record);
        }
    }

    pub fn get_principal(&self, combined_id: &str) -> Option<DirectoryRecord> {
        self.principal_region()?.get(combined_id)
    }

    pub fn get_org_unit(&self, id: &str) -> Option<OrgUnitRecord> {
        self.org_unit_region()?.get(id)
    }

    /// Resolve an alias and fetch the record it points to
    pub fn get_principal_by_alias(&self, alias: &str) -> Option<DirectoryRecord> {
        let combined_id = self.aliases.resolve(alias)?;
        let record = self.get_principal(&combined_id);
        if record.is_none() {
            debug!("Alias {} points to missing record {}", alias, combined_id);
        }
        record
    }

    /// Remove a principal record by alias or combined identifier.
    ///
    /// The alias itself stays in the index.
    pub fn remove_principal(&self, key: &str) -> bool {
        let Some(region) = self.principal_region() else {
            return false;
        };

        let combined_id = match self.aliases.resolve(key) {
            Some(id) => id,
            None if region.contains(key) => key.to_string(),
            None => {
                warn!("No cached record for {}, nothing removed", key);
                return false;
            }
        };
        region.remove(&combined_id)
    }

    pub fn remove_org_unit(&self, id: &str) -> bool {
        self.org_unit_region().map_or(false, |region| region.remove(id))
    }

    /// Purge a whole region; aliases are kept
    pub fn clear(&self, region: CacheRegion) {
        match region {
            CacheRegion::Principal => {
                if let Some(r) = self.principal_region() {
                    r.clear();
                }
            }
            CacheRegion::OrgUnit => {
                if let Some(r) = self.org_unit_region() {
                    r.clear();
                }
            }
        }
        info!("Cleared {} cache region", region.name());
    }

    pub fn add_alias(&self, alias: impl Into<String>, combined_id: impl Into<String>, kind: RecordKind) {
        let alias = alias.into();
        let combined_id = combined_id.into();
        debug!("Alias {} -> {}", alias, combined_id);
        self.aliases.insert(alias, combined_id, kind);
    }

    pub fn resolve_alias(&self, alias: &str) -> Option<String> {
        self.aliases.resolve(alias)
    }

    /// Object class the alias was last seen on
    pub fn alias_kind(&self, alias: &str) -> Option<RecordKind> {
        self.aliases.kind_of(alias)
    }

    /// Number of aliases ever recorded
    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    pub fn len(&self, region: CacheRegion) -> usize {
        match region {
            CacheRegion::Principal => self.principals.as_ref().map_or(0, |r| r.len()),
            CacheRegion::OrgUnit => self.org_units.as_ref().map_or(0, |r| r.len()),
        }
    }

    pub fn stats(&self, region: CacheRegion) -> CacheStats {
        match region {
            CacheRegion::Principal => self.principals.as_ref().map(|r| r.stats()),
            CacheRegion::OrgUnit => self.org_units.as_ref().map(|r| r.stats()),
        }
        .unwrap_or_default()
    }

    /// Log every cached key and alias
    pub fn log_contents(&self) {
        if let Some(region) = &self.principals {
            for key in region.keys() {
                info!("principal: {}", key);
            }
        }
        if let Some(region) = &self.org_units {
            for key in region.keys() {
                info!("org_unit: {}", key);
            }
        }
        for (alias, combined_id) in self.aliases.entries() {
            info!("alias: {} -> {}", alias, combined_id);
        }
    }

    fn principal_region(&self) -> Option<&RegionCache<DirectoryRecord>> {
        if self.principals.is_none() {
            error!("Principal cache region is not initialized");
        }
        self.principals.as_ref()
    }

    fn org_unit_region(&self) -> Option<&RegionCache<OrgUnitRecord>> {
        if self.org_units.is_none() {
            error!("Organizational-unit cache region is not initialized");
        }
        self.org_units.as_ref()
    }
}
