//! Attribute source routing

use std::collections::{HashMap, HashSet};

use crate::profile::{BackendProfile, DirectoryProfiles};
use crate::record::{DirectoryRecord, RecordKind};

/// Where a requested attribute is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeSource {
    /// Read off the principal's directory record
    Directory,
    /// Composed from the principal's organizational units
    Backend,
    Unknown,
}

/// Attribute names each source provides, lower-cased, built once at load
#[derive(Debug, Clone, Default)]
pub struct AttributeRoutes {
    directory: HashMap<(String, RecordKind), HashSet<String>>,
    backend: HashSet<String>,
}

impl AttributeRoutes {
    pub fn build(profiles: &DirectoryProfiles, backend: Option<&BackendProfile>) -> Self {
        let mut directory = HashMap::new();
        for profile in profiles.iter() {
            let classes = [
                (RecordKind::Principal, Some(&profile.users)),
                (RecordKind::Group, profile.groups.as_ref()),
            ];
            for (kind, class) in classes {
                let Some(class) = class else { continue };
                let names = class
                    .pull_attributes
                    .names()
                    .map(str::to_lowercase)
                    .collect::<HashSet<_>>();
                directory.insert((profile.name.clone(), kind), names);
            }
        }

        let backend = backend
            .map(|b| b.pull_attributes.names().map(str::to_lowercase).collect())
            .unwrap_or_default();

        Self { directory, backend }
    }

    /// Route `attribute` for a record; the record's own profile wins over the backend
    pub fn route(&self, record: &DirectoryRecord, attribute: &str) -> AttributeSource {
        let attribute = attribute.to_lowercase();
        let pulled_by_profile = self
            .directory
            .get(&(record.domain.clone(), record.kind))
            .map_or(false, |names| names.contains(&attribute));

        if pulled_by_profile {
            AttributeSource::Directory
        } else if self.backend.contains(&attribute) {
            AttributeSource::Backend
        } else {
            AttributeSource::Unknown
        }
    }

    pub fn is_backend_attribute(&self, attribute: &str) -> bool {
        self.backend.contains(&attribute.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attrbridge_core::Properties;

    fn properties() -> Properties {
        [
            ("DOMAIN_1_host", "dc.local"),
            ("DOMAIN_1_port", "389"),
            ("DOMAIN_1_authentication", "none"),
            ("DOMAIN_1_user_search_base", "dc=local"),
            ("DOMAIN_1_user_filter", "objectClass=person"),
            ("DOMAIN_1_user_key_attributes", "cs:uid"),
            ("DOMAIN_1_user_attributes_to_pull", "multi:mail,single:cn"),
            ("sap_server_prefix", "SERV1_"),
            ("sap_handler", "Z_AOR"),
            ("aor_attributes_to_pull", "multi:sloc,multi:whnum"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_routes_by_record_profile() {
        let props = properties();
        let profiles = DirectoryProfiles::load(&props, &[]);
        let backend = BackendProfile::parse(&props).ok();
        let routes = AttributeRoutes::build(&profiles, backend.as_ref());

        let record = DirectoryRecord::new("DOMAIN_1", "DOMAIN_1#jake", RecordKind::Principal);
        assert_eq!(routes.route(&record, "MAIL"), AttributeSource::Directory);
        assert_eq!(routes.route(&record, "sloc"), AttributeSource::Backend);
        assert_eq!(routes.route(&record, "title"), AttributeSource::Unknown);

        // No group class configured, so group records never route to the directory
        let group = DirectoryRecord::new("DOMAIN_1", "DOMAIN_1#admins", RecordKind::Group);
        assert_eq!(routes.route(&group, "mail"), AttributeSource::Unknown);
    }

    #[test]
    fn test_routes_without_backend() {
        let props = properties();
        let profiles = DirectoryProfiles::load(&props, &[]);
        let routes = AttributeRoutes::build(&profiles, None);

        assert!(!routes.is_backend_attribute("sloc"));
        let record = DirectoryRecord::new("DOMAIN_1", "DOMAIN_1#jake", RecordKind::Principal);
        assert_eq!(routes.route(&record, "sloc"), AttributeSource::Unknown);
    }
}
