//! Directory and backend profiles
//!
//! A profile is either fully valid or rejected at load time; invalid profiles
//! are logged and excluded while their siblings load normally.

mod backend;
mod directory;
mod specifier;

pub use backend::BackendProfile;
pub use directory::{DirectoryProfile, ObjectClassConfig};
pub use specifier::{
    parse_key_attributes, parse_pull_attributes, Cardinality, KeyAttribute, PullAttribute,
    PullAttributes,
};

use attrbridge_core::Properties;
use std::sync::Arc;
use tracing::{error, info};

use crate::record::RecordKind;

/// Profile name used when no `profile_names` list is configured
pub const DEFAULT_PROFILE_NAME: &str = "DOMAIN_1";

/// The valid directory profiles, in configuration order
#[derive(Debug, Clone, Default)]
pub struct DirectoryProfiles {
    profiles: Vec<Arc<DirectoryProfile>>,
    multi_domain: bool,
}

impl DirectoryProfiles {
    /// Load every configured profile.
    ///
    /// With an empty `names` list a single `DOMAIN_1` profile is loaded.
    pub fn load(props: &Properties, names: &[String]) -> Self {
        let multi_domain = !names.is_empty();
        let names: Vec<&str> = if multi_domain {
            names.iter().map(String::as_str).collect()
        } else {
            vec![DEFAULT_PROFILE_NAME]
        };

        let profiles = names
            .into_iter()
            .filter_map(|name| match DirectoryProfile::parse(name, props) {
                Ok(profile) => {
                    info!("Loaded directory profile {} ({})", name, profile.url());
                    Some(Arc::new(profile))
                }
                Err(e) => {
                    error!("Directory profile {} rejected: {}", name, e);
                    None
                }
            })
            .collect();

        Self {
            profiles,
            multi_domain,
        }
    }

    pub fn from_profiles(profiles: Vec<DirectoryProfile>) -> Self {
        Self {
            multi_domain: profiles.len() > 1,
            profiles: profiles.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<DirectoryProfile>> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DirectoryProfile>> {
        self.profiles.iter()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn is_multi_domain(&self) -> bool {
        self.multi_domain
    }

    /// Profiles to query for `attribute` on a record of `kind`.
    ///
    /// In single-domain mode the one profile is always returned; otherwise only
    /// the profiles pulling the attribute, in configuration order.
    pub fn providers_of(&self, attribute: &str, kind: RecordKind) -> Vec<Arc<DirectoryProfile>> {
        if !self.multi_domain {
            return self.profiles.clone();
        }
        self.profiles
            .iter()
            .filter(|p| {
                p.object_class(kind)
                    .map_or(false, |class| class.pull_attributes.contains(attribute))
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain_props(name: &str, pulls: &str) -> Vec<(String, String)> {
        [
            ("host", "dc.local"),
            ("port", "389"),
            ("authentication", "none"),
            ("user_search_base", "dc=local"),
            ("user_filter", "objectClass=person"),
            ("user_key_attributes", "cs:uid"),
            ("user_attributes_to_pull", pulls),
        ]
        .into_iter()
        .map(|(k, v)| (format!("{name}_{k}"), v.to_string()))
        .collect()
    }

    #[test]
    fn test_single_domain_default_name() {
        let props: Properties = domain_props("DOMAIN_1", "multi:mail").into_iter().collect();
        let profiles = DirectoryProfiles::load(&props, &[]);

        assert_eq!(profiles.len(), 1);
        assert!(!profiles.is_multi_domain());
        assert!(profiles.get(DEFAULT_PROFILE_NAME).is_some());
        // single-domain mode ignores pull sets when routing queries
        assert_eq!(profiles.providers_of("phone", RecordKind::Principal).len(), 1);
    }

    #[test]
    fn test_invalid_sibling_is_excluded() {
        let mut props: Properties = domain_props("CORP", "multi:mail").into_iter().collect();
        props.extend(domain_props("LAB", "single:phone"));
        props.extend(domain_props("BROKEN", "single:phone"));
        props.remove("BROKEN_port");

        let names = vec!["CORP".to_string(), "BROKEN".to_string(), "LAB".to_string()];
        let profiles = DirectoryProfiles::load(&props, &names);

        assert_eq!(profiles.len(), 2);
        assert!(profiles.get("BROKEN").is_none());

        let providers = profiles.providers_of("PHONE", RecordKind::Principal);
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name, "LAB");
        assert!(profiles.providers_of("phone", RecordKind::Group).is_empty());
    }
}
