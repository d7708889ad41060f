//! Enterprise backend profile

use attrbridge_core::Properties;
use serde::{Deserialize, Serialize};

use super::specifier::{parse_pull_attributes, PullAttributes};
use crate::config::property;
use crate::error::ProfileError;

/// A validated backend profile, named after its server prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendProfile {
    pub server_prefix: String,
    pub handler: String,
    pub pull_attributes: PullAttributes,
}

impl BackendProfile {
    /// Parse the unprefixed `sap_*` / `aor_*` properties
    pub fn parse(props: &Properties) -> Result<Self, ProfileError> {
        let server_prefix = property(props, "sap_server_prefix")
            .ok_or_else(|| ProfileError::missing("backend", "sap_server_prefix"))?
            .to_string();
        let handler = property(props, "sap_handler")
            .ok_or_else(|| ProfileError::missing(&server_prefix, "sap_handler"))?
            .to_string();
        let raw_pulls = property(props, "aor_attributes_to_pull")
            .ok_or_else(|| ProfileError::missing(&server_prefix, "aor_attributes_to_pull"))?;

        Ok(Self {
            pull_attributes: parse_pull_attributes(&server_prefix, "aor_attributes_to_pull", raw_pulls),
            server_prefix,
            handler,
        })
    }

    pub fn name(&self) -> &str {
        &self.server_prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_backend_profile() {
        let profile = BackendProfile::parse(&props(&[
            ("sap_server_prefix", "SERV1_"),
            ("sap_handler", "Z_GET_AOR_DETAILS"),
            ("aor_attributes_to_pull", "multi:sloc,multi:whnum,multi:fe"),
        ]))
        .unwrap();

        assert_eq!(profile.name(), "SERV1_");
        assert_eq!(profile.handler, "Z_GET_AOR_DETAILS");
        assert!(profile.pull_attributes.contains("WHNUM"));
        assert!(!profile.pull_attributes.contains("bizpn"));
    }

    #[test]
    fn test_missing_handler() {
        let err = BackendProfile::parse(&props(&[("sap_server_prefix", "SERV1_")])).unwrap_err();
        assert_eq!(err, ProfileError::missing("SERV1_", "sap_handler"));
    }

    #[test]
    fn test_missing_prefix_checked_first() {
        let err = BackendProfile::parse(&props(&[("sap_handler", "Z_GET")])).unwrap_err();
        assert_eq!(err.field(), "sap_server_prefix");
    }
}
