//! Directory domain profile

use attrbridge_core::{ConnectionSettings, Properties};
use serde::{Deserialize, Serialize};

use super::specifier::{parse_key_attributes, parse_pull_attributes, KeyAttribute, PullAttributes};
use crate::config::property;
use crate::error::ProfileError;
use crate::record::RecordKind;

/// Search settings for one object class (principals or groups)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectClassConfig {
    pub search_bases: Vec<String>,
    pub filter: String,
    pub key_attributes: Vec<KeyAttribute>,
    pub pull_attributes: PullAttributes,
}

impl ObjectClassConfig {
    /// Attributes requested from the directory: keys first, then pulls
    pub fn requested_attributes(&self) -> Vec<String> {
        let mut attributes: Vec<String> = Vec::new();
        let names = self
            .key_attributes
            .iter()
            .map(|k| k.name.as_str())
            .chain(self.pull_attributes.names());
        for name in names {
            if !attributes.iter().any(|a| a.eq_ignore_ascii_case(name)) {
                attributes.push(name.to_string());
            }
        }
        attributes
    }
}

/// A validated directory domain profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryProfile {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub authentication: String,
    pub username: Option<String>,
    /// Credential as configured; decryption belongs to the directory client
    #[serde(skip_serializing)]
    pub encrypted_password: Option<String>,
    pub include_disabled_accounts: bool,
    pub users: ObjectClassConfig,
    pub groups: Option<ObjectClassConfig>,
}

impl DirectoryProfile {
    /// Parse `<name>_<field>` properties.
    ///
    /// Fields are checked in a fixed order and the first missing or invalid
    /// one rejects the whole profile.
    pub fn parse(name: &str, props: &Properties) -> Result<Self, ProfileError> {
        let reader = PrefixedProperties { name, props };

        let host = reader.required("host")?.to_string();
        let port = reader
            .required("port")?
            .parse::<u16>()
            .map_err(|e| ProfileError::invalid(name, "port", e.to_string()))?;
        let authentication = reader.required("authentication")?.to_string();

        let (username, encrypted_password) = if authentication.eq_ignore_ascii_case("simple") {
            (
                Some(reader.required("username")?.to_string()),
                Some(reader.required("password")?.to_string()),
            )
        } else {
            (None, None)
        };

        let use_tls = reader.optional("ssl") == Some("true");
        let include_disabled_accounts = reader.optional("get_disabled_accounts") == Some("true");

        let users = reader.object_class("user")?;
        let groups = match reader.optional("group_search_base") {
            Some(_) => Some(reader.object_class("group")?),
            None => None,
        };

        Ok(Self {
            name: name.to_string(),
            host,
            port,
            use_tls,
            authentication,
            username,
            encrypted_password,
            include_disabled_accounts,
            users,
            groups,
        })
    }

    /// `ldap://host:port/`, or `ldaps://` when TLS is enabled
    pub fn url(&self) -> String {
        let scheme = if self.use_tls { "ldaps" } else { "ldap" };
        format!("{}://{}:{}/", scheme, self.host, self.port)
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            domain: self.name.clone(),
            url: self.url(),
            use_tls: self.use_tls,
            authentication: self.authentication.clone(),
            bind_dn: self.username.clone(),
            encrypted_password: self.encrypted_password.clone(),
        }
    }

    /// Search settings for an object class, `None` for groups when not configured
    pub fn object_class(&self, kind: RecordKind) -> Option<&ObjectClassConfig> {
        match kind {
            RecordKind::Principal => Some(&self.users),
            RecordKind::Group => self.groups.as_ref(),
        }
    }
}

struct PrefixedProperties<'a> {
    name: &'a str,
    props: &'a Properties,
}

impl<'a> PrefixedProperties<'a> {
    fn optional(&self, field: &str) -> Option<&'a str> {
        property(self.props, &format!("{}_{}", self.name, field))
    }

    fn required(&self, field: &str) -> Result<&'a str, ProfileError> {
        self.optional(field)
            .ok_or_else(|| ProfileError::missing(self.name, field))
    }

    fn object_class(&self, prefix: &str) -> Result<ObjectClassConfig, ProfileError> {
        let bases_field = format!("{prefix}_search_base");
        let search_bases: Vec<String> = self
            .required(&bases_field)?
            .split(';')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
            .collect();
        if search_bases.is_empty() {
            return Err(ProfileError::missing(self.name, &bases_field));
        }

        let filter = self.required(&format!("{prefix}_filter"))?.to_string();

        let keys_field = format!("{prefix}_key_attributes");
        let key_attributes = parse_key_attributes(self.name, &keys_field, self.required(&keys_field)?);

        let pulls_field = format!("{prefix}_attributes_to_pull");
        let pull_attributes =
            parse_pull_attributes(self.name, &pulls_field, self.required(&pulls_field)?);

        Ok(ObjectClassConfig {
            search_bases,
            filter,
            key_attributes,
            pull_attributes,
        })
    }
}
