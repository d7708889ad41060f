//! Directory search types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raw attribute data as returned by the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeData {
    Text(String),
    Binary(Vec<u8>),
}

impl AttributeData {
    /// Text view, lossy for binary payloads
    pub fn to_text(&self) -> String {
        match self {
            AttributeData::Text(s) => s.clone(),
            AttributeData::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AttributeData::Text(s) => s.as_bytes(),
            AttributeData::Binary(bytes) => bytes,
        }
    }
}

impl From<&str> for AttributeData {
    fn from(value: &str) -> Self {
        AttributeData::Text(value.to_string())
    }
}

impl From<String> for AttributeData {
    fn from(value: String) -> Self {
        AttributeData::Text(value)
    }
}

impl From<Vec<u8>> for AttributeData {
    fn from(value: Vec<u8>) -> Self {
        AttributeData::Binary(value)
    }
}

/// One entry returned by a directory search.
///
/// Attribute names are matched case-insensitively, like the directory does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Distinguished name
    pub dn: String,

    /// Attribute values keyed by lower-cased attribute name
    attributes: HashMap<String, Vec<AttributeData>>,
}

impl DirectoryEntry {
    /// Create an empty entry
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    /// Add a single text value
    pub fn with_attribute(mut self, name: &str, value: impl Into<AttributeData>) -> Self {
        self.push(name, value.into());
        self
    }

    /// Add several values for one attribute
    pub fn with_values<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeData>,
    {
        for value in values {
            self.push(name, value.into());
        }
        self
    }

    /// Append a value to an attribute
    pub fn push(&mut self, name: &str, value: AttributeData) {
        self.attributes
            .entry(name.to_lowercase())
            .or_default()
            .push(value);
    }

    /// All values of an attribute, empty when absent
    pub fn values(&self, name: &str) -> &[AttributeData] {
        self.attributes
            .get(&name.to_lowercase())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// First value of an attribute
    pub fn first(&self, name: &str) -> Option<&AttributeData> {
        self.values(name).first()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        !self.values(name).is_empty()
    }

    /// Iterate `(lower-cased name, values)` pairs
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &[AttributeData])> {
        self.attributes
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }
}

/// One page of a paged search
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub entries: Vec<DirectoryEntry>,

    /// Continuation cookie, `None` or empty when the search is complete
    pub cookie: Option<Vec<u8>>,

    /// Server-estimated result size, when the server reports one
    pub total: Option<u32>,
}

impl SearchPage {
    /// Whether another page should be requested
    pub fn has_more(&self) -> bool {
        self.cookie.as_ref().map_or(false, |c| !c.is_empty())
    }
}

/// Connection parameters derived from a directory profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Profile (domain) name
    pub domain: String,

    /// `ldap://host:port/` or `ldaps://host:port/`
    pub url: String,

    pub use_tls: bool,

    /// Authentication mechanism, e.g. `simple` or `none`
    pub authentication: String,

    pub bind_dn: Option<String>,

    /// Credential exactly as configured; decryption is up to the client
    pub encrypted_password: Option<String>,
}
