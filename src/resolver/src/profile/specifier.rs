//! `qualifier:attributeName` specifier lists

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A key attribute and whether its values keep their case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAttribute {
    pub name: String,
    pub case_sensitive: bool,
}

impl KeyAttribute {
    /// Normalize a raw value the way the combined identifier expects
    pub fn normalize(&self, value: &str) -> String {
        if self.case_sensitive {
            value.to_string()
        } else {
            value.to_lowercase()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    Single,
    Multi,
}

/// An attribute pulled from a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullAttribute {
    pub name: String,
    pub cardinality: Cardinality,
}

/// Pull attributes with case-insensitive membership.
///
/// A name listed twice keeps its first position and its last cardinality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullAttributes {
    attributes: Vec<PullAttribute>,
}

impl PullAttributes {
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&PullAttribute> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PullAttribute> {
        self.attributes.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    fn insert(&mut self, attribute: PullAttribute) {
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name.eq_ignore_ascii_case(&attribute.name))
        {
            Some(existing) => existing.cardinality = attribute.cardinality,
            None => self.attributes.push(attribute),
        }
    }
}

impl FromIterator<PullAttribute> for PullAttributes {
    fn from_iter<I: IntoIterator<Item = PullAttribute>>(iter: I) -> Self {
        let mut set = PullAttributes::default();
        for attribute in iter {
            set.insert(attribute);
        }
        set
    }
}

/// Parse `cs:uid,ci:mail`. Any qualifier other than `cs` is case-insensitive.
pub fn parse_key_attributes(domain: &str, field: &str, raw: &str) -> Vec<KeyAttribute> {
    split_specifiers(domain, field, raw)
        .map(|(qualifier, name)| KeyAttribute {
            name: name.to_string(),
            case_sensitive: qualifier == "cs",
        })
        .collect()
}

/// Parse `multi:mail,single:cn`. Any qualifier other than `multi` is single.
pub fn parse_pull_attributes(domain: &str, field: &str, raw: &str) -> PullAttributes {
    split_specifiers(domain, field, raw)
        .map(|(qualifier, name)| PullAttribute {
            name: name.to_string(),
            cardinality: if qualifier == "multi" {
                Cardinality::Multi
            } else {
                Cardinality::Single
            },
        })
        .collect()
}

fn split_specifiers<'a>(
    domain: &'a str,
    field: &'a str,
    raw: &'a str,
) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
    raw.split(',').filter_map(move |specifier| {
        let parts: Vec<&str> = specifier.trim().split(':').collect();
        match parts.as_slice() {
            &[qualifier, name] if !name.trim().is_empty() => Some((qualifier, name.trim())),
            _ => {
                warn!(
                    "{}: skipping malformed specifier '{}' in {}",
                    domain,
                    specifier.trim(),
                    field
                );
                None
            }
        }
    })
}
