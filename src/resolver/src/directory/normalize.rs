//! Directory entry to cache record conversion

use attrbridge_core::{AttributeData, AttributeValue, DirectoryEntry, Result};

use super::sid::{decode_sid, OBJECT_SID};
use crate::profile::{Cardinality, ObjectClassConfig};
use crate::record::{combined_id, DirectoryRecord, RecordKind, UNDEFINED_KEY};

/// A normalized record and the aliases that should point to it
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEntry {
    pub record: DirectoryRecord,
    pub aliases: Vec<String>,
}

/// Build the cache record for one search result.
///
/// Fails only when a binary identifier cannot be decoded; the caller skips
/// that entry.
pub fn normalize_entry(
    profile: &str,
    class: &ObjectClassConfig,
    kind: RecordKind,
    entry: &DirectoryEntry,
) -> Result<NormalizedEntry> {
    let mut key_values = Vec::with_capacity(class.key_attributes.len());
    let mut present_keys = Vec::with_capacity(class.key_attributes.len());

    for key in &class.key_attributes {
        match entry.first(&key.name) {
            Some(data) => {
                let value = key.normalize(&attribute_text(&key.name, data)?);
                key_values.push(value.clone());
                present_keys.push((key.name.as_str(), value));
            }
            None => key_values.push(UNDEFINED_KEY.to_string()),
        }
    }

    let mut record = DirectoryRecord::new(profile, combined_id(profile, key_values), kind);

    for attribute in class.pull_attributes.iter() {
        let values = entry.values(&attribute.name);
        let value = match attribute.cardinality {
            Cardinality::Multi => AttributeValue::Multi(
                values
                    .iter()
                    .map(|data| attribute_text(&attribute.name, data))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Cardinality::Single => match values.first() {
                Some(data) => AttributeValue::Single(attribute_text(&attribute.name, data)?),
                None => AttributeValue::Null,
            },
        };
        record.insert(&attribute.name, value);
    }

    // key attributes win over a pull attribute of the same name
    for (name, value) in &present_keys {
        record.insert(name, AttributeValue::Single(value.clone()));
    }

    let aliases = present_keys.into_iter().map(|(_, value)| value).collect();
    Ok(NormalizedEntry { record, aliases })
}

/// Text form of a value, decoding binary security identifiers
fn attribute_text(name: &str, data: &AttributeData) -> Result<String> {
    match data {
        AttributeData::Binary(bytes) if name.eq_ignore_ascii_case(OBJECT_SID) => decode_sid(bytes),
        other => Ok(other.to_text()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::sid::encode_sid;
    use crate::profile::{parse_key_attributes, parse_pull_attributes};

    fn users(keys: &str, pulls: &str) -> ObjectClassConfig {
        ObjectClassConfig {
            search_bases: vec!["dc=corp".into()],
            filter: "objectClass=person".into(),
            key_attributes: parse_key_attributes("CORP", "keys", keys),
            pull_attributes: parse_pull_attributes("CORP", "pulls", pulls),
        }
    }

    #[test]
    fn test_normalize_user() {
        let class = users("cs:uid,ci:mail", "multi:mail,single:cn,multi:memberOf,single:phone");
        let entry = DirectoryEntry::new("uid=Jake,dc=corp")
            .with_attribute("uid", "Jake")
            .with_values("mail", ["Jake@X", "jake2@x"])
            .with_attribute("cn", "Jake Peralta");

        let normalized = normalize_entry("CORP", &class, RecordKind::Principal, &entry).unwrap();
        let record = &normalized.record;

        assert_eq!(record.id, "CORP#Jake#jake@x");
        assert_eq!(record.domain, "CORP");
        assert_eq!(normalized.aliases, vec!["Jake", "jake@x"]);
        assert_eq!(record.attribute("uid"), Some(&AttributeValue::Single("Jake".into())));
        // the key value replaces the pulled multivalue
        assert_eq!(record.attribute("mail"), Some(&AttributeValue::Single("jake@x".into())));
        assert_eq!(
            record.attribute("cn"),
            Some(&AttributeValue::Single("Jake Peralta".into()))
        );
        assert_eq!(record.attribute("memberof"), Some(&AttributeValue::empty_multi()));
        assert_eq!(record.attribute("phone"), Some(&AttributeValue::Null));
    }

    #[test]
    fn test_missing_key_is_undefined() {
        let class = users("cs:uid,ci:employeeNumber", "multi:mail");
        let entry = DirectoryEntry::new("uid=amy").with_attribute("uid", "amy");

        let normalized = normalize_entry("CORP", &class, RecordKind::Principal, &entry).unwrap();
        assert_eq!(normalized.record.id, "CORP#UNDEFINED#amy");
        assert_eq!(normalized.aliases, vec!["amy"]);
    }

    #[test]
    fn test_object_sid_key_is_decoded() {
        let class = users("cs:objectSid", "single:cn");
        let entry = DirectoryEntry::new("cn=rosa")
            .with_attribute("objectSid", encode_sid(5, &[21, 1, 2, 3, 1104]))
            .with_attribute("cn", "rosa");

        let normalized = normalize_entry("CORP", &class, RecordKind::Group, &entry).unwrap();
        assert_eq!(normalized.record.id, "CORP#S-1-5-21-1-2-3-1104");
        assert_eq!(normalized.record.kind, RecordKind::Group);
        assert_eq!(
            normalized.record.attribute("objectsid"),
            Some(&AttributeValue::Single("S-1-5-21-1-2-3-1104".into()))
        );
    }

    #[test]
    fn test_bad_sid_fails_entry() {
        let class = users("cs:objectSid", "single:cn");
        let entry = DirectoryEntry::new("cn=bad").with_attribute("objectSid", vec![9u8, 0, 0]);

        assert!(normalize_entry("CORP", &class, RecordKind::Principal, &entry).is_err());
    }
}
