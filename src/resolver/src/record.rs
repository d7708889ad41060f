//! Cached record types

use attrbridge_core::AttributeValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key value used when an entry lacks one of its key attributes
pub const UNDEFINED_KEY: &str = "UNDEFINED";

const COMBINED_ID_SEPARATOR: char = '#';

/// Build the cache key of a directory record.
///
/// Values are sorted first so the same key-value set always produces the same
/// identifier, whatever order the directory returned them in.
pub fn combined_id(profile: &str, mut values: Vec<String>) -> String {
    values.sort();

    let mut id = String::with_capacity(
        profile.len() + values.iter().map(|v| v.len() + 1).sum::<usize>(),
    );
    id.push_str(profile);
    for value in &values {
        id.push(COMBINED_ID_SEPARATOR);
        id.push_str(value);
    }
    id
}

/// Profile name prefix of a combined identifier
pub fn profile_of(combined_id: &str) -> &str {
    combined_id
        .split_once(COMBINED_ID_SEPARATOR)
        .map_or(combined_id, |(profile, _)| profile)
}

/// Directory object class a record was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Principal,
    Group,
}

/// A principal or group read from a directory domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    /// Owning profile name
    pub domain: String,

    /// Combined identifier
    pub id: String,

    pub kind: RecordKind,

    /// Values keyed by lower-cased attribute name
    attributes: HashMap<String, AttributeValue>,
}

impl DirectoryRecord {
    pub fn new(domain: impl Into<String>, id: impl Into<String>, kind: RecordKind) -> Self {
        Self {
            domain: domain.into(),
            id: id.into(),
            kind,
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.insert(name, value.into());
        self
    }

    pub fn insert(&mut self, name: &str, value: AttributeValue) {
        self.attributes.insert(name.to_lowercase(), value);
    }

    /// Case-insensitive attribute lookup
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(&name.to_lowercase())
    }

    pub fn attributes(&self) -> &HashMap<String, AttributeValue> {
        &self.attributes
    }

    /// Rough heap footprint used for the region memory budget
    pub fn approx_size(&self) -> usize {
        self.domain.len()
            + self.id.len()
            + self
                .attributes
                .iter()
                .map(|(k, v)| k.len() + v.approx_size())
                .sum::<usize>()
    }
}

/// Logical columns of an organizational-unit record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrgUnitColumn {
    StorageLocation,
    WarehouseNumber,
    BusinessPartner,
    ShippingPoint,
    ForceElement,
}

impl OrgUnitColumn {
    pub const ALL: [OrgUnitColumn; 5] = [
        OrgUnitColumn::StorageLocation,
        OrgUnitColumn::WarehouseNumber,
        OrgUnitColumn::BusinessPartner,
        OrgUnitColumn::ShippingPoint,
        OrgUnitColumn::ForceElement,
    ];

    /// Key used by the backend and by policy attribute names
    pub fn key(&self) -> &'static str {
        match self {
            OrgUnitColumn::StorageLocation => "sloc",
            OrgUnitColumn::WarehouseNumber => "whnum",
            OrgUnitColumn::BusinessPartner => "bizpn",
            OrgUnitColumn::ShippingPoint => "shippt",
            OrgUnitColumn::ForceElement => "fe",
        }
    }

    /// Case-insensitive lookup by key
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|column| column.key().eq_ignore_ascii_case(key.trim()))
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Organizational-unit attributes keyed by natural id.
///
/// Each column is either a list of values or explicitly absent. A record with
/// every column absent is a negative record: the backend was asked and knew
/// nothing about the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgUnitRecord {
    pub id: String,
    columns: [Option<Vec<String>>; 5],
}

impl OrgUnitRecord {
    /// Record with every column present and empty
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            columns: std::array::from_fn(|_| Some(Vec::new())),
        }
    }

    /// Record with every column absent
    pub fn negative(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            columns: std::array::from_fn(|_| None),
        }
    }

    pub fn with_values<I, S>(mut self, column: OrgUnitColumn, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns[column.index()] = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Append one value, turning an absent column into a present one
    pub fn push(&mut self, column: OrgUnitColumn, value: impl Into<String>) {
        self.columns[column.index()]
            .get_or_insert_with(Vec::new)
            .push(value.into());
    }

    pub fn column(&self, column: OrgUnitColumn) -> Option<&[String]> {
        self.columns[column.index()].as_deref()
    }

    /// Column lookup by attribute name, `None` for unknown names too
    pub fn column_by_name(&self, name: &str) -> Option<&[String]> {
        OrgUnitColumn::from_key(name).and_then(|column| self.column(column))
    }

    pub fn is_negative(&self) -> bool {
        self.columns.iter().all(Option::is_none)
    }

    pub fn approx_size(&self) -> usize {
        self.id.len()
            + self
                .columns
                .iter()
                .flatten()
                .flat_map(|values| values.iter())
                .map(|v| v.len() + std::mem::size_of::<String>())
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_id_sorts_values() {
        let a = combined_id("CORP", vec!["zeta".into(), "alpha".into()]);
        let b = combined_id("CORP", vec!["alpha".into(), "zeta".into()]);
        assert_eq!(a, "CORP#alpha#zeta");
        assert_eq!(a, b);
        assert_eq!(profile_of(&a), "CORP");
    }

    #[test]
    fn test_combined_id_without_values() {
        assert_eq!(combined_id("CORP", Vec::new()), "CORP");
        assert_eq!(profile_of("CORP"), "CORP");
    }

    #[test]
    fn test_record_attribute_keys_are_lowercased() {
        let record = DirectoryRecord::new("CORP", "CORP#jake", RecordKind::Principal)
            .with_attribute("Mail", AttributeValue::Multi(vec!["a@x".into()]));

        assert!(record.attributes().contains_key("mail"));
        assert_eq!(
            record.attribute("MAIL"),
            Some(&AttributeValue::Multi(vec!["a@x".into()]))
        );
    }

    #[test]
    fn test_org_unit_columns() {
        let mut record = OrgUnitRecord::new("A1").with_values(OrgUnitColumn::StorageLocation, ["L1"]);
        record.push(OrgUnitColumn::StorageLocation, "L2");

        assert_eq!(
            record.column_by_name("SLOC"),
            Some(&["L1".to_string(), "L2".to_string()][..])
        );
        assert_eq!(record.column(OrgUnitColumn::ForceElement), Some(&[][..]));
        assert_eq!(record.column_by_name("unknown"), None);
        assert!(!record.is_negative());
    }

    #[test]
    fn test_negative_record() {
        let mut record = OrgUnitRecord::negative("B");
        assert!(record.is_negative());
        assert_eq!(record.column(OrgUnitColumn::WarehouseNumber), None);

        record.push(OrgUnitColumn::WarehouseNumber, "W1");
        assert!(!record.is_negative());
    }
}
