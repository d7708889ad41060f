//! Identifier alias index

use dashmap::DashMap;

use crate::record::RecordKind;

#[derive(Debug, Clone)]
struct AliasTarget {
    combined_id: String,
    kind: RecordKind,
}

/// Maps every key-attribute value seen to the combined identifier of its
/// record.
///
/// Entries are never pruned: an alias whose record was evicted keeps pointing
/// at the old identifier and simply resolves to a cache miss.
#[derive(Default)]
pub struct AliasIndex {
    aliases: DashMap<String, AliasTarget>,
}

impl AliasIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, alias: String, combined_id: String, kind: RecordKind) {
        self.aliases.insert(alias, AliasTarget { combined_id, kind });
    }

    pub fn resolve(&self, alias: &str) -> Option<String> {
        self.aliases.get(alias).map(|t| t.combined_id.clone())
    }

    /// Kind of the record the alias last pointed to
    pub fn kind_of(&self, alias: &str) -> Option<RecordKind> {
        self.aliases.get(alias).map(|t| t.kind)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Snapshot of `(alias, combined_id)` pairs
    pub fn entries(&self) -> Vec<(String, String)> {
        self.aliases
            .iter()
            .map(|e| (e.key().clone(), e.value().combined_id.clone()))
            .collect()
    }
}
