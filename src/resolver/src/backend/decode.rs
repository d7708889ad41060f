//! Backend response decoding

use attrbridge_core::{BackendResponse, BackendRow};
use std::collections::HashMap;
use tracing::warn;

use crate::record::{OrgUnitColumn, OrgUnitRecord};

pub const IMPORT_AOR_ID: &str = "IT_AOR_ID";
pub const IMPORT_GET_ALL: &str = "IV_GET_ALL";
pub const GET_ALL_YES: &str = "X";
pub const GET_ALL_NO: &str = "";

pub const EXPORT_RETURN: &str = "ET_RETURN";
pub const EXPORT_AOR_DETAILS: &str = "ET_AOR_DETAILS";

pub const COLUMN_AOR_ID: &str = "AOR_ID";
pub const COLUMN_KEY: &str = "KEY";
pub const COLUMN_VALUE: &str = "VALUE";

pub const RETURN_TYPE: &str = "TYPE";
pub const RETURN_ID: &str = "ID";
pub const RETURN_NUMBER: &str = "NUMBER";
pub const RETURN_MESSAGE: &str = "MESSAGE";

/// Records decoded from one backend response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedBatch {
    /// One record per entity with detail rows, in first-seen order
    pub records: Vec<OrgUnitRecord>,
    /// Requested ids the backend knew nothing about
    pub negatives: Vec<OrgUnitRecord>,
}

impl DecodedBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.negatives.is_empty()
    }
}

/// Decode a response for the ids in `requested` (empty for a full refresh).
///
/// A response without a return table is treated as empty. Backend error rows
/// turn every requested id into a negative record.
pub fn decode_response(response: &BackendResponse, requested: &[String]) -> DecodedBatch {
    let Some(returns) = response.table(EXPORT_RETURN) else {
        warn!("Backend returned an empty response");
        return DecodedBatch::default();
    };

    if !returns.is_empty() {
        warn!("Backend returned {} error row(s)", returns.len());
        for row in &returns.rows {
            warn!(
                "Backend response type [{}], id [{}], number [{}], message [{}]",
                cell(row, RETURN_TYPE),
                cell(row, RETURN_ID),
                cell(row, RETURN_NUMBER),
                cell(row, RETURN_MESSAGE)
            );
        }
        return DecodedBatch {
            records: Vec::new(),
            negatives: requested.iter().map(OrgUnitRecord::negative).collect(),
        };
    }

    let Some(details) = response.table(EXPORT_AOR_DETAILS) else {
        warn!("Backend response contains no detail table");
        return DecodedBatch::default();
    };

    let mut order: Vec<String> = Vec::new();
    let mut by_id: HashMap<String, OrgUnitRecord> = HashMap::new();

    for row in &details.rows {
        let (Some(id), Some(key), Some(value)) = (
            row.get(COLUMN_AOR_ID),
            row.get(COLUMN_KEY),
            row.get(COLUMN_VALUE),
        ) else {
            warn!("Skipping incomplete detail row {:?}", row);
            continue;
        };

        let record = by_id.entry(id.clone()).or_insert_with(|| {
            order.push(id.clone());
            OrgUnitRecord::new(id.clone())
        });

        // unknown keys still register the entity
        if let Some(column) = OrgUnitColumn::from_key(key) {
            let present = record
                .column(column)
                .map_or(false, |values| values.iter().any(|v| v == value));
            if !present {
                record.push(column, value.clone());
            }
        }
    }

    let negatives = requested
        .iter()
        .filter(|id| !by_id.contains_key(id.as_str()))
        .map(OrgUnitRecord::negative)
        .collect();

    let records = order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect();

    DecodedBatch { records, negatives }
}

fn cell<'a>(row: &'a BackendRow, column: &str) -> &'a str {
    row.get(column).map(String::as_str).unwrap_or("")
}
