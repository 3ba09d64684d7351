//! Raw rows to canonical records
//!
//! Never fails. Unusable cells fall back to the per-field defaults listed in
//! [`crate::records`]; rows without an identity (and, for movements, without
//! a timestamp) are dropped and counted.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::records::value::{canonical_id, coerce_f64, optional_text, parse_timestamp};
use crate::records::{
    InventoryRecord, MovementRecord, RawRecord, inventory_fields, movement_fields,
};

/// What normalization saw and did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub rows_in: usize,
    pub rows_dropped: usize,
    /// Expected columns absent from every row
    pub missing_columns: Vec<String>,
    /// Column the movement timestamp was read from
    pub timestamp_column: Option<String>,
}

impl NormalizeReport {
    pub fn rows_out(&self) -> usize {
        self.rows_in - self.rows_dropped
    }

    pub fn has_drift(&self) -> bool {
        !self.missing_columns.is_empty()
    }
}

/// Cleaned records plus the report
#[derive(Debug, Clone, Default)]
pub struct Normalized<T> {
    pub records: Vec<T>,
    pub report: NormalizeReport,
}

/// Lowercase and trim every field name
fn fold_keys(row: RawRecord) -> RawRecord {
    row.into_iter()
        .map(|(k, v)| (k.trim().to_lowercase(), v))
        .collect()
}

fn column_set(rows: &[RawRecord]) -> BTreeSet<&str> {
    rows.iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect()
}

fn missing<'a>(present: &BTreeSet<&str>, wanted: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    wanted
        .into_iter()
        .filter(|c| !present.contains(c))
        .map(str::to_string)
        .collect()
}

/// Normalize inventory rows
pub fn normalize_inventory(raw: Vec<RawRecord>) -> Normalized<InventoryRecord> {
    let rows: Vec<RawRecord> = raw.into_iter().map(fold_keys).collect();
    let mut report = NormalizeReport {
        rows_in: rows.len(),
        ..Default::default()
    };

    if !rows.is_empty() {
        report.missing_columns = missing(&column_set(&rows), inventory_fields::REQUIRED);
        if report.has_drift() {
            warn!(
                missing = ?report.missing_columns,
                "Inventory source is missing expected columns, using defaults"
            );
        }
    }

    let records: Vec<InventoryRecord> = rows
        .iter()
        .filter_map(|row| {
            let product_id = row.get(inventory_fields::PRODUCT_ID).and_then(canonical_id)?;
            Some(InventoryRecord {
                product_id,
                site_id: optional_text(row.get(inventory_fields::SITE_ID)),
                quantity: coerce_f64(row.get(inventory_fields::QUANTITY)),
                unit_cost: coerce_f64(row.get(inventory_fields::UNIT_COST)),
                last_updated: row
                    .get(inventory_fields::LAST_UPDATED)
                    .and_then(parse_timestamp),
            })
        })
        .collect();

    report.rows_dropped = report.rows_in - records.len();
    if report.rows_dropped > 0 {
        debug!(dropped = report.rows_dropped, "Dropped inventory rows without product_id");
    }

    Normalized { records, report }
}

/// Normalize movement rows
///
/// The timestamp is read from `incremental_column`; when no row carries
/// that column the first present of [`movement_fields::TIMESTAMP_FALLBACKS`]
/// is used instead and the configured column is reported as missing.
pub fn normalize_movements(raw: Vec<RawRecord>, incremental_column: &str) -> Normalized<MovementRecord> {
    let rows: Vec<RawRecord> = raw.into_iter().map(fold_keys).collect();
    let incremental_column = incremental_column.trim().to_lowercase();
    let mut report = NormalizeReport {
        rows_in: rows.len(),
        ..Default::default()
    };

    if !rows.is_empty() {
        let present = column_set(&rows);
        let expected = [
            movement_fields::PRODUCT_ID,
            movement_fields::QUANTITY,
            movement_fields::MOVEMENT_TYPE,
            incremental_column.as_str(),
        ];
        report.missing_columns = missing(&present, expected);

        report.timestamp_column =
            movement_fields::timestamp_column(&incremental_column, |c| present.contains(c));

        if report.has_drift() {
            warn!(
                missing = ?report.missing_columns,
                timestamp_column = ?report.timestamp_column,
                "Movement source is missing expected columns, using defaults"
            );
        }
    }

    let ts_column = report.timestamp_column.clone();
    let records: Vec<MovementRecord> = rows
        .iter()
        .filter_map(|row| {
            let product_id = row.get(movement_fields::PRODUCT_ID).and_then(canonical_id)?;
            let timestamp = ts_column
                .as_deref()
                .and_then(|c| row.get(c))
                .and_then(parse_timestamp)?;
            Some(MovementRecord {
                product_id,
                from_site: optional_text(row.get(movement_fields::FROM_SITE)),
                to_site: optional_text(row.get(movement_fields::TO_SITE)),
                quantity: coerce_f64(row.get(movement_fields::QUANTITY)),
                movement_type: optional_text(row.get(movement_fields::MOVEMENT_TYPE)),
                timestamp,
            })
        })
        .collect();

    report.rows_dropped = report.rows_in - records.len();
    if report.rows_dropped > 0 {
        debug!(
            dropped = report.rows_dropped,
            "Dropped movement rows without product_id or timestamp"
        );
    }

    Normalized { records, report }
}
