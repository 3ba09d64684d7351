//! Site utilization and inter-site transfer volume

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::MetricEngine;
use super::group::{group_sum, ratio};
use crate::config::EtlConfig;
use crate::records::{CanonicalRecords, InventoryRecord, MovementRecord};
use crate::sink::{Cell, Column, MetricTable, TableRow};

pub const TABLE_NAME: &str = "warehouse_summary";

/// Synthetic site used when no inventory row names a site
pub const ALL_SITES: &str = "ALL";

const TRANSFER_COLUMNS: [&str; 3] = ["src", "dst", "transfer_quantity"];

/// One site row, optionally widened by one outbound transfer lane
#[derive(Debug, Clone, PartialEq)]
pub struct WarehouseMetric {
    pub site_id: String,
    pub quantity: f64,
    pub capacity: f64,
    pub utilization: Option<f64>,
    pub src: Option<String>,
    pub dst: Option<String>,
    pub transfer_quantity: Option<f64>,
}

impl WarehouseMetric {
    fn site(site_id: String, quantity: f64, capacity: f64) -> Self {
        Self {
            utilization: ratio(quantity, capacity),
            site_id,
            quantity,
            capacity,
            src: None,
            dst: None,
            transfer_quantity: None,
        }
    }
}

impl TableRow for WarehouseMetric {
    fn columns() -> Vec<Column> {
        vec![
            Column::text("site_id"),
            Column::float("quantity"),
            Column::float("capacity"),
            Column::float("utilization"),
            Column::text("src"),
            Column::text("dst"),
            Column::float("transfer_quantity"),
        ]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.site_id.as_str().into(),
            self.quantity.into(),
            self.capacity.into(),
            self.utilization.into(),
            self.src.clone().into(),
            self.dst.clone().into(),
            self.transfer_quantity.into(),
        ]
    }
}

/// Engine output
///
/// Transfer columns are only part of the table when some movement named
/// both ends of a transfer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarehouseSummary {
    pub rows: Vec<WarehouseMetric>,
    pub includes_transfers: bool,
}

impl WarehouseSummary {
    pub fn to_table(&self) -> MetricTable {
        let table = MetricTable::from_rows(TABLE_NAME, &self.rows);
        if self.includes_transfers {
            table
        } else {
            table.without_columns(&TRANSFER_COLUMNS)
        }
    }
}

/// Per-site utilization against configured capacity
#[derive(Debug, Clone)]
pub struct WarehousePerformanceEngine {
    default_capacity: f64,
    site_capacities: BTreeMap<String, f64>,
}

impl Default for WarehousePerformanceEngine {
    fn default() -> Self {
        Self::new(100_000.0)
    }
}

impl WarehousePerformanceEngine {
    pub fn new(default_capacity: f64) -> Self {
        Self {
            default_capacity,
            site_capacities: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &EtlConfig) -> Self {
        Self {
            default_capacity: config.default_capacity,
            site_capacities: config.site_capacities.clone(),
        }
    }

    pub fn with_site_capacity(mut self, site_id: impl Into<String>, capacity: f64) -> Self {
        self.site_capacities.insert(site_id.into(), capacity);
        self
    }

    fn capacity_for(&self, site_id: &str) -> f64 {
        self.site_capacities
            .get(site_id)
            .copied()
            .unwrap_or(self.default_capacity)
    }

    pub fn run(&self, inventory: &[InventoryRecord], movements: &[MovementRecord]) -> WarehouseSummary {
        if inventory.is_empty() {
            warn!("No inventory data for warehouse performance");
            return WarehouseSummary::default();
        }

        if inventory.iter().all(|r| r.site_id.is_none()) {
            let total: f64 = inventory.iter().map(|r| r.quantity).sum();
            debug!(total, "No site identifiers, reporting aggregate utilization");
            return WarehouseSummary {
                rows: vec![WarehouseMetric::site(
                    ALL_SITES.to_string(),
                    total,
                    self.capacity_for(ALL_SITES),
                )],
                includes_transfers: false,
            };
        }

        let by_site = group_sum(inventory, |r| r.site_id.clone(), |r| r.quantity);

        let transfers = group_sum(
            movements,
            |m| {
                m.transfer_pair()
                    .map(|(from, to)| (from.to_string(), to.to_string()))
            },
            |m| m.quantity,
        );

        // left join on site_id == src; a site with no outbound lane keeps one row
        let mut rows = Vec::with_capacity(by_site.len());
        for (site_id, quantity) in by_site {
            let capacity = self.capacity_for(&site_id);
            let base = WarehouseMetric::site(site_id, quantity, capacity);

            let lanes: Vec<_> = transfers
                .iter()
                .filter(|((src, _), _)| *src == base.site_id)
                .collect();
            if lanes.is_empty() {
                rows.push(base);
                continue;
            }
            for ((src, dst), moved) in lanes {
                rows.push(WarehouseMetric {
                    src: Some(src.clone()),
                    dst: Some(dst.clone()),
                    transfer_quantity: Some(*moved),
                    ..base.clone()
                });
            }
        }

        debug!(
            sites = rows.len(),
            transfer_lanes = transfers.len(),
            "Warehouse performance computed"
        );

        WarehouseSummary {
            rows,
            includes_transfers: !transfers.is_empty(),
        }
    }
}

impl MetricEngine for WarehousePerformanceEngine {
    fn table_name(&self) -> &'static str {
        TABLE_NAME
    }

    fn compute(&self, records: &CanonicalRecords, _now: DateTime<Utc>) -> MetricTable {
        self.run(&records.inventory, &records.movements).to_table()
    }
}
