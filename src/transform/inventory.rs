//! Inventory health: value, turnover, days on hand, dead stock

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::MetricEngine;
use super::group::{NumericStats, group_fold, group_sum, ratio};
use crate::records::{CanonicalRecords, InventoryRecord, MovementRecord};
use crate::sink::{Cell, Column, MetricTable, TableRow};

pub const TABLE_NAME: &str = "inventory_summary";

const DAYS_PER_YEAR: f64 = 365.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// One product's inventory health
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryMetric {
    pub product_id: String,
    /// Summed across sites
    pub quantity: f64,
    /// Mean over the product's rows; missing costs count as zero
    pub unit_cost: f64,
    pub inventory_value: f64,
    /// Outbound movement quantity
    pub cogs_quantity: f64,
    pub turnover_ratio: Option<f64>,
    /// Days of inventory on hand
    pub doh: Option<f64>,
    pub last_movement: Option<DateTime<Utc>>,
    pub dead_stock: bool,
}

impl TableRow for InventoryMetric {
    fn columns() -> Vec<Column> {
        vec![
            Column::text("product_id"),
            Column::float("quantity"),
            Column::float("inventory_value"),
            Column::float("turnover_ratio"),
            Column::float("doh"),
            Column::bool("dead_stock"),
        ]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.product_id.as_str().into(),
            self.quantity.into(),
            self.inventory_value.into(),
            self.turnover_ratio.into(),
            self.doh.into(),
            self.dead_stock.into(),
        ]
    }
}

#[derive(Default)]
struct ProductStock {
    quantity: f64,
    cost: NumericStats,
}

/// Per-product turnover and dead-stock derivation
#[derive(Debug, Clone)]
pub struct InventoryMetricsEngine {
    dead_stock_days: i64,
}

impl Default for InventoryMetricsEngine {
    fn default() -> Self {
        Self::new(180)
    }
}

impl InventoryMetricsEngine {
    pub fn new(dead_stock_days: i64) -> Self {
        Self { dead_stock_days }
    }

    /// Compute metrics as of `now` (the reference for dead-stock age)
    pub fn run(
        &self,
        inventory: &[InventoryRecord],
        movements: &[MovementRecord],
        now: DateTime<Utc>,
    ) -> Vec<InventoryMetric> {
        if inventory.is_empty() {
            warn!("No inventory data to compute metrics");
            return Vec::new();
        }

        let stock = group_fold(
            inventory,
            |r| Some(r.product_id.clone()),
            |acc: &mut ProductStock, r| {
                acc.quantity += r.quantity;
                acc.cost.add(r.unit_cost);
            },
        );

        let cogs = group_sum(
            movements.iter().filter(|m| m.is_outbound()),
            |m| Some(m.product_id.clone()),
            |m| m.quantity,
        );

        let last_movement: BTreeMap<String, DateTime<Utc>> = group_fold(
            movements,
            |m| Some(m.product_id.clone()),
            |acc: &mut Option<DateTime<Utc>>, m| {
                *acc = Some(acc.map_or(m.timestamp, |t| t.max(m.timestamp)));
            },
        )
        .into_iter()
        .filter_map(|(k, v)| v.map(|ts| (k, ts)))
        .collect();

        let metrics: Vec<InventoryMetric> = stock
            .into_iter()
            .map(|(product_id, s)| {
                let unit_cost = s.cost.avg().unwrap_or(0.0);
                let cogs_quantity = cogs.get(&product_id).copied().unwrap_or(0.0);
                let turnover_ratio = ratio(cogs_quantity, s.quantity);
                let doh = turnover_ratio.and_then(|t| ratio(DAYS_PER_YEAR, t));
                let last = last_movement.get(&product_id).copied();

                InventoryMetric {
                    inventory_value: s.quantity * unit_cost,
                    dead_stock: last.is_some_and(|ts| self.is_dead(ts, now)),
                    product_id,
                    quantity: s.quantity,
                    unit_cost,
                    cogs_quantity,
                    turnover_ratio,
                    doh,
                    last_movement: last,
                }
            })
            .collect();

        debug!(
            products = metrics.len(),
            dead_stock = metrics.iter().filter(|m| m.dead_stock).count(),
            "Inventory metrics computed"
        );
        metrics
    }

    /// Fractional days since `last` exceed the threshold
    fn is_dead(&self, last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let age_days = (now - last).num_milliseconds() as f64 / MILLIS_PER_DAY;
        age_days > self.dead_stock_days as f64
    }
}

impl MetricEngine for InventoryMetricsEngine {
    fn table_name(&self) -> &'static str {
        TABLE_NAME
    }

    fn compute(&self, records: &CanonicalRecords, now: DateTime<Utc>) -> MetricTable {
        let rows = self.run(&records.inventory, &records.movements, now);
        MetricTable::from_rows(TABLE_NAME, &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()
    }

    fn find<'a>(metrics: &'a [InventoryMetric], id: &str) -> &'a InventoryMetric {
        metrics.iter().find(|m| m.product_id == id).unwrap()
    }

    #[test]
    fn test_turnover_basic() {
        let inventory = vec![
            InventoryRecord::new("1", 100.0, 10.0),
            InventoryRecord::new("2", 0.0, 5.0),
        ];
        let movements = vec![
            MovementRecord::new("1", 50.0, now() - Duration::days(1)).with_type("out"),
        ];

        let metrics = InventoryMetricsEngine::default().run(&inventory, &movements, now());
        let one = find(&metrics, "1");
        assert_eq!(one.turnover_ratio, Some(0.5));
        assert_eq!(one.doh, Some(730.0));
        assert_eq!(one.inventory_value, 1000.0);

        let two = find(&metrics, "2");
        assert_eq!(two.turnover_ratio, None);
        assert_eq!(two.doh, None);
    }

    #[test]
    fn test_cogs_counts_outbound_types_only() {
        let ts = now() - Duration::days(2);
        let inventory = vec![InventoryRecord::new("1", 200.0, 1.0)];
        let movements = vec![
            MovementRecord::new("1", 10.0, ts).with_type("SALE"),
            MovementRecord::new("1", 20.0, ts).with_type("Dispatch"),
            MovementRecord::new("1", 30.0, ts).with_type("issued"),
            MovementRecord::new("1", 40.0, ts).with_type("in"),
            MovementRecord::new("1", 50.0, ts),
        ];

        let metrics = InventoryMetricsEngine::default().run(&inventory, &movements, now());
        assert_eq!(metrics[0].cogs_quantity, 60.0);
        assert_eq!(metrics[0].turnover_ratio, Some(0.3));
    }

    #[test]
    fn test_zero_turnover_has_no_doh() {
        let inventory = vec![InventoryRecord::new("1", 10.0, 1.0)];
        let metrics = InventoryMetricsEngine::default().run(&inventory, &[], now());
        assert_eq!(metrics[0].turnover_ratio, Some(0.0));
        assert_eq!(metrics[0].doh, None);
    }

    #[test]
    fn test_groups_sites_and_averages_cost() {
        let inventory = vec![
            InventoryRecord::new("1", 10.0, 4.0).with_site("WH1"),
            InventoryRecord::new("1", 30.0, 0.0).with_site("WH2"),
        ];
        let metrics = InventoryMetricsEngine::default().run(&inventory, &[], now());
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].quantity, 40.0);
        assert_eq!(metrics[0].unit_cost, 2.0);
        assert_eq!(metrics[0].inventory_value, 80.0);
    }

    #[test]
    fn test_dead_stock_policy() {
        let inventory = vec![
            InventoryRecord::new("old", 1.0, 1.0),
            InventoryRecord::new("recent", 1.0, 1.0),
            InventoryRecord::new("never", 1.0, 1.0),
        ];
        let movements = vec![
            MovementRecord::new("old", 1.0, now() - Duration::days(181)).with_type("in"),
            MovementRecord::new("recent", 1.0, now() - Duration::days(400)).with_type("in"),
            MovementRecord::new("recent", 1.0, now() - Duration::days(10)).with_type("in"),
        ];

        let metrics = InventoryMetricsEngine::new(180).run(&inventory, &movements, now());
        assert!(find(&metrics, "old").dead_stock);
        assert!(!find(&metrics, "recent").dead_stock);
        assert!(!find(&metrics, "never").dead_stock, "no history is not dead stock");
    }

    #[test]
    fn test_empty_inventory() {
        let metrics = InventoryMetricsEngine::default().run(&[], &[], now());
        assert!(metrics.is_empty());
    }

    #[test]
    fn test_table_layout() {
        let inventory = vec![InventoryRecord::new("1", 0.0, 1.0)];
        let table = InventoryMetricsEngine::default()
            .compute(&CanonicalRecords::new(inventory, Vec::new()), now());
        let names: Vec<_> = table.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["product_id", "quantity", "inventory_value", "turnover_ratio", "doh", "dead_stock"]
        );
        assert!(table.cell(0, "turnover_ratio").unwrap().is_null());
    }
}
