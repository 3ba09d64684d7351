//! Inventory valuation, holding cost and ABC classification

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::MetricEngine;
use super::group::group_sum;
use crate::records::{CanonicalRecords, InventoryRecord};
use crate::sink::{Cell, Column, MetricTable, TableRow};

pub const TABLE_NAME: &str = "financial_summary";

/// Upper cumulative-share bound (inclusive) for class A
pub const CLASS_A_SHARE: f64 = 0.80;
/// Upper cumulative-share bound (inclusive) for class B
pub const CLASS_B_SHARE: f64 = 0.95;

/// Absorbs summation rounding at the class boundaries.
const SHARE_EPSILON: f64 = 1e-12;

/// Value tier of a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AbcClass {
    A,
    B,
    C,
}

impl AbcClass {
    fn for_share(share: f64) -> Self {
        if share <= CLASS_A_SHARE + SHARE_EPSILON {
            AbcClass::A
        } else if share <= CLASS_B_SHARE + SHARE_EPSILON {
            AbcClass::B
        } else {
            AbcClass::C
        }
    }
}

impl fmt::Display for AbcClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbcClass::A => write!(f, "A"),
            AbcClass::B => write!(f, "B"),
            AbcClass::C => write!(f, "C"),
        }
    }
}

/// Classify products by cumulative share of total value
///
/// Products are ranked by value descending (ties by id ascending). When the
/// total value is not positive every product is class C.
pub fn classify_abc(values: &BTreeMap<String, f64>) -> BTreeMap<String, AbcClass> {
    let total: f64 = values.values().sum();
    if total <= 0.0 {
        return values.keys().map(|k| (k.clone(), AbcClass::C)).collect();
    }

    let mut ranked: Vec<(&String, f64)> = values.iter().map(|(k, v)| (k, *v)).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut cumulative = 0.0;
    ranked
        .into_iter()
        .map(|(product_id, value)| {
            cumulative += value;
            (product_id.clone(), AbcClass::for_share(cumulative / total))
        })
        .collect()
}

/// One inventory row with its valuation
#[derive(Debug, Clone, PartialEq)]
pub struct FinancialMetric {
    pub product_id: String,
    pub site_id: Option<String>,
    pub quantity: f64,
    pub unit_cost: f64,
    pub last_updated: Option<DateTime<Utc>>,
    pub inventory_value: f64,
    pub annual_holding_cost: f64,
    /// Class of the row's product
    pub class: AbcClass,
}

impl TableRow for FinancialMetric {
    fn columns() -> Vec<Column> {
        vec![
            Column::text("product_id"),
            Column::text("site_id"),
            Column::float("quantity"),
            Column::float("unit_cost"),
            Column::timestamp("last_updated"),
            Column::float("inventory_value"),
            Column::float("annual_holding_cost"),
            Column::text("class"),
        ]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.product_id.as_str().into(),
            self.site_id.clone().into(),
            self.quantity.into(),
            self.unit_cost.into(),
            self.last_updated.into(),
            self.inventory_value.into(),
            self.annual_holding_cost.into(),
            self.class.to_string().into(),
        ]
    }
}

/// Row-level valuation joined with product ABC class
#[derive(Debug, Clone)]
pub struct FinancialMetricsEngine {
    holding_cost_rate: f64,
}

impl Default for FinancialMetricsEngine {
    fn default() -> Self {
        Self::new(0.20)
    }
}

impl FinancialMetricsEngine {
    pub fn new(holding_cost_rate: f64) -> Self {
        Self { holding_cost_rate }
    }

    pub fn run(&self, inventory: &[InventoryRecord]) -> Vec<FinancialMetric> {
        if inventory.is_empty() {
            warn!("No inventory for financial metrics");
            return Vec::new();
        }

        let value_by_product = group_sum(
            inventory,
            |r| Some(r.product_id.clone()),
            |r| r.inventory_value(),
        );
        let classes = classify_abc(&value_by_product);

        let rows: Vec<FinancialMetric> = inventory
            .iter()
            .map(|r| {
                let inventory_value = r.inventory_value();
                FinancialMetric {
                    product_id: r.product_id.clone(),
                    site_id: r.site_id.clone(),
                    quantity: r.quantity,
                    unit_cost: r.unit_cost,
                    last_updated: r.last_updated,
                    inventory_value,
                    annual_holding_cost: inventory_value * self.holding_cost_rate,
                    class: classes.get(&r.product_id).copied().unwrap_or(AbcClass::C),
                }
            })
            .collect();

        debug!(
            rows = rows.len(),
            class_a = classes.values().filter(|c| **c == AbcClass::A).count(),
            "Financial metrics computed"
        );
        rows
    }
}

impl MetricEngine for FinancialMetricsEngine {
    fn table_name(&self) -> &'static str {
        TABLE_NAME
    }

    fn compute(&self, records: &CanonicalRecords, _now: DateTime<Utc>) -> MetricTable {
        MetricTable::from_rows(TABLE_NAME, &self.run(&records.inventory))
    }
}
