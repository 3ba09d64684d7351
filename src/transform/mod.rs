//! Metric engines
//!
//! Four independent transforms over [`CanonicalRecords`]. None of them
//! mutate their input or share state, so they can be evaluated in any order
//! or concurrently.
//!
//! | Engine                          | Reads                 | Table               |
//! |---------------------------------|-----------------------|---------------------|
//! | [`InventoryMetricsEngine`]      | inventory, movements  | `inventory_summary` |
//! | [`MovementAnalyticsEngine`]     | movements             | `movement_summary`  |
//! | [`WarehousePerformanceEngine`]  | inventory, movements  | `warehouse_summary` |
//! | [`FinancialMetricsEngine`]      | inventory             | `financial_summary` |

pub mod financial;
pub mod group;
pub mod inventory;
pub mod movement;
pub mod warehouse;

use chrono::{DateTime, Utc};

use crate::config::EtlConfig;
use crate::records::CanonicalRecords;
use crate::sink::MetricTable;

pub use financial::{AbcClass, FinancialMetric, FinancialMetricsEngine, classify_abc};
pub use inventory::{InventoryMetric, InventoryMetricsEngine};
pub use movement::{MovementAnalyticsEngine, MovementMetric};
pub use warehouse::{WarehouseMetric, WarehousePerformanceEngine, WarehouseSummary};

/// A transform from canonical records to one metric table
pub trait MetricEngine: Send + Sync {
    /// Name of the produced table
    fn table_name(&self) -> &'static str;

    /// Compute the table as of `now`
    fn compute(&self, records: &CanonicalRecords, now: DateTime<Utc>) -> MetricTable;
}

/// The four engines configured for one run
#[derive(Debug, Clone, Default)]
pub struct EngineSet {
    pub inventory: InventoryMetricsEngine,
    pub movement: MovementAnalyticsEngine,
    pub warehouse: WarehousePerformanceEngine,
    pub financial: FinancialMetricsEngine,
}

impl EngineSet {
    pub fn from_config(config: &EtlConfig) -> Self {
        Self {
            inventory: InventoryMetricsEngine::new(config.dead_stock_days),
            movement: MovementAnalyticsEngine::new(),
            warehouse: WarehousePerformanceEngine::from_config(config),
            financial: FinancialMetricsEngine::new(config.holding_cost_rate),
        }
    }

    /// Engines in table output order
    pub fn engines(&self) -> [&dyn MetricEngine; 4] {
        [&self.inventory, &self.movement, &self.warehouse, &self.financial]
    }
}
