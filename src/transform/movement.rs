//! Movement velocity and 30-day trend

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, warn};

use super::MetricEngine;
use super::group::{NumericStats, group_fold, group_sum};
use crate::records::{CanonicalRecords, MovementRecord};
use crate::sink::{Cell, Column, MetricTable, TableRow};

pub const TABLE_NAME: &str = "movement_summary";

/// Length of each trend window
pub const TREND_WINDOW_DAYS: i64 = 30;

/// One product's movement profile
#[derive(Debug, Clone, PartialEq)]
pub struct MovementMetric {
    pub product_id: String,
    /// Mean of per-day summed quantity over days with movements
    pub avg_daily: f64,
    pub peak_daily: f64,
    /// Quantity in the most recent window
    pub w1_qty: f64,
    /// Quantity in the window before that
    pub w2_qty: f64,
    pub trend_pct: Option<f64>,
}

impl TableRow for MovementMetric {
    fn columns() -> Vec<Column> {
        vec![
            Column::text("product_id"),
            Column::float("avg_daily"),
            Column::float("peak_daily"),
            Column::float("w1_qty"),
            Column::float("w2_qty"),
            Column::float("trend_pct"),
        ]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.product_id.as_str().into(),
            self.avg_daily.into(),
            self.peak_daily.into(),
            self.w1_qty.into(),
            self.w2_qty.into(),
            self.trend_pct.into(),
        ]
    }
}

/// Relative change from the prior window; undefined without a positive base
pub fn trend_pct(w1: f64, w2: f64) -> Option<f64> {
    if w2 > 0.0 {
        Some((w1 - w2) / w2)
    } else {
        None
    }
}

/// Daily aggregation and windowed trend per product
///
/// Windows are anchored on the newest movement timestamp in the input,
/// so results depend only on the data and are replayable.
#[derive(Debug, Clone, Default)]
pub struct MovementAnalyticsEngine;

impl MovementAnalyticsEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, movements: &[MovementRecord]) -> Vec<MovementMetric> {
        let Some(latest) = movements.iter().map(|m| m.timestamp).max() else {
            warn!("No movement data");
            return Vec::new();
        };

        let daily = group_sum(
            movements,
            |m| Some((m.product_id.clone(), m.timestamp.date_naive())),
            |m| m.quantity,
        );
        let per_product = group_fold(
            daily,
            |((product_id, _day), _qty): &((String, NaiveDate), f64)| Some(product_id.clone()),
            |acc: &mut NumericStats, (_, qty)| acc.add(qty),
        );

        let w1_start = latest - Duration::days(TREND_WINDOW_DAYS);
        let w2_start = latest - Duration::days(2 * TREND_WINDOW_DAYS);

        let w1 = group_sum(
            movements.iter().filter(|m| m.timestamp >= w1_start),
            |m| Some(m.product_id.clone()),
            |m| m.quantity,
        );
        let w2 = group_sum(
            movements
                .iter()
                .filter(|m| m.timestamp >= w2_start && m.timestamp < w1_start),
            |m| Some(m.product_id.clone()),
            |m| m.quantity,
        );

        let metrics: Vec<MovementMetric> = per_product
            .into_iter()
            .map(|(product_id, stats)| {
                let w1_qty = w1.get(&product_id).copied().unwrap_or(0.0);
                let w2_qty = w2.get(&product_id).copied().unwrap_or(0.0);
                MovementMetric {
                    avg_daily: stats.avg().unwrap_or(0.0),
                    peak_daily: stats.max().unwrap_or(0.0),
                    w1_qty,
                    w2_qty,
                    trend_pct: trend_pct(w1_qty, w2_qty),
                    product_id,
                }
            })
            .collect();

        debug!(products = metrics.len(), latest = %latest, "Movement analytics computed");
        metrics
    }
}

impl MetricEngine for MovementAnalyticsEngine {
    fn table_name(&self) -> &'static str {
        TABLE_NAME
    }

    fn compute(&self, records: &CanonicalRecords, _now: DateTime<Utc>) -> MetricTable {
        MetricTable::from_rows(TABLE_NAME, &self.run(&records.movements))
    }
}
