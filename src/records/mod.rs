//! Canonical record sets shared by the extractor and the metric engines
//!
//! Raw source rows arrive as loosely typed JSON objects ([`RawRecord`]). The
//! normalizer turns them into the two explicit schemas below; every engine
//! reads only these types.
//!
//! Defaulting rules per field:
//!
//! | Record    | Field           | Missing / unparsable          |
//! |-----------|-----------------|-------------------------------|
//! | Inventory | `product_id`    | row dropped                   |
//! | Inventory | `site_id`       | `None`                        |
//! | Inventory | `quantity`      | `0.0` (sign not clamped)      |
//! | Inventory | `unit_cost`     | `0.0`                         |
//! | Inventory | `last_updated`  | `None`                        |
//! | Movement  | `product_id`    | row dropped                   |
//! | Movement  | `timestamp`     | row dropped                   |
//! | Movement  | `quantity`      | `0.0` (sign not clamped)      |
//! | Movement  | `movement_type` | `None`                        |
//! | Movement  | `from_site`     | `None`                        |
//! | Movement  | `to_site`       | `None`                        |

pub mod value;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw source row keyed by column name.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Movement types that count as outbound (cost of goods sold).
pub const OUTBOUND_MOVEMENT_TYPES: [&str; 4] = ["out", "sale", "dispatch", "issued"];

/// Field names of the inventory schema.
pub mod inventory_fields {
    pub const PRODUCT_ID: &str = "product_id";
    pub const SITE_ID: &str = "site_id";
    pub const QUANTITY: &str = "quantity";
    pub const LAST_UPDATED: &str = "last_updated";
    pub const UNIT_COST: &str = "unit_cost";

    /// Columns whose absence is reported as schema drift.
    pub const REQUIRED: [&str; 5] = [PRODUCT_ID, SITE_ID, QUANTITY, LAST_UPDATED, UNIT_COST];
}

/// Field names of the movement schema.
pub mod movement_fields {
    pub const PRODUCT_ID: &str = "product_id";
    pub const FROM_SITE: &str = "from_site";
    pub const TO_SITE: &str = "to_site";
    pub const QUANTITY: &str = "quantity";
    pub const MOVEMENT_TYPE: &str = "movement_type";

    /// Timestamp columns tried when the configured one is absent.
    pub const TIMESTAMP_FALLBACKS: [&str; 3] = ["timestamp", "date", "movement_date"];

    /// Column the movement timestamp is read from
    ///
    /// `configured` when present, else the first present fallback. Names are
    /// compared folded (trimmed, lowercase); `present` receives folded names.
    pub fn timestamp_column(configured: &str, present: impl Fn(&str) -> bool) -> Option<String> {
        let configured = configured.trim().to_lowercase();
        if present(&configured) {
            return Some(configured);
        }
        TIMESTAMP_FALLBACKS
            .into_iter()
            .find(|c| present(*c))
            .map(str::to_string)
    }
}

/// One stock position row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub product_id: String,
    pub site_id: Option<String>,
    pub quantity: f64,
    pub unit_cost: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl InventoryRecord {
    pub fn new(product_id: impl Into<String>, quantity: f64, unit_cost: f64) -> Self {
        Self {
            product_id: product_id.into(),
            site_id: None,
            quantity,
            unit_cost,
            last_updated: None,
        }
    }

    pub fn with_site(mut self, site_id: impl Into<String>) -> Self {
        self.site_id = Some(site_id.into());
        self
    }

    pub fn with_last_updated(mut self, ts: DateTime<Utc>) -> Self {
        self.last_updated = Some(ts);
        self
    }

    /// Quantity on hand valued at unit cost
    pub fn inventory_value(&self) -> f64 {
        self.quantity * self.unit_cost
    }
}

/// One stock movement row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub product_id: String,
    pub from_site: Option<String>,
    pub to_site: Option<String>,
    pub quantity: f64,
    pub movement_type: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl MovementRecord {
    pub fn new(product_id: impl Into<String>, quantity: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            product_id: product_id.into(),
            from_site: None,
            to_site: None,
            quantity,
            movement_type: None,
            timestamp,
        }
    }

    pub fn with_type(mut self, movement_type: impl Into<String>) -> Self {
        self.movement_type = Some(movement_type.into());
        self
    }

    pub fn with_transfer(mut self, from_site: impl Into<String>, to_site: impl Into<String>) -> Self {
        self.from_site = Some(from_site.into());
        self.to_site = Some(to_site.into());
        self
    }

    /// Whether this movement ships stock out (case-insensitive type match)
    pub fn is_outbound(&self) -> bool {
        self.movement_type.as_deref().is_some_and(|t| {
            let t = t.trim().to_lowercase();
            OUTBOUND_MOVEMENT_TYPES.contains(&t.as_str())
        })
    }

    /// Source/destination pair when both ends are known
    pub fn transfer_pair(&self) -> Option<(&str, &str)> {
        match (&self.from_site, &self.to_site) {
            (Some(from), Some(to)) => Some((from.as_str(), to.as_str())),
            _ => None,
        }
    }
}

/// The two cleaned record sets produced by one extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalRecords {
    pub inventory: Vec<InventoryRecord>,
    pub movements: Vec<MovementRecord>,
}

impl CanonicalRecords {
    pub fn new(inventory: Vec<InventoryRecord>, movements: Vec<MovementRecord>) -> Self {
        Self {
            inventory,
            movements,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inventory.is_empty() && self.movements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_outbound_types_case_insensitive() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        for kind in ["OUT", "Sale", "dispatch", " issued "] {
            assert!(MovementRecord::new("1", 1.0, ts).with_type(kind).is_outbound());
        }
        assert!(!MovementRecord::new("1", 1.0, ts).with_type("in").is_outbound());
        assert!(!MovementRecord::new("1", 1.0, ts).is_outbound());
    }

    #[test]
    fn test_transfer_pair_requires_both_ends() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut movement = MovementRecord::new("1", 5.0, ts);
        assert!(movement.transfer_pair().is_none());

        movement.from_site = Some("WH1".to_string());
        assert!(movement.transfer_pair().is_none());

        let movement = movement.with_transfer("WH1", "WH2");
        assert_eq!(movement.transfer_pair(), Some(("WH1", "WH2")));
    }

    #[test]
    fn test_timestamp_column_resolution() {
        let columns = ["product_id", "timestamp", "date"];
        let present = |c: &str| columns.contains(&c);

        assert_eq!(
            movement_fields::timestamp_column(" Product_ID ", present),
            Some("product_id".to_string())
        );
        assert_eq!(
            movement_fields::timestamp_column("modified_date", present),
            Some("timestamp".to_string())
        );
        assert_eq!(movement_fields::timestamp_column("modified_date", |_| false), None);
    }

    #[test]
    fn test_inventory_value() {
        let record = InventoryRecord::new("1", 100.0, 2.5);
        assert_eq!(record.inventory_value(), 250.0);
    }
}
