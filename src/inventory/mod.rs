//! Inventory ledger — items and their quantity/status transition rules.
//!
//! Quantity is a percentage clamped to [0, 100]; status is derived state:
//! - consumption depletes quantity and flips status to `needed` at zero,
//!   but never promotes back to `in_stock`
//! - restock unconditionally resets to (100, `in_stock`)
//! - an explicit quantity set clamps and promotes/demotes at the bounds
//!
//! `record_consumption` and `record_restock` persist their log row and
//! the item update as a single SQLite transaction; a failure of either
//! statement rolls back both.

pub mod logs;

use crate::error::{Error, Result};
use crate::store::Store;
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use logs::{ConsumptionLog, LogFilter, LogQuery, RestockLog};

/// Default starting quantity for a new item (percent).
pub const DEFAULT_QUANTITY_PERCENT: f64 = 100.0;

/// Default low-stock threshold (percent, informational only).
pub const DEFAULT_LOW_STOCK_THRESHOLD: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Needed,
    InStock,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Needed => "needed",
            Self::InStock => "in_stock",
        }
    }

    /// Strict parse for API input; anything but the two enum strings is None.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "needed" => Some(Self::Needed),
            "in_stock" => Some(Self::InStock),
            _ => None,
        }
    }

    fn from_str_lossy(s: &str) -> Self {
        Self::parse(s).unwrap_or(Self::Needed)
    }
}

/// A trackable inventory unit scoped to one kitchen.
#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub quantity_percent: f64,
    pub low_stock_threshold: f64,
    pub status: ItemStatus,
    pub kitchen_id: i64,
}

/// Parameters for item creation, with the documented defaults.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub kitchen_id: i64,
    pub category: Option<String>,
    pub quantity_percent: f64,
    pub low_stock_threshold: f64,
    pub status: ItemStatus,
}

impl NewItem {
    pub fn new(name: impl Into<String>, kitchen_id: i64) -> Self {
        Self {
            name: name.into(),
            kitchen_id,
            category: None,
            quantity_percent: DEFAULT_QUANTITY_PERCENT,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            status: ItemStatus::InStock,
        }
    }
}

/// Partial update: only supplied fields change. No clamping here — range
/// checks belong to the validation boundary in front of this call.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub quantity_percent: Option<f64>,
    pub low_stock_threshold: Option<f64>,
    pub status: Option<ItemStatus>,
}

/// Ledger service over the shared store.
pub struct InventoryLedger {
    store: Arc<Store>,
}

impl InventoryLedger {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn create_item(&self, draft: NewItem) -> Result<Item> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Item name cannot be empty".into()));
        }

        let conn = self.store.conn();
        let result = conn.execute(
            "INSERT INTO items (name, category, quantity_percent, low_stock_threshold, status, kitchen_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                name,
                draft.category,
                draft.quantity_percent,
                draft.low_stock_threshold,
                draft.status.as_str(),
                draft.kitchen_id,
            ],
        );

        match result {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                tracing::debug!(item_id = id, kitchen_id = draft.kitchen_id, "Item created");
                Ok(Item {
                    id,
                    name: name.to_string(),
                    category: draft.category,
                    quantity_percent: draft.quantity_percent,
                    low_stock_threshold: draft.low_stock_threshold,
                    status: draft.status,
                    kitchen_id: draft.kitchen_id,
                })
            }
            // Foreign key miss: the kitchen does not exist.
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::NotFound("kitchen"))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_item(&self, item_id: i64) -> Result<Item> {
        let conn = self.store.conn();
        Self::fetch_item(&conn, item_id)?.ok_or(Error::NotFound("item"))
    }

    pub fn list_items_by_kitchen(&self, kitchen_id: i64) -> Result<Vec<Item>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, category, quantity_percent, low_stock_threshold, status, kitchen_id
             FROM items WHERE kitchen_id = ?1 ORDER BY id",
        )?;
        let items = stmt
            .query_map(rusqlite::params![kitchen_id], Self::item_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Apply a partial update. Status moves only if explicitly supplied;
    /// quantity and status are free to disagree through this path.
    pub fn update_item(&self, item_id: i64, patch: ItemPatch) -> Result<Item> {
        let conn = self.store.conn();
        let mut item = Self::fetch_item(&conn, item_id)?.ok_or(Error::NotFound("item"))?;

        if let Some(name) = patch.name {
            item.name = name;
        }
        if let Some(category) = patch.category {
            item.category = Some(category);
        }
        if let Some(quantity) = patch.quantity_percent {
            item.quantity_percent = quantity;
        }
        if let Some(threshold) = patch.low_stock_threshold {
            item.low_stock_threshold = threshold;
        }
        if let Some(status) = patch.status {
            item.status = status;
        }

        conn.execute(
            "UPDATE items SET name = ?1, category = ?2, quantity_percent = ?3,
                              low_stock_threshold = ?4, status = ?5
             WHERE id = ?6",
            rusqlite::params![
                item.name,
                item.category,
                item.quantity_percent,
                item.low_stock_threshold,
                item.status.as_str(),
                item_id,
            ],
        )?;
        Ok(item)
    }

    /// Set the quantity directly. Input is clamped to [0, 100]; status is
    /// derived at the bounds (<= 0 forces `needed`, >= 100 forces
    /// `in_stock`) and left untouched strictly in between.
    pub fn update_quantity(&self, item_id: i64, quantity_percent: f64) -> Result<Item> {
        // NaN would slip through clamp() and poison the stored quantity.
        if !quantity_percent.is_finite() {
            return Err(Error::Validation(
                "quantity_percent must be a finite number".into(),
            ));
        }
        let conn = self.store.conn();
        let mut item = Self::fetch_item(&conn, item_id)?.ok_or(Error::NotFound("item"))?;

        item.quantity_percent = quantity_percent.clamp(0.0, 100.0);
        if item.quantity_percent <= 0.0 {
            item.status = ItemStatus::Needed;
        } else if item.quantity_percent >= 100.0 {
            item.status = ItemStatus::InStock;
        }

        conn.execute(
            "UPDATE items SET quantity_percent = ?1, status = ?2 WHERE id = ?3",
            rusqlite::params![item.quantity_percent, item.status.as_str(), item_id],
        )?;
        Ok(item)
    }

    pub fn delete_item(&self, item_id: i64) -> Result<bool> {
        let conn = self.store.conn();
        let deleted = conn.execute(
            "DELETE FROM items WHERE id = ?1",
            rusqlite::params![item_id],
        )?;
        Ok(deleted > 0)
    }

    /// Record a consumption event: subtract `percent_used` (floored at 0)
    /// and flip status to `needed` when depleted. Never promotes status —
    /// only an explicit quantity set or a restock can do that.
    ///
    /// Log insert and item update commit or roll back together.
    pub fn record_consumption(
        &self,
        user_id: i64,
        item_id: i64,
        percent_used: f64,
    ) -> Result<ConsumptionLog> {
        let conn = self.store.conn();
        let item = Self::fetch_item(&conn, item_id)?.ok_or(Error::NotFound("item"))?;

        let new_quantity = (item.quantity_percent - percent_used).max(0.0);
        let status = if new_quantity <= 0.0 {
            ItemStatus::Needed
        } else {
            item.status
        };
        let created_at = Utc::now();

        conn.execute("BEGIN", [])?;
        let result = (|| -> Result<i64> {
            conn.execute(
                "INSERT INTO consumption_logs (user_id, item_id, percent_used, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![user_id, item_id, percent_used, created_at.to_rfc3339()],
            )?;
            let log_id = conn.last_insert_rowid();
            conn.execute(
                "UPDATE items SET quantity_percent = ?1, status = ?2 WHERE id = ?3",
                rusqlite::params![new_quantity, status.as_str(), item_id],
            )?;
            Ok(log_id)
        })();

        match result {
            Ok(log_id) => {
                conn.execute("COMMIT", [])?;
                tracing::info!(item_id, percent_used, new_quantity, "Consumption recorded");
                Ok(ConsumptionLog {
                    id: log_id,
                    user_id,
                    item_id,
                    percent_used,
                    created_at,
                })
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    /// Record a restock event: reset to (100, `in_stock`) regardless of
    /// prior state. There is no partial restock. Log insert and item
    /// update commit or roll back together.
    pub fn record_restock(&self, user_id: i64, item_id: i64) -> Result<RestockLog> {
        let conn = self.store.conn();
        if Self::fetch_item(&conn, item_id)?.is_none() {
            return Err(Error::NotFound("item"));
        }
        let created_at = Utc::now();

        conn.execute("BEGIN", [])?;
        let result = (|| -> Result<i64> {
            conn.execute(
                "INSERT INTO restock_logs (user_id, item_id, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![user_id, item_id, created_at.to_rfc3339()],
            )?;
            let log_id = conn.last_insert_rowid();
            conn.execute(
                "UPDATE items SET quantity_percent = 100.0, status = 'in_stock' WHERE id = ?1",
                rusqlite::params![item_id],
            )?;
            Ok(log_id)
        })();

        match result {
            Ok(log_id) => {
                conn.execute("COMMIT", [])?;
                tracing::info!(item_id, "Restock recorded");
                Ok(RestockLog {
                    id: log_id,
                    user_id,
                    item_id,
                    created_at,
                })
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    fn fetch_item(conn: &Connection, item_id: i64) -> Result<Option<Item>> {
        let row = conn.query_row(
            "SELECT id, name, category, quantity_percent, low_stock_threshold, status, kitchen_id
             FROM items WHERE id = ?1",
            rusqlite::params![item_id],
            Self::item_from_row,
        );
        match row {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
        Ok(Item {
            id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            quantity_percent: row.get(3)?,
            low_stock_threshold: row.get(4)?,
            status: ItemStatus::from_str_lossy(&row.get::<_, String>(5)?),
            kitchen_id: row.get(6)?,
        })
    }
}
