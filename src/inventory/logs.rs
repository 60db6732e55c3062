//! Append-only consumption/restock event records and their query layer.
//!
//! Logs are written only by the ledger's `record_consumption` and
//! `record_restock`, never mutated, and only ever deleted outright.
//! Deleting a log does not roll back the item quantity it produced.
//!
//! Retrieval takes exactly one filter dimension per call. Filtering by
//! kitchen joins through `items` — log rows carry no kitchen id of their
//! own, and the membership lookup is an explicit join rather than a lazy
//! relationship walk.

use crate::error::{Error, Result};
use crate::store::{parse_created_at, Store};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// A consumption event: `percent_used` was subtracted from the item.
#[derive(Debug, Clone, Serialize)]
pub struct ConsumptionLog {
    pub id: i64,
    pub user_id: i64,
    pub item_id: i64,
    pub percent_used: f64,
    pub created_at: DateTime<Utc>,
}

/// A restock event: the item was reset to full.
#[derive(Debug, Clone, Serialize)]
pub struct RestockLog {
    pub id: i64,
    pub user_id: i64,
    pub item_id: i64,
    pub created_at: DateTime<Utc>,
}

/// The single filter dimension a log listing accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFilter {
    Item(i64),
    Kitchen(i64),
    User(i64),
}

/// Read/delete access to both log tables. Newest first, always.
pub struct LogQuery {
    store: Arc<Store>,
}

impl LogQuery {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn list_consumption(&self, filter: LogFilter) -> Result<Vec<ConsumptionLog>> {
        let conn = self.store.conn();
        let (sql, id) = match filter {
            LogFilter::Item(id) => (
                "SELECT id, user_id, item_id, percent_used, created_at
                 FROM consumption_logs WHERE item_id = ?1
                 ORDER BY created_at DESC, id DESC",
                id,
            ),
            LogFilter::User(id) => (
                "SELECT id, user_id, item_id, percent_used, created_at
                 FROM consumption_logs WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC",
                id,
            ),
            LogFilter::Kitchen(id) => (
                "SELECT l.id, l.user_id, l.item_id, l.percent_used, l.created_at
                 FROM consumption_logs l JOIN items i ON l.item_id = i.id
                 WHERE i.kitchen_id = ?1
                 ORDER BY l.created_at DESC, l.id DESC",
                id,
            ),
        };
        let mut stmt = conn.prepare(sql)?;
        let logs = stmt
            .query_map(rusqlite::params![id], Self::consumption_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    pub fn list_restock(&self, filter: LogFilter) -> Result<Vec<RestockLog>> {
        let conn = self.store.conn();
        let (sql, id) = match filter {
            LogFilter::Item(id) => (
                "SELECT id, user_id, item_id, created_at
                 FROM restock_logs WHERE item_id = ?1
                 ORDER BY created_at DESC, id DESC",
                id,
            ),
            LogFilter::User(id) => (
                "SELECT id, user_id, item_id, created_at
                 FROM restock_logs WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC",
                id,
            ),
            LogFilter::Kitchen(id) => (
                "SELECT l.id, l.user_id, l.item_id, l.created_at
                 FROM restock_logs l JOIN items i ON l.item_id = i.id
                 WHERE i.kitchen_id = ?1
                 ORDER BY l.created_at DESC, l.id DESC",
                id,
            ),
        };
        let mut stmt = conn.prepare(sql)?;
        let logs = stmt
            .query_map(rusqlite::params![id], Self::restock_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    pub fn get_consumption(&self, log_id: i64) -> Result<ConsumptionLog> {
        let conn = self.store.conn();
        let row = conn.query_row(
            "SELECT id, user_id, item_id, percent_used, created_at
             FROM consumption_logs WHERE id = ?1",
            rusqlite::params![log_id],
            Self::consumption_from_row,
        );
        match row {
            Ok(log) => Ok(log),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::NotFound("consumption log")),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_restock(&self, log_id: i64) -> Result<RestockLog> {
        let conn = self.store.conn();
        let row = conn.query_row(
            "SELECT id, user_id, item_id, created_at FROM restock_logs WHERE id = ?1",
            rusqlite::params![log_id],
            Self::restock_from_row,
        );
        match row {
            Ok(log) => Ok(log),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::NotFound("restock log")),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a consumption log. Item quantity is untouched.
    pub fn delete_consumption(&self, log_id: i64) -> Result<bool> {
        let conn = self.store.conn();
        let deleted = conn.execute(
            "DELETE FROM consumption_logs WHERE id = ?1",
            rusqlite::params![log_id],
        )?;
        Ok(deleted > 0)
    }

    /// Delete a restock log. Item quantity is untouched.
    pub fn delete_restock(&self, log_id: i64) -> Result<bool> {
        let conn = self.store.conn();
        let deleted = conn.execute(
            "DELETE FROM restock_logs WHERE id = ?1",
            rusqlite::params![log_id],
        )?;
        Ok(deleted > 0)
    }

    fn consumption_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConsumptionLog> {
        Ok(ConsumptionLog {
            id: row.get(0)?,
            user_id: row.get(1)?,
            item_id: row.get(2)?,
            percent_used: row.get(3)?,
            created_at: parse_created_at(row, 4),
        })
    }

    fn restock_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RestockLog> {
        Ok(RestockLog {
            id: row.get(0)?,
            user_id: row.get(1)?,
            item_id: row.get(2)?,
            created_at: parse_created_at(row, 3),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{InventoryLedger, NewItem};
    use crate::kitchen::KitchenDirectory;

    struct Fixture {
        ledger: InventoryLedger,
        logs: LogQuery,
        kitchen_id: i64,
        other_kitchen_id: i64,
        item_id: i64,
        other_item_id: i64,
        user_id: i64,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(Store::in_memory().unwrap());
        let directory = KitchenDirectory::new(store.clone());
        let ledger = InventoryLedger::new(store.clone());
        let logs = LogQuery::new(store.clone());

        let kitchen = directory.create("Home").unwrap();
        let other = directory.create("Office").unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO users (display_name, password_hash, kitchen_id, created_at)
                 VALUES ('Alice', 'h', ?1, '2026-01-01T00:00:00Z')",
                rusqlite::params![kitchen.id],
            )
            .unwrap();

        let item = ledger.create_item(NewItem::new("Milk", kitchen.id)).unwrap();
        let other_item = ledger.create_item(NewItem::new("Beans", other.id)).unwrap();

        Fixture {
            ledger,
            logs,
            kitchen_id: kitchen.id,
            other_kitchen_id: other.id,
            item_id: item.id,
            other_item_id: other_item.id,
            user_id: 1,
        }
    }

    #[test]
    fn list_consumption_by_item_newest_first() {
        let f = fixture();
        let first = f
            .ledger
            .record_consumption(f.user_id, f.item_id, 10.0)
            .unwrap();
        let second = f
            .ledger
            .record_consumption(f.user_id, f.item_id, 20.0)
            .unwrap();

        let logs = f.logs.list_consumption(LogFilter::Item(f.item_id)).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].id, second.id);
        assert_eq!(logs[1].id, first.id);
    }

    #[test]
    fn kitchen_filter_joins_through_items() {
        let f = fixture();
        f.ledger
            .record_consumption(f.user_id, f.item_id, 10.0)
            .unwrap();
        f.ledger
            .record_consumption(f.user_id, f.other_item_id, 10.0)
            .unwrap();

        let home = f
            .logs
            .list_consumption(LogFilter::Kitchen(f.kitchen_id))
            .unwrap();
        assert_eq!(home.len(), 1);
        assert_eq!(home[0].item_id, f.item_id);

        let office = f
            .logs
            .list_consumption(LogFilter::Kitchen(f.other_kitchen_id))
            .unwrap();
        assert_eq!(office.len(), 1);
        assert_eq!(office[0].item_id, f.other_item_id);
    }

    #[test]
    fn list_restock_by_user() {
        let f = fixture();
        f.ledger.record_restock(f.user_id, f.item_id).unwrap();
        f.ledger.record_restock(f.user_id, f.item_id).unwrap();

        let logs = f.logs.list_restock(LogFilter::User(f.user_id)).unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs[0].id > logs[1].id);
    }

    #[test]
    fn get_missing_log_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.logs.get_consumption(99),
            Err(Error::NotFound("consumption log"))
        ));
        assert!(matches!(
            f.logs.get_restock(99),
            Err(Error::NotFound("restock log"))
        ));
    }

    #[test]
    fn deleting_a_log_does_not_roll_back_quantity() {
        let f = fixture();
        let log = f
            .ledger
            .record_consumption(f.user_id, f.item_id, 40.0)
            .unwrap();
        assert!(f.logs.delete_consumption(log.id).unwrap());
        assert!(!f.logs.delete_consumption(log.id).unwrap());

        let item = f.ledger.get_item(f.item_id).unwrap();
        assert_eq!(item.quantity_percent, 60.0);
    }
}
