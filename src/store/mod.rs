//! SQLite-backed relational store shared by every service.
//!
//! Tables:
//! - `kitchens`: unique 6-digit code, name, created_at
//! - `users`: display_name (unique per kitchen), password_hash, is_active
//! - `items`: percentage quantity, threshold, status, kitchen_id
//! - `consumption_logs` / `restock_logs`: append-only event records
//!
//! One handle is created at process startup and injected into each
//! service; no module-level database state anywhere in the crate.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use std::path::Path;

/// Shared storage handle. WAL mode for concurrent reads + crash safety;
/// foreign keys enforced so log rows always point at real users/items.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data dir: {}", parent.display()))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kitchens (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                code       TEXT NOT NULL UNIQUE,
                name       TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                display_name  TEXT NOT NULL COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                kitchen_id    INTEGER NOT NULL REFERENCES kitchens(id),
                is_active     INTEGER NOT NULL DEFAULT 1,
                created_at    TEXT NOT NULL,
                UNIQUE (kitchen_id, display_name)
            );
            CREATE INDEX IF NOT EXISTS idx_users_kitchen ON users(kitchen_id);

            CREATE TABLE IF NOT EXISTS items (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                name                TEXT NOT NULL,
                category            TEXT,
                quantity_percent    REAL NOT NULL DEFAULT 100.0,
                low_stock_threshold REAL NOT NULL DEFAULT 20.0,
                status              TEXT NOT NULL DEFAULT 'in_stock'
                                    CHECK (status IN ('needed', 'in_stock')),
                kitchen_id          INTEGER NOT NULL REFERENCES kitchens(id)
            );
            CREATE INDEX IF NOT EXISTS idx_items_kitchen ON items(kitchen_id);

            CREATE TABLE IF NOT EXISTS consumption_logs (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id      INTEGER NOT NULL REFERENCES users(id),
                item_id      INTEGER NOT NULL REFERENCES items(id),
                percent_used REAL NOT NULL,
                created_at   TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_consumption_item ON consumption_logs(item_id);
            CREATE INDEX IF NOT EXISTS idx_consumption_user ON consumption_logs(user_id);

            CREATE TABLE IF NOT EXISTS restock_logs (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id    INTEGER NOT NULL REFERENCES users(id),
                item_id    INTEGER NOT NULL REFERENCES items(id),
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_restock_item ON restock_logs(item_id);
            CREATE INDEX IF NOT EXISTS idx_restock_user ON restock_logs(user_id);",
        )?;
        Ok(())
    }

    /// Lock the connection. Services hold the guard for one operation
    /// at a time; helpers take `&Connection` so a method never re-locks.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Cheap connectivity probe for the health endpoint.
    pub fn ping(&self) -> bool {
        let conn = self.conn.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }
}

/// Parse a stored RFC 3339 `created_at` column, falling back to the
/// current time when the cell is malformed.
pub(crate) fn parse_created_at(row: &rusqlite::Row<'_>, idx: usize) -> DateTime<Utc> {
    row.get::<_, String>(idx)
        .ok()
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn in_memory_store_initializes_schema() {
        let store = Store::in_memory().unwrap();
        let conn = store.conn();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('kitchens', 'users', 'items', 'consumption_logs', 'restock_logs')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }

    #[test]
    fn open_creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nested").join("kitchensync.db");
        let store = Store::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert!(store.ping());
    }

    #[test]
    fn kitchen_code_is_unique_at_storage_layer() {
        let store = Store::in_memory().unwrap();
        let conn = store.conn();
        conn.execute(
            "INSERT INTO kitchens (code, name, created_at) VALUES ('123456', 'a', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO kitchens (code, name, created_at) VALUES ('123456', 'b', '2026-01-01T00:00:00Z')",
            [],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn display_name_unique_per_kitchen_not_globally() {
        let store = Store::in_memory().unwrap();
        let conn = store.conn();
        conn.execute_batch(
            "INSERT INTO kitchens (code, name, created_at) VALUES ('111111', 'a', '2026-01-01T00:00:00Z');
             INSERT INTO kitchens (code, name, created_at) VALUES ('222222', 'b', '2026-01-01T00:00:00Z');",
        )
        .unwrap();

        let insert = |kitchen_id: i64| {
            conn.execute(
                "INSERT INTO users (display_name, password_hash, kitchen_id, created_at)
                 VALUES ('Alice', 'h', ?1, '2026-01-01T00:00:00Z')",
                [kitchen_id],
            )
        };
        assert!(insert(1).is_ok());
        assert!(insert(1).is_err());
        assert!(insert(2).is_ok());
    }

    #[test]
    fn malformed_created_at_falls_back_to_now() {
        let store = Store::in_memory().unwrap();
        let conn = store.conn();
        let parsed = conn
            .query_row("SELECT 'not-a-timestamp'", [], |row| {
                Ok(parse_created_at(row, 0))
            })
            .unwrap();
        assert!((Utc::now() - parsed).num_seconds().abs() < 5);

        let exact = conn
            .query_row("SELECT '2026-01-01T00:00:00Z'", [], |row| {
                Ok(parse_created_at(row, 0))
            })
            .unwrap();
        assert_eq!(exact.to_rfc3339(), "2026-01-01T00:00:00+00:00");
    }

    #[test]
    fn item_status_is_constrained() {
        let store = Store::in_memory().unwrap();
        let conn = store.conn();
        conn.execute(
            "INSERT INTO kitchens (code, name, created_at) VALUES ('111111', 'a', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let bad = conn.execute(
            "INSERT INTO items (name, kitchen_id, status) VALUES ('milk', 1, 'bogus')",
            [],
        );
        assert!(bad.is_err());
    }
}
