//! Kitchen directory — tenant scopes identified by shared 6-digit codes.
//!
//! Codes are drawn from a CSPRNG over the full 000000–999999 space and
//! checked for uniqueness before insert. The UNIQUE constraint on
//! `kitchens.code` is the authoritative guard: two concurrent creations
//! can draw the same code, and the loser retries with a fresh draw. Both
//! the draw loop and the insert loop are bounded so a nearly-full code
//! space fails with `CodeSpaceExhausted` instead of spinning.

use crate::error::{Error, Result};
use crate::store::{parse_created_at, Store};
use chrono::{DateTime, Utc};
use rand::RngExt;
use rusqlite::Connection;
use serde::Serialize;
use std::sync::Arc;

/// Upper bound on code draws (and insert retries) per create.
const MAX_CODE_ATTEMPTS: usize = 100;

/// A tenant scope owning users and items. The code is immutable after
/// creation; only the name can change.
#[derive(Debug, Clone, Serialize)]
pub struct Kitchen {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Directory service for kitchen lookup and lifecycle.
pub struct KitchenDirectory {
    store: Arc<Store>,
}

impl KitchenDirectory {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Generate a 6-digit zero-padded code not currently in use.
    pub fn generate_unique_code(&self) -> Result<String> {
        let conn = self.store.conn();
        Self::unique_code(&conn)
    }

    /// Create a kitchen with a freshly allocated unique code.
    pub fn create(&self, name: &str) -> Result<Kitchen> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Kitchen name cannot be empty".into()));
        }

        let created_at = Utc::now();
        let conn = self.store.conn();

        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = Self::unique_code(&conn)?;
            let result = conn.execute(
                "INSERT INTO kitchens (code, name, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![code, name, created_at.to_rfc3339()],
            );
            match result {
                Ok(_) => {
                    let id = conn.last_insert_rowid();
                    tracing::info!(kitchen_id = id, code = %code, "Kitchen created");
                    return Ok(Kitchen {
                        id,
                        code,
                        name: name.to_string(),
                        created_at,
                    });
                }
                // Lost a race on the code's UNIQUE constraint: redraw.
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::CodeSpaceExhausted)
    }

    /// Look up a kitchen by its 6-digit code.
    pub fn lookup_by_code(&self, code: &str) -> Result<Kitchen> {
        let conn = self.store.conn();
        let row = conn.query_row(
            "SELECT id, code, name, created_at FROM kitchens WHERE code = ?1",
            rusqlite::params![code],
            Self::kitchen_from_row,
        );
        match row {
            Ok(kitchen) => Ok(kitchen),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::NotFound("kitchen")),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a kitchen by id.
    pub fn lookup_by_id(&self, kitchen_id: i64) -> Result<Kitchen> {
        let conn = self.store.conn();
        let row = conn.query_row(
            "SELECT id, code, name, created_at FROM kitchens WHERE id = ?1",
            rusqlite::params![kitchen_id],
            Self::kitchen_from_row,
        );
        match row {
            Ok(kitchen) => Ok(kitchen),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::NotFound("kitchen")),
            Err(e) => Err(e.into()),
        }
    }

    /// All kitchens, oldest first.
    pub fn list_all(&self) -> Result<Vec<Kitchen>> {
        let conn = self.store.conn();
        let mut stmt =
            conn.prepare("SELECT id, code, name, created_at FROM kitchens ORDER BY id")?;
        let kitchens = stmt
            .query_map([], Self::kitchen_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(kitchens)
    }

    /// Rename a kitchen. The code never changes.
    pub fn rename(&self, kitchen_id: i64, new_name: &str) -> Result<Kitchen> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(Error::Validation("Kitchen name cannot be empty".into()));
        }

        {
            let conn = self.store.conn();
            let updated = conn.execute(
                "UPDATE kitchens SET name = ?1 WHERE id = ?2",
                rusqlite::params![new_name, kitchen_id],
            )?;
            if updated == 0 {
                return Err(Error::NotFound("kitchen"));
            }
        }
        self.lookup_by_id(kitchen_id)
    }

    /// Delete a kitchen. Returns false when the id has no match.
    pub fn delete(&self, kitchen_id: i64) -> Result<bool> {
        let conn = self.store.conn();
        let deleted = conn.execute(
            "DELETE FROM kitchens WHERE id = ?1",
            rusqlite::params![kitchen_id],
        )?;
        Ok(deleted > 0)
    }

    fn unique_code(conn: &Connection) -> Result<String> {
        let mut rng = rand::rng();
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = format!("{:06}", rng.random_range(0..1_000_000));
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM kitchens WHERE code = ?1",
                rusqlite::params![code],
                |row| row.get(0),
            )?;
            if exists == 0 {
                return Ok(code);
            }
        }
        Err(Error::CodeSpaceExhausted)
    }

    fn kitchen_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Kitchen> {
        Ok(Kitchen {
            id: row.get(0)?,
            code: row.get(1)?,
            name: row.get(2)?,
            created_at: parse_created_at(row, 3),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> KitchenDirectory {
        KitchenDirectory::new(Arc::new(Store::in_memory().unwrap()))
    }

    fn is_six_digits(code: &str) -> bool {
        code.len() == 6 && code.chars().all(|c| c.is_ascii_digit())
    }

    #[test]
    fn create_yields_six_digit_code() {
        let directory = directory();
        let kitchen = directory.create("Home").unwrap();
        assert!(is_six_digits(&kitchen.code), "bad code: {}", kitchen.code);
        assert_eq!(kitchen.name, "Home");
    }

    #[test]
    fn codes_are_unique_across_kitchens() {
        let directory = directory();
        let mut codes = std::collections::HashSet::new();
        for i in 0..50 {
            let kitchen = directory.create(&format!("Kitchen {i}")).unwrap();
            assert!(is_six_digits(&kitchen.code));
            assert!(codes.insert(kitchen.code), "duplicate code issued");
        }
    }

    #[test]
    fn generate_unique_code_avoids_existing_codes() {
        let directory = directory();
        let existing = directory.create("Home").unwrap();
        for _ in 0..20 {
            let code = directory.generate_unique_code().unwrap();
            assert!(is_six_digits(&code));
            assert_ne!(code, existing.code);
        }
    }

    #[test]
    fn lookup_by_code_and_id() {
        let directory = directory();
        let kitchen = directory.create("Home").unwrap();

        let by_code = directory.lookup_by_code(&kitchen.code).unwrap();
        assert_eq!(by_code.id, kitchen.id);

        let by_id = directory.lookup_by_id(kitchen.id).unwrap();
        assert_eq!(by_id.code, kitchen.code);
    }

    #[test]
    fn lookup_missing_kitchen_is_not_found() {
        let directory = directory();
        assert!(matches!(
            directory.lookup_by_code("000000"),
            Err(Error::NotFound("kitchen"))
        ));
        assert!(matches!(
            directory.lookup_by_id(999),
            Err(Error::NotFound("kitchen"))
        ));
    }

    #[test]
    fn rename_keeps_code() {
        let directory = directory();
        let kitchen = directory.create("Home").unwrap();
        let renamed = directory.rename(kitchen.id, "Shared Flat").unwrap();
        assert_eq!(renamed.name, "Shared Flat");
        assert_eq!(renamed.code, kitchen.code);
    }

    #[test]
    fn rename_missing_kitchen_is_not_found() {
        let directory = directory();
        assert!(matches!(
            directory.rename(42, "Nope"),
            Err(Error::NotFound("kitchen"))
        ));
    }

    #[test]
    fn delete_reports_whether_anything_matched() {
        let directory = directory();
        let kitchen = directory.create("Home").unwrap();
        assert!(directory.delete(kitchen.id).unwrap());
        assert!(!directory.delete(kitchen.id).unwrap());
    }

    #[test]
    fn list_all_returns_every_kitchen() {
        let directory = directory();
        directory.create("A").unwrap();
        directory.create("B").unwrap();
        let all = directory.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "A");
    }

    #[test]
    fn create_empty_name_fails() {
        let directory = directory();
        assert!(matches!(
            directory.create("  "),
            Err(Error::Validation(_))
        ));
    }
}
