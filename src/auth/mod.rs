//! Kitchen-scoped user authentication.
//!
//! Provides:
//! - Registration bound to a kitchen's 6-digit code (display names are
//!   unique per kitchen, not globally)
//! - Login that collapses every failure cause — unknown kitchen, unknown
//!   user, wrong password, deactivated account — into one indistinguishable
//!   "invalid credentials" outcome
//! - HS256 access/refresh token issue, refresh, and subject resolution
//!
//! Passwords are bcrypt-hashed via [`credentials`]; tokens are signed
//! via [`tokens::TokenSigner`].

pub mod credentials;
pub mod tokens;

use crate::error::{Error, Result};
use crate::store::Store;
use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use std::sync::Arc;

pub use tokens::{TokenPair, TokenSigner};

/// Maximum display name length, matching the `users` column width.
const MAX_DISPLAY_NAME_LEN: usize = 80;

/// A registered user, always resolved together with its kitchen code so
/// callers never need a second lookup.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub kitchen_id: i64,
    pub kitchen_code: String,
    pub is_active: bool,
}

/// Authentication service over the shared store.
pub struct AuthService {
    store: Arc<Store>,
    signer: TokenSigner,
}

impl AuthService {
    pub fn new(store: Arc<Store>, signer: TokenSigner) -> Self {
        Self { store, signer }
    }

    /// Register a new user in the kitchen identified by `kitchen_code`.
    ///
    /// Fails with `NotFound("kitchen")` for an unknown code and `Conflict`
    /// when the display name is already taken within that kitchen. Password
    /// strength and code format are the transport boundary's checks.
    pub fn register(&self, display_name: &str, password: &str, kitchen_code: &str) -> Result<User> {
        let trimmed = display_name.trim();
        if trimmed.is_empty() {
            return Err(Error::Validation("Display name cannot be empty".into()));
        }
        if trimmed.len() > MAX_DISPLAY_NAME_LEN {
            return Err(Error::Validation(format!(
                "Display name too long (max {MAX_DISPLAY_NAME_LEN} characters)"
            )));
        }

        let kitchen_id = {
            let conn = self.store.conn();
            Self::kitchen_id_by_code(&conn, kitchen_code)?.ok_or(Error::NotFound("kitchen"))?
        };

        // Hash outside the connection lock — bcrypt is deliberately slow.
        let password_hash = credentials::hash(password)?;
        let now = Utc::now();

        let conn = self.store.conn();
        let result = conn.execute(
            "INSERT INTO users (display_name, password_hash, kitchen_id, is_active, created_at)
             VALUES (?1, ?2, ?3, 1, ?4)",
            rusqlite::params![trimmed, password_hash, kitchen_id, now.to_rfc3339()],
        );

        match result {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                tracing::info!(user_id = id, kitchen_id, "User registered");
                Ok(User {
                    id,
                    display_name: trimmed.to_string(),
                    password_hash,
                    kitchen_id,
                    kitchen_code: kitchen_code.to_string(),
                    is_active: true,
                })
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::Conflict(format!(
                    "Display name '{trimmed}' is already taken in this kitchen"
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Authenticate a user by display name + password within a kitchen.
    ///
    /// Every failure path returns the identical `InvalidCredentials` so a
    /// caller cannot probe which kitchens or display names exist.
    pub fn authenticate(
        &self,
        display_name: &str,
        password: &str,
        kitchen_code: &str,
    ) -> Result<User> {
        let user = {
            let conn = self.store.conn();
            Self::user_by_name_and_code(&conn, display_name.trim(), kitchen_code)?
        };

        let Some(user) = user else {
            // Equalize timing against the password-check path.
            let _ = credentials::verify(password, credentials::DUMMY_HASH);
            return Err(Error::InvalidCredentials);
        };

        if !credentials::verify(password, &user.password_hash) {
            return Err(Error::InvalidCredentials);
        }
        if !user.is_active {
            return Err(Error::InvalidCredentials);
        }

        Ok(user)
    }

    /// Issue an access/refresh pair for an authenticated user.
    pub fn issue_tokens(&self, user: &User) -> Result<TokenPair> {
        self.signer.issue_pair(user.id)
    }

    /// Exchange a valid refresh token for a new access token.
    pub fn refresh(&self, refresh_token: &str) -> Result<String> {
        self.signer.refresh(refresh_token)
    }

    /// Resolve the user behind an access token. Fails with
    /// `NotFound("user")` when the token outlived the account.
    pub fn current_user(&self, access_token: &str) -> Result<User> {
        let user_id = self.signer.verify_access(access_token)?;
        let conn = self.store.conn();
        Self::user_by_id(&conn, user_id)?.ok_or(Error::NotFound("user"))
    }

    // ── Row helpers (take &Connection; never re-lock) ───────────────

    fn kitchen_id_by_code(conn: &Connection, code: &str) -> Result<Option<i64>> {
        let row = conn.query_row(
            "SELECT id FROM kitchens WHERE code = ?1",
            rusqlite::params![code],
            |row| row.get(0),
        );
        match row {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn user_by_id(conn: &Connection, user_id: i64) -> Result<Option<User>> {
        let row = conn.query_row(
            "SELECT u.id, u.display_name, u.password_hash, u.kitchen_id, u.is_active, k.code
             FROM users u JOIN kitchens k ON u.kitchen_id = k.id
             WHERE u.id = ?1",
            rusqlite::params![user_id],
            Self::user_from_row,
        );
        match row {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn user_by_name_and_code(
        conn: &Connection,
        display_name: &str,
        kitchen_code: &str,
    ) -> Result<Option<User>> {
        let row = conn.query_row(
            "SELECT u.id, u.display_name, u.password_hash, u.kitchen_id, u.is_active, k.code
             FROM users u JOIN kitchens k ON u.kitchen_id = k.id
             WHERE k.code = ?1 AND u.display_name = ?2",
            rusqlite::params![kitchen_code, display_name],
            Self::user_from_row,
        );
        match row {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            display_name: row.get(1)?,
            password_hash: row.get(2)?,
            kitchen_id: row.get(3)?,
            is_active: row.get(4)?,
            kitchen_code: row.get(5)?,
        })
    }
}
