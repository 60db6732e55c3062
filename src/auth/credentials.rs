//! Password hashing via bcrypt (per-password salt, adaptive cost).
//!
//! No plaintext password is ever persisted or logged; hash comparison is
//! the bcrypt crate's constant-time concern.

use crate::error::Result;

/// Known-good bcrypt hash used to equalize timing when the looked-up user
/// does not exist (hash of the literal string "password", never matched).
pub(crate) const DUMMY_HASH: &str =
    "$2b$12$R9h/cIPz0gi.URNNX3kh2OPST9/PgBkqquzi.Ss7KIUgO2t0jWMUW";

/// Hash a password with a fresh per-password salt.
pub fn hash(password: &str) -> Result<String> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

/// Verify a password against a stored hash. A malformed stored hash
/// verifies as a mismatch rather than an error.
pub fn verify(password: &str, stored_hash: &str) -> bool {
    bcrypt::verify(password, stored_hash).unwrap_or(false)
}
