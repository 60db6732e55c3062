//! Domain error taxonomy shared by every service.
//!
//! Expected absences (`NotFound`) and rejected credentials are ordinary
//! `Err` values, never panics. Each variant maps to exactly one stable
//! HTTP error code at the gateway boundary.

use thiserror::Error;

/// Crate-wide result alias for service-layer operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The named entity has no match for the given id or code.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Uniqueness violation (duplicate display name per kitchen, or a
    /// kitchen-code collision that survived the insert retry).
    #[error("{0}")]
    Conflict(String),

    /// Collapses all authentication failure causes: unknown kitchen code,
    /// unknown display name, wrong password, inactive account. Callers
    /// must not be able to tell these apart.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Caller-side field constraint violation (format, range, required).
    #[error("{0}")]
    Validation(String),

    /// Token signature or structure check failed.
    #[error("token is invalid")]
    TokenInvalid,

    /// Token was well-formed and correctly signed but past its expiry.
    #[error("token has expired")]
    TokenExpired,

    /// The 6-digit code space could not yield a free code within the
    /// bounded number of retries.
    #[error("kitchen code space exhausted")]
    CodeSpaceExhausted,

    #[error("password hashing failed: {0}")]
    Credential(#[from] bcrypt::BcryptError),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl Error {
    /// Stable machine-readable identifier consumed by API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::InvalidCredentials => "auth_invalid_credentials",
            Self::Validation(_) => "validation_error",
            Self::TokenInvalid => "token_invalid",
            Self::TokenExpired => "token_expired",
            Self::CodeSpaceExhausted => "code_space_exhausted",
            Self::Credential(_) | Self::Storage(_) => "storage_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::NotFound("item").code(), "not_found");
        assert_eq!(Error::InvalidCredentials.code(), "auth_invalid_credentials");
        assert_eq!(Error::TokenExpired.code(), "token_expired");
        assert_eq!(Error::Validation("x".into()).code(), "validation_error");
    }

    #[test]
    fn not_found_names_the_entity() {
        assert_eq!(Error::NotFound("kitchen").to_string(), "kitchen not found");
    }

    #[test]
    fn invalid_credentials_message_leaks_nothing() {
        let msg = Error::InvalidCredentials.to_string();
        assert!(!msg.contains("password"));
        assert!(!msg.contains("kitchen"));
        assert!(!msg.contains("user"));
    }
}
