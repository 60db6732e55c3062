//! HS256-signed access/refresh tokens.
//!
//! Both token classes carry the user id as `sub` plus a `kind` claim so a
//! refresh token can never pass as an access token (or vice versa).
//! Refreshing issues a new access token only — the refresh token itself
//! is not rotated or invalidated.

use crate::error::{Error, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Default access token lifetime: 15 minutes (seconds).
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 900;

/// Default refresh token lifetime: 7 days (seconds).
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 604_800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    kind: TokenKind,
    iat: i64,
    exp: i64,
}

/// An access/refresh pair issued at login or registration.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signs and verifies session tokens for the authentication service.
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenSigner {
    pub fn new(secret: &str, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    /// Issue a fresh access+refresh pair bound to a user id.
    pub fn issue_pair(&self, user_id: i64) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.sign(user_id, TokenKind::Access, self.access_ttl_secs)?,
            refresh_token: self.sign(user_id, TokenKind::Refresh, self.refresh_ttl_secs)?,
        })
    }

    /// Exchange a valid refresh token for a new access token.
    pub fn refresh(&self, refresh_token: &str) -> Result<String> {
        let user_id = self.verify(refresh_token, TokenKind::Refresh)?;
        self.sign(user_id, TokenKind::Access, self.access_ttl_secs)
    }

    /// Resolve the subject user id from a valid, unexpired access token.
    pub fn verify_access(&self, token: &str) -> Result<i64> {
        self.verify(token, TokenKind::Access)
    }

    fn sign(&self, user_id: i64, kind: TokenKind, ttl_secs: i64) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            kind,
            iat: now,
            exp: now + ttl_secs,
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(map_jwt_error)
    }

    fn verify(&self, token: &str, expected: TokenKind) -> Result<i64> {
        let data =
            decode::<Claims>(token, &self.decoding, &Validation::default()).map_err(map_jwt_error)?;
        if data.claims.kind != expected {
            return Err(Error::TokenInvalid);
        }
        data.claims.sub.parse::<i64>().map_err(|_| Error::TokenInvalid)
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> Error {
    match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => Error::TokenExpired,
        _ => Error::TokenInvalid,
    }
}
