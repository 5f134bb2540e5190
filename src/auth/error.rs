//! Failure taxonomy of the auth core

use thiserror::Error;

use super::models::Provider;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Provider rejected the credential, or signature/audience/issuer/expiry checks failed
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// Credential was accepted but the profile lacks a required field
    #[error("incomplete {provider} profile: {reason}")]
    IncompleteProfile { provider: Provider, reason: String },

    /// Network failure or timeout talking to a provider
    #[error("identity provider unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("refresh token not recognised")]
    TokenInvalid,

    #[error("refresh token has been revoked")]
    TokenRevoked,

    #[error("refresh token expired")]
    TokenExpired,

    #[error("access token rejected: {0}")]
    AccessTokenRejected(String),

    /// Insert lost a race on a unique key; callers recover by re-reading
    #[error("duplicate key")]
    DuplicateKey,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AuthError {
    /// Stable tag for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidCredential(_) => "invalid_credential",
            AuthError::IncompleteProfile { .. } => "incomplete_profile",
            AuthError::UpstreamUnavailable(_) => "upstream_unavailable",
            AuthError::TokenInvalid => "token_invalid",
            AuthError::TokenRevoked => "token_revoked",
            AuthError::TokenExpired => "token_expired",
            AuthError::AccessTokenRejected(_) => "access_token_rejected",
            AuthError::DuplicateKey => "duplicate_key",
            AuthError::Internal(_) => "internal_error",
            AuthError::Database(_) => "database_error",
        }
    }

    /// Maps a storage error, turning unique-constraint violations into `DuplicateKey`
    pub fn from_insert(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => AuthError::DuplicateKey,
            _ => AuthError::Database(err),
        }
    }
}
