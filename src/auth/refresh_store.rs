//! Refresh Token Store: persisted state machine for refresh tokens
//!
//! A token is `active` until revoked. Expiry is derived from `expires_at`.
//! Validity is checked in a fixed order: unknown, then revoked, then expired.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::error::AuthError;
use super::models::RefreshToken;
use crate::common::{generate_refresh_token_id, safe_token_log};

/// Storage contract for refresh tokens
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    /// Fails with `AuthError::DuplicateKey` when the token string already exists
    async fn insert(&self, token: &RefreshToken) -> Result<(), AuthError>;

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AuthError>;

    /// Returns `false` when the record was already revoked or does not exist
    async fn mark_revoked(&self, id: &str, at: DateTime<Utc>) -> Result<bool, AuthError>;

    /// Revoke `old_id` and insert `successor` as one unit.
    ///
    /// Fails with `AuthError::TokenRevoked` and changes nothing when `old_id`
    /// is no longer active, so two rotations of one token cannot both commit.
    async fn rotate(
        &self,
        old_id: &str,
        successor: &RefreshToken,
        at: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    async fn revoke_all_for_user(&self, user_id: &str, at: DateTime<Utc>)
        -> Result<u64, AuthError>;
}

#[derive(Debug, Clone)]
pub struct SqliteRefreshTokenRepository {
    db: SqlitePool,
}

impl SqliteRefreshTokenRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

const INSERT_REFRESH_TOKEN: &str = r#"
    INSERT INTO refresh_tokens (id, token, user_id, expires_at, created_at, revoked, revoked_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

#[async_trait]
impl RefreshTokenRepository for SqliteRefreshTokenRepository {
    async fn insert(&self, token: &RefreshToken) -> Result<(), AuthError> {
        sqlx::query(INSERT_REFRESH_TOKEN)
            .bind(&token.id)
            .bind(&token.token)
            .bind(&token.user_id)
            .bind(token.expires_at)
            .bind(token.created_at)
            .bind(token.revoked)
            .bind(token.revoked_at)
            .execute(&self.db)
            .await
            .map_err(AuthError::from_insert)?;
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AuthError> {
        let record =
            sqlx::query_as::<_, RefreshToken>("SELECT * FROM refresh_tokens WHERE token = ?")
                .bind(token)
                .fetch_optional(&self.db)
                .await?;
        Ok(record)
    }

    async fn mark_revoked(&self, id: &str, at: DateTime<Utc>) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = 1, revoked_at = ? WHERE id = ? AND revoked = 0",
        )
        .bind(at)
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn rotate(
        &self,
        old_id: &str,
        successor: &RefreshToken,
        at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut tx = self.db.begin().await?;

        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET revoked = 1, revoked_at = ? WHERE id = ? AND revoked = 0",
        )
        .bind(at)
        .bind(old_id)
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(AuthError::TokenRevoked);
        }

        sqlx::query(INSERT_REFRESH_TOKEN)
            .bind(&successor.id)
            .bind(&successor.token)
            .bind(&successor.user_id)
            .bind(successor.expires_at)
            .bind(successor.created_at)
            .bind(successor.revoked)
            .bind(successor.revoked_at)
            .execute(&mut *tx)
            .await
            .map_err(AuthError::from_insert)?;

        tx.commit().await?;
        Ok(())
    }

    async fn revoke_all_for_user(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = 1, revoked_at = ? WHERE user_id = ? AND revoked = 0",
        )
        .bind(at)
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct RefreshTokenStore {
    repo: Arc<dyn RefreshTokenRepository>,
    ttl: Duration,
}

impl RefreshTokenStore {
    pub fn new(repo: Arc<dyn RefreshTokenRepository>, ttl: Duration) -> Self {
        Self { repo, ttl }
    }

    /// Persist a new active token for `user_id` using the configured lifetime
    pub async fn store(&self, user_id: &str, token: String) -> Result<RefreshToken, AuthError> {
        self.store_with_ttl(user_id, token, self.ttl).await
    }

    /// Persist a new active token.
    ///
    /// A token-string collision is fatal and never retried.
    pub async fn store_with_ttl(
        &self,
        user_id: &str,
        token: String,
        ttl: Duration,
    ) -> Result<RefreshToken, AuthError> {
        let record = self.new_record(user_id, token, Utc::now(), ttl);

        self.repo.insert(&record).await.map_err(|e| match e {
            AuthError::DuplicateKey => {
                error!(user_id = %user_id, "Refresh token collision on insert");
                AuthError::Internal("refresh token collision".to_string())
            }
            other => other,
        })?;

        debug!(
            user_id = %user_id,
            token = %safe_token_log(&record.token),
            expires_at = %record.expires_at,
            "Stored refresh token"
        );
        Ok(record)
    }

    pub async fn lookup(&self, token: &str) -> Result<Option<RefreshToken>, AuthError> {
        self.repo.find_by_token(token).await
    }

    /// Revoke `old` and persist `new_token` for the same user in one unit
    pub async fn rotate(
        &self,
        old: &RefreshToken,
        new_token: String,
    ) -> Result<RefreshToken, AuthError> {
        let now = Utc::now();
        let successor = self.new_record(&old.user_id, new_token, now, self.ttl);

        match self.repo.rotate(&old.id, &successor, now).await {
            Ok(()) => {
                debug!(
                    user_id = %old.user_id,
                    old_token = %safe_token_log(&old.token),
                    new_token = %safe_token_log(&successor.token),
                    "Rotated refresh token"
                );
                Ok(successor)
            }
            Err(AuthError::TokenRevoked) => {
                warn!(
                    user_id = %old.user_id,
                    token = %safe_token_log(&old.token),
                    "Refresh token was consumed concurrently"
                );
                Err(AuthError::TokenRevoked)
            }
            Err(AuthError::DuplicateKey) => {
                error!(user_id = %old.user_id, "Refresh token collision during rotation");
                Err(AuthError::Internal("refresh token collision".to_string()))
            }
            Err(e) => {
                error!(error = %e, user_id = %old.user_id, "Refresh token rotation failed");
                Err(AuthError::Internal("refresh token rotation failed".to_string()))
            }
        }
    }

    /// Revoke a single token; revoking an already revoked token is a no-op
    pub async fn revoke(&self, token: &str) -> Result<RefreshToken, AuthError> {
        let record = self.lookup(token).await?.ok_or(AuthError::TokenInvalid)?;
        if self.repo.mark_revoked(&record.id, Utc::now()).await? {
            info!(user_id = %record.user_id, token = %safe_token_log(token), "Refresh token revoked");
        }
        Ok(record)
    }

    pub async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64, AuthError> {
        self.repo.revoke_all_for_user(user_id, Utc::now()).await
    }

    fn new_record(
        &self,
        user_id: &str,
        token: String,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> RefreshToken {
        RefreshToken {
            id: generate_refresh_token_id(),
            token,
            user_id: user_id.to_string(),
            expires_at: now + ttl,
            created_at: now,
            revoked: false,
            revoked_at: None,
        }
    }
}

/// Unknown is handled by the caller; revoked is reported before expired
pub fn check_validity(record: &RefreshToken, now: DateTime<Utc>) -> Result<(), AuthError> {
    if record.revoked {
        return Err(AuthError::TokenRevoked);
    }
    if record.is_expired(now) {
        return Err(AuthError::TokenExpired);
    }
    Ok(())
}
