//! User Directory: maps verified identities onto persisted users

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::error::AuthError;
use super::models::{IdentityClaim, Provider, User};
use crate::common::{generate_user_id, safe_email_log};

/// Storage contract for users.
///
/// `insert` must fail with `AuthError::DuplicateKey` when the
/// `(provider, provider_user_id)` pair already exists; the directory relies on
/// the store, not an in-memory check, to close the first-login race.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_provider_identity(
        &self,
        provider: Provider,
        provider_user_id: &str,
    ) -> Result<Option<User>, AuthError>;

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, AuthError>;

    async fn insert(&self, user: User) -> Result<User, AuthError>;

    /// Stamp a repeat login and refresh the profile fields from `claim`
    async fn touch_last_login(
        &self,
        user_id: &str,
        claim: &IdentityClaim,
        at: DateTime<Utc>,
    ) -> Result<(), AuthError>;
}

#[derive(Debug, Clone)]
pub struct SqliteUserStore {
    db: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn find_by_provider_identity(
        &self,
        provider: Provider,
        provider_user_id: &str,
    ) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE provider = ? AND provider_user_id = ?",
        )
        .bind(provider.as_str())
        .bind(provider_user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn insert(&self, user: User) -> Result<User, AuthError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, picture, provider, provider_user_id, created_at, last_login_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.picture.as_deref())
        .bind(&user.provider)
        .bind(&user.provider_user_id)
        .bind(user.created_at)
        .bind(user.last_login_at)
        .execute(&self.db)
        .await
        .map_err(AuthError::from_insert)?;

        Ok(user)
    }

    async fn touch_last_login(
        &self,
        user_id: &str,
        claim: &IdentityClaim,
        at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            UPDATE users
            SET last_login_at = ?, email = ?, name = ?, picture = COALESCE(?, picture)
            WHERE id = ?
            "#,
        )
        .bind(at)
        .bind(&claim.email)
        .bind(&claim.display_name)
        .bind(claim.avatar_url.as_deref())
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

/// Idempotent upsert of users keyed on `(provider, provider_user_id)`
#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn UserStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    pub async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, AuthError> {
        self.store.find_by_id(user_id).await
    }

    /// Create the user on first sight, otherwise record the login.
    ///
    /// A duplicate-key failure on insert means a concurrent login created the
    /// user first; the row is re-read and treated as a repeat login.
    pub async fn upsert(&self, claim: &IdentityClaim) -> Result<User, AuthError> {
        let now = Utc::now();

        if let Some(existing) = self
            .store
            .find_by_provider_identity(claim.provider, &claim.provider_user_id)
            .await?
        {
            return self.record_login(existing, claim, now).await;
        }

        let candidate = User {
            id: generate_user_id(),
            email: claim.email.clone(),
            name: claim.display_name.clone(),
            picture: claim.avatar_url.clone(),
            provider: claim.provider.as_str().to_string(),
            provider_user_id: claim.provider_user_id.clone(),
            created_at: now,
            last_login_at: now,
        };

        match self.store.insert(candidate).await {
            Ok(user) => {
                info!(
                    user_id = %user.id,
                    email = %safe_email_log(&user.email),
                    provider = %claim.provider,
                    "New user created"
                );
                Ok(user)
            }
            Err(AuthError::DuplicateKey) => {
                debug!(
                    provider = %claim.provider,
                    provider_user_id = %claim.provider_user_id,
                    "Concurrent first login detected, re-reading user"
                );
                let existing = self
                    .store
                    .find_by_provider_identity(claim.provider, &claim.provider_user_id)
                    .await?
                    .ok_or_else(|| {
                        error!(
                            provider = %claim.provider,
                            provider_user_id = %claim.provider_user_id,
                            "Duplicate key on insert but no matching user found"
                        );
                        AuthError::Internal("user insert conflicted on a non-identity key".to_string())
                    })?;
                self.record_login(existing, claim, now).await
            }
            Err(e) => Err(e),
        }
    }

    async fn record_login(
        &self,
        mut user: User,
        claim: &IdentityClaim,
        now: DateTime<Utc>,
    ) -> Result<User, AuthError> {
        self.store.touch_last_login(&user.id, claim, now).await?;

        user.last_login_at = now;
        user.email = claim.email.clone();
        user.name = claim.display_name.clone();
        if claim.avatar_url.is_some() {
            user.picture = claim.avatar_url.clone();
        }

        info!(
            user_id = %user.id,
            email = %safe_email_log(&user.email),
            provider = %claim.provider,
            "User logged in"
        );
        Ok(user)
    }
}
