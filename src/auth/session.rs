//! Session Orchestrator: login, refresh and logout over the auth components

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::directory::UserDirectory;
use super::error::AuthError;
use super::models::{IdentityClaim, Session, User, UserInfo};
use super::refresh_store::{check_validity, RefreshTokenStore};
use super::tokens::TokenIssuer;
use super::verifier::CredentialVerifier;
use crate::common::{safe_email_log, safe_token_log};

#[derive(Clone)]
pub struct SessionOrchestrator {
    verifier: Arc<dyn CredentialVerifier>,
    directory: UserDirectory,
    issuer: TokenIssuer,
    refresh_tokens: RefreshTokenStore,
    revoke_all_on_reuse: bool,
}

impl SessionOrchestrator {
    pub fn new(
        verifier: Arc<dyn CredentialVerifier>,
        directory: UserDirectory,
        issuer: TokenIssuer,
        refresh_tokens: RefreshTokenStore,
        revoke_all_on_reuse: bool,
    ) -> Self {
        Self {
            verifier,
            directory,
            issuer,
            refresh_tokens,
            revoke_all_on_reuse,
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub async fn login_with_google(&self, id_token: &str) -> Result<Session, AuthError> {
        info!("🔐 Google login requested");
        let claim = self.verifier.verify_google(id_token).await?;
        self.establish_session(claim).await
    }

    pub async fn login_with_microsoft(&self, code: &str) -> Result<Session, AuthError> {
        info!("🔐 Microsoft login requested");
        let claim = self.verifier.verify_microsoft(code).await?;
        self.establish_session(claim).await
    }

    /// Exchange a refresh token for a new session.
    ///
    /// The presented token is revoked and replaced; it can succeed at most once.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let now = Utc::now();

        let record = self.refresh_tokens.lookup(refresh_token).await?.ok_or_else(|| {
            warn!(
                error_kind = "token_invalid",
                token = %safe_token_log(refresh_token),
                "Refresh rejected: unknown token"
            );
            AuthError::TokenInvalid
        })?;

        if let Err(e) = check_validity(&record, now) {
            warn!(
                error_kind = e.kind(),
                user_id = %record.user_id,
                token = %safe_token_log(refresh_token),
                "Refresh rejected"
            );
            if matches!(e, AuthError::TokenRevoked) && self.revoke_all_on_reuse {
                self.revoke_family(&record.user_id).await;
            }
            return Err(e);
        }

        let user = self
            .directory
            .find_by_id(&record.user_id)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %record.user_id, "Refresh token owner no longer exists");
                AuthError::TokenInvalid
            })?;

        let access = self.issuer.issue_access_token(&user)?;
        let successor = self
            .refresh_tokens
            .rotate(&record, self.issuer.issue_refresh_token())
            .await?;

        info!(
            user_id = %user.id,
            jti = %access.jti,
            old_token = %safe_token_log(refresh_token),
            new_token = %safe_token_log(&successor.token),
            "Session refreshed"
        );

        Ok(Session {
            access_token: access.token,
            refresh_token: successor.token,
            expires_at: access.expires_at,
            user: user.info(),
        })
    }

    /// Revoke a refresh token; already revoked tokens are accepted
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let record = self.refresh_tokens.revoke(refresh_token).await.map_err(|e| {
            warn!(
                error_kind = e.kind(),
                token = %safe_token_log(refresh_token),
                "Logout failed"
            );
            e
        })?;

        info!(user_id = %record.user_id, "User logout successful");
        Ok(())
    }

    /// Public profile of the user behind an access token
    pub async fn current_user(&self, user_id: &str) -> Result<UserInfo, AuthError> {
        let user = self.directory.find_by_id(user_id).await?.ok_or_else(|| {
            warn!(user_id = %user_id, "Access token subject not found");
            AuthError::AccessTokenRejected("user not found".to_string())
        })?;
        Ok(user.info())
    }

    /// Everything after a successful verification is a server-side failure
    async fn establish_session(&self, claim: IdentityClaim) -> Result<Session, AuthError> {
        debug!(
            provider = %claim.provider,
            email = %safe_email_log(&claim.email),
            "Credential verified, establishing session"
        );

        let user = self
            .directory
            .upsert(&claim)
            .await
            .map_err(|e| post_verification_failure("user upsert", e))?;

        self.issue_session(user)
            .await
            .map_err(|e| post_verification_failure("session issue", e))
    }

    async fn issue_session(&self, user: User) -> Result<Session, AuthError> {
        let access = self.issuer.issue_access_token(&user)?;
        let refresh = self
            .refresh_tokens
            .store(&user.id, self.issuer.issue_refresh_token())
            .await?;

        info!(
            user_id = %user.id,
            email = %safe_email_log(&user.email),
            provider = %user.provider,
            jti = %access.jti,
            "Session established"
        );

        Ok(Session {
            access_token: access.token,
            refresh_token: refresh.token,
            expires_at: access.expires_at,
            user: user.info(),
        })
    }

    async fn revoke_family(&self, user_id: &str) {
        match self.refresh_tokens.revoke_all_for_user(user_id).await {
            Ok(count) => warn!(
                user_id = %user_id,
                revoked = count,
                "Revoked refresh token reused, all sessions of user revoked"
            ),
            Err(e) => error!(
                error = %e,
                user_id = %user_id,
                "Failed to revoke sessions after refresh token reuse"
            ),
        }
    }
}

fn post_verification_failure(stage: &'static str, err: AuthError) -> AuthError {
    match err {
        AuthError::Internal(_) => err,
        other => {
            error!(stage, error_kind = other.kind(), error = %other, "Login failed after verification");
            AuthError::Internal(format!("{} failed", stage))
        }
    }
}
