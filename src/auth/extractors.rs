//! Authentication extractors for Axum

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::{debug, warn};

use super::models::Provider;
use crate::common::{safe_email_log, ApiError, AppState};

/// Caller identity taken from a verified access token.
///
/// Only the token is checked here; handlers that need the stored profile load it.
#[derive(Debug)]
pub struct AuthedUser {
    pub id: String,
    pub provider: Provider,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(app_state): Extension<AppState> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::InternalServer("missing app state".to_string()))?;

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| {
                warn!("Authentication failed: missing Authorization header");
                ApiError::Unauthorized("missing auth".into())
            })?;

        let bare_token = header.strip_prefix("Bearer ").unwrap_or(header).trim();

        let claims = app_state
            .sessions
            .issuer()
            .verify_access_token(bare_token)
            .map_err(ApiError::from)?;

        let provider = claims.provider.parse::<Provider>().map_err(|e| {
            warn!(user_id = %claims.sub, error = %e, "Access token carries unknown provider");
            ApiError::Unauthorized("invalid token".into())
        })?;

        debug!(
            user_id = %claims.sub,
            provider = %provider,
            email = %safe_email_log(&claims.email),
            jti = %claims.jti,
            "User authentication successful via extractor"
        );

        Ok(AuthedUser {
            id: claims.sub,
            provider,
        })
    }
}
