//! Authentication handlers

use axum::extract::{Extension, Json};
use tracing::info;

use super::extractors::AuthedUser;
use super::models::{
    GoogleLoginRequest, MicrosoftLoginRequest, RefreshTokenRequest, Session, UserInfo,
};
use crate::common::{ApiError, AppState, Validator};

/// POST /api/auth/google
/// Authenticates a user via Google ID token
///
/// # Request Body
/// ```json
/// {
///   "idToken": "<google id token>"
/// }
/// ```
///
/// # Response
/// ```json
/// {
///   "accessToken": "<jwt>",
///   "refreshToken": "<opaque token>",
///   "expiresAt": "2024-01-01T01:00:00Z",
///   "user": { "id": "U_...", "email": "...", "name": "...", "picture": "...", "provider": "Google" }
/// }
/// ```
pub async fn google_auth(
    Extension(state): Extension<AppState>,
    Json(payload): Json<GoogleLoginRequest>,
) -> Result<Json<Session>, ApiError> {
    payload.validate().into_result()?;

    let session = state.sessions.login_with_google(&payload.id_token).await?;
    Ok(Json(session))
}

/// POST /api/auth/microsoft
/// Authenticates a user via Microsoft authorization code
///
/// # Request Body
/// ```json
/// {
///   "code": "<authorization code>"
/// }
/// ```
///
/// Responds with the same session shape as `/api/auth/google`.
pub async fn microsoft_auth(
    Extension(state): Extension<AppState>,
    Json(payload): Json<MicrosoftLoginRequest>,
) -> Result<Json<Session>, ApiError> {
    payload.validate().into_result()?;

    let session = state.sessions.login_with_microsoft(&payload.code).await?;
    Ok(Json(session))
}

/// POST /api/auth/refresh
/// Rotates a refresh token and returns a new session
///
/// # Request Body
/// ```json
/// {
///   "refreshToken": "<opaque token>"
/// }
/// ```
pub async fn refresh_token(
    Extension(state): Extension<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<Json<Session>, ApiError> {
    payload.validate().into_result()?;

    let session = state.sessions.refresh(&payload.refresh_token).await?;
    Ok(Json(session))
}

/// POST /api/auth/logout
/// Revokes the given refresh token
///
/// # Response
/// ```json
/// {
///   "message": "Logout successful"
/// }
/// ```
pub async fn logout_handler(
    Extension(state): Extension<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    payload.validate().into_result()?;

    state.sessions.logout(&payload.refresh_token).await?;

    let resp = serde_json::json!({
        "message": "Logout successful"
    });
    Ok(Json(resp))
}

/// GET /api/auth/me
/// Returns the current authenticated user's information
pub async fn me_handler(
    Extension(state): Extension<AppState>,
    authed: AuthedUser,
) -> Result<Json<UserInfo>, ApiError> {
    let user = state.sessions.current_user(&authed.id).await?;
    info!(user_id = %user.id, provider = %authed.provider, "Served current user");
    Ok(Json(user))
}
