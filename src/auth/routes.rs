//! Authentication routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;

/// Creates and returns the authentication router
///
/// # Routes
/// - `POST /api/auth/google` - Google ID token login
/// - `POST /api/auth/microsoft` - Microsoft authorization code login
/// - `POST /api/auth/refresh` - Rotate refresh token
/// - `POST /api/auth/logout` - Revoke refresh token
/// - `GET /api/auth/me` - Get current user information
pub fn auth_routes() -> Router {
    Router::new()
        .route("/api/auth/google", post(handlers::google_auth))
        .route("/api/auth/microsoft", post(handlers::microsoft_auth))
        .route("/api/auth/refresh", post(handlers::refresh_token))
        .route("/api/auth/logout", post(handlers::logout_handler))
        .route("/api/auth/me", get(handlers::me_handler))
}
