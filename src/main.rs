// src/main.rs
use axum::{extract::Extension, middleware, routing::get, Json, Router};
use chrono::Duration;
use dotenv::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::PathBuf;
use std::{net::SocketAddr, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// MODULE IMPORTS
// ============================================================================

mod auth;
mod common;
mod logging_middleware;
mod services;

// ============================================================================
// COMMON IMPORTS
// ============================================================================

use auth::{
    ProviderVerifier, RefreshTokenStore, SessionOrchestrator, SqliteRefreshTokenRepository,
    SqliteUserStore, TokenIssuer, UserDirectory,
};
use common::config::AppConfig;
use common::{ApiError, AppState};
use services::{GoogleService, MicrosoftService};

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // ========================================================================
    // ENVIRONMENT CONFIGURATION
    // ========================================================================

    let config = AppConfig::from_env()?;
    info!(
        database_url = %config.database_url,
        jwt = ?config.jwt,
        google_enabled = config.google.is_some(),
        microsoft_enabled = config.microsoft.is_some(),
        "Configuration loaded"
    );

    // ========================================================================
    // DATABASE SETUP
    // ========================================================================

    if let Some(path_part) = config.database_url.strip_prefix("sqlite://") {
        let path_without_params = path_part.split('?').next().unwrap_or("");
        if !path_without_params.is_empty() && !path_without_params.starts_with(':') {
            let db_path = PathBuf::from(path_without_params);
            if let Some(parent) = db_path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }
    }

    let connect_options =
        SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(connect_options)
        .await?;

    common::migrations::run_migrations(&pool, config.reset_db).await?;

    // ========================================================================
    // SERVICE INITIALIZATION
    // ========================================================================

    let google = config
        .google
        .clone()
        .map(|c| GoogleService::new(c, config.provider_timeout));
    if google.is_none() {
        warn!("GOOGLE_CLIENT_ID not set, Google login disabled");
    }

    let microsoft = config
        .microsoft
        .clone()
        .map(|c| MicrosoftService::new(c, config.provider_timeout));
    if microsoft.is_none() {
        warn!("Microsoft OAuth settings incomplete, Microsoft login disabled");
    }

    let sessions = SessionOrchestrator::new(
        Arc::new(ProviderVerifier::new(google, microsoft)),
        UserDirectory::new(Arc::new(SqliteUserStore::new(pool.clone()))),
        TokenIssuer::new(config.jwt.clone()),
        RefreshTokenStore::new(
            Arc::new(SqliteRefreshTokenRepository::new(pool.clone())),
            Duration::days(config.session.refresh_token_days),
        ),
        config.session.revoke_all_on_reuse,
    );
    info!("SessionOrchestrator initialized");

    // ========================================================================
    // APPLICATION STATE
    // ========================================================================

    let app_state = AppState::new(pool, sessions);
    let app = build_router(app_state, &config.cors_origins);

    // ========================================================================
    // SERVER STARTUP
    // ========================================================================

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

// ============================================================================
// ROUTER COMPOSITION
// ============================================================================

fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let origins: Vec<axum::http::HeaderValue> = cors_origins
        .iter()
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    Router::new()
        // ====================================================================
        // AUTHENTICATION ROUTES
        // ====================================================================
        .merge(auth::auth_routes())
        .route("/health", get(health))
        // ====================================================================
        // MIDDLEWARE AND LAYERS
        // ====================================================================
        // Add request/response body logging in debug mode
        .layer(middleware::from_fn(logging_middleware::log_request_response))
        .layer(Extension(state))
        .layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::AUTHORIZATION,
                    axum::http::HeaderName::from_static("x-request-id"),
                ])
                .allow_credentials(true),
        )
        .layer(TraceLayer::new_for_http())
}

/// GET /health
async fn health(
    Extension(state): Extension<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    sqlx::query("SELECT 1")
        .execute(&state.db)
        .await
        .map_err(ApiError::DatabaseError)?;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}
