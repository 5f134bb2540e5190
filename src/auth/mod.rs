//! # Auth Module
//!
//! This module handles all authentication-related functionality including:
//! - Google ID token and Microsoft authorization code login
//! - JWT access tokens and rotating refresh tokens
//! - AuthedUser extractor for protected routes

pub mod directory;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod refresh_store;
pub mod routes;
pub mod session;
pub mod tokens;
pub mod verifier;

#[cfg(test)]
mod tests;

pub use directory::{SqliteUserStore, UserDirectory};
pub use error::AuthError;
pub use refresh_store::{RefreshTokenStore, SqliteRefreshTokenRepository};
pub use routes::auth_routes;
pub use session::SessionOrchestrator;
pub use tokens::TokenIssuer;
pub use verifier::ProviderVerifier;
