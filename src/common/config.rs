// src/common/config.rs
//! Process configuration loaded once from the environment at startup.
//!
//! Every component that needs a secret or an endpoint receives the relevant
//! section by value at construction time; nothing reads the environment after
//! `AppConfig::from_env` returns.

use std::env;
use std::fmt;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::warn;

pub const DEFAULT_GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
pub const DEFAULT_MICROSOFT_AUTHORITY_URL: &str = "https://login.microsoftonline.com";
pub const DEFAULT_MICROSOFT_GRAPH_URL: &str = "https://graph.microsoft.com";
pub const DEFAULT_MICROSOFT_REDIRECT_URI: &str = "http://localhost:5173/login";

/// Upper bounds for the lifetime settings; larger values overflow chrono durations
pub const MAX_ACCESS_TOKEN_MINUTES: i64 = 60 * 24 * 365;
pub const MAX_REFRESH_TOKEN_DAYS: i64 = 3650;
pub const MAX_PROVIDER_TIMEOUT_SECS: i64 = 300;

/// Access-token signing settings
#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub expiration_minutes: i64,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("expiration_minutes", &self.expiration_minutes)
            .finish()
    }
}

/// Refresh-token lifecycle settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub refresh_token_days: i64,
    pub revoke_all_on_reuse: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_token_days: 30,
            revoke_all_on_reuse: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub tokeninfo_url: String,
}

#[derive(Clone)]
pub struct MicrosoftConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authority_url: String,
    pub graph_url: String,
}

impl MicrosoftConfig {
    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_url.trim_end_matches('/'),
            self.tenant_id
        )
    }

    pub fn profile_endpoint(&self) -> String {
        format!("{}/v1.0/me", self.graph_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for MicrosoftConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicrosoftConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("authority_url", &self.authority_url)
            .field("graph_url", &self.graph_url)
            .finish()
    }
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub reset_db: bool,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub provider_timeout: Duration,
    pub jwt: JwtConfig,
    pub session: SessionConfig,
    pub google: Option<GoogleConfig>,
    pub microsoft: Option<MicrosoftConfig>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if secret.trim().is_empty() {
            bail!("JWT_SECRET must not be empty");
        }
        if secret.len() < 32 {
            warn!(
                secret_len = secret.len(),
                "JWT_SECRET is shorter than 32 bytes; generate one with `generate_jwt_secret`"
            );
        }

        let jwt = JwtConfig {
            secret,
            issuer: env_or("JWT_ISSUER", "todolist-api"),
            audience: env_or("JWT_AUDIENCE", "todolist-client"),
            expiration_minutes: parse_bounded_env(
                "JWT_EXPIRATION_MINUTES",
                60,
                MAX_ACCESS_TOKEN_MINUTES,
            ),
        };

        let session = SessionConfig {
            refresh_token_days: parse_bounded_env("REFRESH_TOKEN_DAYS", 30, MAX_REFRESH_TOKEN_DAYS),
            revoke_all_on_reuse: env::var("REVOKE_ALL_ON_REFRESH_REUSE")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(true),
        };

        // GOOGLE_CLIENT_ID - enables Google login when present
        let google = non_empty_env("GOOGLE_CLIENT_ID").map(|client_id| GoogleConfig {
            client_id,
            tokeninfo_url: env_or("GOOGLE_TOKENINFO_URL", DEFAULT_GOOGLE_TOKENINFO_URL),
        });

        // MICROSOFT_CLIENT_ID + MICROSOFT_CLIENT_SECRET - enable Microsoft login
        let microsoft = match (
            non_empty_env("MICROSOFT_CLIENT_ID"),
            non_empty_env("MICROSOFT_CLIENT_SECRET"),
        ) {
            (Some(client_id), Some(client_secret)) => Some(MicrosoftConfig {
                tenant_id: env_or("MICROSOFT_TENANT_ID", "common"),
                client_id,
                client_secret,
                redirect_uri: env_or("MICROSOFT_REDIRECT_URI", DEFAULT_MICROSOFT_REDIRECT_URI),
                authority_url: env_or("MICROSOFT_AUTHORITY_URL", DEFAULT_MICROSOFT_AUTHORITY_URL),
                graph_url: env_or("MICROSOFT_GRAPH_URL", DEFAULT_MICROSOFT_GRAPH_URL),
            }),
            (Some(_), None) | (None, Some(_)) => {
                warn!("Microsoft login disabled: MICROSOFT_CLIENT_ID and MICROSOFT_CLIENT_SECRET must both be set");
                None
            }
            (None, None) => None,
        };

        let cors_origins = env_or("CORS_ORIGINS", "http://localhost:5173,http://localhost:3000")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database_url: env_or("DATABASE_URL", "sqlite://todolist_auth.db"),
            // RESET_DB - only an explicit "true" drops the tables
            reset_db: env::var("RESET_DB").unwrap_or_default().to_lowercase() == "true",
            port: parse_env("PORT", 8080),
            cors_origins,
            provider_timeout: Duration::from_secs(
                parse_bounded_env("PROVIDER_TIMEOUT_SECS", 15, MAX_PROVIDER_TIMEOUT_SECS) as u64,
            ),
            jwt,
            session,
            google,
            microsoft,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    non_empty_env(key).unwrap_or_else(|| default.to_string())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + fmt::Display + Copy,
{
    match non_empty_env(key) {
        Some(raw) => raw.parse::<T>().unwrap_or_else(|_| {
            warn!(key = %key, value = %raw, default = %default, "Invalid numeric setting, using default");
            default
        }),
        None => default,
    }
}

/// Like `parse_env`, but values outside `1..=max` also fall back to the default
fn parse_bounded_env(key: &str, default: i64, max: i64) -> i64 {
    let value = parse_env(key, default);
    if (1..=max).contains(&value) {
        value
    } else {
        warn!(key = %key, value, max, default, "Setting out of range, using default");
        default
    }
}
