//! Authentication data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::common::{safe_token_log, ValidationResult, Validator};

/// External identity service that authenticated the end user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    Google,
    Microsoft,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "Google",
            Provider::Microsoft => "Microsoft",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Google" => Ok(Provider::Google),
            "Microsoft" => Ok(Provider::Microsoft),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// Normalized profile extracted from a verified provider credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaim {
    pub provider: Provider,
    pub provider_user_id: String,
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// User database model
///
/// `(provider, provider_user_id)` is unique and is the upsert key.
#[derive(FromRow, Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub provider: String,
    pub provider_user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}

impl User {
    pub fn info(&self) -> UserInfo {
        UserInfo {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            picture: self.picture.clone(),
            provider: self.provider.clone(),
        }
    }
}

/// Refresh token database model
///
/// `active` until revoked; expiry is derived from `expires_at` rather than
/// stored as a state.
#[derive(FromRow, Clone, PartialEq)]
pub struct RefreshToken {
    pub id: String,
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshToken")
            .field("id", &self.id)
            .field("token", &safe_token_log(&self.token))
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .field("created_at", &self.created_at)
            .field("revoked", &self.revoked)
            .field("revoked_at", &self.revoked_at)
            .finish()
    }
}

/// JWT claims carried by an access token
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AccessClaims {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub provider: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Public view of a user returned to clients
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub provider: String,
}

/// Credentials handed to the client after login or refresh
#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserInfo,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &safe_token_log(&self.access_token))
            .field("refresh_token", &safe_token_log(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Google ID token payload for OAuth
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLoginRequest {
    #[serde(alias = "id_token")]
    pub id_token: String,
}

/// Microsoft authorization code payload
#[derive(Deserialize)]
pub struct MicrosoftLoginRequest {
    pub code: String,
}

/// Body of `/refresh` and `/logout`
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    #[serde(alias = "refresh_token")]
    pub refresh_token: String,
}

impl Validator for GoogleLoginRequest {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.require_non_blank("idToken", &self.id_token);
        result
    }
}

impl Validator for MicrosoftLoginRequest {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.require_non_blank("code", &self.code);
        result
    }
}

impl Validator for RefreshTokenRequest {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.require_non_blank("refreshToken", &self.refresh_token);
        result
    }
}
