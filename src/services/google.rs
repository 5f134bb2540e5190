// src/services/google.rs
//! Google ID token verification.
//!
//! Tokens are checked through Google's tokeninfo endpoint, which validates the
//! signature server-side. The service then enforces audience, issuer and expiry
//! locally before handing back a normalized identity.
//! Docs: https://developers.google.com/identity/sign-in/web/backend-auth

use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::auth::models::{IdentityClaim, Provider};
use crate::common::config::GoogleConfig;
use crate::common::{safe_email_log, safe_token_log};

const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

#[derive(Debug, Error)]
pub enum GoogleError {
    #[error("Google rejected the ID token: {0}")]
    Rejected(String),

    #[error("ID token claims failed validation: {0}")]
    InvalidClaims(String),

    #[error("ID token is missing profile field: {0}")]
    MissingField(&'static str),

    #[error("Google tokeninfo unreachable: {0}")]
    Unreachable(String),

    #[error("Unexpected tokeninfo response: {0}")]
    UnexpectedResponse(String),
}

#[derive(Debug, Clone)]
pub struct GoogleService {
    config: GoogleConfig,
    client: Client,
}

impl GoogleService {
    pub fn new(config: GoogleConfig, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { config, client }
    }

    /// Verify a Google ID token and extract the caller's identity
    pub async fn verify_id_token(&self, id_token: &str) -> Result<IdentityClaim, GoogleError> {
        debug!(
            token = %safe_token_log(id_token),
            "Initiating Google token validation with tokeninfo endpoint"
        );

        let response = self
            .client
            .get(&self.config.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    timeout = e.is_timeout(),
                    endpoint = %self.config.tokeninfo_url,
                    "HTTP error contacting Google tokeninfo endpoint"
                );
                GoogleError::Unreachable(e.to_string())
            })?;

        let status = response.status();
        debug!(http_status = %status, "Received response from Google tokeninfo endpoint");

        if status.is_server_error() {
            warn!(http_status = %status, "Google tokeninfo returned server error");
            return Err(GoogleError::Unreachable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            warn!(http_status = %status, "Google tokeninfo rejected the token");
            return Err(GoogleError::Rejected(format!("HTTP {}", status)));
        }

        let body = response.json::<Value>().await.map_err(|e| {
            error!(error = %e, "Failed to parse Google tokeninfo JSON response");
            GoogleError::UnexpectedResponse(e.to_string())
        })?;

        self.claim_from_tokeninfo(&body)
    }

    fn claim_from_tokeninfo(&self, body: &Value) -> Result<IdentityClaim, GoogleError> {
        let aud = string_field(body, "aud")
            .ok_or_else(|| GoogleError::InvalidClaims("missing audience".to_string()))?;
        if aud != self.config.client_id {
            warn!(
                token_audience = %aud,
                expected_client_id = %self.config.client_id,
                "Google token audience validation failed"
            );
            return Err(GoogleError::InvalidClaims("audience mismatch".to_string()));
        }

        let iss = string_field(body, "iss")
            .ok_or_else(|| GoogleError::InvalidClaims("missing issuer".to_string()))?;
        if !GOOGLE_ISSUERS.contains(&iss.as_str()) {
            warn!(token_issuer = %iss, "Google token issuer validation failed");
            return Err(GoogleError::InvalidClaims("issuer mismatch".to_string()));
        }

        let exp = integer_field(body, "exp")
            .ok_or_else(|| GoogleError::InvalidClaims("missing expiry".to_string()))?;
        let current_time = Utc::now().timestamp();
        if exp < current_time {
            warn!(token_exp = exp, current_time, "Google token has expired");
            return Err(GoogleError::InvalidClaims("token has expired".to_string()));
        }

        let sub = string_field(body, "sub").ok_or(GoogleError::MissingField("sub"))?;
        let email = string_field(body, "email").ok_or(GoogleError::MissingField("email"))?;

        // tokeninfo reports booleans as strings
        match body.get("email_verified") {
            Some(Value::Bool(false)) => warn!("Google token contains unverified email address"),
            Some(Value::String(s)) if s == "false" => {
                warn!("Google token contains unverified email address")
            }
            _ => {}
        }

        let display_name = string_field(body, "name").unwrap_or_else(|| email.clone());

        debug!(
            email = %safe_email_log(&email),
            provider_user_id = %sub,
            "Google token validation successful"
        );

        Ok(IdentityClaim {
            provider: Provider::Google,
            provider_user_id: sub,
            email,
            display_name,
            avatar_url: string_field(body, "picture"),
        })
    }
}

fn string_field(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// tokeninfo encodes numeric claims as strings; accept both forms
fn integer_field(body: &Value, key: &str) -> Option<i64> {
    match body.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
