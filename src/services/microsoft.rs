// src/services/microsoft.rs
//! Microsoft identity platform: authorization-code exchange plus Graph profile lookup.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::auth::models::{IdentityClaim, Provider};
use crate::common::config::MicrosoftConfig;
use crate::common::{safe_email_log, safe_token_log};

#[derive(Debug, Error)]
pub enum MicrosoftError {
    #[error("Authorization code rejected: {0}")]
    CodeRejected(String),

    #[error("Profile request rejected: {0}")]
    ProfileRejected(String),

    #[error("Profile is missing field: {0}")]
    MissingField(&'static str),

    #[error("Microsoft endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

#[derive(Debug, Deserialize)]
pub struct MicrosoftTokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
}

/// Subset of the Graph `/me` resource
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrosoftProfile {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub mail: Option<String>,
    pub user_principal_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MicrosoftService {
    config: MicrosoftConfig,
    client: Client,
}

impl MicrosoftService {
    pub fn new(config: MicrosoftConfig, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { config, client }
    }

    /// Exchange `code` and resolve the signed-in user's identity
    pub async fn authenticate(&self, code: &str) -> Result<IdentityClaim, MicrosoftError> {
        let token = self.exchange_code(code).await?;
        let profile = self.fetch_profile(&token.access_token).await?;
        claim_from_profile(profile)
    }

    /// Exchange a one-time authorization code for a Graph access token
    pub async fn exchange_code(&self, code: &str) -> Result<MicrosoftTokenResponse, MicrosoftError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        info!(
            redirect_uri = %self.config.redirect_uri,
            "Exchanging Microsoft authorization code for token"
        );

        let response = self
            .client
            .post(self.config.token_endpoint())
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, timeout = e.is_timeout(), "HTTP error contacting Microsoft token endpoint");
                MicrosoftError::Unreachable(e.to_string())
            })?;

        let status = response.status();
        if status.is_server_error() {
            warn!(http_status = %status, "Microsoft token endpoint returned server error");
            return Err(MicrosoftError::Unreachable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(http_status = %status, error = %error_text, "Microsoft token exchange failed");
            return Err(MicrosoftError::CodeRejected(format!("HTTP {}", status)));
        }

        let token = response
            .json::<MicrosoftTokenResponse>()
            .await
            .map_err(|e| MicrosoftError::UnexpectedResponse(e.to_string()))?;

        if token.access_token.trim().is_empty() {
            error!("Microsoft token response carried an empty access token");
            return Err(MicrosoftError::UnexpectedResponse(
                "empty access_token".to_string(),
            ));
        }

        debug!(
            token_type = ?token.token_type,
            expires_in = ?token.expires_in,
            "Microsoft token exchange succeeded"
        );
        Ok(token)
    }

    /// Fetch the Graph profile for `access_token`
    pub async fn fetch_profile(&self, access_token: &str) -> Result<MicrosoftProfile, MicrosoftError> {
        debug!(
            token = %safe_token_log(access_token),
            "Fetching user info from Microsoft Graph"
        );

        let response = self
            .client
            .get(self.config.profile_endpoint())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, timeout = e.is_timeout(), "HTTP error contacting Microsoft Graph");
                MicrosoftError::Unreachable(e.to_string())
            })?;

        let status = response.status();
        if status.is_server_error() {
            warn!(http_status = %status, "Microsoft Graph returned server error");
            return Err(MicrosoftError::Unreachable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(http_status = %status, error = %error_text, "Microsoft Graph API failed");
            return Err(MicrosoftError::ProfileRejected(format!("HTTP {}", status)));
        }

        response
            .json::<MicrosoftProfile>()
            .await
            .map_err(|e| MicrosoftError::UnexpectedResponse(e.to_string()))
    }
}

/// `mail` is preferred; accounts without a mailbox fall back to the principal name
fn claim_from_profile(profile: MicrosoftProfile) -> Result<IdentityClaim, MicrosoftError> {
    let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    let id = non_empty(profile.id).ok_or(MicrosoftError::MissingField("id"))?;
    let email = non_empty(profile.mail)
        .or_else(|| non_empty(profile.user_principal_name))
        .ok_or(MicrosoftError::MissingField("mail/userPrincipalName"))?;
    let display_name = non_empty(profile.display_name).unwrap_or_else(|| email.clone());

    debug!(
        email = %safe_email_log(&email),
        provider_user_id = %id,
        "Microsoft profile resolved"
    );

    // Graph serves photos from a separate endpoint; none is fetched here
    Ok(IdentityClaim {
        provider: Provider::Microsoft,
        provider_user_id: id,
        email,
        display_name,
        avatar_url: None,
    })
}
