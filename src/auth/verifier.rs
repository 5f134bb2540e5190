//! Credential Verifier: turns provider artifacts into identity claims

use async_trait::async_trait;
use tracing::{error, warn};

use super::error::AuthError;
use super::models::{IdentityClaim, Provider};
use crate::services::{GoogleError, GoogleService, MicrosoftError, MicrosoftService};

/// Verification seam used by the session orchestrator.
///
/// Implementations perform read-only provider calls and never persist anything.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify_google(&self, id_token: &str) -> Result<IdentityClaim, AuthError>;

    async fn verify_microsoft(&self, authorization_code: &str) -> Result<IdentityClaim, AuthError>;
}

/// Verifier backed by the live Google and Microsoft clients.
///
/// A provider without configuration is disabled; logins through it fail
/// with an internal error.
#[derive(Debug, Clone, Default)]
pub struct ProviderVerifier {
    google: Option<GoogleService>,
    microsoft: Option<MicrosoftService>,
}

impl ProviderVerifier {
    pub fn new(google: Option<GoogleService>, microsoft: Option<MicrosoftService>) -> Self {
        Self { google, microsoft }
    }
}

#[async_trait]
impl CredentialVerifier for ProviderVerifier {
    async fn verify_google(&self, id_token: &str) -> Result<IdentityClaim, AuthError> {
        let google = self.google.as_ref().ok_or_else(|| {
            error!("Google login attempted but GOOGLE_CLIENT_ID is not configured");
            AuthError::Internal("Google login is not configured".to_string())
        })?;

        google.verify_id_token(id_token).await.map_err(|e| {
            warn!(provider = "Google", error = %e, "Google credential verification failed");
            map_google_error(e)
        })
    }

    async fn verify_microsoft(&self, authorization_code: &str) -> Result<IdentityClaim, AuthError> {
        let microsoft = self.microsoft.as_ref().ok_or_else(|| {
            error!("Microsoft login attempted but Microsoft OAuth is not configured");
            AuthError::Internal("Microsoft login is not configured".to_string())
        })?;

        microsoft.authenticate(authorization_code).await.map_err(|e| {
            warn!(provider = "Microsoft", error = %e, "Microsoft credential verification failed");
            map_microsoft_error(e)
        })
    }
}

fn map_google_error(err: GoogleError) -> AuthError {
    match err {
        GoogleError::Rejected(msg) | GoogleError::InvalidClaims(msg) => {
            AuthError::InvalidCredential(msg)
        }
        GoogleError::MissingField(field) => AuthError::IncompleteProfile {
            provider: Provider::Google,
            reason: format!("missing {}", field),
        },
        GoogleError::Unreachable(msg) | GoogleError::UnexpectedResponse(msg) => {
            AuthError::UpstreamUnavailable(msg)
        }
    }
}

fn map_microsoft_error(err: MicrosoftError) -> AuthError {
    match err {
        MicrosoftError::CodeRejected(msg) | MicrosoftError::ProfileRejected(msg) => {
            AuthError::InvalidCredential(msg)
        }
        MicrosoftError::MissingField(field) => AuthError::IncompleteProfile {
            provider: Provider::Microsoft,
            reason: format!("missing {}", field),
        },
        MicrosoftError::Unreachable(msg) | MicrosoftError::UnexpectedResponse(msg) => {
            AuthError::UpstreamUnavailable(msg)
        }
    }
}
