//! Token Issuer: mints signed access tokens and opaque refresh tokens

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use std::fmt;
use tracing::{debug, error};
use uuid::Uuid;

use super::error::AuthError;
use super::models::{AccessClaims, User};
use crate::common::config::JwtConfig;

/// Bytes of randomness behind every refresh token (256 bits)
pub const REFRESH_TOKEN_BYTES: usize = 32;

/// A freshly signed access token and the instant it stops being valid
#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenIssuer {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("config", &self.config)
            .field("keys", &"<redacted>")
            .finish()
    }
}

impl TokenIssuer {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    pub fn access_token_lifetime(&self) -> Duration {
        Duration::minutes(self.config.expiration_minutes)
    }

    /// Sign an access token for `user` valid from now
    pub fn issue_access_token(&self, user: &User) -> Result<IssuedAccessToken, AuthError> {
        self.issue_access_token_at(user, Utc::now())
    }

    pub fn issue_access_token_at(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<IssuedAccessToken, AuthError> {
        let expires_at = now + self.access_token_lifetime();
        let jti = Uuid::new_v4().to_string();

        let claims = AccessClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            provider: user.provider.clone(),
            jti: jti.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(
            |e| {
                error!(error = %e, user_id = %user.id, "JWT encoding error");
                AuthError::Internal("failed to sign access token".to_string())
            },
        )?;

        debug!(user_id = %user.id, jti = %jti, expires_at = %expires_at, "Issued access token");

        Ok(IssuedAccessToken {
            token,
            jti,
            expires_at,
        })
    }

    /// Generate an opaque refresh token from OS randomness.
    ///
    /// The value carries no user or session data.
    pub fn issue_refresh_token(&self) -> String {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        BASE64.encode(bytes)
    }

    /// Validate signature, issuer, audience and expiry of an access token
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::AccessTokenRejected(e.to_string()))
    }
}
