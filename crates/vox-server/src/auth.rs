//! HS256 trigger-token validation.
//!
//! External callers authorize a "speak this" request with a JWT whose claims
//! name the target channel and the requesting viewer. The shared secret is
//! distributed base64-encoded.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

/// Claims carried by a trigger token.
#[derive(Clone, Debug, Deserialize)]
pub struct TriggerClaims {
    /// Target channel the text should be spoken on.
    pub channel_id: String,
    /// Viewer who triggered the announcement.
    pub user_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid secret encoding: {0}")]
    Secret(#[from] jsonwebtoken::errors::Error),
}

/// Validates trigger tokens against the configured shared secret.
pub struct TriggerAuth {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TriggerAuth {
    /// Build from the base64-encoded HS256 secret.
    pub fn from_base64_secret(secret: &str) -> Result<Self, AuthError> {
        Ok(Self {
            decoding_key: DecodingKey::from_base64_secret(secret)?,
            validation: Validation::new(Algorithm::HS256),
        })
    }

    /// Decode and validate a token. `None` covers every failure mode; the
    /// dispatch boundary maps them all to a single unauthorized response.
    pub fn decode(&self, token: &str) -> Option<TriggerClaims> {
        match jsonwebtoken::decode::<TriggerClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(err) => {
                tracing::debug!(error = %err, "trigger token rejected");
                None
            }
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let mut parts = header.splitn(2, ' ');
    match (parts.next(), parts.next()) {
        (Some(scheme), Some(token)) if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() => {
            Some(token)
        }
        _ => None,
    }
}
