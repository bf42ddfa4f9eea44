use std::collections::HashSet;

use jwt_simple::prelude::*;

use super::{AUTHENTICATED_AUDIENCE, AuthSession, SessionClaims};
use crate::error::{AppError, Result};

/// Shared-secret key for access tokens.
#[derive(Clone)]
pub struct SessionKey {
    key: HS256Key,
}

impl SessionKey {
    pub fn new(secret: &str) -> Self {
        Self {
            key: HS256Key::from_bytes(secret.as_bytes()),
        }
    }

    /// Verify an access token and return the caller's identity.
    ///
    /// Tokens must carry a non-empty `sub` and the `authenticated` audience.
    pub fn verify(&self, token: &str) -> Result<AuthSession> {
        let options = VerificationOptions {
            allowed_audiences: Some(HashSet::from([AUTHENTICATED_AUDIENCE.to_string()])),
            ..Default::default()
        };

        let claims = self
            .key
            .verify_token::<SessionClaims>(token, Some(options))
            .map_err(|e| {
                tracing::debug!("Access token rejected: {}", e);
                AppError::Unauthorized
            })?;

        let user_id = claims
            .subject
            .filter(|s| !s.is_empty())
            .ok_or(AppError::Unauthorized)?;

        Ok(AuthSession {
            user_id,
            email: claims.custom.email,
        })
    }

    /// Issue an access token shaped like the auth provider's.
    pub fn sign(&self, user_id: &str, email: Option<&str>, ttl_secs: u64) -> Result<String> {
        let custom = SessionClaims {
            email: email.map(str::to_string),
            role: Some(AUTHENTICATED_AUDIENCE.to_string()),
        };
        let claims = Claims::with_custom_claims(custom, Duration::from_secs(ttl_secs))
            .with_subject(user_id)
            .with_audience(AUTHENTICATED_AUDIENCE);

        self.key
            .authenticate(claims)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}
