use serde::{Deserialize, Serialize};

/// Audience the auth provider stamps on end-user access tokens.
pub const AUTHENTICATED_AUDIENCE: &str = "authenticated";

/// Non-standard claims carried by auth provider access tokens.
/// Standard claims (sub, aud, exp, iat) are handled by jwt-simple.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Identity extracted from a verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: String,
    pub email: Option<String>,
}
