//! Error types for the Vibe Store SDK

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// No signed-in user or access token
    NoSession,
    /// Server could not be reached
    Network,
    Timeout,
    Unauthorized,
    NotFound,
    /// Rejected request (bad product, mode mismatch, off-origin redirect)
    Validation,
    /// Server or processor temporarily unavailable
    Unavailable,
    ServerError,
    /// Response did not match the expected shape
    InvalidResponse,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StoreError {
    pub code: StoreErrorCode,
    pub message: String,
    /// HTTP status, when the server answered
    pub status_code: Option<u16>,
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(code: StoreErrorCode, message: impl Into<String>, status: u16) -> Self {
        Self {
            code,
            message: message.into(),
            status_code: Some(status),
        }
    }

    pub fn no_session() -> Self {
        Self::new(StoreErrorCode::NoSession, "Not signed in")
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Network, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Validation, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::InvalidResponse, message)
    }

    /// Whether trying the same call again later may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.code,
            StoreErrorCode::Network
                | StoreErrorCode::Timeout
                | StoreErrorCode::Unavailable
                | StoreErrorCode::ServerError
        )
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::new(StoreErrorCode::Timeout, e.to_string())
        } else if e.is_decode() {
            Self::invalid_response(e.to_string())
        } else {
            Self::network(e.to_string())
        }
    }
}

pub fn map_status_to_error_code(status: u16) -> StoreErrorCode {
    match status {
        400 | 422 => StoreErrorCode::Validation,
        401 | 403 => StoreErrorCode::Unauthorized,
        404 => StoreErrorCode::NotFound,
        429 | 502 | 503 | 504 => StoreErrorCode::Unavailable,
        _ => StoreErrorCode::ServerError,
    }
}
