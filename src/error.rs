//! Error types for EmailBill
//!
//! This module provides the error hierarchy using thiserror.
//! All errors can be converted to EmailBillError for unified error handling.

use crate::model::Provider;
use thiserror::Error;

/// Main error type for EmailBill operations
#[derive(Error, Debug)]
pub enum EmailBillError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Downstream error: {0}")]
    Downstream(String),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of the OAuth handshake or token refresh with a provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Callback `state` did not match the nonce stored in the session
    #[error("OAuth state mismatch")]
    InvalidState,

    /// Provider answered the code exchange (or profile lookup) with a failure.
    /// `detail` carries the provider payload and is only ever logged.
    #[error("{provider} rejected the request: {detail}")]
    ProviderRejected { provider: Provider, detail: String },

    /// Refresh token missing, revoked or otherwise unusable
    #[error("{provider} token refresh failed: {reason}")]
    RefreshFailed { provider: Provider, reason: String },
}

/// Session persistence and decoding errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session payload is corrupt: {0}")]
    Corrupt(String),

    #[error("Unsupported session schema version: {0}")]
    UnsupportedVersion(u32),

    #[error("Session store error: {0}")]
    Store(String),
}

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// Convenient result type for EmailBill operations
pub type Result<T> = std::result::Result<T, EmailBillError>;

impl From<reqwest::Error> for EmailBillError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EmailBillError::Network(NetworkError::Timeout)
        } else {
            EmailBillError::Network(NetworkError::Reqwest(err))
        }
    }
}

impl From<url::ParseError> for EmailBillError {
    fn from(err: url::ParseError) -> Self {
        EmailBillError::Network(NetworkError::InvalidUrl(err.to_string()))
    }
}

impl EmailBillError {
    /// Create a validation error
    #[inline]
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        EmailBillError::Validation(msg.into())
    }

    /// Create a config error
    #[inline]
    pub fn config<S: Into<String>>(msg: S) -> Self {
        EmailBillError::Config(msg.into())
    }

    /// Create a downstream collaborator error
    #[inline]
    pub fn downstream<S: Into<String>>(msg: S) -> Self {
        EmailBillError::Downstream(msg.into())
    }
}

impl AuthError {
    /// Machine-readable reason string used in 401 bodies and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::InvalidState => "invalid_state",
            AuthError::ProviderRejected { .. } => "provider_rejected",
            AuthError::RefreshFailed { .. } => "refresh_failed",
        }
    }
}
