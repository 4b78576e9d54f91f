use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::PreparedMessage;
use crate::url::ParsedUrl;

/// Handler configuration errors, raised at construction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required parameter '{0}'")]
    MissingParameter(String),

    #[error("invalid value for '{param}': {reason}")]
    InvalidValue { param: String, reason: String },

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl ValidationError {
    pub fn missing(param: impl Into<String>) -> Self {
        Self::MissingParameter(param.into())
    }

    pub fn invalid(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            param: param.into(),
            reason: reason.into(),
        }
    }
}

/// Category of a delivery failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Auth,
    RateLimited,
    InvalidPayload,
    Timeout,
    Unknown,
}

impl ErrorKind {
    /// Whether a later attempt may succeed without changing anything.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::RateLimited | ErrorKind::Timeout
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::InvalidPayload => "invalid_payload",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery failure reported by a handler
///
/// These never escape the executor; they end up in a
/// [`NotifyOutcome`](crate::dispatch::NotifyOutcome).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unknown failure: {0}")]
    Unknown(String),
}

impl NotifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NotifyError::Network(_) => ErrorKind::Network,
            NotifyError::Auth(_) => ErrorKind::Auth,
            NotifyError::RateLimited(_) => ErrorKind::RateLimited,
            NotifyError::InvalidPayload(_) => ErrorKind::InvalidPayload,
            NotifyError::Timeout(_) => ErrorKind::Timeout,
            NotifyError::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

/// One vendor adapter with its validated configuration
///
/// Implementations only speak the vendor protocol. Format negotiation,
/// truncation, throttling, retries and timeouts happen around them.
#[async_trait]
pub trait NotifyHandler: Send + Sync + fmt::Debug {
    /// Canonical URL; parsing it and constructing again gives an equal
    /// configuration.
    fn url(&self) -> ParsedUrl;

    /// URL safe for logs and reports.
    fn url_redacted(&self) -> String {
        self.url().redacted()
    }

    /// Deliver one prepared message.
    async fn send(&self, message: &PreparedMessage) -> Result<(), NotifyError>;

    /// Independent recipients one message fans out to.
    ///
    /// Each one is delivered and retried on its own through
    /// [`send_to`](Self::send_to).
    fn destinations(&self) -> usize {
        1
    }

    /// Deliver one prepared message to one destination.
    async fn send_to(&self, message: &PreparedMessage, _index: usize) -> Result<(), NotifyError> {
        self.send(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Network.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(!ErrorKind::Auth.is_retryable());
        assert!(!ErrorKind::InvalidPayload.is_retryable());
        assert!(!ErrorKind::Unknown.is_retryable());
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            NotifyError::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(NotifyError::Auth("401".into()).kind(), ErrorKind::Auth);
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::RateLimited).unwrap();
        assert_eq!(json, "\"rate_limited\"");
    }
}
