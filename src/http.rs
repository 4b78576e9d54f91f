//! Shared HTTP client for webhook-style handlers

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::debug;

use crate::handlers::NotifyError;

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            user_agent: format!("Notifybox/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Thin wrapper over [`reqwest::Client`] that reports failures as
/// [`NotifyError`] kinds.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    request_timeout: Duration,
}

impl HttpClient {
    /// Build a client; `verify_tls = false` accepts invalid certificates.
    pub fn new(config: &HttpConfig, verify_tls: bool) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .danger_accept_invalid_certs(!verify_tls)
            .build()?;

        Ok(Self {
            client,
            request_timeout: config.request_timeout,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send a request and require a 2xx answer.
    pub async fn execute(&self, request: RequestBuilder) -> Result<Response, NotifyError> {
        let response = request
            .send()
            .await
            .map_err(|e| self.classify_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), detail = %detail, "Request rejected");
            return Err(classify_status(status));
        }

        Ok(response)
    }

    fn classify_error(&self, error: &reqwest::Error) -> NotifyError {
        if error.is_timeout() {
            NotifyError::Timeout(self.request_timeout)
        } else if error.is_builder() {
            NotifyError::InvalidPayload(error.to_string())
        } else {
            NotifyError::Network(error.to_string())
        }
    }
}

/// Map a non-success HTTP status to an error kind.
pub fn classify_status(status: StatusCode) -> NotifyError {
    let message = format!(
        "HTTP {}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    );

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => NotifyError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => NotifyError::RateLimited(message),
        StatusCode::REQUEST_TIMEOUT => NotifyError::Network(message),
        s if s.is_client_error() => NotifyError::InvalidPayload(message),
        s if s.is_server_error() => NotifyError::Network(message),
        _ => NotifyError::Unknown(message),
    }
}
