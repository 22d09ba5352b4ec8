// Token backend client
// Exchanges credentials or a refresh token for a new token pair

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

use super::types::{RefreshRequest, TokenPair};

/// Path of the token endpoint, relative to the backend base URL
pub const TOKENS_PATH: &str = "/api/v1/tokens";

/// Failure of a refresh call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// Transport failure or timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response
    #[error("Request failed with status code {status}: {message}")]
    Rejected { status: u16, message: String },

    /// 2xx response whose body is not a token pair
    #[error("Malformed token response: {0}")]
    MalformedResponse(String),
}

pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenPair, RefreshError>> + Send + 'a>>;

/// Issues token pairs for the relay
pub trait TokenBackend: Send + Sync {
    fn refresh<'a>(&'a self, request: &'a RefreshRequest) -> BackendFuture<'a>;
}

/// Error body returned by the token endpoint
#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// `TokenBackend` talking JSON over HTTP
pub struct HttpTokenBackend {
    client: Client,
    endpoint: Url,
}

impl HttpTokenBackend {
    /// Create a client for the backend at `base_url`
    pub fn new(base_url: &Url, request_timeout: u64) -> Result<Self> {
        let endpoint = base_url
            .join(TOKENS_PATH)
            .with_context(|| format!("Invalid backend URL: {}", base_url))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(&self, request: &RefreshRequest) -> Result<TokenPair, RefreshError> {
        tracing::debug!(url = %self.endpoint, "Requesting token pair");

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connection_failed"
                } else {
                    "request_error"
                };
                tracing::warn!(error_kind = kind, error = %e, "Token request failed");
                RefreshError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = rejection_message(status, &body);
            tracing::warn!(status = status.as_u16(), message = %message, "Token request rejected");
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;
        let pair: TokenPair = serde_json::from_str(&body)
            .map_err(|e| RefreshError::MalformedResponse(e.to_string()))?;

        tracing::debug!(
            "Token pair received (access token: {}...)",
            pair.access_token.chars().take(8).collect::<String>()
        );
        Ok(pair)
    }
}

impl TokenBackend for HttpTokenBackend {
    fn refresh<'a>(&'a self, request: &'a RefreshRequest) -> BackendFuture<'a> {
        Box::pin(self.post(request))
    }
}

/// Prefer the backend's own message, fall back to the status reason
fn rejection_message(status: StatusCode, body: &str) -> String {
    if let Ok(error) = serde_json::from_str::<ErrorBody>(body) {
        if !error.message.is_empty() {
            return error.message;
        }
    }
    status
        .canonical_reason()
        .unwrap_or("Unknown error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let base = Url::parse("https://sso.example.com").unwrap();
        let backend = HttpTokenBackend::new(&base, 30).unwrap();
        assert_eq!(
            backend.endpoint().as_str(),
            "https://sso.example.com/api/v1/tokens"
        );

        // Absolute path replaces any base path
        let base = Url::parse("https://example.com/sso/").unwrap();
        let backend = HttpTokenBackend::new(&base, 30).unwrap();
        assert_eq!(
            backend.endpoint().as_str(),
            "https://example.com/api/v1/tokens"
        );
    }

    #[test]
    fn test_rejection_message_prefers_body() {
        let message = rejection_message(
            StatusCode::BAD_REQUEST,
            r#"{"message": "Incorrect password"}"#,
        );
        assert_eq!(message, "Incorrect password");
    }

    #[test]
    fn test_rejection_message_falls_back_to_reason() {
        assert_eq!(
            rejection_message(StatusCode::UNAUTHORIZED, "<html>nope</html>"),
            "Unauthorized"
        );
        assert_eq!(
            rejection_message(StatusCode::BAD_GATEWAY, r#"{"message": ""}"#),
            "Bad Gateway"
        );
    }

    #[test]
    fn test_error_display_is_human_readable() {
        let err = RefreshError::Rejected {
            status: 401,
            message: "Unauthorized".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Request failed with status code 401: Unauthorized"
        );

        let err = RefreshError::MalformedResponse("missing field `refresh_token`".to_string());
        assert!(err.to_string().contains("refresh_token"));
    }
}
