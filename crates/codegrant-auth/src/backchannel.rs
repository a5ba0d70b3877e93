//! Back-channel exchange of an authorization code for tokens.

use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{ClientConfig, ConfigError};
use crate::error::BackchannelError;

/// Builds the shared back-channel HTTP client for a configuration.
///
/// One client is created per handler and reused by every request.
pub fn build_client(config: &ClientConfig) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(config.backchannel_timeout)
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(|e| ConfigError::InvalidValue(format!("Failed to create HTTP client: {e}")))
}

/// Successful token endpoint response.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthTokenResponse {
    /// The full JSON payload as returned by the token endpoint.
    pub response: Value,
    /// `access_token`. Absence is reported by the caller, not here.
    pub access_token: Option<String>,
    /// `refresh_token`.
    pub refresh_token: Option<String>,
    /// `token_type`.
    pub token_type: Option<String>,
    /// `expires_in` in seconds, normalized to a string.
    pub expires_in: Option<String>,
}

impl OAuthTokenResponse {
    /// Extracts the well-known fields from a token endpoint payload.
    ///
    /// # Errors
    ///
    /// Returns `BackchannelError::MalformedPayload` if the payload is not a
    /// JSON object.
    pub fn from_json(response: Value) -> Result<Self, BackchannelError> {
        let Value::Object(fields) = &response else {
            return Err(BackchannelError::MalformedPayload(
                "token response is not a JSON object".to_string(),
            ));
        };

        Ok(Self {
            access_token: scalar_field(fields, "access_token"),
            refresh_token: scalar_field(fields, "refresh_token"),
            token_type: scalar_field(fields, "token_type"),
            expires_in: scalar_field(fields, "expires_in"),
            response,
        })
    }
}

/// Reads a string field, accepting numbers in their decimal form.
fn scalar_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Some(i.to_string()),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Some((f as i64).to_string())
            }
            _ => Some(n.to_string()),
        },
        _ => None,
    }
}

/// Performs the authorization code exchange against the token endpoint.
#[derive(Clone)]
pub struct TokenExchanger {
    client: reqwest::Client,
    token_endpoint: Url,
    client_id: String,
    client_secret: String,
    timeout: Duration,
}

impl TokenExchanger {
    /// Creates an exchanger using the shared back-channel client.
    #[must_use]
    pub fn new(config: &ClientConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            token_endpoint: config.token_endpoint.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            timeout: config.backchannel_timeout,
        }
    }

    /// The shared back-channel client.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Exchanges `code` for tokens.
    ///
    /// Sends exactly one request. Fails with `BackchannelError::Canceled` as
    /// soon as `cancellation` fires and with `BackchannelError::Timeout` once
    /// the configured timeout elapses.
    pub async fn exchange(
        &self,
        code: &str,
        redirect_uri: &str,
        cancellation: &CancellationToken,
    ) -> Result<OAuthTokenResponse, BackchannelError> {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => Err(BackchannelError::Canceled),
            result = tokio::time::timeout(self.timeout, self.send(code, redirect_uri)) => {
                result.unwrap_or(Err(BackchannelError::Timeout(self.timeout)))
            }
        }
    }

    async fn send(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthTokenResponse, BackchannelError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("code", code),
            ("grant_type", "authorization_code"),
        ];

        tracing::debug!(
            token_endpoint = %self.token_endpoint,
            "Exchanging authorization code"
        );

        let response = self
            .client
            .post(self.token_endpoint.clone())
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let headers = format_headers(response.headers());
            let body = error_body(response).await;
            return Err(BackchannelError::Status {
                endpoint: "token",
                status,
                headers,
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let payload: Value = serde_json::from_str(&body)
            .map_err(|e| BackchannelError::MalformedPayload(e.to_string()))?;

        OAuthTokenResponse::from_json(payload)
    }

    fn map_transport_error(&self, err: reqwest::Error) -> BackchannelError {
        if err.is_timeout() {
            BackchannelError::Timeout(self.timeout)
        } else {
            BackchannelError::Network(err)
        }
    }
}

/// Reads an error response body, keeping a read failure as the diagnostic.
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(body) => body,
        Err(e) => format!("<unreadable: {e}>"),
    }
}

pub(crate) fn format_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value.to_str().unwrap_or("<binary>")))
        .collect::<Vec<_>>()
        .join("\n")
}
