//! Error types for the authorization code flow.
//!
//! Per-request failures never cross the handler boundary as panics: the
//! callback leg reports a [`CallbackError`] inside its result, whose display
//! string is the human-readable failure reason.

use reqwest::StatusCode;

/// Errors raised by a [`DataProtector`](crate::state::DataProtector).
#[derive(Debug, thiserror::Error)]
pub enum ProtectionError {
    /// The key material could not be used.
    #[error("Invalid protection key: {0}")]
    InvalidKey(String),

    /// Encryption failed.
    #[error("Failed to protect payload")]
    ProtectFailed,

    /// The payload was truncated, corrupted, or tampered with.
    #[error("Failed to unprotect payload")]
    UnprotectFailed,
}

/// Errors from the back-channel token exchange.
#[derive(Debug, thiserror::Error)]
pub enum BackchannelError {
    /// The remote endpoint answered with a non-success status.
    ///
    /// This carries everything the remote server sent back; it is usually the
    /// only signal available when debugging a provider integration.
    #[error("OAuth {endpoint} endpoint failure: Status: {status};Headers: {headers};Body: {body};")]
    Status {
        /// Which endpoint answered, e.g. `token`.
        endpoint: &'static str,
        /// Response status.
        status: StatusCode,
        /// Response headers, one `name: value` pair per line.
        headers: String,
        /// Raw response body.
        body: String,
    },

    /// The request could not be sent or the response could not be read.
    #[error("OAuth backchannel failure: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote endpoint did not answer within the back-channel timeout.
    #[error("OAuth backchannel failure: request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The enclosing request was aborted while the call was in flight.
    #[error("OAuth backchannel failure: request was canceled")]
    Canceled,

    /// The response body was not a JSON object.
    #[error("OAuth backchannel failure: malformed response: {0}")]
    MalformedPayload(String),

    /// An optional endpoint needed for the call is not configured.
    #[error("OAuth backchannel failure: {0} is not configured")]
    NotConfigured(&'static str),
}

impl BackchannelError {
    /// Returns `true` if the remote server answered, but not successfully.
    #[must_use]
    pub fn is_status_error(&self) -> bool {
        matches!(self, Self::Status { .. })
    }

    /// Returns `true` for transport-level failures (network, timeout, cancellation).
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_) | Self::Canceled)
    }
}

/// Terminal failure of the callback leg.
///
/// The `Display` output is the failure reason handed to the hosting pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    /// The authorization server redirected back with an `error` parameter.
    #[error("{}", remote_failure_message(.error, .description, .uri))]
    Remote {
        /// The OAuth error code.
        error: String,
        /// Optional `error_description`.
        description: Option<String>,
        /// Optional `error_uri`.
        uri: Option<String>,
    },

    /// The `state` parameter was absent or failed to unprotect.
    #[error("The oauth state was missing or invalid.")]
    InvalidState,

    /// The correlation marker was absent, mismatched, or already consumed.
    #[error("Correlation failed.")]
    CorrelationFailed,

    /// The `code` parameter was absent or empty.
    #[error("Code was not found.")]
    CodeNotFound,

    /// The back-channel exchange failed.
    #[error(transparent)]
    Backchannel(#[from] BackchannelError),

    /// The token endpoint succeeded but returned no access token.
    #[error("Failed to retrieve access token.")]
    MissingAccessToken,

    /// The ticket creation hook rejected the sign-in.
    #[error("Failed to retrieve user information from remote server.")]
    TicketRejected,
}

impl CallbackError {
    /// Creates a `Remote` error from the callback query values.
    #[must_use]
    pub fn remote(
        error: impl Into<String>,
        description: Option<String>,
        uri: Option<String>,
    ) -> Self {
        Self::Remote {
            error: error.into(),
            description,
            uri,
        }
    }

    /// Returns `true` if the remote authorization server reported the error.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Returns `true` if the callback failed state, correlation, or code checks.
    #[must_use]
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidState | Self::CorrelationFailed | Self::CodeNotFound
        )
    }

    /// Returns `true` if the token exchange failed.
    #[must_use]
    pub fn is_backchannel_error(&self) -> bool {
        matches!(self, Self::Backchannel(_) | Self::MissingAccessToken)
    }

    /// Returns `true` if the ticket creation hook declined the sign-in.
    #[must_use]
    pub fn is_enrichment_error(&self) -> bool {
        matches!(self, Self::TicketRejected)
    }
}

fn remote_failure_message(
    error: &str,
    description: &Option<String>,
    uri: &Option<String>,
) -> String {
    let mut message = error.to_string();
    if let Some(description) = description {
        message.push_str(";Description=");
        message.push_str(description);
    }
    if let Some(uri) = uri {
        message.push_str(";Uri=");
        message.push_str(uri);
    }
    message
}
