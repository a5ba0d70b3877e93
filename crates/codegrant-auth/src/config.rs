//! Client configuration for the authorization code handler.
//!
//! The configuration is immutable once a handler is constructed. All checks
//! run in [`ClientConfig::validate`], which the handler calls exactly once so
//! that a bad configuration aborts startup instead of failing on first use.
//!
//! # Example (TOML)
//!
//! ```toml
//! [oauth]
//! client_id = "my-app"
//! client_secret = "s3cret"
//! authorization_endpoint = "https://idp.example.com/oauth/authorize"
//! token_endpoint = "https://idp.example.com/oauth/token"
//! callback_path = "/signin-oauth"
//! scopes = ["openid", "profile"]
//! backchannel_timeout = "30s"
//! save_tokens = true
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Errors that can occur when validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

/// OAuth 2.0 client configuration for one authentication scheme.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Authentication scheme name. Used in cookie names, ticket identity,
    /// and as the issuer of mapped claims.
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Client identifier issued by the authorization server.
    pub client_id: String,

    /// Client secret issued by the authorization server.
    pub client_secret: String,

    /// Remote authorization endpoint the user agent is redirected to.
    pub authorization_endpoint: Url,

    /// Remote token endpoint used for the back-channel exchange.
    pub token_endpoint: Url,

    /// Optional user-info endpoint, available to ticket enrichment hooks.
    #[serde(default)]
    pub user_information_endpoint: Option<Url>,

    /// Request path on this application where the authorization server
    /// redirects back to. Required.
    #[serde(default)]
    pub callback_path: Option<String>,

    /// Requested scopes, sent space-joined in configured order.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Upper bound on the back-channel request.
    #[serde(default = "default_backchannel_timeout", with = "humantime_serde")]
    pub backchannel_timeout: Duration,

    /// Store the access/refresh tokens in the ticket properties.
    #[serde(default)]
    pub save_tokens: bool,

    /// JSON key to claim type mappings applied by enrichment hooks.
    #[serde(default)]
    pub claim_mappings: Vec<ClaimMapping>,

    /// Correlation cookie settings.
    #[serde(default)]
    pub correlation: CorrelationConfig,

    /// User agent sent on back-channel requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl ClientConfig {
    /// Creates a configuration with defaults for every optional field.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        authorization_endpoint: Url,
        token_endpoint: Url,
    ) -> Self {
        Self {
            scheme: default_scheme(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorization_endpoint,
            token_endpoint,
            user_information_endpoint: None,
            callback_path: None,
            scopes: Vec::new(),
            backchannel_timeout: default_backchannel_timeout(),
            save_tokens: false,
            claim_mappings: Vec::new(),
            correlation: CorrelationConfig::default(),
            user_agent: default_user_agent(),
        }
    }

    /// Sets the authentication scheme name.
    #[must_use]
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Sets the callback path.
    #[must_use]
    pub fn with_callback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = Some(path.into());
        self
    }

    /// Sets the requested scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the back-channel timeout.
    #[must_use]
    pub fn with_backchannel_timeout(mut self, timeout: Duration) -> Self {
        self.backchannel_timeout = timeout;
        self
    }

    /// Enables or disables saving tokens into the ticket properties.
    #[must_use]
    pub fn with_save_tokens(mut self, save: bool) -> Self {
        self.save_tokens = save;
        self
    }

    /// Sets the user-info endpoint.
    #[must_use]
    pub fn with_user_information_endpoint(mut self, endpoint: Url) -> Self {
        self.user_information_endpoint = Some(endpoint);
        self
    }

    /// Adds a JSON key to claim type mapping.
    #[must_use]
    pub fn with_claim_mapping(
        mut self,
        json_key: impl Into<String>,
        claim_type: impl Into<String>,
    ) -> Self {
        self.claim_mappings.push(ClaimMapping {
            json_key: json_key.into(),
            claim_type: claim_type.into(),
        });
        self
    }

    /// Returns the validated callback path.
    ///
    /// Only meaningful after [`validate`](Self::validate) succeeded; an unset
    /// path yields `"/"`.
    pub fn callback_path(&self) -> &str {
        self.callback_path.as_deref().unwrap_or("/")
    }

    /// Returns the scopes as they appear on the wire.
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the callback path, client ID, or
    /// client secret is absent, and `ConfigError::InvalidValue` if the
    /// callback path is not absolute, an endpoint is not HTTP(S), or a
    /// duration is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let callback_path = self
            .callback_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ConfigError::Missing("callback_path".to_string()))?;

        if !callback_path.starts_with('/') {
            return Err(ConfigError::InvalidValue(format!(
                "callback_path must start with '/': '{}'",
                callback_path
            )));
        }

        if self.scheme.is_empty() {
            return Err(ConfigError::Missing("scheme".to_string()));
        }

        if self.client_id.is_empty() {
            return Err(ConfigError::Missing("client_id".to_string()));
        }

        if self.client_secret.is_empty() {
            return Err(ConfigError::Missing("client_secret".to_string()));
        }

        validate_endpoint("authorization_endpoint", &self.authorization_endpoint)?;
        validate_endpoint("token_endpoint", &self.token_endpoint)?;
        if let Some(endpoint) = &self.user_information_endpoint {
            validate_endpoint("user_information_endpoint", endpoint)?;
        }

        if self.backchannel_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "backchannel_timeout must be > 0".to_string(),
            ));
        }

        if self.correlation.lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "correlation.lifetime must be > 0".to_string(),
            ));
        }

        if self.correlation.cookie_prefix.is_empty() {
            return Err(ConfigError::InvalidValue(
                "correlation.cookie_prefix cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_endpoint(name: &str, url: &Url) -> Result<(), ConfigError> {
    match url.scheme() {
        "https" | "http" => Ok(()),
        other => Err(ConfigError::InvalidValue(format!(
            "{} must use http or https, got '{}'",
            name, other
        ))),
    }
}

/// Maps a top-level key of a JSON user document to a claim type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClaimMapping {
    /// Key in the JSON document.
    pub json_key: String,
    /// Claim type to emit.
    pub claim_type: String,
}

/// Correlation cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Prefix of the correlation cookie name; the scheme and marker follow.
    pub cookie_prefix: String,

    /// How long a challenge may stay outstanding.
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            cookie_prefix: ".codegrant.Correlation.".to_string(),
            lifetime: Duration::from_secs(15 * 60),
        }
    }
}

fn default_scheme() -> String {
    "OAuth".to_string()
}

fn default_backchannel_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_user_agent() -> String {
    format!("codegrant/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClientConfig {
        ClientConfig::new(
            "client",
            "secret",
            Url::parse("https://idp.example.com/authorize").unwrap(),
            Url::parse("https://idp.example.com/token").unwrap(),
        )
        .with_callback_path("/signin-oauth")
    }

    #[test]
    fn test_valid_config() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_missing_callback_path() {
        let mut config = sample();
        config.callback_path = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing(field)) if field == "callback_path"
        ));

        config.callback_path = Some(String::new());
        assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_relative_callback_path() {
        let config = sample().with_callback_path("signin-oauth");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_missing_client_credentials() {
        let mut config = sample();
        config.client_secret = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing(field)) if field == "client_secret"
        ));
    }

    #[test]
    fn test_non_http_endpoint() {
        let mut config = sample();
        config.token_endpoint = Url::parse("ftp://idp.example.com/token").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_zero_timeout() {
        let config = sample().with_backchannel_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scope_param_keeps_order() {
        let config = sample().with_scopes(["profile", "openid", "email"]);
        assert_eq!(config.scope_param(), "profile openid email");
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = serde_json::json!({
            "client_id": "client",
            "client_secret": "secret",
            "authorization_endpoint": "https://idp.example.com/authorize",
            "token_endpoint": "https://idp.example.com/token",
            "callback_path": "/cb",
            "backchannel_timeout": "5s",
            "correlation": { "lifetime": "2m" }
        });

        let config: ClientConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.scheme, "OAuth");
        assert_eq!(config.backchannel_timeout, Duration::from_secs(5));
        assert_eq!(config.correlation.lifetime, Duration::from_secs(120));
        assert_eq!(config.correlation.cookie_prefix, ".codegrant.Correlation.");
        assert!(!config.save_tokens);
        assert!(config.validate().is_ok());
    }
}
