//! Authentication properties round-tripped through the protected state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name of the saved access token.
pub const ACCESS_TOKEN: &str = "access_token";
/// Name of the saved refresh token.
pub const REFRESH_TOKEN: &str = "refresh_token";
/// Name of the saved token type.
pub const TOKEN_TYPE: &str = "token_type";
/// Name of the saved absolute expiry.
pub const EXPIRES_AT: &str = "expires_at";

/// A named token kept alongside the ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationToken {
    /// Token name, e.g. `access_token`.
    pub name: String,
    /// Token value.
    pub value: String,
}

impl AuthenticationToken {
    /// Creates a token entry.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// State describing one challenge → callback round trip.
///
/// Produced by the caller before the challenge, protected into the `state`
/// parameter, and recovered unchanged on the callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthProperties {
    /// Free-form application values.
    #[serde(default)]
    pub items: BTreeMap<String, String>,

    /// Where the user agent goes after a successful sign-in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// Tokens saved by the ticket builder.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<AuthenticationToken>,
}

impl AuthProperties {
    /// Creates empty properties.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the post-login redirect target.
    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Adds an item.
    #[must_use]
    pub fn with_item(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.items.insert(key.into(), value.into());
        self
    }

    /// Gets an item value.
    pub fn item(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    /// Gets the value of a saved token.
    pub fn get_token_value(&self, name: &str) -> Option<&str> {
        self.tokens
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.value.as_str())
    }
}
