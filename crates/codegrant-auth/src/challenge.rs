//! Authorization endpoint URL construction.

use url::Url;

use crate::config::ClientConfig;
use crate::error::ProtectionError;
use crate::properties::AuthProperties;
use crate::state::StateCodec;

/// Builds the redirect to the remote authorization endpoint.
#[derive(Clone)]
pub struct ChallengeBuilder {
    authorization_endpoint: Url,
    client_id: String,
    scope: String,
    state_codec: StateCodec,
}

impl ChallengeBuilder {
    /// Creates a builder for the given client.
    #[must_use]
    pub fn new(config: &ClientConfig, state_codec: StateCodec) -> Self {
        Self {
            authorization_endpoint: config.authorization_endpoint.clone(),
            client_id: config.client_id.clone(),
            scope: config.scope_param(),
            state_codec,
        }
    }

    /// Returns the authorization URL for `properties`.
    ///
    /// `redirect_uri` must be exactly the value later sent to the token
    /// endpoint. Existing query parameters of the configured endpoint are
    /// kept.
    pub fn build(
        &self,
        properties: &AuthProperties,
        redirect_uri: &str,
    ) -> Result<Url, ProtectionError> {
        let state = self.state_codec.protect(properties)?;

        let mut url = self.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("scope", &self.scope)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", &state);

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use crate::state::AesGcmProtector;

    fn builder(endpoint: &str, scopes: &[&str]) -> (ChallengeBuilder, StateCodec) {
        let codec = StateCodec::new(Arc::new(AesGcmProtector::ephemeral("test")));
        let config = ClientConfig::new(
            "my-client",
            "secret",
            Url::parse(endpoint).unwrap(),
            Url::parse("https://idp.example.com/token").unwrap(),
        )
        .with_scopes(scopes.iter().copied());
        (ChallengeBuilder::new(&config, codec.clone()), codec)
    }

    #[test]
    fn test_build_authorization_url() {
        let (builder, codec) = builder("https://idp.example.com/authorize", &["openid", "email"]);
        let props = AuthProperties::new().with_redirect_uri("/home");

        let url = builder
            .build(&props, "https://app.example.com/signin-oauth")
            .unwrap();

        assert_eq!(url.host_str(), Some("idp.example.com"));
        assert_eq!(url.path(), "/authorize");

        let keys: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        assert_eq!(
            keys,
            vec!["client_id", "scope", "response_type", "redirect_uri", "state"]
        );

        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "my-client");
        assert_eq!(params["scope"], "openid email");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["redirect_uri"], "https://app.example.com/signin-oauth");
        assert_eq!(codec.unprotect(&params["state"]), Some(props));
    }

    #[test]
    fn test_keeps_existing_query() {
        let (builder, _) = builder("https://idp.example.com/authorize?prompt=login", &[]);
        let url = builder
            .build(&AuthProperties::new(), "https://app.example.com/cb")
            .unwrap();

        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["prompt"], "login");
        assert_eq!(params["scope"], "");
    }
}
