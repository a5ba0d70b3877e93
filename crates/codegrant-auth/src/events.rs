//! Extensibility hooks.
//!
//! [`OAuthEvents`] is invoked at two points of the flow:
//!
//! - `redirect_to_authorization_endpoint` right before the challenge leg
//!   responds. The hook may rewrite the authorization URL or take over the
//!   response entirely.
//! - `creating_ticket` after a successful token exchange. The hook may
//!   enrich the identity (typically from the user information endpoint) or
//!   reject the sign-in.
//!
//! Both methods default to no-ops, so implementors override only what they
//! need.

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::Value;

use crate::backchannel::{OAuthTokenResponse, error_body, format_headers};
use crate::config::ClientConfig;
use crate::context::RequestContext;
use crate::error::BackchannelError;
use crate::properties::AuthProperties;
use crate::ticket::{Claim, ClaimsIdentity};

/// Hooks invoked by [`OAuthHandler`](crate::handler::OAuthHandler).
#[async_trait]
pub trait OAuthEvents: Send + Sync {
    /// Called after tokens were obtained and before the ticket is issued.
    ///
    /// Calling [`CreatingTicketContext::reject`] turns the sign-in into a
    /// failure.
    async fn creating_ticket(&self, _context: &mut CreatingTicketContext<'_>) {}

    /// Called before redirecting the user agent to the authorization
    /// endpoint.
    async fn redirect_to_authorization_endpoint(&self, _context: &mut RedirectContext<'_>) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultOAuthEvents;

impl OAuthEvents for DefaultOAuthEvents {}

/// State available to the `creating_ticket` hook.
pub struct CreatingTicketContext<'a> {
    /// Identity under construction. Claims added here end up in the ticket.
    pub identity: ClaimsIdentity,
    /// Properties recovered from the state, including saved tokens.
    pub properties: AuthProperties,
    token_response: &'a OAuthTokenResponse,
    config: &'a ClientConfig,
    backchannel: &'a reqwest::Client,
    rejected: bool,
}

impl<'a> CreatingTicketContext<'a> {
    pub(crate) fn new(
        identity: ClaimsIdentity,
        properties: AuthProperties,
        token_response: &'a OAuthTokenResponse,
        config: &'a ClientConfig,
        backchannel: &'a reqwest::Client,
    ) -> Self {
        Self {
            identity,
            properties,
            token_response,
            config,
            backchannel,
            rejected: false,
        }
    }

    /// Scheme being authenticated.
    pub fn scheme(&self) -> &str {
        &self.config.scheme
    }

    /// Client configuration of the handler.
    pub fn config(&self) -> &ClientConfig {
        self.config
    }

    /// The token endpoint response.
    pub fn token_response(&self) -> &OAuthTokenResponse {
        self.token_response
    }

    /// The access token. Always present once this hook runs.
    pub fn access_token(&self) -> &str {
        self.token_response.access_token.as_deref().unwrap_or_default()
    }

    /// Shared back-channel client, configured with the handler's timeout.
    pub fn backchannel(&self) -> &reqwest::Client {
        self.backchannel
    }

    /// Declines the sign-in.
    pub fn reject(&mut self) {
        self.rejected = true;
    }

    /// Returns `true` once [`reject`](Self::reject) was called.
    pub fn is_rejected(&self) -> bool {
        self.rejected
    }

    pub(crate) fn into_parts(self) -> (ClaimsIdentity, AuthProperties) {
        (self.identity, self.properties)
    }

    /// Fetches the user information document with the access token.
    ///
    /// # Errors
    ///
    /// Returns `BackchannelError::NotConfigured` without a configured
    /// `user_information_endpoint`, and the usual back-channel errors
    /// otherwise.
    pub async fn fetch_user_info(&self) -> Result<Value, BackchannelError> {
        let endpoint = self
            .config
            .user_information_endpoint
            .as_ref()
            .ok_or(BackchannelError::NotConfigured("user_information_endpoint"))?;

        tracing::debug!(
            scheme = %self.config.scheme,
            user_information_endpoint = %endpoint,
            "Fetching user information"
        );

        let response = self
            .backchannel
            .get(endpoint.clone())
            .bearer_auth(self.access_token())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackchannelError::Timeout(self.config.backchannel_timeout)
                } else {
                    BackchannelError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let headers = format_headers(response.headers());
            let body = error_body(response).await;
            return Err(BackchannelError::Status {
                endpoint: "user information",
                status,
                headers,
                body,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| BackchannelError::MalformedPayload(e.to_string()))?;

        if !payload.is_object() {
            return Err(BackchannelError::MalformedPayload(
                "user information is not a JSON object".to_string(),
            ));
        }

        Ok(payload)
    }

    /// Applies the configured claim mappings to a JSON document.
    ///
    /// Missing, null, empty, and structured values are skipped.
    pub fn run_claim_actions(&mut self, user: &Value) {
        for mapping in &self.config.claim_mappings {
            let value = match user.get(&mapping.json_key) {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                _ => continue,
            };

            if self.identity.has_claim(&mapping.claim_type, &value) {
                continue;
            }

            self.identity
                .add_claim(Claim::new(&mapping.claim_type, value, &self.config.scheme));
        }
    }
}

/// Response produced by a redirect hook that handled the challenge itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandledResponse {
    /// Status code to send.
    pub status: StatusCode,
    /// Body to send.
    pub body: String,
}

/// State available to the `redirect_to_authorization_endpoint` hook.
pub struct RedirectContext<'a> {
    /// Authorization URL the user agent will be sent to.
    pub redirect_uri: String,
    properties: &'a AuthProperties,
    request: &'a RequestContext,
    scheme: &'a str,
    handled: Option<HandledResponse>,
}

impl<'a> RedirectContext<'a> {
    pub(crate) fn new(
        redirect_uri: String,
        properties: &'a AuthProperties,
        request: &'a RequestContext,
        scheme: &'a str,
    ) -> Self {
        Self {
            redirect_uri,
            properties,
            request,
            scheme,
            handled: None,
        }
    }

    /// Properties protected into the `state` parameter.
    pub fn properties(&self) -> &AuthProperties {
        self.properties
    }

    /// The request that triggered the challenge.
    pub fn request(&self) -> &RequestContext {
        self.request
    }

    /// Scheme issuing the challenge.
    pub fn scheme(&self) -> &str {
        self.scheme
    }

    /// Replaces the redirect with a custom response.
    pub fn handle_response(&mut self, status: StatusCode, body: impl Into<String>) {
        self.handled = Some(HandledResponse {
            status,
            body: body.into(),
        });
    }

    pub(crate) fn into_outcome(self) -> (String, Option<HandledResponse>) {
        (self.redirect_uri, self.handled)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::ticket::claim_types;

    fn config(userinfo: Option<String>) -> ClientConfig {
        let mut config = ClientConfig::new(
            "client",
            "secret",
            Url::parse("https://idp.example.com/authorize").unwrap(),
            Url::parse("https://idp.example.com/token").unwrap(),
        )
        .with_claim_mapping("sub", claim_types::NAME_IDENTIFIER)
        .with_claim_mapping("email", claim_types::EMAIL)
        .with_claim_mapping("age", "age")
        .with_claim_mapping("verified", "email_verified");
        if let Some(userinfo) = userinfo {
            config = config.with_user_information_endpoint(Url::parse(&userinfo).unwrap());
        }
        config
    }

    fn token_response() -> OAuthTokenResponse {
        OAuthTokenResponse::from_json(json!({ "access_token": "tok1" })).unwrap()
    }

    #[test]
    fn test_run_claim_actions() {
        let config = config(None);
        let tokens = token_response();
        let client = reqwest::Client::new();
        let mut ctx = CreatingTicketContext::new(
            ClaimsIdentity::new("OAuth"),
            AuthProperties::new(),
            &tokens,
            &config,
            &client,
        );

        ctx.run_claim_actions(&json!({
            "sub": "user-1",
            "email": "",
            "age": 42,
            "verified": true,
            "groups": ["a", "b"]
        }));
        ctx.run_claim_actions(&json!({ "sub": "user-1" }));

        let claims: Vec<_> = ctx
            .identity
            .claims
            .iter()
            .map(|c| (c.claim_type.as_str(), c.value.as_str()))
            .collect();
        assert_eq!(
            claims,
            vec![("sub", "user-1"), ("age", "42"), ("email_verified", "true")]
        );
        assert!(ctx.identity.claims.iter().all(|c| c.issuer == "OAuth"));
    }

    #[test]
    fn test_reject() {
        let config = config(None);
        let tokens = token_response();
        let client = reqwest::Client::new();
        let mut ctx = CreatingTicketContext::new(
            ClaimsIdentity::new("OAuth"),
            AuthProperties::new(),
            &tokens,
            &config,
            &client,
        );
        assert!(!ctx.is_rejected());
        ctx.reject();
        assert!(ctx.is_rejected());
    }

    #[tokio::test]
    async fn test_fetch_user_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer tok1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": "user-1",
                "email": "user@example.com"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = config(Some(format!("{}/userinfo", server.uri())));
        let tokens = token_response();
        let client = reqwest::Client::new();
        let ctx = CreatingTicketContext::new(
            ClaimsIdentity::new("OAuth"),
            AuthProperties::new(),
            &tokens,
            &config,
            &client,
        );

        let user = ctx.fetch_user_info().await.unwrap();
        assert_eq!(user["email"], "user@example.com");
    }

    #[tokio::test]
    async fn test_fetch_user_info_failure_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .mount(&server)
            .await;

        let config = config(Some(format!("{}/userinfo", server.uri())));
        let tokens = token_response();
        let client = reqwest::Client::new();
        let ctx = CreatingTicketContext::new(
            ClaimsIdentity::new("OAuth"),
            AuthProperties::new(),
            &tokens,
            &config,
            &client,
        );

        let err = ctx.fetch_user_info().await.unwrap_err();
        assert!(err.is_status_error());
        assert!(
            err.to_string()
                .starts_with("OAuth user information endpoint failure: Status: 401")
        );
    }

    #[tokio::test]
    async fn test_fetch_user_info_not_configured() {
        let config = config(None);
        let tokens = token_response();
        let client = reqwest::Client::new();
        let ctx = CreatingTicketContext::new(
            ClaimsIdentity::new("OAuth"),
            AuthProperties::new(),
            &tokens,
            &config,
            &client,
        );

        assert!(matches!(
            ctx.fetch_user_info().await,
            Err(BackchannelError::NotConfigured(_))
        ));
    }
}
