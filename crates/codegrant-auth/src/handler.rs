//! Challenge and callback orchestration.
//!
//! [`OAuthHandler`] owns everything shared across requests: the validated
//! configuration, the back-channel client, the state codec, and the
//! correlation store. Each call works on its own [`RequestContext`].
//!
//! The callback leg runs a fixed sequence of checks:
//!
//! ```text
//! error check -> state -> correlation -> code -> exchange -> ticket
//! ```
//!
//! The first failing step ends the flow. Steps before the exchange never
//! touch the network.

use std::sync::Arc;

use time::format_description::well_known::Rfc3339;

use crate::backchannel::{OAuthTokenResponse, TokenExchanger, build_client};
use crate::challenge::ChallengeBuilder;
use crate::clock::{Clock, SystemClock};
use crate::config::{ClientConfig, ConfigError};
use crate::context::RequestContext;
use crate::correlation::{CorrelationGuard, CorrelationStore, InMemoryCorrelationStore};
use crate::error::{CallbackError, ProtectionError};
use crate::events::{
    CreatingTicketContext, DefaultOAuthEvents, HandledResponse, OAuthEvents, RedirectContext,
};
use crate::properties::{self, AuthProperties, AuthenticationToken};
use crate::state::{DataProtector, StateCodec};
use crate::ticket::{AuthenticationTicket, ClaimsIdentity};

/// Result of the callback leg.
#[derive(Debug)]
pub enum AuthenticateResult {
    /// The user signed in.
    Success(Box<AuthenticationTicket>),
    /// The callback was rejected.
    Failure {
        /// Why the callback failed. Its `Display` is the failure reason.
        error: CallbackError,
        /// Properties recovered from the state, once the state was valid.
        properties: Option<AuthProperties>,
    },
}

impl AuthenticateResult {
    fn fail(error: CallbackError, properties: Option<AuthProperties>) -> Self {
        Self::Failure { error, properties }
    }

    /// Returns `true` on success.
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The ticket of a successful sign-in.
    pub fn ticket(&self) -> Option<&AuthenticationTicket> {
        match self {
            Self::Success(ticket) => Some(ticket),
            Self::Failure { .. } => None,
        }
    }

    /// The error of a failed callback.
    pub fn failure(&self) -> Option<&CallbackError> {
        match self {
            Self::Success(_) => None,
            Self::Failure { error, .. } => Some(error),
        }
    }

    /// Human-readable failure reason.
    pub fn failure_message(&self) -> Option<String> {
        self.failure().map(ToString::to_string)
    }

    /// Properties recovered from the state, on success or after the state
    /// was validated.
    pub fn properties(&self) -> Option<&AuthProperties> {
        match self {
            Self::Success(ticket) => Some(&ticket.properties),
            Self::Failure { properties, .. } => properties.as_ref(),
        }
    }
}

/// What the challenge leg asks the pipeline to send.
///
/// Either variant means the request was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// Redirect the user agent to `location`.
    Redirect {
        /// Authorization endpoint URL, including the `state` parameter.
        location: String,
    },
    /// A redirect hook produced its own response.
    Handled(HandledResponse),
}

/// OAuth 2.0 authorization code handler for one scheme.
pub struct OAuthHandler {
    config: ClientConfig,
    state_codec: StateCodec,
    challenge: ChallengeBuilder,
    exchanger: TokenExchanger,
    correlation: CorrelationGuard,
    correlation_store: Arc<dyn CorrelationStore>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn OAuthEvents>,
}

impl OAuthHandler {
    /// Creates a handler, validating `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid or the
    /// back-channel client cannot be built.
    pub fn new(config: ClientConfig, protector: Arc<dyn DataProtector>) -> Result<Self, ConfigError> {
        config.validate()?;

        let client = build_client(&config)?;
        let state_codec = StateCodec::new(protector);
        let correlation_store: Arc<dyn CorrelationStore> = Arc::new(InMemoryCorrelationStore::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        tracing::info!(
            scheme = %config.scheme,
            callback_path = %config.callback_path(),
            authorization_endpoint = %config.authorization_endpoint,
            "OAuth handler configured"
        );

        Ok(Self {
            challenge: ChallengeBuilder::new(&config, state_codec.clone()),
            exchanger: TokenExchanger::new(&config, client),
            correlation: CorrelationGuard::new(&config, correlation_store.clone(), clock.clone()),
            state_codec,
            correlation_store,
            clock,
            events: Arc::new(DefaultOAuthEvents),
            config,
        })
    }

    /// Sets the hooks.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn OAuthEvents>) -> Self {
        self.events = events;
        self
    }

    /// Replaces the correlation store, e.g. with one shared across instances.
    #[must_use]
    pub fn with_correlation_store(mut self, store: Arc<dyn CorrelationStore>) -> Self {
        self.correlation = CorrelationGuard::new(&self.config, store.clone(), self.clock.clone());
        self.correlation_store = store;
        self
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.correlation =
            CorrelationGuard::new(&self.config, self.correlation_store.clone(), clock.clone());
        self.clock = clock;
        self
    }

    /// The validated configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The correlation store in use.
    pub fn correlation_store(&self) -> &Arc<dyn CorrelationStore> {
        &self.correlation_store
    }

    /// Returns `true` if the request targets the callback path.
    pub fn is_callback_request(&self, ctx: &RequestContext) -> bool {
        ctx.path() == self.config.callback_path()
    }

    /// Issues a challenge: sends the user agent to the authorization endpoint.
    ///
    /// `properties.redirect_uri` defaults to the current request URL.
    ///
    /// # Errors
    ///
    /// Returns `ProtectionError` if the state cannot be protected.
    pub async fn challenge(
        &self,
        ctx: &mut RequestContext,
        mut properties: AuthProperties,
    ) -> Result<ChallengeOutcome, ProtectionError> {
        if properties.redirect_uri.is_none() {
            properties.redirect_uri = Some(ctx.current_url());
        }

        self.correlation.generate(ctx, &mut properties).await;

        let redirect_uri = ctx.build_redirect_uri(self.config.callback_path());
        let authorization_url = self.challenge.build(&properties, &redirect_uri)?;

        let mut redirect = RedirectContext::new(
            authorization_url.to_string(),
            &properties,
            ctx,
            &self.config.scheme,
        );
        self.events
            .redirect_to_authorization_endpoint(&mut redirect)
            .await;

        let (location, handled) = redirect.into_outcome();
        if let Some(response) = handled {
            tracing::debug!(
                scheme = %self.config.scheme,
                status = %response.status,
                "Challenge handled by redirect hook"
            );
            return Ok(ChallengeOutcome::Handled(response));
        }

        tracing::debug!(
            scheme = %self.config.scheme,
            location = %without_query(&location),
            "Redirecting to authorization endpoint"
        );

        Ok(ChallengeOutcome::Redirect { location })
    }

    /// Handles a request to the callback path.
    pub async fn handle_callback(&self, ctx: &mut RequestContext) -> AuthenticateResult {
        let result = self.authenticate(ctx).await;

        match &result {
            AuthenticateResult::Success(ticket) => {
                tracing::info!(
                    scheme = %self.config.scheme,
                    claims = ticket.identity.claims.len(),
                    "OAuth sign-in succeeded"
                );
            }
            AuthenticateResult::Failure { error, .. } => {
                tracing::warn!(
                    scheme = %self.config.scheme,
                    reason = %error,
                    "OAuth callback failed"
                );
            }
        }

        result
    }

    async fn authenticate(&self, ctx: &mut RequestContext) -> AuthenticateResult {
        if let Some(error) = ctx.non_empty_query_value("error") {
            return AuthenticateResult::fail(
                CallbackError::remote(
                    error,
                    ctx.non_empty_query_value("error_description")
                        .map(str::to_string),
                    ctx.non_empty_query_value("error_uri").map(str::to_string),
                ),
                None,
            );
        }

        let Some(mut properties) = ctx
            .query_value("state")
            .and_then(|state| self.state_codec.unprotect(state))
        else {
            return AuthenticateResult::fail(CallbackError::InvalidState, None);
        };

        if !self.correlation.validate(ctx, &mut properties).await {
            return AuthenticateResult::fail(CallbackError::CorrelationFailed, Some(properties));
        }

        let Some(code) = ctx.non_empty_query_value("code").map(str::to_string) else {
            return AuthenticateResult::fail(CallbackError::CodeNotFound, Some(properties));
        };

        let redirect_uri = ctx.build_redirect_uri(self.config.callback_path());
        let tokens = match self
            .exchanger
            .exchange(&code, &redirect_uri, ctx.cancellation())
            .await
        {
            Ok(tokens) => tokens,
            Err(e) => return AuthenticateResult::fail(e.into(), Some(properties)),
        };

        if tokens.access_token.as_deref().is_none_or(str::is_empty) {
            return AuthenticateResult::fail(CallbackError::MissingAccessToken, Some(properties));
        }

        let identity = ClaimsIdentity::new(&self.config.scheme);
        match self.create_ticket(identity, properties, &tokens).await {
            Some(ticket) => AuthenticateResult::Success(Box::new(ticket)),
            None => AuthenticateResult::fail(CallbackError::TicketRejected, None),
        }
    }

    /// Builds the ticket from a successful token response.
    ///
    /// Saves the tokens into `properties` when configured, then runs the
    /// `creating_ticket` hook. Returns `None` if the hook rejected the
    /// sign-in.
    pub async fn create_ticket(
        &self,
        identity: ClaimsIdentity,
        mut properties: AuthProperties,
        tokens: &OAuthTokenResponse,
    ) -> Option<AuthenticationTicket> {
        if self.config.save_tokens {
            properties.tokens.extend(self.tokens_to_save(tokens));
        }

        let mut context = CreatingTicketContext::new(
            identity,
            properties,
            tokens,
            &self.config,
            self.exchanger.client(),
        );
        self.events.creating_ticket(&mut context).await;

        if context.is_rejected() {
            tracing::debug!(scheme = %self.config.scheme, "Ticket rejected by hook");
            return None;
        }

        let (identity, properties) = context.into_parts();
        Some(AuthenticationTicket::new(
            identity,
            properties,
            &self.config.scheme,
        ))
    }

    fn tokens_to_save(&self, tokens: &OAuthTokenResponse) -> Vec<AuthenticationToken> {
        let mut saved = Vec::new();

        if let Some(access_token) = &tokens.access_token {
            saved.push(AuthenticationToken::new(properties::ACCESS_TOKEN, access_token));
        }
        if let Some(refresh_token) = tokens.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            saved.push(AuthenticationToken::new(properties::REFRESH_TOKEN, refresh_token));
        }
        if let Some(token_type) = tokens.token_type.as_deref().filter(|t| !t.is_empty()) {
            saved.push(AuthenticationToken::new(properties::TOKEN_TYPE, token_type));
        }
        if let Some(expires_at) = tokens
            .expires_in
            .as_deref()
            .and_then(|secs| self.expires_at(secs))
        {
            saved.push(AuthenticationToken::new(properties::EXPIRES_AT, expires_at));
        }

        saved
    }

    fn expires_at(&self, expires_in: &str) -> Option<String> {
        let seconds: i64 = expires_in.trim().parse().ok()?;
        let expires_at = self
            .clock
            .now_utc()
            .checked_add(time::Duration::seconds(seconds))?;
        expires_at.format(&Rfc3339).ok()
    }
}

fn without_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
