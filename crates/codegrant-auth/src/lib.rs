//! # codegrant-auth
//!
//! Relying-party side of the OAuth 2.0 Authorization Code grant (RFC 6749 §4.1).
//!
//! This crate provides:
//! - Challenge issuance (redirect to the remote authorization endpoint)
//! - Protected, tamper-evident state carried across the redirect
//! - Single-use correlation markers against CSRF and replay
//! - Back-channel authorization code exchange
//! - Authentication ticket construction with pluggable enrichment hooks
//! - Axum handlers for the challenge and callback legs
//!
//! ## Modules
//!
//! - [`config`] - Client configuration, validated once at construction
//! - [`context`] - Per-request view of the incoming request
//! - [`state`] - Data protection and the state codec
//! - [`correlation`] - Correlation markers and their store
//! - [`backchannel`] - Token endpoint exchange
//! - [`ticket`] - Claims, identities, and authentication tickets
//! - [`events`] - Extensibility hooks
//! - [`handler`] - The challenge and callback orchestration
//! - [`http`] - Axum HTTP handlers

pub mod backchannel;
pub mod challenge;
pub mod clock;
pub mod config;
pub mod context;
pub mod correlation;
pub mod error;
pub mod events;
pub mod handler;
pub mod http;
pub mod properties;
pub mod state;
pub mod ticket;

pub use backchannel::{OAuthTokenResponse, TokenExchanger};
pub use challenge::ChallengeBuilder;
pub use clock::{Clock, SystemClock};
pub use config::{ClaimMapping, ClientConfig, ConfigError, CorrelationConfig};
pub use context::RequestContext;
pub use correlation::{CorrelationGuard, CorrelationStore, InMemoryCorrelationStore};
pub use error::{BackchannelError, CallbackError, ProtectionError};
pub use events::{
    CreatingTicketContext, DefaultOAuthEvents, HandledResponse, OAuthEvents, RedirectContext,
};
pub use handler::{AuthenticateResult, ChallengeOutcome, OAuthHandler};
pub use properties::{AuthProperties, AuthenticationToken};
pub use state::{AesGcmProtector, DataProtector, StateCodec};
pub use ticket::{AuthenticationTicket, Claim, ClaimsIdentity};
