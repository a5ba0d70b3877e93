//! Correlation markers binding a callback to the challenge that caused it.
//!
//! A challenge stamps a random marker into the protected properties and sets
//! a cookie named after that marker. The callback is accepted only when the
//! marker recovered from the state has a matching cookie in the same user
//! agent and has not been consumed before.
//!
//! # Replay protection
//!
//! Cookie presence alone cannot stop two concurrent callbacks carrying the
//! same state. Every marker is therefore also registered in a
//! [`CorrelationStore`] whose `consume` must succeed at most once per marker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use cookie::{Cookie, SameSite};
use dashmap::DashMap;
use rand::RngCore;
use time::OffsetDateTime;

use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::context::RequestContext;
use crate::properties::AuthProperties;

/// Properties item holding the correlation marker.
pub const CORRELATION_ITEM: &str = ".xsrf";

/// Value of every correlation cookie; the marker lives in the cookie name.
const CORRELATION_COOKIE_VALUE: &str = "N";

/// Storage for outstanding correlation markers.
///
/// Implementations that can fail should treat a failed `consume` as `false`.
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    /// Records a marker that stays valid until `expires_at`.
    async fn register(&self, marker: &str, expires_at: OffsetDateTime);

    /// Atomically removes a marker.
    ///
    /// Returns `true` only for the first call with a registered, unexpired
    /// marker. Concurrent calls with the same marker must not both succeed.
    async fn consume(&self, marker: &str, now: OffsetDateTime) -> bool;

    /// Drops expired markers and returns how many were removed.
    async fn cleanup_expired(&self, now: OffsetDateTime) -> usize;
}

/// Process-local correlation store.
///
/// Suitable for a single instance; deployments behind a load balancer need a
/// shared store.
#[derive(Debug, Default)]
pub struct InMemoryCorrelationStore {
    markers: DashMap<String, OffsetDateTime>,
}

impl InMemoryCorrelationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outstanding markers.
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Returns `true` if no markers are outstanding.
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

#[async_trait]
impl CorrelationStore for InMemoryCorrelationStore {
    async fn register(&self, marker: &str, expires_at: OffsetDateTime) {
        self.markers.insert(marker.to_string(), expires_at);
    }

    async fn consume(&self, marker: &str, now: OffsetDateTime) -> bool {
        self.markers
            .remove(marker)
            .is_some_and(|(_, expires_at)| expires_at > now)
    }

    async fn cleanup_expired(&self, now: OffsetDateTime) -> usize {
        let before = self.markers.len();
        self.markers.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.markers.len())
    }
}

/// Generates and validates correlation markers for one scheme.
#[derive(Clone)]
pub struct CorrelationGuard {
    cookie_prefix: String,
    scheme: String,
    callback_path: String,
    lifetime: Duration,
    store: Arc<dyn CorrelationStore>,
    clock: Arc<dyn Clock>,
}

impl CorrelationGuard {
    /// Creates a guard for the scheme described by `config`.
    #[must_use]
    pub fn new(
        config: &ClientConfig,
        store: Arc<dyn CorrelationStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cookie_prefix: config.correlation.cookie_prefix.clone(),
            scheme: config.scheme.clone(),
            callback_path: config.callback_path().to_string(),
            lifetime: config.correlation.lifetime,
            store,
            clock,
        }
    }

    /// Stamps a fresh marker into `properties` and sets its cookie.
    pub async fn generate(&self, ctx: &mut RequestContext, properties: &mut AuthProperties) {
        let marker = generate_marker();
        let expires_at = self.clock.now_utc() + self.lifetime;

        self.store.register(&marker, expires_at).await;

        let secure = ctx.is_https();
        let cookie = Cookie::build((self.cookie_name(&marker), CORRELATION_COOKIE_VALUE))
            .path(self.cookie_path(ctx))
            .http_only(true)
            .secure(secure)
            .same_site(if secure { SameSite::None } else { SameSite::Lax })
            .expires(expires_at)
            .build();
        ctx.cookies_mut().add(cookie);

        properties
            .items
            .insert(CORRELATION_ITEM.to_string(), marker);
    }

    /// Checks and consumes the marker carried by `properties`.
    ///
    /// The marker is removed from `properties` and its cookie is deleted
    /// whatever the outcome.
    pub async fn validate(&self, ctx: &mut RequestContext, properties: &mut AuthProperties) -> bool {
        let Some(marker) = properties.items.remove(CORRELATION_ITEM) else {
            tracing::warn!(scheme = %self.scheme, "Correlation property not found in state");
            return false;
        };

        let cookie_name = self.cookie_name(&marker);
        let Some(value) = ctx
            .cookies()
            .get(&cookie_name)
            .map(|c| c.value().to_string())
        else {
            tracing::warn!(scheme = %self.scheme, "Correlation cookie not found");
            return false;
        };

        let removal = Cookie::build(cookie_name).path(self.cookie_path(ctx));
        ctx.cookies_mut().remove(removal);

        if value != CORRELATION_COOKIE_VALUE {
            tracing::warn!(scheme = %self.scheme, "Unexpected correlation cookie value");
            return false;
        }

        if !self.store.consume(&marker, self.clock.now_utc()).await {
            tracing::warn!(
                scheme = %self.scheme,
                "Correlation marker expired or already used"
            );
            return false;
        }

        true
    }

    fn cookie_name(&self, marker: &str) -> String {
        format!("{}{}.{}", self.cookie_prefix, self.scheme, marker)
    }

    fn cookie_path(&self, ctx: &RequestContext) -> String {
        format!("{}{}", ctx.path_base(), self.callback_path)
    }
}

fn generate_marker() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
