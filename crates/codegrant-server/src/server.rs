use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use codegrant_auth::ticket::claim_types;
use codegrant_auth::{
    AesGcmProtector, AuthenticationTicket, Clock, CorrelationStore, DataProtector, OAuthHandler,
    SystemClock,
};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::events::ClaimMappingEvents;

/// How often expired correlation markers are purged.
const CORRELATION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

pub struct ServerBuilder {
    config: AppConfig,
}

pub struct CodegrantServer {
    addr: SocketAddr,
    app: Router,
    correlation_store: Arc<dyn CorrelationStore>,
}

impl ServerBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn build(self) -> anyhow::Result<CodegrantServer> {
        let addr = self.config.addr().map_err(anyhow::Error::msg)?;
        let handler = build_handler(&self.config)?;
        let correlation_store = handler.correlation_store().clone();
        let app = build_app(Arc::new(handler), &self.config.server.login_path);
        Ok(CodegrantServer {
            addr,
            app,
            correlation_store,
        })
    }
}

impl CodegrantServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);

        let cleanup = spawn_correlation_cleanup(self.correlation_store);
        let result = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;
        cleanup.abort();

        result?;
        Ok(())
    }
}

fn spawn_correlation_cleanup(store: Arc<dyn CorrelationStore>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CORRELATION_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = store.cleanup_expired(SystemClock.now_utc()).await;
            if removed > 0 {
                tracing::debug!(removed, "Purged expired correlation markers");
            }
        }
    })
}

pub fn build_handler(config: &AppConfig) -> anyhow::Result<OAuthHandler> {
    let protection = &config.protection;
    let protector: Arc<dyn DataProtector> = match protection.key.as_deref() {
        Some(key) => Arc::new(AesGcmProtector::from_key_str(key, &protection.purpose)?),
        None => {
            tracing::warn!("protection.key not set; using an ephemeral key");
            Arc::new(AesGcmProtector::ephemeral(&protection.purpose))
        }
    };

    let handler = OAuthHandler::new(config.oauth.clone(), protector)?
        .with_events(Arc::new(ClaimMappingEvents));
    Ok(handler)
}

pub fn build_app(handler: Arc<OAuthHandler>, login_path: &str) -> Router {
    codegrant_auth::http::router(handler, login_path)
        .route("/", get(index))
        .route("/healthz", get(|| async { "ok" }))
        .layer(axum::middleware::map_response(log_sign_in))
        .layer(TraceLayer::new_for_http())
}

async fn index() -> impl IntoResponse {
    "codegrant demo relying party"
}

async fn log_sign_in(response: Response) -> Response {
    if let Some(ticket) = response.extensions().get::<AuthenticationTicket>() {
        let subject = ticket
            .identity
            .find_first(claim_types::NAME_IDENTIFIER)
            .map(|c| c.value.as_str())
            .unwrap_or("<unknown>");
        tracing::info!(
            scheme = %ticket.scheme,
            subject = %subject,
            tokens = ticket.properties.tokens.len(),
            "User signed in"
        );
    }
    response
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
