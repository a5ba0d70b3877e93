//! Axum handlers for the challenge and callback legs.
//!
//! ```text
//! GET {login_path}?returnUrl=/somewhere
//!   └─► 302 authorization_endpoint?client_id=..&state=..  (+ correlation cookie)
//!
//! GET {callback_path}?code=..&state=..
//!   ├─► success → 302 redirect_uri (ticket in response extensions)
//!   └─► failure → 401 with the failure reason
//! ```

use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::header::{HOST, LOCATION};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::context::RequestContext;
use crate::handler::{AuthenticateResult, ChallengeOutcome, OAuthHandler};
use crate::properties::AuthProperties;

/// Header set by reverse proxies terminating TLS.
const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Query parameters of the login endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ChallengeQuery {
    /// Local path to return to after sign-in.
    #[serde(rename = "returnUrl", default)]
    pub return_url: Option<String>,
}

/// Builds a router serving `login_path` and the configured callback path.
pub fn router(handler: Arc<OAuthHandler>, login_path: &str) -> Router {
    let callback_path = handler.config().callback_path().to_string();
    Router::new()
        .route(login_path, get(challenge))
        .route(&callback_path, get(callback))
        .with_state(handler)
}

/// GET handler that issues the challenge.
pub async fn challenge(
    State(handler): State<Arc<OAuthHandler>>,
    Query(query): Query<ChallengeQuery>,
    uri: Uri,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let mut ctx = request_context(&uri, &headers, &jar);

    // Without a local return URL, land on the site root rather than back on
    // the login path.
    let return_url = query
        .return_url
        .filter(|url| is_local_path(url))
        .unwrap_or_else(|| "/".to_string());
    let properties = AuthProperties::new().with_redirect_uri(return_url);

    match handler.challenge(&mut ctx, properties).await {
        Ok(ChallengeOutcome::Redirect { location }) => (
            StatusCode::FOUND,
            [(LOCATION, location)],
            with_response_cookies(jar, &ctx),
        )
            .into_response(),
        Ok(ChallengeOutcome::Handled(response)) => (
            response.status,
            with_response_cookies(jar, &ctx),
            response.body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to issue OAuth challenge");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to start sign-in").into_response()
        }
    }
}

/// GET handler for the callback path.
pub async fn callback(
    State(handler): State<Arc<OAuthHandler>>,
    uri: Uri,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    // Dropping the request future cancels the in-flight exchange.
    let cancellation = CancellationToken::new();
    let _guard = cancellation.clone().drop_guard();

    let mut ctx = request_context(&uri, &headers, &jar).with_cancellation(cancellation);
    let result = handler.handle_callback(&mut ctx).await;
    let jar = with_response_cookies(jar, &ctx);

    match result {
        AuthenticateResult::Success(ticket) => {
            let location = ticket
                .properties
                .redirect_uri
                .clone()
                .unwrap_or_else(|| "/".to_string());
            let mut response = (StatusCode::FOUND, [(LOCATION, location)], jar).into_response();
            response.extensions_mut().insert(*ticket);
            response
        }
        AuthenticateResult::Failure { error, .. } => {
            (StatusCode::UNAUTHORIZED, jar, error.to_string()).into_response()
        }
    }
}

/// Builds a [`RequestContext`] from the parts axum extracted.
pub fn request_context(uri: &Uri, headers: &HeaderMap, jar: &CookieJar) -> RequestContext {
    let scheme = headers
        .get(FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.scheme_str())
        .unwrap_or("http");

    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");

    let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());

    jar.iter().fold(
        RequestContext::new(scheme, host, path_and_query),
        |ctx, cookie| ctx.with_cookie(cookie.name(), cookie.value()),
    )
}

fn with_response_cookies(mut jar: CookieJar, ctx: &RequestContext) -> CookieJar {
    for cookie in ctx.response_cookies() {
        jar = jar.add(cookie.clone());
    }
    jar
}

/// Accepts `/path` but not `//host` or absolute URLs.
///
/// Browsers drop tabs and line breaks from URLs, so `/\t/host` would
/// resolve as `//host`. Any control character or whitespace is rejected.
fn is_local_path(url: &str) -> bool {
    url.starts_with('/')
        && !url.starts_with("//")
        && !url.starts_with("/\\")
        && !url.chars().any(|c| c.is_control() || c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use axum::http::header::{COOKIE, SET_COOKIE};
    use tower::ServiceExt;
    use url::Url;

    use super::*;
    use crate::config::ClientConfig;
    use crate::state::{AesGcmProtector, DataProtector, StateCodec};

    fn app() -> Router {
        app_with_codec().0
    }

    /// Router plus a codec sharing its key, for reading back issued state.
    fn app_with_codec() -> (Router, StateCodec) {
        let protector: Arc<dyn DataProtector> = Arc::new(AesGcmProtector::ephemeral("test"));
        let config = ClientConfig::new(
            "my-client",
            "my-secret",
            Url::parse("https://idp.example.com/authorize").unwrap(),
            Url::parse("https://idp.example.com/token").unwrap(),
        )
        .with_callback_path("/signin-oauth");
        let handler = OAuthHandler::new(config, protector.clone()).unwrap();
        (router(Arc::new(handler), "/login"), StateCodec::new(protector))
    }

    async fn login_redirect_uri(target: &str) -> Option<String> {
        let (app, codec) = app_with_codec();
        let response = app
            .oneshot(
                Request::get(target)
                    .header(HOST, "app.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);

        let location = Url::parse(response.headers()[LOCATION].to_str().unwrap()).unwrap();
        let state = location
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        codec.unprotect(&state).unwrap().redirect_uri
    }

    #[tokio::test]
    async fn test_login_redirects_and_sets_correlation_cookie() {
        let response = app()
            .oneshot(
                Request::get("/login?returnUrl=/home")
                    .header(HOST, "app.example.com")
                    .header(FORWARDED_PROTO, "https")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://idp.example.com/authorize?client_id=my-client"));
        assert!(location.contains(
            "redirect_uri=https%3A%2F%2Fapp.example.com%2Fsignin-oauth"
        ));

        let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.starts_with(".codegrant.Correlation.OAuth."));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("Secure"));
        assert!(set_cookie.contains("Path=/signin-oauth"));
    }

    #[tokio::test]
    async fn test_callback_failure_is_unauthorized_with_reason() {
        let response = app()
            .oneshot(
                Request::get("/signin-oauth?error=access_denied")
                    .header(HOST, "app.example.com")
                    .header(COOKIE, "unrelated=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"access_denied");
    }

    #[test]
    fn test_request_context_from_parts() {
        let uri: Uri = "/signin-oauth?code=abc".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(HOST, "app.example.com:8443".parse().unwrap());
        headers.insert(FORWARDED_PROTO, "https".parse().unwrap());
        let jar = CookieJar::new().add(cookie::Cookie::new("a", "b"));

        let ctx = request_context(&uri, &headers, &jar);
        assert!(ctx.is_https());
        assert_eq!(ctx.host(), "app.example.com:8443");
        assert_eq!(ctx.path(), "/signin-oauth");
        assert_eq!(ctx.query_value("code"), Some("abc"));
        assert_eq!(ctx.cookies().get("a").map(|c| c.value()), Some("b"));
        assert_eq!(ctx.response_cookies().count(), 0);
    }

    #[test]
    fn test_is_local_path() {
        assert!(is_local_path("/home"));
        assert!(!is_local_path("//evil.example.com"));
        assert!(!is_local_path("https://evil.example.com"));
        assert!(!is_local_path("/\\evil.example.com"));
        assert!(!is_local_path("/\t/evil.example.com"));
        assert!(!is_local_path("/\n/evil.example.com"));
        assert!(!is_local_path("/\r\n/evil.example.com"));
        assert!(!is_local_path("/ /evil.example.com"));
    }

    #[tokio::test]
    async fn test_login_return_url_is_kept_when_local() {
        assert_eq!(
            login_redirect_uri("/login?returnUrl=%2Fhome%3Ftab%3D1").await.as_deref(),
            Some("/home?tab=1")
        );
    }

    #[tokio::test]
    async fn test_login_without_return_url_lands_on_root() {
        assert_eq!(login_redirect_uri("/login").await.as_deref(), Some("/"));
    }

    #[tokio::test]
    async fn test_login_rejected_return_url_lands_on_root() {
        // %09 decodes to a tab before the check runs.
        for target in [
            "/login?returnUrl=%2F%09%2Fevil.example.com",
            "/login?returnUrl=%2F%0A%2Fevil.example.com",
            "/login?returnUrl=%2F%2Fevil.example.com",
            "/login?returnUrl=https%3A%2F%2Fevil.example.com",
        ] {
            assert_eq!(login_redirect_uri(target).await.as_deref(), Some("/"), "{target}");
        }
    }
}
