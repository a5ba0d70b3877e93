//! Per-request view handed to the handler by the hosting pipeline.

use cookie::{Cookie, CookieJar};
use tokio_util::sync::CancellationToken;
use url::form_urlencoded;

/// The parts of an incoming request the handler reads, plus the cookies it
/// writes back.
///
/// Cookies added or removed through [`cookies_mut`](Self::cookies_mut) are
/// tracked as a delta; the hosting pipeline emits them as `Set-Cookie`
/// headers via [`response_cookies`](Self::response_cookies).
#[derive(Debug)]
pub struct RequestContext {
    scheme: String,
    host: String,
    path_base: String,
    path: String,
    query: Vec<(String, String)>,
    cookies: CookieJar,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Creates a context from the request scheme, host, and path with query.
    #[must_use]
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, query),
            None => (path_and_query, ""),
        };

        Self {
            scheme: scheme.into(),
            host: host.into(),
            path_base: String::new(),
            path: if path.is_empty() { "/" } else { path }.to_string(),
            query: form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
            cookies: CookieJar::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Sets the path prefix the application is mounted under.
    #[must_use]
    pub fn with_path_base(mut self, path_base: impl Into<String>) -> Self {
        self.path_base = path_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Adds a cookie sent by the user agent.
    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies
            .add_original(Cookie::new(name.into(), value.into()));
        self
    }

    /// Sets the token that is cancelled when the request is aborted.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Request scheme, `http` or `https`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns `true` for HTTPS requests.
    pub fn is_https(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("https")
    }

    /// Request host, including the port when present.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Path prefix the application is mounted under, without trailing slash.
    pub fn path_base(&self) -> &str {
        &self.path_base
    }

    /// Request path relative to the path base.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// First value of a query parameter.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First non-empty value of a query parameter.
    pub fn non_empty_query_value(&self, name: &str) -> Option<&str> {
        self.query_value(name).filter(|value| !value.is_empty())
    }

    /// Absolute URL of the current request.
    pub fn current_url(&self) -> String {
        let mut url = format!("{}://{}{}{}", self.scheme, self.host, self.path_base, self.path);
        if !self.query.is_empty() {
            url.push('?');
            url.push_str(
                &form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(&self.query)
                    .finish(),
            );
        }
        url
    }

    /// Absolute URL for `path` on this application's origin and path base.
    pub fn build_redirect_uri(&self, path: &str) -> String {
        format!("{}://{}{}{}", self.scheme, self.host, self.path_base, path)
    }

    /// Request cookies plus any pending changes.
    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Mutable access to the cookie jar.
    pub fn cookies_mut(&mut self) -> &mut CookieJar {
        &mut self.cookies
    }

    /// Cookies to emit as `Set-Cookie` headers, including removals.
    pub fn response_cookies(&self) -> impl Iterator<Item = &Cookie<'static>> {
        self.cookies.delta()
    }

    /// Cancellation signal of the enclosing request.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}
