//! HTTP request type.
//!
//! [`HttpRequest`] carries the method, path, headers, decoded query and form
//! parameters and the raw body of one incoming request. Instances are built
//! from axum request parts via [`HttpRequest::from_axum`], or with
//! [`HttpRequest::builder`] in tests.

use std::collections::HashMap;
use std::sync::OnceLock;

use http::{HeaderMap, Method};

use crate::cookies;
use crate::querydict::QueryDict;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// An incoming HTTP request.
///
/// # Examples
///
/// ```
/// use grove_http::HttpRequest;
///
/// let request = HttpRequest::builder()
///     .method(http::Method::GET)
///     .path("/articles/2024/")
///     .query_string("page=1")
///     .build();
///
/// assert_eq!(request.method(), &http::Method::GET);
/// assert_eq!(request.path(), "/articles/2024/");
/// assert_eq!(request.get().get("page"), Some("1"));
/// ```
#[derive(Debug)]
pub struct HttpRequest {
    method: Method,
    path: String,
    query_string: String,
    content_type: Option<String>,
    get: QueryDict,
    post: QueryDict,
    headers: HeaderMap,
    body: Vec<u8>,
    scheme: String,
    cached_cookies: OnceLock<HashMap<String, String>>,
}

impl HttpRequest {
    /// Creates a new [`HttpRequestBuilder`].
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::default()
    }

    /// Creates an `HttpRequest` from axum request parts and the collected body.
    pub fn from_axum(parts: http::request::Parts, body: Vec<u8>) -> Self {
        let scheme = if parts
            .headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("https"))
        {
            "https"
        } else {
            "http"
        };
        let content_type = parts
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self::assemble(
            parts.method,
            parts.uri.path().to_string(),
            parts.uri.query().unwrap_or("").to_string(),
            content_type,
            parts.headers,
            body,
            scheme.to_string(),
        )
    }

    fn assemble(
        method: Method,
        path: String,
        query_string: String,
        content_type: Option<String>,
        headers: HeaderMap,
        body: Vec<u8>,
        scheme: String,
    ) -> Self {
        let get = QueryDict::parse(&query_string);
        let post = if content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with(FORM_URLENCODED))
        {
            QueryDict::parse(&String::from_utf8_lossy(&body))
        } else {
            QueryDict::new()
        };

        Self {
            method,
            path,
            query_string,
            content_type,
            get,
            post,
            headers,
            body,
            scheme,
            cached_cookies: OnceLock::new(),
        }
    }

    /// Returns the HTTP method.
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Replaces the HTTP method. Used for form method overrides.
    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// Returns the request path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string without the leading `?`.
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// Returns the request content type, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Returns the decoded query parameters.
    pub const fn get(&self) -> &QueryDict {
        &self.get
    }

    /// Returns the decoded form body parameters.
    pub const fn post(&self) -> &QueryDict {
        &self.post
    }

    /// Returns the request headers.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the raw body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns `"http"` or `"https"`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns `true` if the request arrived over HTTPS.
    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }

    /// Returns `true` if the client sent or asked for JSON.
    ///
    /// Checks `Content-Type` first, then `Accept`.
    pub fn wants_json(&self) -> bool {
        let is_json = |value: &str| value.contains("application/json") || value.contains("+json");
        self.content_type().is_some_and(is_json) || self.header("accept").is_some_and(is_json)
    }

    /// Parses cookies from the `Cookie` header. Cached after the first call.
    pub fn cookies(&self) -> &HashMap<String, String> {
        self.cached_cookies.get_or_init(|| {
            self.header("cookie")
                .map_or_else(HashMap::new, cookies::parse_cookie_header)
        })
    }

    /// Returns one cookie value by name.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().get(name).map(String::as_str)
    }
}

/// Builder for [`HttpRequest`], mainly for tests.
#[derive(Debug)]
pub struct HttpRequestBuilder {
    method: Method,
    path: String,
    query_string: String,
    content_type: Option<String>,
    headers: HeaderMap,
    body: Vec<u8>,
    scheme: String,
}

impl Default for HttpRequestBuilder {
    fn default() -> Self {
        Self {
            method: Method::GET,
            path: "/".to_string(),
            query_string: String::new(),
            content_type: None,
            headers: HeaderMap::new(),
            body: Vec::new(),
            scheme: "http".to_string(),
        }
    }
}

impl HttpRequestBuilder {
    /// Sets the HTTP method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the request path.
    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    /// Sets the query string (without leading `?`).
    #[must_use]
    pub fn query_string(mut self, qs: &str) -> Self {
        self.query_string = qs.to_string();
        self
    }

    /// Sets the content type.
    #[must_use]
    pub fn content_type(mut self, ct: &str) -> Self {
        self.content_type = Some(ct.to_string());
        self
    }

    /// Adds a header. Invalid names or values are ignored.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::from_bytes(name.as_bytes()),
            http::header::HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Sets a url-encoded form body and its content type.
    #[must_use]
    pub fn form(mut self, body: &str) -> Self {
        self.content_type = Some(FORM_URLENCODED.to_string());
        self.body = body.as_bytes().to_vec();
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Sets the scheme.
    #[must_use]
    pub fn scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    /// Builds the [`HttpRequest`].
    pub fn build(self) -> HttpRequest {
        let mut content_type = self.content_type;
        if content_type.is_none() {
            content_type = self
                .headers
                .get(http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
        }
        HttpRequest::assemble(
            self.method,
            self.path,
            self.query_string,
            content_type,
            self.headers,
            self.body,
            self.scheme,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let request = HttpRequest::builder().build();
        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.path(), "/");
        assert_eq!(request.scheme(), "http");
        assert!(request.get().is_empty());
        assert!(request.post().is_empty());
    }

    #[test]
    fn test_form_body_is_parsed() {
        let request = HttpRequest::builder()
            .method(Method::POST)
            .form("_method=DELETE&name=a+b")
            .build();
        assert_eq!(request.post().get("_method"), Some("DELETE"));
        assert_eq!(request.post().get("name"), Some("a b"));
    }

    #[test]
    fn test_non_form_body_is_not_parsed() {
        let request = HttpRequest::builder()
            .content_type("application/json")
            .body(b"a=1".to_vec())
            .build();
        assert!(request.post().is_empty());
        assert_eq!(request.body(), b"a=1");
    }

    #[test]
    fn test_set_method() {
        let mut request = HttpRequest::builder().method(Method::POST).build();
        request.set_method(Method::PUT);
        assert_eq!(request.method(), &Method::PUT);
    }

    #[test]
    fn test_cookies() {
        let request = HttpRequest::builder()
            .header("cookie", "sid=abc; theme=dark")
            .build();
        assert_eq!(request.cookie("sid"), Some("abc"));
        assert_eq!(request.cookie("theme"), Some("dark"));
        assert_eq!(request.cookie("none"), None);
    }

    #[test]
    fn test_wants_json() {
        let by_accept = HttpRequest::builder()
            .header("accept", "application/json")
            .build();
        let by_type = HttpRequest::builder()
            .header("content-type", "application/vnd.api+json")
            .build();
        let html = HttpRequest::builder().header("accept", "text/html").build();
        assert!(by_accept.wants_json());
        assert!(by_type.wants_json());
        assert!(!html.wants_json());
    }

    #[test]
    fn test_from_axum() {
        let (parts, ()) = http::Request::builder()
            .method(Method::POST)
            .uri("/submit?x=1")
            .header("content-type", FORM_URLENCODED)
            .header("x-forwarded-proto", "https")
            .body(())
            .unwrap()
            .into_parts();
        let request = HttpRequest::from_axum(parts, b"field=value".to_vec());
        assert_eq!(request.path(), "/submit");
        assert_eq!(request.query_string(), "x=1");
        assert_eq!(request.get().get("x"), Some("1"));
        assert_eq!(request.post().get("field"), Some("value"));
        assert!(request.is_secure());
    }
}
