//! HTTP response type.
//!
//! [`HttpResponse`] is what every handler, middleware and error handler
//! produces. It converts into an axum response via [`IntoResponse`].

use axum::response::IntoResponse;
use http::header::{HeaderName, ALLOW, CONTENT_TYPE, LOCATION, SET_COOKIE};
use http::{HeaderMap, HeaderValue, Method, StatusCode};

use crate::cookies::Cookie;

/// An HTTP response.
///
/// # Examples
///
/// ```
/// use grove_http::HttpResponse;
///
/// let response = HttpResponse::ok("Hello, World!");
/// assert_eq!(response.status(), http::StatusCode::OK);
/// assert_eq!(response.text(), "Hello, World!");
/// assert_eq!(response.content_type(), "text/html");
/// ```
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
    content_type: String,
}

impl HttpResponse {
    /// Creates a `text/html` response with the given status and body.
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            content_type: "text/html".to_string(),
        }
    }

    /// Creates a 200 OK response.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    /// Creates a `text/plain` response.
    pub fn plain(status: StatusCode, body: impl Into<String>) -> Self {
        let mut response = Self::new(status, body);
        response.set_content_type("text/plain");
        response
    }

    /// Serializes `data` into an `application/json` response.
    ///
    /// A value that fails to serialize yields a 500 plain-text response.
    pub fn json<T: serde::Serialize + ?Sized>(status: StatusCode, data: &T) -> Self {
        match serde_json::to_string(data) {
            Ok(json) => {
                let mut response = Self::new(status, json);
                response.set_content_type("application/json");
                response
            }
            Err(e) => Self::plain(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("JSON serialization error: {e}"),
            ),
        }
    }

    /// Creates a 302 Found redirect.
    pub fn redirect(url: &str) -> Self {
        Self::redirect_with(StatusCode::FOUND, url)
    }

    /// Creates a redirect with an explicit 3xx status.
    pub fn redirect_with(status: StatusCode, url: &str) -> Self {
        let mut response = Self::new(status, "");
        if let Ok(value) = HeaderValue::from_str(url) {
            response.headers.insert(LOCATION, value);
        }
        response
    }

    /// Returns the status code.
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the status code.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Returns the headers.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the headers mutably.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Sets a header, replacing existing values. Invalid values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Sets the `Allow` header to the given methods, in order.
    #[must_use]
    pub fn with_allow(self, methods: &[Method]) -> Self {
        let allow = methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        self.with_header(ALLOW, &allow)
    }

    /// Appends a header value, keeping existing ones. Invalid values are ignored.
    pub fn append_header(&mut self, name: HeaderName, value: &str) {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.append(name, value);
        }
    }

    /// Returns the first value of a header as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Appends a `Set-Cookie` header.
    pub fn set_cookie(&mut self, cookie: &Cookie) {
        self.append_header(SET_COOKIE, &cookie.to_set_cookie_header());
    }

    /// Returns the content type without parameters.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Sets the content type.
    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = content_type.into();
    }

    /// Returns the body text.
    pub fn text(&self) -> &str {
        &self.body
    }

    /// Returns the body bytes.
    pub fn body_bytes(&self) -> &[u8] {
        self.body.as_bytes()
    }

    fn full_content_type(&self) -> String {
        if self.content_type.starts_with("text/") || self.content_type.contains("json") {
            format!("{}; charset=utf-8", self.content_type)
        } else {
            self.content_type.clone()
        }
    }
}

impl IntoResponse for HttpResponse {
    fn into_response(self) -> axum::response::Response {
        let content_type = self.full_content_type();
        let mut response = axum::response::Response::new(axum::body::Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        if let Ok(value) = HeaderValue::from_str(&content_type) {
            response.headers_mut().insert(CONTENT_TYPE, value);
        }
        response
    }
}
