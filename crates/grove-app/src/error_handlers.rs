//! Status-keyed error handlers.
//!
//! Whenever a handler chain returns an error, or a request matches no route,
//! the owning app looks up the handler registered for the error's status code
//! and renders the response with it. A default handler always exists, so
//! every lookup yields something to call.
//!
//! ```
//! use grove_app::error_handlers::ErrorHandlers;
//! use grove_http::HttpResponse;
//!
//! let mut handlers = ErrorHandlers::new();
//! handlers.set(422, |status, err, _ctx| HttpResponse::plain(status, err.to_string()));
//!
//! assert!(handlers.contains(422));
//! assert!(handlers.contains(404));
//! assert!(!handlers.contains(418));
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use http::StatusCode;

use grove_core::GroveError;
use grove_http::HttpResponse;

use crate::context::Context;

/// Renders an error into a response.
pub type ErrorHandler = Arc<dyn Fn(StatusCode, &GroveError, &Context) -> HttpResponse + Send + Sync>;

/// A table of error handlers keyed by status code, plus a default.
#[derive(Clone)]
pub struct ErrorHandlers {
    handlers: HashMap<u16, ErrorHandler>,
    default: ErrorHandler,
}

impl Default for ErrorHandlers {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorHandlers {
    /// Creates the standard table: 404, 500 and the default all render with
    /// [`default_error_handler`].
    pub fn new() -> Self {
        let default: ErrorHandler = Arc::new(default_error_handler);
        let handlers = HashMap::from([(404, Arc::clone(&default)), (500, Arc::clone(&default))]);
        Self { handlers, default }
    }

    /// Creates a table with only a default handler.
    pub fn with_default<F>(default: F) -> Self
    where
        F: Fn(StatusCode, &GroveError, &Context) -> HttpResponse + Send + Sync + 'static,
    {
        Self {
            handlers: HashMap::new(),
            default: Arc::new(default),
        }
    }

    /// Returns the handler for `code`, or the default.
    pub fn get(&self, code: u16) -> &ErrorHandler {
        self.handlers.get(&code).unwrap_or(&self.default)
    }

    /// Registers a handler for `code`.
    pub fn set<F>(&mut self, code: u16, handler: F)
    where
        F: Fn(StatusCode, &GroveError, &Context) -> HttpResponse + Send + Sync + 'static,
    {
        self.handlers.insert(code, Arc::new(handler));
    }

    /// Registers an already shared handler for `code`.
    pub fn set_shared(&mut self, code: u16, handler: ErrorHandler) {
        self.handlers.insert(code, handler);
    }

    /// Registers several handlers at once.
    pub fn extend(&mut self, handlers: impl IntoIterator<Item = (u16, ErrorHandler)>) {
        self.handlers.extend(handlers);
    }

    /// Removes the handler for `code`. The default is unaffected.
    pub fn remove(&mut self, code: u16) -> bool {
        self.handlers.remove(&code).is_some()
    }

    /// Replaces the default handler.
    pub fn set_default<F>(&mut self, handler: F)
    where
        F: Fn(StatusCode, &GroveError, &Context) -> HttpResponse + Send + Sync + 'static,
    {
        self.default = Arc::new(handler);
    }

    /// Returns the default handler.
    pub fn default_handler(&self) -> &ErrorHandler {
        &self.default
    }

    /// Returns `true` if a handler is registered for exactly `code`.
    pub fn contains(&self, code: u16) -> bool {
        self.handlers.contains_key(&code)
    }

    /// Returns the codes with a dedicated handler, sorted.
    pub fn codes(&self) -> Vec<u16> {
        let mut codes: Vec<u16> = self.handlers.keys().copied().collect();
        codes.sort_unstable();
        codes
    }

    /// Renders `err` with the handler for its status code.
    pub fn render(&self, err: &GroveError, ctx: &Context) -> HttpResponse {
        let code = err.status_code();
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.get(code)(status, err, ctx)
    }
}

impl std::fmt::Debug for ErrorHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandlers")
            .field("codes", &self.codes())
            .finish_non_exhaustive()
    }
}

/// The built-in error renderer.
///
/// Responds with JSON (`{"error": ..., "code": ...}`) when the request's
/// `Content-Type` or `Accept` mentions JSON, and with a small HTML page
/// otherwise. Outside the `development` environment the error message is
/// replaced by the status reason phrase.
pub fn default_error_handler(status: StatusCode, err: &GroveError, ctx: &Context) -> HttpResponse {
    let reason = status.canonical_reason().unwrap_or("Error");
    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), error = %err, route = %ctx.route().name, "request failed");
    } else {
        tracing::debug!(status = status.as_u16(), error = %err, "request error");
    }

    let message = if ctx.options().is_development() {
        err.to_string()
    } else {
        reason.to_string()
    };

    if ctx.request().wants_json() {
        return HttpResponse::json(
            status,
            &serde_json::json!({ "error": message, "code": status.as_u16() }),
        );
    }

    let mut page = String::new();
    let _ = write!(
        page,
        "<!DOCTYPE html>\n<html>\n<head><title>{code} {reason}</title></head>\n<body>\n\
         <h1>{code} {reason}</h1>\n<pre>{message}</pre>\n</body>\n</html>\n",
        code = status.as_u16(),
        message = escape_html(&message),
    );
    HttpResponse::new(status, page)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(label: &'static str) -> impl Fn(StatusCode, &GroveError, &Context) -> HttpResponse {
        move |status, _err, _ctx| HttpResponse::plain(status, label)
    }

    #[test]
    fn test_new_is_seeded() {
        let handlers = ErrorHandlers::new();
        assert_eq!(handlers.codes(), vec![404, 500]);
    }

    #[test]
    fn test_get_returns_exact_or_default() {
        let mut handlers = ErrorHandlers::with_default(plain("default"));
        handlers.set(418, plain("teapot"));
        let ctx = Context::for_test();
        let err = GroveError::status(418, "x");

        let exact = handlers.get(418)(StatusCode::IM_A_TEAPOT, &err, &ctx);
        assert_eq!(exact.text(), "teapot");
        let fallback = handlers.get(419)(StatusCode::IM_A_TEAPOT, &err, &ctx);
        assert_eq!(fallback.text(), "default");
    }

    #[test]
    fn test_remove_keeps_default() {
        let mut handlers = ErrorHandlers::with_default(plain("default"));
        handlers.set(404, plain("nf"));
        assert!(handlers.remove(404));
        assert!(!handlers.remove(404));
        let ctx = Context::for_test();
        let err = GroveError::NotFound("gone".into());
        assert_eq!(handlers.render(&err, &ctx).text(), "default");
    }

    #[test]
    fn test_extend_and_set_default() {
        let mut handlers = ErrorHandlers::new();
        let teapot: ErrorHandler = Arc::new(plain("teapot"));
        handlers.extend([(418, teapot)]);
        handlers.set_default(plain("new default"));
        let ctx = Context::for_test();
        assert_eq!(
            handlers.render(&GroveError::status(418, "x"), &ctx).text(),
            "teapot"
        );
        assert_eq!(
            handlers.render(&GroveError::Forbidden("x".into()), &ctx).text(),
            "new default"
        );
    }

    #[test]
    fn test_render_uses_error_status() {
        let handlers = ErrorHandlers::new();
        let ctx = Context::for_test();
        let response = handlers.render(&GroveError::BadRequest("bad <input>".into()), &ctx);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response.text();
        assert!(body.contains("<h1>400 Bad Request</h1>"));
        assert!(body.contains("bad &lt;input&gt;"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">'&'</a>"), "&lt;a href=&quot;x&quot;&gt;&#x27;&amp;&#x27;&lt;/a&gt;");
    }
}
