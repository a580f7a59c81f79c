//! Built-in middleware installed by [`App::new`](crate::App::new).
//!
//! - [`panic_recovery`] - Turns a panic anywhere in the chain into a 500 error
//! - [`request_logger`] - Tags each request with an id and logs one line for it
//! - [`session_saver`] - Persists a modified session and sets its cookie
//!
//! [`method_override`] is not a middleware: it runs on the raw request before
//! routing, so that the rewritten method takes part in route matching.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use http::Method;
use tracing::Instrument;

use grove_core::logging::request_span;
use grove_core::GroveError;
use grove_http::HttpRequest;

use super::MiddlewareStack;
use crate::context::Context;
use crate::handler::{BoxFuture, Handler, HandlerResult};

/// The form field consulted by [`method_override`].
pub const METHOD_OVERRIDE_FIELD: &str = "_method";

/// Name of [`panic_recovery`] in the default stack.
pub const PANIC_RECOVERY: &str = "panic_recovery";
/// Name of [`request_logger`] in the default stack.
pub const REQUEST_LOGGER: &str = "request_logger";
/// Name of [`session_saver`] in the default stack.
pub const SESSION_SAVER: &str = "session_saver";

/// Returns the stack a new root app starts with: [`panic_recovery`],
/// [`request_logger`], [`session_saver`], outermost first.
pub fn default_stack() -> MiddlewareStack {
    let mut stack = MiddlewareStack::new();
    stack.push(PANIC_RECOVERY.to_string(), Arc::new(panic_recovery));
    stack.push(REQUEST_LOGGER.to_string(), Arc::new(request_logger));
    stack.push(SESSION_SAVER.to_string(), Arc::new(session_saver));
    stack
}

/// Catches panics raised by the wrapped chain.
///
/// Both a panic while building the handler future and a panic while polling
/// it are recovered and returned as [`GroveError::Panic`], which the owning
/// app's error handlers render as a 500.
pub fn panic_recovery(next: Handler) -> Handler {
    Arc::new(move |ctx: Context| -> BoxFuture<HandlerResult> {
        let next = next.clone();
        Box::pin(async move {
            let route = ctx.route().name.clone();
            let future = match std::panic::catch_unwind(AssertUnwindSafe(|| next(ctx))) {
                Ok(future) => future,
                Err(payload) => return Err(recovered(&route, payload.as_ref())),
            };
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(recovered(&route, payload.as_ref())),
            }
        })
    })
}

fn recovered(route: &str, payload: &(dyn Any + Send)) -> GroveError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    tracing::error!(route = %route, panic = %message, "handler panicked");
    GroveError::Panic(message)
}

/// Assigns a request id and logs the outcome of every request.
///
/// The id (a v4 UUID) is stored in the context data under `request_id`, and
/// everything downstream runs inside a [`request_span`].
pub fn request_logger(next: Handler) -> Handler {
    Arc::new(move |ctx: Context| -> BoxFuture<HandlerResult> {
        let next = next.clone();
        Box::pin(async move {
            let request_id = uuid::Uuid::new_v4().to_string();
            ctx.set("request_id", request_id.clone());
            let method = ctx.request().method().to_string();
            let path = ctx.request().path().to_string();
            let span = request_span(&request_id, &method, &path);

            let start = Instant::now();
            let result = next(ctx.clone()).instrument(span).await;
            let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

            let status = match &result {
                Ok(response) => response.status().as_u16(),
                Err(e) => e.status_code(),
            };
            tracing::info!(
                request_id = %request_id,
                method = %method,
                path = %path,
                route = %ctx.route().name,
                status,
                duration_ms,
                "request completed"
            );
            result
        })
    })
}

/// Saves the session after a successful handler.
///
/// When the session changed, the cookie returned by
/// [`Session::save`](crate::Session::save) is appended to the response. The
/// cookie is marked secure on HTTPS requests. Failed chains leave the session
/// untouched.
pub fn session_saver(next: Handler) -> Handler {
    Arc::new(move |ctx: Context| -> BoxFuture<HandlerResult> {
        let next = next.clone();
        Box::pin(async move {
            let mut response = next(ctx.clone()).await?;
            if let Some(cookie) = ctx.session().save().await? {
                let cookie = cookie.secure(ctx.request().is_secure());
                response.set_cookie(&cookie);
            }
            Ok(response)
        })
    })
}

/// Rewrites the method of a form `POST` that carries a `_method` field.
///
/// HTML forms can only submit `GET` and `POST`; this lets them reach `PUT`,
/// `PATCH` and `DELETE` routes. Values that are not valid methods are ignored.
///
/// ```
/// use grove_app::middleware::builtin::method_override;
/// use grove_http::HttpRequest;
/// use http::Method;
///
/// let mut request = HttpRequest::builder()
///     .method(Method::POST)
///     .path("/users/1")
///     .form("_method=delete")
///     .build();
/// method_override(&mut request);
/// assert_eq!(request.method(), Method::DELETE);
/// ```
pub fn method_override(request: &mut HttpRequest) {
    if *request.method() != Method::POST {
        return;
    }
    let Some(value) = request.post().get(METHOD_OVERRIDE_FIELD) else {
        return;
    };
    match Method::from_bytes(value.trim().to_ascii_uppercase().as_bytes()) {
        Ok(method) => {
            tracing::debug!(method = %method, path = %request.path(), "method overridden");
            request.set_method(method);
        }
        Err(_) => {
            tracing::debug!(value = %value, "ignoring invalid method override");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler;
    use grove_http::HttpResponse;

    #[test]
    fn test_default_stack_order() {
        assert_eq!(
            default_stack().names(),
            vec![PANIC_RECOVERY, REQUEST_LOGGER, SESSION_SAVER]
        );
    }

    fn exploding(_ctx: Context) -> BoxFuture<HandlerResult> {
        panic!("exploded before the future")
    }

    #[tokio::test]
    async fn test_recovers_synchronous_panic() {
        let chain = panic_recovery(Arc::new(exploding));
        let err = chain(Context::for_test()).await.unwrap_err();
        assert!(matches!(err, GroveError::Panic(ref m) if m == "exploded before the future"));
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn test_recovers_panic_inside_future() {
        let chain = panic_recovery(handler(|ctx| async move {
            if ctx.param("never").is_none() {
                panic!("boom {}", 42);
            }
            Ok(HttpResponse::ok("unreachable"))
        }));
        let err = chain(Context::for_test()).await.unwrap_err();
        assert!(matches!(err, GroveError::Panic(ref m) if m == "boom 42"));
    }

    #[tokio::test]
    async fn test_recovery_passes_results_through() {
        let chain = panic_recovery(handler(|_ctx| async {
            Err(GroveError::Forbidden("nope".into()))
        }));
        let err = chain(Context::for_test()).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_request_logger_sets_request_id() {
        let chain = request_logger(handler(|ctx| async move {
            let id = ctx.value("request_id").unwrap();
            Ok(HttpResponse::ok(id.as_str().unwrap_or_default()))
        }));
        let ctx = Context::for_test();
        let response = chain(ctx.clone()).await.unwrap();
        let id = ctx.value("request_id").unwrap();
        assert_eq!(Some(response.text()), id.as_str());
        assert!(uuid::Uuid::parse_str(id.as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_session_saver_sets_cookie_when_modified() {
        let chain = session_saver(handler(|ctx| async move {
            ctx.session().set("user", "ada");
            Ok(HttpResponse::ok("saved"))
        }));
        let ctx = Context::for_test();
        let response = chain(ctx.clone()).await.unwrap();
        let header = response.header("set-cookie").unwrap();
        assert!(header.starts_with(&format!("{}=", ctx.options().session_name())));
        assert!(header.contains("HttpOnly"));
        assert!(ctx.session().key().is_some());
    }

    #[tokio::test]
    async fn test_session_saver_skips_untouched_session() {
        let chain = session_saver(handler(|_ctx| async { Ok(HttpResponse::ok("read only")) }));
        let response = chain(Context::for_test()).await.unwrap();
        assert!(response.header("set-cookie").is_none());
    }

    #[tokio::test]
    async fn test_session_saver_ignores_failed_chain() {
        let chain = session_saver(handler(|ctx| async move {
            ctx.session().set("user", "ada");
            Err(GroveError::BadRequest("invalid".into()))
        }));
        let ctx = Context::for_test();
        assert!(chain(ctx.clone()).await.is_err());
        assert!(ctx.session().key().is_none());
        assert!(ctx.session().is_modified());
    }

    #[test]
    fn test_method_override() {
        let mut request = HttpRequest::builder()
            .method(Method::POST)
            .form("_method=PATCH&name=ada")
            .build();
        method_override(&mut request);
        assert_eq!(request.method(), Method::PATCH);
    }

    #[test]
    fn test_method_override_only_applies_to_post() {
        let mut request = HttpRequest::builder()
            .method(Method::GET)
            .query_string("_method=DELETE")
            .build();
        method_override(&mut request);
        assert_eq!(request.method(), Method::GET);

        let mut request = HttpRequest::builder()
            .method(Method::POST)
            .query_string("_method=DELETE")
            .build();
        method_override(&mut request);
        assert_eq!(request.method(), Method::POST);
    }

    #[test]
    fn test_method_override_ignores_garbage() {
        let mut request = HttpRequest::builder()
            .method(Method::POST)
            .form("_method=not%20a%20method")
            .build();
        method_override(&mut request);
        assert_eq!(request.method(), Method::POST);
    }
}
