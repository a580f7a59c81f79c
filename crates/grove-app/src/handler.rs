//! Handler types.
//!
//! Every route terminates in a [`Handler`]: an async function from a
//! [`Context`] to a response or a [`GroveError`]. Middleware wrap handlers in
//! further handlers, so a composed chain is itself just a `Handler`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use grove_core::GroveResult;
use grove_http::HttpResponse;

use crate::context::Context;

/// A boxed, sendable future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// What a handler resolves to.
pub type HandlerResult = GroveResult<HttpResponse>;

/// A shareable async request handler.
pub type Handler = Arc<dyn Fn(Context) -> BoxFuture<HandlerResult> + Send + Sync>;

/// Boxes an async function into a [`Handler`].
///
/// ```
/// use grove_app::handler::handler;
/// use grove_http::HttpResponse;
///
/// let h = handler(|_ctx| async { Ok(HttpResponse::ok("hi")) });
/// let again = h.clone();
/// assert!(std::sync::Arc::ptr_eq(&h, &again));
/// ```
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}
