//! # grove
//!
//! Composable application trees for Rust web services.
//!
//! This is the meta-crate that re-exports all sub-crates for convenient access.
//! You can depend on `grove` to get the entire framework, or depend on
//! individual crates for finer-grained control.

/// Core types: errors, environment bootstrap and logging.
pub use grove_core as core;

/// HTTP layer: request, response, cookies and the router adapter.
#[cfg(feature = "http")]
pub use grove_http as http;

/// Application trees, middleware, error handlers, sessions and serving.
#[cfg(feature = "app")]
pub use grove_app as app;

// Third-party crates handler authors need alongside grove.
pub use async_trait::async_trait;
pub use axum;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;

/// The types most applications need.
///
/// ```
/// use grove::prelude::*;
///
/// let app = App::new(Options::new());
/// app.get("/", |_ctx: Context| async { Ok(HttpResponse::ok("hello")) }).unwrap();
/// assert_eq!(app.routes().len(), 1);
/// ```
#[cfg(feature = "app")]
pub mod prelude {
    pub use grove_app::middleware::from_fn;
    pub use grove_app::{App, Context, ErrorHandlers, Handler, HandlerResult, Options, Session};
    pub use grove_core::{GroveError, GroveResult};
    pub use grove_http::{Cookie, HttpRequest, HttpResponse};
}
