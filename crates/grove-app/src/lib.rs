//! # grove-app
//!
//! Application layer for the grove framework. An application is a tree of
//! [`App`]s: each node carries its own options, middleware stack, error
//! handlers and route namer, and registers its routes into a router shared by
//! the whole tree.
//!
//! ## Modules
//!
//! - [`app`] - The application tree, route registration and dispatch
//! - [`context`] - Per-request [`Context`]
//! - [`error_handlers`] - Status-keyed error rendering
//! - [`handler`] - The [`Handler`] type
//! - [`middleware`] - [`MiddlewareStack`] and the built-in middleware
//! - [`options`] - Application [`Options`]
//! - [`route_info`] - Registered route metadata
//! - [`route_namer`] - Symbolic route names
//! - [`server`] - Axum integration and serving
//! - [`session`] - Sessions and session stores

pub mod app;
pub mod context;
pub mod error_handlers;
pub mod handler;
pub mod middleware;
pub mod options;
pub mod route_info;
pub mod route_namer;
pub mod server;
pub mod session;

pub use app::{App, AppId, AppMuxer, CompiledRoute};
pub use context::Context;
pub use error_handlers::{default_error_handler, ErrorHandler, ErrorHandlers};
pub use handler::{handler, BoxFuture, Handler, HandlerResult};
pub use middleware::{from_fn, Middleware, MiddlewareStack};
pub use options::Options;
pub use route_info::RouteInfo;
pub use route_namer::{BaseRouteNamer, RouteNamer};
pub use session::{InMemorySessionStore, Session, SessionStore};
