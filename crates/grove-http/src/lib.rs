//! # grove-http
//!
//! HTTP layer for the grove framework. Provides the request and response
//! types shared by handlers and middleware, and the router adapter that maps
//! method + path onto registered handlers.
//!
//! ## Modules
//!
//! - [`request`] - [`HttpRequest`] and its builder
//! - [`response`] - [`HttpResponse`] with axum conversion
//! - [`cookies`] - Cookie parsing and `Set-Cookie` formatting
//! - [`querydict`] - Decoded query and form parameters
//! - [`mux`] - Pattern compilation and method + path dispatch

pub mod cookies;
pub mod mux;
pub mod querydict;
pub mod request;
pub mod response;

pub use cookies::{Cookie, SameSite};
pub use mux::{MuxMatch, Muxer, PathPattern};
pub use querydict::QueryDict;
pub use request::HttpRequest;
pub use response::HttpResponse;
