//! # grove-core
//!
//! Core types shared by every grove crate: the error enum, the one-time
//! environment bootstrap and tracing setup. This crate has no HTTP
//! dependencies.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`env`] - Process-wide environment snapshot loaded once
//! - [`logging`] - Tracing-based logging integration

pub mod env;
pub mod error;
pub mod logging;

// Re-export the most commonly used types at the crate root.
pub use env::Environment;
pub use error::{GroveError, GroveResult};
