//! Core error types for the grove framework.
//!
//! This module provides [`GroveError`], the single error enum shared by every
//! grove crate. Each variant maps to an HTTP status code so that errors raised
//! anywhere in a middleware chain can be rendered by the status-keyed error
//! handlers of the owning application.

use std::fmt;

use thiserror::Error;

/// The primary error type for the grove framework.
///
/// Variants fall into two groups:
///
/// - request-time errors (routing failures, handler errors, recovered panics),
///   which are always turned into a rendered response;
/// - registration-time errors (duplicate names, bad patterns, mutation after
///   serving began), which are returned from the registering call.
///
/// # Examples
///
/// ```
/// use grove_core::GroveError;
///
/// let err = GroveError::NotFound("path not found: GET /missing".into());
/// assert_eq!(err.status_code(), 404);
/// assert_eq!(err.to_string(), "path not found: GET /missing");
/// ```
#[derive(Error, Debug)]
pub enum GroveError {
    // ── Routing ──────────────────────────────────────────────────────

    /// No route matched the request path.
    #[error("{0}")]
    NotFound(String),

    /// A route matched the path but not the method.
    #[error("{0}")]
    MethodNotAllowed(String),

    // ── Handler errors ───────────────────────────────────────────────

    /// HTTP 400 Bad Request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// HTTP 401 Unauthorized.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// HTTP 403 Forbidden.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// An error carrying an explicit status code chosen by the handler.
    #[error("{message}")]
    Status {
        /// The HTTP status code to render with.
        code: u16,
        /// The error message.
        message: String,
    },

    /// HTTP 500 Internal Server Error.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// A panic caught by the recovery middleware.
    #[error("panic: {0}")]
    Panic(String),

    // ── Registration ─────────────────────────────────────────────────

    /// Two routes in the same application derived or declared the same name.
    #[error("duplicate route name {name:?} for {method} {path}")]
    DuplicateRouteName {
        /// The colliding name.
        name: String,
        /// Method of the route being registered.
        method: String,
        /// Path of the route being registered.
        path: String,
    },

    /// Two middleware in the same stack share an explicit name.
    #[error("duplicate middleware name {0:?}")]
    DuplicateMiddleware(String),

    /// A route pattern could not be compiled.
    #[error("invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The application tree was mutated after it started serving.
    #[error("application is already serving; {0} is not allowed")]
    AlreadyServing(&'static str),

    /// The framework is improperly configured.
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration file or value could not be loaded.
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ── Sessions ─────────────────────────────────────────────────────

    /// A session store failed to load or persist a session.
    #[error("Session error: {0}")]
    Session(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GroveError {
    /// Builds an error that renders with an arbitrary status code.
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    /// Builds an internal error from anything displayable.
    pub fn internal(message: impl fmt::Display) -> Self {
        Self::Internal(message.to_string())
    }

    /// Returns the HTTP status code associated with this error.
    ///
    /// - `NotFound` -> 404
    /// - `MethodNotAllowed` -> 405
    /// - `BadRequest` -> 400
    /// - `Unauthorized` -> 401
    /// - `Forbidden` -> 403
    /// - `Status { code, .. }` -> `code`
    /// - Everything else -> 500
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::MethodNotAllowed(_) => 405,
            Self::BadRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::Status { code, .. } => *code,
            Self::Internal(_)
            | Self::Panic(_)
            | Self::DuplicateRouteName { .. }
            | Self::DuplicateMiddleware(_)
            | Self::InvalidPattern { .. }
            | Self::AlreadyServing(_)
            | Self::ImproperlyConfigured(_)
            | Self::Configuration(_)
            | Self::Session(_)
            | Self::Io(_) => 500,
        }
    }

    /// Returns `true` for errors raised while building the application tree.
    pub const fn is_registration_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateRouteName { .. }
                | Self::DuplicateMiddleware(_)
                | Self::InvalidPattern { .. }
                | Self::AlreadyServing(_)
        )
    }
}

/// A convenience type alias for `Result<T, GroveError>`.
pub type GroveResult<T> = Result<T, GroveError>;
