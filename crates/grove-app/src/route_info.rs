//! Route metadata.

use std::fmt;

use http::Method;

use crate::app::AppId;

/// Describes one registered route.
///
/// The composed handler lives in the router; `RouteInfo` is the immutable
/// record kept in the owning app's route list and handed to each request's
/// [`Context`](crate::Context).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    /// HTTP method.
    pub method: Method,
    /// Full path pattern, group prefixes included.
    pub path: String,
    /// Symbolic name, unique within the owning app.
    pub name: String,
    /// The app the route was registered on.
    pub app: AppId,
}

impl RouteInfo {
    /// Route info for a request that matched no route.
    pub(crate) fn unmatched(method: Method, path: &str, app: AppId) -> Self {
        Self {
            method,
            path: path.to_string(),
            name: String::new(),
            app,
        }
    }

    /// Returns `true` for the placeholder used on unmatched requests.
    pub fn is_unmatched(&self) -> bool {
        self.name.is_empty()
    }
}

impl fmt::Display for RouteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.method, self.path, self.name)
    }
}
