//! Per-request context.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use grove_core::GroveResult;
use grove_http::HttpRequest;

use crate::app::App;
use crate::options::Options;
use crate::route_info::RouteInfo;
use crate::session::Session;

struct ContextInner {
    app: App,
    options: Arc<Options>,
    route: Arc<RouteInfo>,
    request: HttpRequest,
    params: HashMap<String, String>,
    data: Mutex<HashMap<String, serde_json::Value>>,
    session: Session,
    cancel: CancellationToken,
}

/// Everything a handler, middleware or error handler knows about one request.
///
/// A context is created per request and dropped with it. Clones share the
/// same state, so a middleware can keep using its context after passing a
/// clone down the chain and see what downstream code stored.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub(crate) fn new(
        app: App,
        options: Arc<Options>,
        route: Arc<RouteInfo>,
        request: HttpRequest,
        params: HashMap<String, String>,
        session: Session,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                app,
                options,
                route,
                request,
                params,
                data: Mutex::new(HashMap::new()),
                session,
                cancel,
            }),
        }
    }

    /// Returns the request.
    pub fn request(&self) -> &HttpRequest {
        &self.inner.request
    }

    /// Returns the matched route.
    ///
    /// For requests that matched nothing this is a placeholder for which
    /// [`RouteInfo::is_unmatched`] is `true`.
    pub fn route(&self) -> &RouteInfo {
        &self.inner.route
    }

    /// Returns the options of the app that owns the route.
    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Returns the app that owns the route.
    pub fn app(&self) -> &App {
        &self.inner.app
    }

    /// Looks up a parameter: path parameters first, then the query string,
    /// then the form body.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner
            .params
            .get(name)
            .map(String::as_str)
            .or_else(|| self.inner.request.get().get(name))
            .or_else(|| self.inner.request.post().get(name))
    }

    /// Returns the captured path parameters.
    pub fn path_params(&self) -> &HashMap<String, String> {
        &self.inner.params
    }

    /// Stores a value in the request's data bag.
    pub fn set(&self, key: &str, value: impl Into<serde_json::Value>) {
        self.inner
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.into());
    }

    /// Reads a value from the request's data bag.
    pub fn value(&self, key: &str) -> Option<serde_json::Value> {
        self.inner
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Returns a copy of the whole data bag.
    pub fn data(&self) -> HashMap<String, serde_json::Value> {
        self.inner
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the session.
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Returns the token cancelled when the client goes away.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// Returns `true` once the request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Builds the URL of a named route. See [`App::url_for`].
    pub fn url_for(&self, name: &str, params: &[(&str, &str)]) -> GroveResult<String> {
        self.inner.app.url_for(name, params)
    }

    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        let app = App::new(Options::new());
        let options = app.options();
        let route = Arc::new(RouteInfo::unmatched(http::Method::GET, "/", app.id()));
        let session = Session::empty(
            Arc::new(crate::session::InMemorySessionStore::new()),
            options.session_name(),
        );
        Self::new(
            app,
            options,
            route,
            HttpRequest::builder().build(),
            HashMap::new(),
            session,
            CancellationToken::new(),
        )
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("route", &self.inner.route)
            .field("path", &self.inner.request.path())
            .field("params", &self.inner.params)
            .finish_non_exhaustive()
    }
}
