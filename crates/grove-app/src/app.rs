//! The application tree.
//!
//! An [`App`] is a handle to one node of a tree of apps. The root is created
//! with [`App::new`]; [`App::group`] adds children that share a path prefix.
//! All nodes live in one arena behind a single lock, together with the
//! router that every node registers into.
//!
//! ## Lifecycle
//!
//! The tree is built first and served afterwards. The first dispatched
//! request (or [`App::into_router`]) freezes it: from then on every
//! structural change returns [`GroveError::AlreadyServing`].
//!
//! ```
//! use grove_app::{App, Options};
//! use grove_http::HttpResponse;
//!
//! let app = App::new(Options::new());
//! app.get("/", |_ctx| async { Ok(HttpResponse::ok("home")) }).unwrap();
//!
//! let api = app.group("/api").unwrap();
//! let route = api
//!     .get("/users/<int:id>", |ctx| async move {
//!         Ok(HttpResponse::ok(format!("user {}", ctx.param("id").unwrap_or_default())))
//!     })
//!     .unwrap();
//!
//! assert_eq!(route.path, "/api/users/<int:id>");
//! assert_eq!(route.name, "apiUserPath");
//! assert_eq!(app.url_for("apiUserPath", &[("id", "7")]).unwrap(), "/api/users/7");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use http::{Method, StatusCode};
use tokio_util::sync::CancellationToken;

use grove_core::{GroveError, GroveResult};
use grove_http::mux::pattern::{join, normalize};
use grove_http::mux::{MuxMatch, Muxer};
use grove_http::{HttpRequest, HttpResponse};

use crate::context::Context;
use crate::error_handlers::{default_error_handler, ErrorHandler, ErrorHandlers};
use crate::handler::{handler, Handler, HandlerResult};
use crate::middleware::builtin::default_stack;
use crate::middleware::{from_fn, Middleware, MiddlewareStack};
use crate::options::Options;
use crate::route_info::RouteInfo;
use crate::route_namer::{BaseRouteNamer, RouteNamer};
use crate::session::{InMemorySessionStore, Session, SessionStore};

/// Identifies an app within its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppId(usize);

impl AppId {
    /// The root app.
    pub const ROOT: Self = Self(0);

    /// Returns the arena index.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A route as stored in the router: its metadata plus the handler composed
/// with the middleware active at registration.
pub struct CompiledRoute {
    /// The route's metadata.
    pub info: Arc<RouteInfo>,
    /// The composed handler.
    pub handler: Handler,
}

impl fmt::Debug for CompiledRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRoute")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// The router type shared by a tree.
pub type AppMuxer = Muxer<Arc<CompiledRoute>>;

struct AppNode {
    options: Arc<Options>,
    middleware: MiddlewareStack,
    error_handlers: Arc<ErrorHandlers>,
    namer: Arc<dyn RouteNamer>,
    routes: Vec<Arc<RouteInfo>>,
    parent: Option<AppId>,
    children: Vec<AppId>,
}

struct AppTree {
    nodes: Vec<AppNode>,
    muxer: AppMuxer,
    session_store: Arc<dyn SessionStore>,
}

impl AppTree {
    fn node(&self, id: AppId) -> &AppNode {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: AppId) -> &mut AppNode {
        &mut self.nodes[id.0]
    }
}

struct Shared {
    tree: RwLock<AppTree>,
    serving: AtomicBool,
}

/// A handle to one app of an application tree.
///
/// Handles are cheap to clone; clones refer to the same node.
#[derive(Clone)]
pub struct App {
    shared: Arc<Shared>,
    id: AppId,
}

/// Where a request ended up after routing.
enum Resolved {
    Route {
        route: Arc<CompiledRoute>,
        params: HashMap<String, String>,
        options: Arc<Options>,
        handlers: Arc<ErrorHandlers>,
    },
    Unmatched {
        error: GroveError,
        allowed: Vec<Method>,
        options: Arc<Options>,
        handlers: Arc<ErrorHandlers>,
    },
}

impl App {
    /// Creates the root app.
    ///
    /// Bootstraps the process environment (once per process), fills unset
    /// options from it and from the defaults, seeds the error handlers and
    /// installs the default middleware: `panic_recovery`, `request_logger`,
    /// `session_saver`. A failed bootstrap, such as a malformed `.env` file,
    /// is logged and the app is built without it; use [`App::try_new`] to
    /// get the error instead.
    pub fn new(mut options: Options) -> Self {
        match grove_core::env::bootstrap() {
            Ok(env) => options.fill_from_env(env),
            Err(e) => tracing::error!(error = %e, "environment bootstrap failed"),
        }
        Self::with_root(options)
    }

    /// Like [`App::new`], but fails if the environment bootstrap fails.
    ///
    /// # Errors
    ///
    /// Returns the bootstrap error.
    pub fn try_new(mut options: Options) -> GroveResult<Self> {
        options.fill_from_env(grove_core::env::bootstrap()?);
        Ok(Self::with_root(options))
    }

    fn with_root(options: Options) -> Self {
        let options = options.with_defaults();
        tracing::debug!(name = %options.name(), env = %options.env(), "app created");
        let root = AppNode {
            options: Arc::new(options),
            middleware: default_stack(),
            error_handlers: Arc::new(ErrorHandlers::new()),
            namer: Arc::new(BaseRouteNamer),
            routes: Vec::new(),
            parent: None,
            children: Vec::new(),
        };
        let tree = AppTree {
            nodes: vec![root],
            muxer: Muxer::new(),
            session_store: Arc::new(InMemorySessionStore::new()),
        };
        Self {
            shared: Arc::new(Shared {
                tree: RwLock::new(tree),
                serving: AtomicBool::new(false),
            }),
            id: AppId::ROOT,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AppTree> {
        self.shared
            .tree
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, op: &'static str) -> GroveResult<RwLockWriteGuard<'_, AppTree>> {
        let tree = self
            .shared
            .tree
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_serving() {
            return Err(GroveError::AlreadyServing(op));
        }
        Ok(tree)
    }

    fn handle(&self, id: AppId) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            id,
        }
    }

    /// Freezes the tree. Called on the first request and by the transport.
    pub(crate) fn mark_serving(&self) {
        if !self.shared.serving.swap(true, Ordering::AcqRel) {
            tracing::debug!(routes = self.read().muxer.len(), "app tree frozen for serving");
        }
    }

    /// Returns `true` once the tree has started serving.
    pub fn is_serving(&self) -> bool {
        self.shared.serving.load(Ordering::Acquire)
    }

    /// Returns this app's id.
    pub const fn id(&self) -> AppId {
        self.id
    }

    /// Returns `true` for the root app.
    pub fn is_root(&self) -> bool {
        self.id == AppId::ROOT
    }

    /// Returns the root app of the tree.
    pub fn root(&self) -> Self {
        self.handle(AppId::ROOT)
    }

    /// Returns the parent app, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        self.read().node(self.id).parent.map(|id| self.handle(id))
    }

    /// Returns the direct children in creation order.
    pub fn children(&self) -> Vec<Self> {
        self.read()
            .node(self.id)
            .children
            .iter()
            .map(|&id| self.handle(id))
            .collect()
    }

    /// Creates a child app whose routes live under `path`.
    ///
    /// The child starts with a copy of this app's options (prefix joined
    /// with `path`), route namer, error handlers and middleware as they are
    /// now. Middleware added to this app later does not reach the child.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::AlreadyServing`] once the tree is serving.
    pub fn group(&self, path: &str) -> GroveResult<Self> {
        let mut tree = self.write("group")?;
        let parent = tree.node(self.id);
        let mut options = Options::clone(&parent.options);
        let prefix = join(parent.options.prefix(), path);
        options.prefix = Some(prefix.clone());
        let child = AppNode {
            options: Arc::new(options),
            middleware: parent.middleware.clone(),
            error_handlers: Arc::clone(&parent.error_handlers),
            namer: Arc::clone(&parent.namer),
            routes: Vec::new(),
            parent: Some(self.id),
            children: Vec::new(),
        };
        let id = AppId(tree.nodes.len());
        tree.nodes.push(child);
        tree.node_mut(self.id).children.push(id);
        tracing::debug!(prefix = %prefix, parent = self.id.0, child = id.0, "group created");
        Ok(self.handle(id))
    }

    /// Returns this app's options.
    pub fn options(&self) -> Arc<Options> {
        Arc::clone(&self.read().node(self.id).options)
    }

    // ── Middleware ───────────────────────────────────────────────────

    fn edit_middleware<R>(
        &self,
        op: &'static str,
        edit: impl FnOnce(&mut MiddlewareStack) -> R,
    ) -> GroveResult<R> {
        let mut tree = self.write(op)?;
        Ok(edit(&mut tree.node_mut(self.id).middleware))
    }

    /// Returns a snapshot of this app's middleware stack.
    pub fn middleware(&self) -> MiddlewareStack {
        self.read().node(self.id).middleware.clone()
    }

    /// Appends a middleware under its derived name, returning the name.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::AlreadyServing`] once the tree is serving.
    pub fn use_middleware(&self, middleware: impl Middleware) -> GroveResult<String> {
        self.edit_middleware("use_middleware", |stack| stack.use_fn(middleware))
    }

    /// Appends an async closure as a middleware. See [`from_fn`].
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::AlreadyServing`] once the tree is serving.
    pub fn use_fn<F, Fut>(&self, f: F) -> GroveResult<String>
    where
        F: Fn(Context, Handler) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.use_middleware(from_fn(f))
    }

    /// Appends a middleware under an explicit name.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::DuplicateMiddleware`] if the name is taken in this
    /// app, or [`GroveError::AlreadyServing`].
    pub fn use_named(&self, name: &str, middleware: impl Middleware) -> GroveResult<()> {
        self.edit_middleware("use_named", |stack| stack.use_named(name, middleware))?
    }

    /// Leaves the named middleware out of routes registered from now on.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::AlreadyServing`] once the tree is serving.
    pub fn skip(&self, names: &[&str]) -> GroveResult<()> {
        self.edit_middleware("skip", |stack| stack.skip(names))
    }

    /// Re-activates skipped middleware.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::AlreadyServing`] once the tree is serving.
    pub fn enable(&self, names: &[&str]) -> GroveResult<()> {
        self.edit_middleware("enable", |stack| stack.enable(names))
    }

    /// Deletes the named middleware, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::AlreadyServing`] once the tree is serving.
    pub fn remove(&self, names: &[&str]) -> GroveResult<usize> {
        self.edit_middleware("remove", |stack| stack.remove(names))
    }

    /// Swaps the function of a declared middleware in place.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::ImproperlyConfigured`] for an unknown name, or
    /// [`GroveError::AlreadyServing`].
    pub fn replace(&self, name: &str, middleware: impl Middleware) -> GroveResult<()> {
        self.edit_middleware("replace", |stack| stack.replace(name, middleware))?
    }

    /// Removes all of this app's middleware.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::AlreadyServing`] once the tree is serving.
    pub fn clear_middleware(&self) -> GroveResult<()> {
        self.edit_middleware("clear_middleware", MiddlewareStack::clear)
    }

    // ── Error handlers, naming, sessions ─────────────────────────────

    fn edit_error_handlers(
        &self,
        op: &'static str,
        edit: impl FnOnce(&mut ErrorHandlers),
    ) -> GroveResult<()> {
        let mut tree = self.write(op)?;
        edit(Arc::make_mut(&mut tree.node_mut(self.id).error_handlers));
        Ok(())
    }

    /// Returns a snapshot of this app's error handlers.
    pub fn error_handlers(&self) -> ErrorHandlers {
        ErrorHandlers::clone(&self.read().node(self.id).error_handlers)
    }

    /// Registers the error handler for `code` on this app.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::AlreadyServing`] once the tree is serving.
    pub fn set_error_handler<F>(&self, code: u16, handler: F) -> GroveResult<()>
    where
        F: Fn(StatusCode, &GroveError, &Context) -> HttpResponse + Send + Sync + 'static,
    {
        self.edit_error_handlers("set_error_handler", |handlers| handlers.set(code, handler))
    }

    /// Registers several error handlers at once.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::AlreadyServing`] once the tree is serving.
    pub fn extend_error_handlers(
        &self,
        handlers: impl IntoIterator<Item = (u16, ErrorHandler)>,
    ) -> GroveResult<()> {
        self.edit_error_handlers("extend_error_handlers", |table| table.extend(handlers))
    }

    /// Replaces the fallback error handler of this app.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::AlreadyServing`] once the tree is serving.
    pub fn set_default_error_handler<F>(&self, handler: F) -> GroveResult<()>
    where
        F: Fn(StatusCode, &GroveError, &Context) -> HttpResponse + Send + Sync + 'static,
    {
        self.edit_error_handlers("set_default_error_handler", |handlers| {
            handlers.set_default(handler);
        })
    }

    /// Replaces the route namer used for routes registered from now on.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::AlreadyServing`] once the tree is serving.
    pub fn set_route_namer(&self, namer: impl RouteNamer + 'static) -> GroveResult<()> {
        let mut tree = self.write("set_route_namer")?;
        tree.node_mut(self.id).namer = Arc::new(namer);
        Ok(())
    }

    /// Replaces the session store of the whole tree.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::AlreadyServing`] once the tree is serving.
    pub fn set_session_store(&self, store: impl SessionStore + 'static) -> GroveResult<()> {
        let mut tree = self.write("set_session_store")?;
        tree.session_store = Arc::new(store);
        Ok(())
    }

    // ── Routes ───────────────────────────────────────────────────────

    /// Registers a `GET` route.
    ///
    /// # Errors
    ///
    /// See [`App::add_route`].
    pub fn get<F, Fut>(&self, path: &str, f: F) -> GroveResult<Arc<RouteInfo>>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_route(Method::GET, path, f)
    }

    /// Registers a `POST` route.
    ///
    /// # Errors
    ///
    /// See [`App::add_route`].
    pub fn post<F, Fut>(&self, path: &str, f: F) -> GroveResult<Arc<RouteInfo>>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_route(Method::POST, path, f)
    }

    /// Registers a `PUT` route.
    ///
    /// # Errors
    ///
    /// See [`App::add_route`].
    pub fn put<F, Fut>(&self, path: &str, f: F) -> GroveResult<Arc<RouteInfo>>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_route(Method::PUT, path, f)
    }

    /// Registers a `PATCH` route.
    ///
    /// # Errors
    ///
    /// See [`App::add_route`].
    pub fn patch<F, Fut>(&self, path: &str, f: F) -> GroveResult<Arc<RouteInfo>>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_route(Method::PATCH, path, f)
    }

    /// Registers a `DELETE` route.
    ///
    /// # Errors
    ///
    /// See [`App::add_route`].
    pub fn delete<F, Fut>(&self, path: &str, f: F) -> GroveResult<Arc<RouteInfo>>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_route(Method::DELETE, path, f)
    }

    /// Registers a `HEAD` route.
    ///
    /// # Errors
    ///
    /// See [`App::add_route`].
    pub fn head<F, Fut>(&self, path: &str, f: F) -> GroveResult<Arc<RouteInfo>>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_route(Method::HEAD, path, f)
    }

    /// Registers an `OPTIONS` route.
    ///
    /// # Errors
    ///
    /// See [`App::add_route`].
    pub fn options_route<F, Fut>(&self, path: &str, f: F) -> GroveResult<Arc<RouteInfo>>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_route(Method::OPTIONS, path, f)
    }

    /// Registers one handler for every standard method.
    ///
    /// Each method gets its own route (and name).
    ///
    /// # Errors
    ///
    /// See [`App::add_route`]. Routes registered before a failure stay
    /// registered.
    pub fn any<F, Fut>(&self, path: &str, f: F) -> GroveResult<Vec<Arc<RouteInfo>>>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        const METHODS: [Method; 7] = [
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
        ];
        let terminal = handler(f);
        METHODS
            .into_iter()
            .map(|method| self.register(method, path, None, Arc::clone(&terminal)))
            .collect()
    }

    /// Registers a route, named by the app's route namer.
    ///
    /// The handler is wrapped with this app's middleware as it is at this
    /// moment; later middleware changes do not affect the route. A route
    /// already registered anywhere in the tree for the same method and path
    /// is replaced, and drops out of [`App::routes`] and [`App::url_for`].
    ///
    /// # Errors
    ///
    /// - [`GroveError::DuplicateRouteName`] if the name is taken in this app
    /// - [`GroveError::InvalidPattern`] if `path` does not compile
    /// - [`GroveError::AlreadyServing`] once the tree is serving
    pub fn add_route<F, Fut>(&self, method: Method, path: &str, f: F) -> GroveResult<Arc<RouteInfo>>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(method, path, None, handler(f))
    }

    /// Registers a route under an explicit name.
    ///
    /// # Errors
    ///
    /// See [`App::add_route`].
    pub fn add_route_named<F, Fut>(
        &self,
        method: Method,
        path: &str,
        name: &str,
        f: F,
    ) -> GroveResult<Arc<RouteInfo>>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(method, path, Some(name), handler(f))
    }

    /// Registers an already boxed handler.
    ///
    /// # Errors
    ///
    /// See [`App::add_route`].
    pub fn add_handler(
        &self,
        method: Method,
        path: &str,
        name: Option<&str>,
        terminal: Handler,
    ) -> GroveResult<Arc<RouteInfo>> {
        self.register(method, path, name, terminal)
    }

    fn register(
        &self,
        method: Method,
        path: &str,
        name: Option<&str>,
        terminal: Handler,
    ) -> GroveResult<Arc<RouteInfo>> {
        let mut guard = self.write("route registration")?;
        let tree = &mut *guard;
        let node = &tree.nodes[self.id.0];

        let full_path = join(node.options.prefix(), path);
        let route_key = normalize(&full_path);
        let replaces = |r: &RouteInfo| r.method == method && normalize(&r.path) == route_key;
        let name = name.map_or_else(|| node.namer.name_route(&method, &full_path), str::to_string);
        if node.routes.iter().any(|r| r.name == name && !replaces(r)) {
            return Err(GroveError::DuplicateRouteName {
                name,
                method: method.to_string(),
                path: full_path,
            });
        }

        let info = Arc::new(RouteInfo {
            method: method.clone(),
            path: full_path,
            name,
            app: self.id,
        });
        let compiled = CompiledRoute {
            info: Arc::clone(&info),
            handler: node.middleware.compose(terminal),
        };
        let active = node.middleware.active_names().join(", ");
        tree.muxer.register(method.clone(), &info.path, Arc::new(compiled))?;

        // The router keeps only the newest handler for a method and path.
        for other in &mut tree.nodes {
            other.routes.retain(|r| {
                let keep = !replaces(r);
                if !keep {
                    tracing::debug!(method = %r.method, path = %r.path, name = %r.name, "route replaced");
                }
                keep
            });
        }
        tree.node_mut(self.id).routes.push(Arc::clone(&info));

        tracing::debug!(
            method = %info.method,
            path = %info.path,
            name = %info.name,
            middleware = %active,
            "route registered"
        );
        Ok(info)
    }

    /// Returns the routes registered on this app, in registration order.
    pub fn routes(&self) -> Vec<Arc<RouteInfo>> {
        self.read().node(self.id).routes.clone()
    }

    /// Returns the routes of the whole tree, sorted by path then method.
    pub fn all_routes(&self) -> Vec<Arc<RouteInfo>> {
        let tree = self.read();
        let mut routes: Vec<Arc<RouteInfo>> = tree
            .nodes
            .iter()
            .flat_map(|node| node.routes.iter().cloned())
            .collect();
        routes.sort_by(|a, b| {
            a.path
                .cmp(&b.path)
                .then_with(|| a.method.as_str().cmp(b.method.as_str()))
        });
        routes
    }

    /// Builds the path of a named route.
    ///
    /// The name is looked up on this app first, then anywhere in the tree.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::NotFound`] for an unknown name, or the
    /// reversal error for missing or malformed parameters.
    pub fn url_for(&self, name: &str, params: &[(&str, &str)]) -> GroveResult<String> {
        let tree = self.read();
        let info = tree
            .node(self.id)
            .routes
            .iter()
            .find(|r| r.name == name)
            .or_else(|| {
                tree.nodes
                    .iter()
                    .flat_map(|node| node.routes.iter())
                    .find(|r| r.name == name)
            })
            .ok_or_else(|| GroveError::NotFound(format!("no route named {name:?}")))?;
        let params: HashMap<&str, &str> = params.iter().copied().collect();
        tree.muxer.reverse(&info.path, &params)
    }

    /// Runs `f` with mutable access to the shared router.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::AlreadyServing`] once the tree is serving.
    pub fn with_muxer<R>(&self, f: impl FnOnce(&mut AppMuxer) -> R) -> GroveResult<R> {
        let mut tree = self.write("with_muxer")?;
        Ok(f(&mut tree.muxer))
    }

    /// Runs `f` with read access to the shared router.
    pub fn muxer<R>(&self, f: impl FnOnce(&AppMuxer) -> R) -> R {
        f(&self.read().muxer)
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Handles one request and always produces a response.
    ///
    /// Freezes the tree on first use.
    pub async fn dispatch(&self, request: HttpRequest) -> HttpResponse {
        self.dispatch_with(request, CancellationToken::new()).await
    }

    /// Like [`App::dispatch`], with a cancellation token that the handler
    /// can observe through [`Context::cancellation`].
    pub async fn dispatch_with(
        &self,
        mut request: HttpRequest,
        cancel: CancellationToken,
    ) -> HttpResponse {
        self.mark_serving();

        let rewrite = self.read().node(AppId::ROOT).options.method_override.clone();
        if let Some(rewrite) = rewrite {
            rewrite(&mut request);
        }

        let (resolved, store) = {
            let tree = self.read();
            let root = tree.node(AppId::ROOT);

            let resolved = match tree.muxer.dispatch(request.method(), request.path()) {
                MuxMatch::Found {
                    handler: route,
                    params,
                    ..
                } => {
                    let owner = tree.node(route.info.app);
                    Resolved::Route {
                        options: Arc::clone(&owner.options),
                        handlers: Arc::clone(&owner.error_handlers),
                        route,
                        params,
                    }
                }
                MuxMatch::NotFound => Resolved::Unmatched {
                    error: GroveError::NotFound(format!(
                        "path not found: {} {}",
                        request.method(),
                        request.path()
                    )),
                    allowed: Vec::new(),
                    options: Arc::clone(&root.options),
                    handlers: Arc::clone(&root.error_handlers),
                },
                MuxMatch::MethodNotAllowed { allowed } => Resolved::Unmatched {
                    error: GroveError::MethodNotAllowed(format!(
                        "method not found: {} {}",
                        request.method(),
                        request.path()
                    )),
                    allowed,
                    options: Arc::clone(&root.options),
                    handlers: Arc::clone(&root.error_handlers),
                },
            };
            (resolved, Arc::clone(&tree.session_store))
        };

        match resolved {
            Resolved::Route {
                route,
                params,
                options,
                handlers,
            } => {
                let session = load_session(store, &options, &request).await;
                let ctx = Context::new(
                    self.handle(route.info.app),
                    options,
                    Arc::clone(&route.info),
                    request,
                    params,
                    session,
                    cancel,
                );
                match (route.handler)(ctx.clone()).await {
                    Ok(response) => response,
                    Err(e) => render_error(&handlers, &e, &ctx),
                }
            }
            Resolved::Unmatched {
                error,
                allowed,
                options,
                handlers,
            } => {
                tracing::debug!(error = %error, "request matched no route");
                let session = load_session(store, &options, &request).await;
                let route = Arc::new(RouteInfo::unmatched(
                    request.method().clone(),
                    request.path(),
                    AppId::ROOT,
                ));
                let ctx = Context::new(
                    self.root(),
                    options,
                    route,
                    request,
                    HashMap::new(),
                    session,
                    cancel,
                );
                let response = render_error(&handlers, &error, &ctx);
                if allowed.is_empty() {
                    response
                } else {
                    response.with_allow(&allowed)
                }
            }
        }
    }
}

/// Renders `err` through `handlers`, falling back to the built-in renderer
/// if the user's handler panics.
fn render_error(handlers: &ErrorHandlers, err: &GroveError, ctx: &Context) -> HttpResponse {
    match std::panic::catch_unwind(AssertUnwindSafe(|| handlers.render(err, ctx))) {
        Ok(response) => response,
        Err(payload) => {
            let panic = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            tracing::error!(error = %err, panic = %panic, route = %ctx.route().name, "error handler panicked");
            let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            default_error_handler(status, err, ctx)
        }
    }
}

async fn load_session(
    store: Arc<dyn SessionStore>,
    options: &Options,
    request: &HttpRequest,
) -> Session {
    let name = options.session_name();
    Session::load(store, name, request.cookie(name)).await
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = self.read();
        let node = tree.node(self.id);
        f.debug_struct("App")
            .field("id", &self.id)
            .field("prefix", &node.options.prefix())
            .field("routes", &node.routes.len())
            .field("children", &node.children)
            .field("serving", &self.is_serving())
            .finish()
    }
}
