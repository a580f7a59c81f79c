//! Middleware framework for grove.
//!
//! A middleware turns one [`Handler`] into another. It may run code before
//! calling the wrapped handler, inspect or replace the result, or
//! short-circuit by never calling it. Apps keep their middleware in a
//! [`MiddlewareStack`] and compose it around each route's handler when the
//! route is registered.
//!
//! ## Execution Order
//!
//! The first middleware added is the outermost: it sees the request first and
//! the response last.
//!
//! ```
//! use grove_app::middleware::{from_fn, MiddlewareStack};
//! use grove_app::handler::handler;
//! use grove_http::HttpResponse;
//!
//! let mut stack = MiddlewareStack::new();
//! stack
//!     .use_named("timing", from_fn(|ctx, next| async move { next(ctx).await }))
//!     .unwrap();
//! assert_eq!(stack.names(), vec!["timing"]);
//!
//! let terminal = handler(|_ctx| async { Ok(HttpResponse::ok("done")) });
//! let composed = stack.compose(terminal);
//! # let _ = composed;
//! ```

pub mod builtin;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use grove_core::{GroveError, GroveResult};

use crate::context::Context;
use crate::handler::{BoxFuture, Handler, HandlerResult};

/// A request-wrapping component.
///
/// Any `Fn(Handler) -> Handler` is a middleware; [`from_fn`] adapts an async
/// closure that receives the context and the next handler.
pub trait Middleware: Send + Sync + 'static {
    /// Wraps `next`, returning the combined handler.
    fn wrap(&self, next: Handler) -> Handler;

    /// The name used when the middleware is added without an explicit one.
    fn derived_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<F> Middleware for F
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    fn wrap(&self, next: Handler) -> Handler {
        self(next)
    }
}

/// A shared middleware.
pub type MiddlewareFn = Arc<dyn Middleware>;

/// Middleware built from an async closure. See [`from_fn`].
pub struct FromFn<F> {
    f: Arc<F>,
}

/// Builds a middleware from an async closure taking the context and the next
/// handler.
///
/// ```
/// use grove_app::middleware::from_fn;
///
/// let add_header = from_fn(|ctx, next| async move {
///     let mut response = next(ctx).await?;
///     response.append_header(http::header::HeaderName::from_static("x-powered-by"), "grove");
///     Ok(response)
/// });
/// # let _ = add_header;
/// ```
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Context, Handler) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FromFn { f: Arc::new(f) }
}

impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Context, Handler) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn wrap(&self, next: Handler) -> Handler {
        let f = Arc::clone(&self.f);
        Arc::new(move |ctx| -> BoxFuture<HandlerResult> { Box::pin(f(ctx, next.clone())) })
    }

    fn derived_name(&self) -> &'static str {
        std::any::type_name::<F>()
    }
}

#[derive(Clone)]
struct Entry {
    name: String,
    middleware: MiddlewareFn,
}

/// An ordered, named list of middleware.
///
/// Names are unique. A skipped entry stays declared but is left out of
/// [`compose`](Self::compose), so it can be re-enabled later, for instance by
/// a child app that copied the stack.
#[derive(Clone, Default)]
pub struct MiddlewareStack {
    entries: Vec<Entry>,
    skipped: HashSet<String>,
}

impl MiddlewareStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware under its derived name and returns that name.
    ///
    /// When the derived name is taken, `#2`, `#3`, ... is appended.
    pub fn use_fn(&mut self, middleware: impl Middleware) -> String {
        let base = middleware.derived_name();
        let mut name = base.to_string();
        let mut n = 2;
        while self.contains(&name) {
            name = format!("{base}#{n}");
            n += 1;
        }
        self.push(name.clone(), Arc::new(middleware));
        name
    }

    /// Appends a middleware under an explicit name.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::DuplicateMiddleware`] if the name is taken.
    pub fn use_named(&mut self, name: &str, middleware: impl Middleware) -> GroveResult<()> {
        self.use_shared(name, Arc::new(middleware))
    }

    /// Appends an already shared middleware under an explicit name.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::DuplicateMiddleware`] if the name is taken.
    pub fn use_shared(&mut self, name: &str, middleware: MiddlewareFn) -> GroveResult<()> {
        if self.contains(name) {
            return Err(GroveError::DuplicateMiddleware(name.to_string()));
        }
        self.push(name.to_string(), middleware);
        Ok(())
    }

    fn push(&mut self, name: String, middleware: MiddlewareFn) {
        tracing::debug!(middleware = %name, "middleware added");
        self.entries.push(Entry { name, middleware });
    }

    /// Leaves the named middleware out of future compositions.
    ///
    /// Names that are not declared are ignored.
    pub fn skip(&mut self, names: &[&str]) {
        for name in names {
            if self.contains(name) {
                self.skipped.insert((*name).to_string());
            } else {
                tracing::debug!(middleware = %name, "skip ignored: middleware not declared");
            }
        }
    }

    /// Re-activates skipped middleware.
    pub fn enable(&mut self, names: &[&str]) {
        for name in names {
            self.skipped.remove(*name);
        }
    }

    /// Deletes the named middleware. Returns how many were removed.
    pub fn remove(&mut self, names: &[&str]) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !names.contains(&e.name.as_str()));
        for name in names {
            self.skipped.remove(*name);
        }
        before - self.entries.len()
    }

    /// Swaps the function of a declared middleware, keeping its position.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::ImproperlyConfigured`] if no middleware has that name.
    pub fn replace(&mut self, name: &str, middleware: impl Middleware) -> GroveResult<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or_else(|| {
                GroveError::ImproperlyConfigured(format!("no middleware named {name:?} to replace"))
            })?;
        entry.middleware = Arc::new(middleware);
        Ok(())
    }

    /// Removes every middleware.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.skipped.clear();
    }

    /// Returns `true` if a middleware with this name is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Returns `true` if the named middleware is declared but skipped.
    pub fn is_skipped(&self, name: &str) -> bool {
        self.skipped.contains(name)
    }

    /// Returns all declared names in order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Returns the names that take part in composition, in order.
    pub fn active_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| !self.skipped.contains(&e.name))
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Returns the number of declared middleware.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wraps `terminal` with every active middleware, first-declared outermost.
    ///
    /// With no active middleware the terminal handler itself is returned.
    pub fn compose(&self, terminal: Handler) -> Handler {
        self.entries
            .iter()
            .rev()
            .filter(|e| !self.skipped.contains(&e.name))
            .fold(terminal, |next, entry| entry.middleware.wrap(next))
    }
}

impl std::fmt::Debug for MiddlewareStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareStack")
            .field("names", &self.names())
            .field("skipped", &self.skipped)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::handler::handler;
    use grove_http::HttpResponse;

    fn tracker(log: &Arc<Mutex<Vec<String>>>, label: &'static str) -> impl Middleware {
        let log = Arc::clone(log);
        from_fn(move |ctx, next| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(format!("{label}:in"));
                let result = next(ctx).await;
                log.lock().unwrap().push(format!("{label}:out"));
                result
            }
        })
    }

    fn terminal(log: &Arc<Mutex<Vec<String>>>) -> Handler {
        let log = Arc::clone(log);
        handler(move |_ctx| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push("handler".to_string());
                Ok(HttpResponse::ok("ok"))
            }
        })
    }

    #[test]
    fn test_new_is_empty() {
        let stack = MiddlewareStack::new();
        assert!(stack.is_empty());
        assert_eq!(stack.len(), 0);
    }

    #[test]
    fn test_empty_compose_returns_terminal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let t = terminal(&log);
        let composed = MiddlewareStack::new().compose(t.clone());
        assert!(Arc::ptr_eq(&t, &composed));
    }

    #[test]
    fn test_fully_skipped_compose_returns_terminal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = MiddlewareStack::new();
        stack.use_named("a", tracker(&log, "a")).unwrap();
        stack.skip(&["a"]);
        let t = terminal(&log);
        assert!(Arc::ptr_eq(&t, &stack.compose(t.clone())));
    }

    #[tokio::test]
    async fn test_first_declared_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = MiddlewareStack::new();
        stack.use_named("a", tracker(&log, "a")).unwrap();
        stack.use_named("b", tracker(&log, "b")).unwrap();
        let composed = stack.compose(terminal(&log));
        composed(Context::for_test()).await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:in", "b:in", "handler", "b:out", "a:out"]
        );
    }

    #[tokio::test]
    async fn test_skip_and_enable() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = MiddlewareStack::new();
        stack.use_named("a", tracker(&log, "a")).unwrap();
        stack.use_named("b", tracker(&log, "b")).unwrap();
        stack.use_named("c", tracker(&log, "c")).unwrap();
        stack.skip(&["b", "unknown"]);
        assert!(stack.is_skipped("b"));
        assert!(!stack.is_skipped("unknown"));
        assert_eq!(stack.active_names(), vec!["a", "c"]);
        assert_eq!(stack.names(), vec!["a", "b", "c"]);

        stack.compose(terminal(&log))(Context::for_test()).await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:in", "c:in", "handler", "c:out", "a:out"]
        );

        stack.enable(&["b"]);
        assert_eq!(stack.active_names(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_short_circuit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = MiddlewareStack::new();
        stack
            .use_named(
                "deny",
                from_fn(|_ctx, _next| async { Ok(HttpResponse::plain(http::StatusCode::FORBIDDEN, "no")) }),
            )
            .unwrap();
        let response = stack.compose(terminal(&log))(Context::for_test()).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::FORBIDDEN);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_named_fails() {
        let mut stack = MiddlewareStack::new();
        stack.use_named("a", |h: Handler| h).unwrap();
        let err = stack.use_named("a", |h: Handler| h).unwrap_err();
        assert!(matches!(err, GroveError::DuplicateMiddleware(ref n) if n == "a"));
    }

    #[test]
    fn test_derived_names_are_suffixed() {
        fn passthrough(next: Handler) -> Handler {
            next
        }
        let mut stack = MiddlewareStack::new();
        let first = stack.use_fn(passthrough);
        let second = stack.use_fn(passthrough);
        assert!(first.ends_with("passthrough"));
        assert_eq!(second, format!("{first}#2"));
    }

    #[test]
    fn test_remove_replace_clear() {
        let mut stack = MiddlewareStack::new();
        stack.use_named("a", |h: Handler| h).unwrap();
        stack.use_named("b", |h: Handler| h).unwrap();
        stack.skip(&["b"]);
        assert!(stack.replace("a", |h: Handler| h).is_ok());
        assert!(stack.replace("zzz", |h: Handler| h).is_err());
        assert_eq!(stack.remove(&["b", "nope"]), 1);
        assert!(!stack.is_skipped("b"));
        assert_eq!(stack.names(), vec!["a"]);
        stack.clear();
        assert!(stack.is_empty());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut parent = MiddlewareStack::new();
        parent.use_named("a", |h: Handler| h).unwrap();
        let child = parent.clone();
        parent.use_named("b", |h: Handler| h).unwrap();
        assert_eq!(child.names(), vec!["a"]);
        assert_eq!(parent.names(), vec!["a", "b"]);
    }
}
