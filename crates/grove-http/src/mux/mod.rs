//! The router adapter: method + path matching over compiled patterns.
//!
//! [`Muxer`] is deliberately ignorant of what a handler is; it stores any
//! cloneable value per `(method, pattern)` and hands it back on dispatch
//! together with the captured path parameters. Applications layer middleware
//! composition and error handling on top.
//!
//! - [`converters`]: Parameter converters (`int`, `str`, `slug`, `uuid`, `path`)
//! - [`pattern`]: Pattern parsing, matching, joining and reversal
//!
//! # Examples
//!
//! ```
//! use grove_http::mux::{MuxMatch, Muxer};
//! use http::Method;
//!
//! let mut mux = Muxer::new();
//! mux.register(Method::GET, "/users/<int:id>", "show-user").unwrap();
//!
//! match mux.dispatch(&Method::GET, "/users/42") {
//!     MuxMatch::Found { handler, params, .. } => {
//!         assert_eq!(handler, "show-user");
//!         assert_eq!(params["id"], "42");
//!     }
//!     other => panic!("unexpected {other:?}"),
//! }
//!
//! assert!(matches!(mux.dispatch(&Method::GET, "/nope"), MuxMatch::NotFound));
//! assert!(matches!(
//!     mux.dispatch(&Method::POST, "/users/42"),
//!     MuxMatch::MethodNotAllowed { .. }
//! ));
//! ```

pub mod converters;
pub mod pattern;

use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasher;

use http::Method;

use grove_core::{GroveError, GroveResult};

pub use converters::Converter;
pub use pattern::PathPattern;

/// The outcome of [`Muxer::dispatch`].
#[derive(Debug, Clone)]
pub enum MuxMatch<H> {
    /// A pattern matched the path and has a handler for the method.
    Found {
        /// The registered handler.
        handler: H,
        /// Captured path parameters.
        params: HashMap<String, String>,
        /// The route string of the matched pattern.
        pattern: String,
    },
    /// No pattern matched the path.
    NotFound,
    /// At least one pattern matched the path, none for this method.
    MethodNotAllowed {
        /// Methods registered on the matching patterns.
        allowed: Vec<Method>,
    },
}

struct MuxEntry<H> {
    pattern: PathPattern,
    handlers: Vec<(Method, H)>,
}

/// A table of compiled routes, matched in registration order.
pub struct Muxer<H> {
    entries: Vec<MuxEntry<H>>,
    by_route: HashMap<String, usize>,
}

impl<H> Default for Muxer<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Muxer<H> {
    /// Creates an empty muxer.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_route: HashMap::new(),
        }
    }

    /// Registers `handler` for `method` on `route`.
    ///
    /// Routes that normalize to the same string share one compiled pattern.
    /// Registering the same method on the same route again replaces the
    /// earlier handler.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::InvalidPattern`](grove_core::GroveError::InvalidPattern)
    /// if the route does not compile.
    pub fn register(&mut self, method: Method, route: &str, handler: H) -> GroveResult<()> {
        let normalized = pattern::normalize(route);
        let index = if let Some(&index) = self.by_route.get(&normalized) {
            index
        } else {
            let compiled = PathPattern::parse(&normalized)?;
            self.entries.push(MuxEntry {
                pattern: compiled,
                handlers: Vec::new(),
            });
            self.by_route.insert(normalized, self.entries.len() - 1);
            self.entries.len() - 1
        };

        let entry = &mut self.entries[index];
        if let Some(slot) = entry.handlers.iter_mut().find(|(m, _)| *m == method) {
            tracing::debug!(%method, route = entry.pattern.route(), "replacing route handler");
            slot.1 = handler;
        } else {
            entry.handlers.push((method, handler));
        }
        Ok(())
    }

    /// Returns the number of distinct `(method, route)` registrations.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.handlers.len()).sum()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(method, route)` pairs in registration order.
    pub fn routes(&self) -> impl Iterator<Item = (&Method, &str)> {
        self.entries.iter().flat_map(|entry| {
            entry
                .handlers
                .iter()
                .map(move |(method, _)| (method, entry.pattern.route()))
        })
    }

    /// Looks up the compiled pattern for a route string.
    pub fn pattern(&self, route: &str) -> Option<&PathPattern> {
        self.by_route
            .get(&pattern::normalize(route))
            .map(|&i| &self.entries[i].pattern)
    }

    /// Builds a concrete path for a registered route.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::NotFound`](grove_core::GroveError::NotFound) if
    /// the route is not registered, or the errors of [`PathPattern::reverse`].
    pub fn reverse<S: BuildHasher>(
        &self,
        route: &str,
        params: &HashMap<&str, &str, S>,
    ) -> GroveResult<String> {
        self.pattern(route)
            .ok_or_else(|| GroveError::NotFound(format!("no route registered for {route}")))?
            .reverse(params)
    }
}

impl<H: Clone> Muxer<H> {
    /// Matches `method` and `path` against the registered routes.
    ///
    /// The first pattern (in registration order) that matches the path and
    /// carries a handler for the method wins. If patterns match the path but
    /// none carries the method, the union of their methods is reported.
    pub fn dispatch(&self, method: &Method, path: &str) -> MuxMatch<H> {
        let mut allowed: Vec<Method> = Vec::new();
        for entry in &self.entries {
            let Some(params) = entry.pattern.matches(path) else {
                continue;
            };
            if let Some((_, handler)) = entry.handlers.iter().find(|(m, _)| m == method) {
                return MuxMatch::Found {
                    handler: handler.clone(),
                    params,
                    pattern: entry.pattern.route().to_string(),
                };
            }
            for (m, _) in &entry.handlers {
                if !allowed.contains(m) {
                    allowed.push(m.clone());
                }
            }
        }

        if allowed.is_empty() {
            MuxMatch::NotFound
        } else {
            MuxMatch::MethodNotAllowed { allowed }
        }
    }
}

impl<H> fmt::Debug for Muxer<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Muxer")
            .field("routes", &self.routes().map(|(m, r)| format!("{m} {r}")).collect::<Vec<_>>())
            .finish()
    }
}
