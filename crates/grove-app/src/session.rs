//! Sessions.
//!
//! Every request gets a [`Session`], loaded from the store named by the
//! session cookie (`Options::session_name`). Handlers read and write it through
//! [`Context::session`](crate::Context::session); the `session_saver`
//! middleware persists a modified session after the handler succeeds and
//! appends the cookie to the response.
//!
//! ## Session Stores
//!
//! - [`InMemorySessionStore`] - Keeps sessions in process memory (the default)
//!
//! Other persistence layers plug in through the [`SessionStore`] trait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use grove_core::GroveResult;
use grove_http::cookies::{Cookie, SameSite};

/// The values stored in one session.
pub type SessionValues = HashMap<String, serde_json::Value>;

/// Persistence for session values, keyed by session key.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the values for `key`, or `None` if unknown or expired.
    async fn load(&self, key: &str) -> GroveResult<Option<SessionValues>>;

    /// Stores `values` under `key`, replacing what was there.
    async fn save(&self, key: &str, values: &SessionValues) -> GroveResult<()>;

    /// Forgets `key`.
    async fn delete(&self, key: &str) -> GroveResult<()>;
}

#[derive(Debug, Clone)]
struct StoredSession {
    values: SessionValues,
    expire_date: DateTime<Utc>,
}

/// A session store backed by a process-local map.
///
/// Sessions expire after a fixed lifetime (two weeks by default) and are lost
/// when the process exits.
#[derive(Debug)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
    lifetime: Duration,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySessionStore {
    /// Creates a store with a two-week session lifetime.
    pub fn new() -> Self {
        Self::with_lifetime(Duration::weeks(2))
    }

    /// Creates a store with a custom session lifetime.
    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            lifetime,
        }
    }

    /// Returns the number of live sessions.
    pub async fn len(&self) -> usize {
        let now = Utc::now();
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.expire_date > now)
            .count()
    }

    /// Returns `true` if no live session is stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops every expired session.
    pub async fn clear_expired(&self) {
        let now = Utc::now();
        self.sessions
            .write()
            .await
            .retain(|_, session| session.expire_date > now);
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, key: &str) -> GroveResult<Option<SessionValues>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(key)
            .filter(|s| s.expire_date > Utc::now())
            .map(|s| s.values.clone()))
    }

    async fn save(&self, key: &str, values: &SessionValues) -> GroveResult<()> {
        self.sessions.write().await.insert(
            key.to_string(),
            StoredSession {
                values: values.clone(),
                expire_date: Utc::now() + self.lifetime,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> GroveResult<()> {
        self.sessions.write().await.remove(key);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SessionState {
    key: Option<String>,
    values: SessionValues,
    modified: bool,
    destroyed: bool,
}

struct SessionInner {
    store: Arc<dyn SessionStore>,
    cookie_name: String,
    state: Mutex<SessionState>,
}

/// The session of one request.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Loads the session identified by `key` from `store`.
    ///
    /// An unknown key or a store failure yields a fresh, empty session; the
    /// failure is logged.
    pub async fn load(
        store: Arc<dyn SessionStore>,
        cookie_name: &str,
        key: Option<&str>,
    ) -> Self {
        let mut state = SessionState::default();
        if let Some(key) = key.filter(|k| !k.is_empty()) {
            match store.load(key).await {
                Ok(Some(values)) => {
                    state.key = Some(key.to_string());
                    state.values = values;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "failed to load session"),
            }
        }
        Self::from_state(store, cookie_name, state)
    }

    /// Creates an empty session that has not been persisted.
    pub fn empty(store: Arc<dyn SessionStore>, cookie_name: &str) -> Self {
        Self::from_state(store, cookie_name, SessionState::default())
    }

    fn from_state(store: Arc<dyn SessionStore>, cookie_name: &str, state: SessionState) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                store,
                cookie_name: cookie_name.to_string(),
                state: Mutex::new(state),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the session key, if the session has been persisted.
    pub fn key(&self) -> Option<String> {
        self.state().key.clone()
    }

    /// Returns the cookie name this session is carried in.
    pub fn cookie_name(&self) -> &str {
        &self.inner.cookie_name
    }

    /// Returns a value by key.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.state().values.get(key).cloned()
    }

    /// Sets a value.
    pub fn set(&self, key: &str, value: impl Into<serde_json::Value>) {
        let mut state = self.state();
        state.values.insert(key.to_string(), value.into());
        state.modified = true;
    }

    /// Removes a value, returning it.
    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        let mut state = self.state();
        let removed = state.values.remove(key);
        if removed.is_some() {
            state.modified = true;
        }
        removed
    }

    /// Removes every value.
    pub fn clear(&self) {
        let mut state = self.state();
        state.values.clear();
        state.modified = true;
    }

    /// Clears the session and deletes it from the store on save.
    pub fn destroy(&self) {
        let mut state = self.state();
        state.values.clear();
        state.destroyed = true;
    }

    /// Returns `true` if values changed since the session was loaded or saved.
    pub fn is_modified(&self) -> bool {
        self.state().modified
    }

    /// Returns the number of values.
    pub fn len(&self) -> usize {
        self.state().values.len()
    }

    /// Returns `true` if the session holds no values.
    pub fn is_empty(&self) -> bool {
        self.state().values.is_empty()
    }

    /// Persists the session if needed.
    ///
    /// Returns the cookie the client must receive, or `None` if nothing
    /// changed. A destroyed session is deleted and a removal cookie returned.
    pub async fn save(&self) -> GroveResult<Option<Cookie>> {
        let (key, values, destroyed) = {
            let mut state = self.state();
            if state.destroyed {
                state.destroyed = false;
                state.modified = false;
                (state.key.take(), SessionValues::new(), true)
            } else if state.modified {
                let key = state
                    .key
                    .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
                    .clone();
                (Some(key), state.values.clone(), false)
            } else {
                return Ok(None);
            }
        };

        if destroyed {
            if let Some(key) = key {
                self.inner.store.delete(&key).await?;
            }
            return Ok(Some(Cookie::removal(self.cookie_name())));
        }

        let Some(key) = key else {
            return Ok(None);
        };
        self.inner.store.save(&key, &values).await?;
        self.state().modified = false;
        Ok(Some(
            Cookie::new(self.cookie_name(), key)
                .httponly(true)
                .samesite(SameSite::Lax),
        ))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Session")
            .field("key", &state.key)
            .field("len", &state.values.len())
            .field("modified", &state.modified)
            .finish_non_exhaustive()
    }
}
