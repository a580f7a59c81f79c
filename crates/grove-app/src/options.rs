//! Application options.
//!
//! [`Options`] is the configuration bag handed to [`App::new`](crate::App::new).
//! Every field is optional; [`Options::with_defaults`] fills the unset ones and
//! never touches a field that was set explicitly.
//!
//! ## Loading Order
//!
//! 1. Build options in code, or load them from TOML.
//! 2. Optionally apply environment overrides ([`Options::apply_env`]).
//! 3. `App::new` fills whatever is still unset with defaults.
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Option |
//! |---|---|
//! | `GROVE_ENV` | `env` |
//! | `GROVE_ADDR` | `addr` |
//! | `ADDR` / `PORT` | `addr` (host and port parts, when `GROVE_ADDR` is unset) |
//! | `GROVE_HOST` | `host` |
//! | `GROVE_LOG_LEVEL` | `log_level` |
//! | `GROVE_SESSION_NAME` | `session_name` |
//!
//! ```
//! use grove_app::Options;
//!
//! let options = Options::from_toml_str(r#"
//!     name = "shop"
//!     env = "production"
//! "#).unwrap().with_defaults();
//!
//! assert_eq!(options.name(), "shop");
//! assert_eq!(options.addr(), "0.0.0.0:3000");
//! assert_eq!(options.log_level(), "info");
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use grove_core::{Environment, GroveError, GroveResult};
use grove_http::HttpRequest;

/// Default application name.
pub const DEFAULT_NAME: &str = "grove";
/// Default environment name.
pub const DEFAULT_ENV: &str = "development";
/// Default session cookie name.
pub const DEFAULT_SESSION_NAME: &str = "_grove_session";
const DEFAULT_PORT: &str = "3000";

/// Rewrites an incoming request before routing, e.g. the HTTP method.
pub type MethodOverride = Arc<dyn Fn(&mut HttpRequest) + Send + Sync>;

/// Configuration for an [`App`](crate::App).
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Application name, used in logs.
    pub name: Option<String>,
    /// Environment name such as `development`, `test` or `production`.
    pub env: Option<String>,
    /// Address to bind when serving.
    pub addr: Option<String>,
    /// Public base URL of the application.
    pub host: Option<String>,
    /// Log filter directive.
    pub log_level: Option<String>,
    /// Name of the session cookie.
    pub session_name: Option<String>,
    /// Path prefix applied to every route of the app.
    pub prefix: Option<String>,
    /// Request rewrite applied before routing.
    #[serde(skip)]
    pub method_override: Option<MethodOverride>,
}

impl Options {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads options from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::Configuration`] if the TOML is malformed or
    /// names an unknown option.
    pub fn from_toml_str(toml_str: &str) -> GroveResult<Self> {
        toml::from_str(toml_str)
            .map_err(|e| GroveError::Configuration(format!("failed to parse options TOML: {e}")))
    }

    /// Loads options from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::Configuration`] if the file cannot be read or parsed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> GroveResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GroveError::Configuration(format!(
                "failed to read options file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Builds options from the process environment snapshot.
    ///
    /// # Errors
    ///
    /// Returns the bootstrap error if the `.env` file is malformed.
    pub fn from_env() -> GroveResult<Self> {
        let mut options = Self::default();
        options.apply_env(grove_core::env::bootstrap()?);
        Ok(options)
    }

    /// Overrides fields with the values found in `env`.
    pub fn apply_env(&mut self, env: &Environment) {
        let set = |field: &mut Option<String>, key: &str| {
            if let Some(value) = env.get(key).filter(|v| !v.is_empty()) {
                *field = Some(value.to_string());
            }
        };
        set(&mut self.env, "GROVE_ENV");
        set(&mut self.addr, "GROVE_ADDR");
        set(&mut self.host, "GROVE_HOST");
        set(&mut self.log_level, "GROVE_LOG_LEVEL");
        set(&mut self.session_name, "GROVE_SESSION_NAME");

        if env.get("GROVE_ADDR").is_none() && (env.get("ADDR").is_some() || env.get("PORT").is_some()) {
            let host = env.get_or("ADDR", default_bind_host(self.env()));
            let port = env.get_or("PORT", DEFAULT_PORT);
            self.addr = Some(format!("{host}:{port}"));
        }
    }

    /// Fills the unset fields from `env`, leaving explicit values alone.
    pub fn fill_from_env(&mut self, env: &Environment) {
        let mut from_env = Self::default();
        from_env.apply_env(env);
        self.env = self.env.take().or(from_env.env);
        self.addr = self.addr.take().or(from_env.addr);
        self.host = self.host.take().or(from_env.host);
        self.log_level = self.log_level.take().or(from_env.log_level);
        self.session_name = self.session_name.take().or(from_env.session_name);
    }

    /// Fills every unset field with its default.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.env = Some(self.env().to_string());
        self.name = Some(self.name().to_string());
        self.addr = Some(self.addr().to_string());
        self.host = Some(self.host());
        self.log_level = Some(self.log_level().to_string());
        self.session_name = Some(self.session_name().to_string());
        self.prefix = Some(self.prefix().to_string());
        if self.method_override.is_none() {
            self.method_override = Some(Arc::new(crate::middleware::builtin::method_override));
        }
        self
    }

    /// Sets the application name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the environment name.
    #[must_use]
    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    /// Sets the bind address.
    #[must_use]
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = Some(addr.into());
        self
    }

    /// Sets the route prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sets the session cookie name.
    #[must_use]
    pub fn with_session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = Some(name.into());
        self
    }

    /// Sets the method override hook.
    #[must_use]
    pub fn with_method_override<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut HttpRequest) + Send + Sync + 'static,
    {
        self.method_override = Some(Arc::new(f));
        self
    }
}

/// Read accessors. Unset fields read as their defaults.
impl Options {
    /// Returns the application name.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_NAME)
    }

    /// Returns the environment name.
    pub fn env(&self) -> &str {
        self.env.as_deref().unwrap_or(DEFAULT_ENV)
    }

    /// Returns `true` in the `development` environment.
    pub fn is_development(&self) -> bool {
        self.env() == DEFAULT_ENV
    }

    /// Returns the bind address.
    pub fn addr(&self) -> &str {
        self.addr
            .as_deref()
            .unwrap_or_else(|| default_addr(self.env()))
    }

    /// Returns the public base URL.
    pub fn host(&self) -> String {
        self.host
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.addr()))
    }

    /// Returns the log filter directive.
    pub fn log_level(&self) -> &str {
        self.log_level
            .as_deref()
            .unwrap_or_else(|| default_log_level(self.env()))
    }

    /// Returns the session cookie name.
    pub fn session_name(&self) -> &str {
        self.session_name.as_deref().unwrap_or(DEFAULT_SESSION_NAME)
    }

    /// Returns the route prefix.
    pub fn prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or("")
    }
}

fn default_bind_host(env: &str) -> &'static str {
    if env == DEFAULT_ENV {
        "127.0.0.1"
    } else {
        "0.0.0.0"
    }
}

fn default_addr(env: &str) -> &'static str {
    if env == DEFAULT_ENV {
        "127.0.0.1:3000"
    } else {
        "0.0.0.0:3000"
    }
}

fn default_log_level(env: &str) -> &'static str {
    if env == DEFAULT_ENV {
        "debug"
    } else {
        "info"
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("name", &self.name)
            .field("env", &self.env)
            .field("addr", &self.addr)
            .field("host", &self.host)
            .field("log_level", &self.log_level)
            .field("session_name", &self.session_name)
            .field("prefix", &self.prefix)
            .field("method_override", &self.method_override.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_unset_fields() {
        let options = Options::new().with_defaults();
        assert_eq!(options.name.as_deref(), Some("grove"));
        assert_eq!(options.env.as_deref(), Some("development"));
        assert_eq!(options.addr.as_deref(), Some("127.0.0.1:3000"));
        assert_eq!(options.host.as_deref(), Some("http://127.0.0.1:3000"));
        assert_eq!(options.log_level.as_deref(), Some("debug"));
        assert_eq!(options.session_name.as_deref(), Some("_grove_session"));
        assert_eq!(options.prefix.as_deref(), Some(""));
        assert!(options.method_override.is_some());
    }

    #[test]
    fn test_defaults_keep_explicit_fields() {
        let options = Options::new()
            .with_name("api")
            .with_addr("10.0.0.1:9000")
            .with_session_name("sid")
            .with_defaults();
        assert_eq!(options.name(), "api");
        assert_eq!(options.addr(), "10.0.0.1:9000");
        assert_eq!(options.host(), "http://10.0.0.1:9000");
        assert_eq!(options.session_name(), "sid");
    }

    #[test]
    fn test_production_defaults() {
        let options = Options::new().with_env("production").with_defaults();
        assert_eq!(options.addr(), "0.0.0.0:3000");
        assert_eq!(options.log_level(), "info");
        assert!(!options.is_development());
    }

    #[test]
    fn test_custom_method_override_is_kept() {
        let options = Options::new()
            .with_method_override(|req| req.set_method(http::Method::PATCH))
            .with_defaults();
        let mut request = HttpRequest::builder().build();
        (options.method_override.unwrap())(&mut request);
        assert_eq!(request.method(), &http::Method::PATCH);
    }

    #[test]
    fn test_from_toml_str() {
        let options = Options::from_toml_str(
            r#"
            name = "shop"
            addr = "0.0.0.0:8080"
            session_name = "shop_session"
            "#,
        )
        .unwrap();
        assert_eq!(options.name(), "shop");
        assert_eq!(options.addr(), "0.0.0.0:8080");
        assert_eq!(options.session_name(), "shop_session");
        assert!(options.env.is_none());
    }

    #[test]
    fn test_from_toml_str_rejects_unknown_and_malformed() {
        assert!(Options::from_toml_str("colour = \"blue\"").is_err());
        assert!(Options::from_toml_str("[[broken").is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grove.toml");
        std::fs::write(&path, "env = \"test\"\n").unwrap();
        let options = Options::from_toml_file(&path).unwrap();
        assert_eq!(options.env(), "test");
        assert!(Options::from_toml_file(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_apply_env() {
        let env = Environment::from_pairs([
            ("GROVE_ENV", "staging"),
            ("GROVE_LOG_LEVEL", "warn"),
            ("PORT", "8081"),
        ]);
        let mut options = Options::new().with_name("kept");
        options.apply_env(&env);
        assert_eq!(options.env(), "staging");
        assert_eq!(options.log_level(), "warn");
        assert_eq!(options.addr(), "0.0.0.0:8081");
        assert_eq!(options.name(), "kept");
    }

    #[test]
    fn test_apply_env_grove_addr_wins() {
        let env = Environment::from_pairs([("GROVE_ADDR", "1.2.3.4:5"), ("PORT", "9")]);
        let mut options = Options::new();
        options.apply_env(&env);
        assert_eq!(options.addr(), "1.2.3.4:5");
    }

    #[test]
    fn test_fill_from_env_keeps_explicit_fields() {
        let env = Environment::from_pairs([
            ("GROVE_ENV", "production"),
            ("GROVE_SESSION_NAME", "from_env"),
        ]);
        let mut options = Options::new().with_env("test");
        options.fill_from_env(&env);
        assert_eq!(options.env(), "test");
        assert_eq!(options.session_name(), "from_env");
    }

    #[test]
    fn test_debug_hides_closure() {
        let debug = format!("{:?}", Options::new().with_defaults());
        assert!(debug.contains("method_override: true"));
    }
}
