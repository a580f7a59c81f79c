//! Process-wide environment bootstrap.
//!
//! [`bootstrap`] runs once per process: it snapshots the process environment
//! and overlays an optional `.env` file from the working directory. Values
//! already present in the process environment win over the file. Every later
//! call returns the same snapshot, so constructing many applications is cheap
//! and never re-reads the file.
//!
//! ```
//! use grove_core::env;
//!
//! let environment = env::bootstrap().unwrap();
//! let mode = environment.get_or("GROVE_ENV", "development");
//! assert!(!mode.is_empty());
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::{GroveError, GroveResult};

/// The file consulted by [`bootstrap`].
pub const DOTENV_FILE: &str = ".env";

static ENVIRONMENT: OnceLock<Result<Environment, String>> = OnceLock::new();

/// An immutable snapshot of environment variables.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Creates an environment from explicit key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Snapshots the current process environment.
    pub fn from_process() -> Self {
        Self::from_pairs(std::env::vars())
    }

    /// Adds entries from `.env`-formatted text without replacing existing keys.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::Configuration`] for a line that is neither blank,
    /// a comment, nor `KEY=VALUE`.
    pub fn overlay_dotenv(&mut self, contents: &str) -> GroveResult<()> {
        for (key, value) in parse_dotenv(contents)? {
            self.vars.entry(key).or_insert(value);
        }
        Ok(())
    }

    /// Returns the value for `key`, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Returns the value for `key`, or `default` when unset or empty.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.get(key) {
            Some(v) if !v.is_empty() => v,
            _ => default,
        }
    }

    /// Returns the number of variables in the snapshot.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns `true` if the snapshot holds no variables.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Parses `.env` text into ordered key/value pairs.
///
/// Supports `#` comments, an optional `export ` prefix and single or double
/// quoted values.
///
/// # Errors
///
/// Returns [`GroveError::Configuration`] naming the first malformed line.
pub fn parse_dotenv(contents: &str) -> GroveResult<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for (index, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            return Err(GroveError::Configuration(format!(
                "malformed line {} in {DOTENV_FILE}: {raw:?}",
                index + 1
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(GroveError::Configuration(format!(
                "empty key on line {} in {DOTENV_FILE}",
                index + 1
            )));
        }
        pairs.push((key.to_string(), unquote(value.trim()).to_string()));
    }
    Ok(pairs)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn load(dotenv: &Path) -> Result<Environment, String> {
    let mut environment = Environment::from_process();
    match std::fs::read_to_string(dotenv) {
        Ok(contents) => {
            environment
                .overlay_dotenv(&contents)
                .map_err(|e| e.to_string())?;
            tracing::debug!(file = %dotenv.display(), "loaded environment file");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(format!("failed to read {}: {e}", dotenv.display())),
    }
    Ok(environment)
}

/// Loads the process environment exactly once and returns the snapshot.
///
/// Safe to call any number of times from any thread.
///
/// # Errors
///
/// Returns [`GroveError::Configuration`] if the `.env` file exists but cannot
/// be read or parsed. The failure is remembered, so every call reports it.
pub fn bootstrap() -> GroveResult<&'static Environment> {
    ENVIRONMENT
        .get_or_init(|| load(Path::new(DOTENV_FILE)))
        .as_ref()
        .map_err(|e| GroveError::Configuration(e.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotenv_basic() {
        let pairs = parse_dotenv("A=1\n# comment\n\nexport B = two\nC=\"quoted value\"\nD='x'")
            .unwrap();
        assert_eq!(
            pairs,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two".to_string()),
                ("C".to_string(), "quoted value".to_string()),
                ("D".to_string(), "x".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_dotenv_malformed() {
        let err = parse_dotenv("GOOD=1\nnot a pair").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_dotenv_empty_key() {
        assert!(parse_dotenv("=value").is_err());
    }

    #[test]
    fn test_overlay_keeps_existing() {
        let mut env = Environment::from_pairs([("PORT", "8080")]);
        env.overlay_dotenv("PORT=3000\nHOST=example.com").unwrap();
        assert_eq!(env.get("PORT"), Some("8080"));
        assert_eq!(env.get("HOST"), Some("example.com"));
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn test_get_or() {
        let env = Environment::from_pairs([("EMPTY", ""), ("SET", "yes")]);
        assert_eq!(env.get_or("EMPTY", "fallback"), "fallback");
        assert_eq!(env.get_or("MISSING", "fallback"), "fallback");
        assert_eq!(env.get_or("SET", "fallback"), "yes");
    }

    #[test]
    fn test_load_missing_file_is_ok() {
        let env = load(Path::new("/definitely/not/here/.env")).unwrap();
        assert_eq!(env.len(), std::env::vars().count());
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        let first = bootstrap().map(|e| e as *const Environment);
        let second = bootstrap().map(|e| e as *const Environment);
        if let (Ok(a), Ok(b)) = (first, second) {
            assert_eq!(a, b);
        }
    }
}
