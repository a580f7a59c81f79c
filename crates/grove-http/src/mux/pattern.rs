//! Route pattern parsing, matching and reversal.
//!
//! Patterns are absolute paths whose segments may contain `<type:name>`
//! placeholders, e.g. `/users/<int:id>/edit`. A placeholder without a type
//! (`<name>`) uses the `str` converter.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::hash::BuildHasher;

use regex::Regex;

use grove_core::{GroveError, GroveResult};

use super::converters::Converter;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Param { name: String, converter: Converter },
}

/// A compiled route pattern.
///
/// # Examples
///
/// ```
/// use grove_http::mux::PathPattern;
///
/// let pattern = PathPattern::parse("/articles/<int:year>/<slug:title>").unwrap();
/// let params = pattern.matches("/articles/2024/hello-world").unwrap();
/// assert_eq!(params["year"], "2024");
/// assert_eq!(params["title"], "hello-world");
/// assert!(pattern.matches("/articles/abc/hello").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct PathPattern {
    route: String,
    regex: Regex,
    pieces: Vec<Piece>,
}

impl PathPattern {
    /// Parses and compiles a route pattern.
    ///
    /// The route is normalized first (see [`normalize`]).
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::InvalidPattern`] for an unclosed `<`, an unknown
    /// converter, an empty or non-identifier parameter name, or a parameter
    /// name used twice.
    pub fn parse(route: &str) -> GroveResult<Self> {
        let route = normalize(route);
        let invalid = |reason: String| GroveError::InvalidPattern {
            pattern: route.clone(),
            reason,
        };

        let mut pieces = Vec::new();
        let mut seen = HashSet::new();
        let mut regex_str = String::from("^");
        let mut remaining = route.as_str();

        while !remaining.is_empty() {
            let Some(start) = remaining.find('<') else {
                regex_str.push_str(&regex::escape(remaining));
                pieces.push(Piece::Literal(remaining.to_string()));
                break;
            };

            let literal = &remaining[..start];
            if !literal.is_empty() {
                regex_str.push_str(&regex::escape(literal));
                pieces.push(Piece::Literal(literal.to_string()));
            }

            let end = remaining[start..]
                .find('>')
                .ok_or_else(|| invalid("unclosed angle bracket".to_string()))?
                + start;

            let inner = &remaining[start + 1..end];
            let (type_name, name) = inner.split_once(':').unwrap_or(("str", inner));
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid(format!("invalid parameter name {name:?}")));
            }
            if !seen.insert(name.to_string()) {
                return Err(invalid(format!("parameter {name:?} appears twice")));
            }
            let converter = Converter::from_name(type_name, &route)?;

            write!(regex_str, "(?P<{name}>{})", converter.regex()).ok();
            pieces.push(Piece::Param {
                name: name.to_string(),
                converter,
            });

            remaining = &remaining[end + 1..];
        }
        regex_str.push('$');

        let regex = Regex::new(&regex_str).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            route,
            regex,
            pieces,
        })
    }

    /// Returns the normalized route string.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Returns the parameter names in declaration order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.pieces.iter().filter_map(|piece| match piece {
            Piece::Param { name, .. } => Some(name.as_str()),
            Piece::Literal(_) => None,
        })
    }

    /// Matches a full request path, returning the captured parameters.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(path)?;
        let mut params = HashMap::new();
        for piece in &self.pieces {
            if let Piece::Param { name, converter } = piece {
                let raw = captures.name(name)?.as_str();
                if !converter.accepts(raw) {
                    return None;
                }
                params.insert(name.clone(), raw.to_string());
            }
        }
        Some(params)
    }

    /// Builds a concrete path by substituting `params` into the pattern.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::BadRequest`] when a parameter is missing or its
    /// value is rejected by the parameter's converter.
    pub fn reverse<S: BuildHasher>(&self, params: &HashMap<&str, &str, S>) -> GroveResult<String> {
        let mut url = String::with_capacity(self.route.len());
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => url.push_str(text),
                Piece::Param { name, converter } => {
                    let value = params.get(name.as_str()).ok_or_else(|| {
                        GroveError::BadRequest(format!(
                            "missing parameter {name:?} for {}",
                            self.route
                        ))
                    })?;
                    if !converter.accepts(value) || (*converter != Converter::Path && value.contains('/')) {
                        return Err(GroveError::BadRequest(format!(
                            "value {value:?} is not a valid {converter} for parameter {name:?}"
                        )));
                    }
                    url.push_str(value);
                }
            }
        }
        Ok(url)
    }
}

/// Normalizes a route: ensures a leading `/` and collapses repeated slashes.
///
/// ```
/// use grove_http::mux::pattern::normalize;
///
/// assert_eq!(normalize("users//<id>"), "/users/<id>");
/// assert_eq!(normalize(""), "/");
/// ```
pub fn normalize(route: &str) -> String {
    let mut out = String::with_capacity(route.len() + 1);
    out.push('/');
    for ch in route.chars() {
        if ch == '/' && out.ends_with('/') {
            continue;
        }
        out.push(ch);
    }
    out
}

/// Joins a group prefix and a route.
///
/// ```
/// use grove_http::mux::pattern::join;
///
/// assert_eq!(join("/api/v1", "/users"), "/api/v1/users");
/// assert_eq!(join("/api/", "users/"), "/api/users/");
/// assert_eq!(join("/api", "/"), "/api/");
/// assert_eq!(join("", "/"), "/");
/// ```
pub fn join(prefix: &str, route: &str) -> String {
    let prefix = normalize(prefix);
    let prefix = prefix.trim_end_matches('/');
    format!("{prefix}{}", normalize(route))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern() {
        let p = PathPattern::parse("/users").unwrap();
        assert!(p.matches("/users").is_some());
        assert!(p.matches("/users/").is_none());
        assert!(p.matches("/other").is_none());
        assert_eq!(p.param_names().count(), 0);
    }

    #[test]
    fn test_default_str_converter() {
        let p = PathPattern::parse("/users/<username>").unwrap();
        let params = p.matches("/users/alice").unwrap();
        assert_eq!(params["username"], "alice");
        assert!(p.matches("/users/alice/posts").is_none());
    }

    #[test]
    fn test_int_converter_rejects_text() {
        let p = PathPattern::parse("/users/<int:id>/edit").unwrap();
        assert_eq!(p.matches("/users/7/edit").unwrap()["id"], "7");
        assert!(p.matches("/users/seven/edit").is_none());
    }

    #[test]
    fn test_path_converter_spans_slashes() {
        let p = PathPattern::parse("/files/<path:rest>").unwrap();
        assert_eq!(p.matches("/files/a/b/c.txt").unwrap()["rest"], "a/b/c.txt");
    }

    #[test]
    fn test_literal_is_escaped() {
        let p = PathPattern::parse("/v1.0/items").unwrap();
        assert!(p.matches("/v1.0/items").is_some());
        assert!(p.matches("/v1x0/items").is_none());
    }

    #[test]
    fn test_param_names_in_order() {
        let p = PathPattern::parse("/a/<int:x>/b/<slug:y>").unwrap();
        assert_eq!(p.param_names().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(PathPattern::parse("/users/<int:id").is_err());
        assert!(PathPattern::parse("/users/<custom:id>").is_err());
        assert!(PathPattern::parse("/users/<int:>").is_err());
        assert!(PathPattern::parse("/users/<int:my-id>").is_err());
        assert!(PathPattern::parse("/<id>/<id>").is_err());
    }

    #[test]
    fn test_parse_normalizes() {
        let p = PathPattern::parse("users//<int:id>").unwrap();
        assert_eq!(p.route(), "/users/<int:id>");
    }

    #[test]
    fn test_reverse() {
        let p = PathPattern::parse("/users/<int:id>/posts/<slug:post>").unwrap();
        let params = HashMap::from([("id", "4"), ("post", "hello-world")]);
        assert_eq!(p.reverse(&params).unwrap(), "/users/4/posts/hello-world");
    }

    #[test]
    fn test_reverse_missing_and_invalid() {
        let p = PathPattern::parse("/users/<int:id>").unwrap();
        let missing: HashMap<&str, &str> = HashMap::new();
        assert!(p.reverse(&missing).is_err());
        let invalid = HashMap::from([("id", "abc")]);
        assert!(p.reverse(&invalid).is_err());
        let slashed = PathPattern::parse("/u/<name>").unwrap();
        assert!(slashed.reverse(&HashMap::from([("name", "a/b")])).is_err());
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/", "/users"), "/users");
        assert_eq!(join("/api", "users/<int:id>"), "/api/users/<int:id>");
        assert_eq!(join("/api/", "/"), "/api/");
    }
}
