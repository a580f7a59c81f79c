//! Path parameter converters.
//!
//! A converter decides which characters a `<type:name>` segment may capture.
//!
//! | Name   | Regex                                  |
//! |--------|----------------------------------------|
//! | `int`  | `[0-9]+`                               |
//! | `str`  | `[^/]+`                                |
//! | `slug` | `[-a-zA-Z0-9_]+`                       |
//! | `uuid` | `[0-9a-f]{8}-...-[0-9a-f]{12}`         |
//! | `path` | `.+`                                   |

use std::fmt;

use grove_core::{GroveError, GroveResult};

/// The set of built-in converters for path parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Converter {
    /// One or more ASCII digits that fit in an `i64`.
    Int,
    /// Any non-empty run of characters without `/`. The default.
    Str,
    /// ASCII letters, digits, hyphens and underscores.
    Slug,
    /// A lowercase hyphenated UUID.
    Uuid,
    /// Any non-empty string, slashes included.
    Path,
}

impl Converter {
    /// Looks up a converter by the name used in route patterns.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::InvalidPattern`] for unknown names.
    pub fn from_name(name: &str, route: &str) -> GroveResult<Self> {
        match name {
            "int" => Ok(Self::Int),
            "str" => Ok(Self::Str),
            "slug" => Ok(Self::Slug),
            "uuid" => Ok(Self::Uuid),
            "path" => Ok(Self::Path),
            other => Err(GroveError::InvalidPattern {
                pattern: route.to_string(),
                reason: format!("unknown path converter type: {other}"),
            }),
        }
    }

    /// Returns the regex fragment matched by this converter.
    pub const fn regex(self) -> &'static str {
        match self {
            Self::Int => "[0-9]+",
            Self::Str => "[^/]+",
            Self::Slug => "[-a-zA-Z0-9_]+",
            Self::Uuid => "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}",
            Self::Path => ".+",
        }
    }

    /// Checks a captured value beyond what the regex enforces.
    pub fn accepts(self, value: &str) -> bool {
        match self {
            Self::Int => value.parse::<i64>().is_ok(),
            Self::Uuid => value.parse::<uuid::Uuid>().is_ok(),
            Self::Str | Self::Slug | Self::Path => !value.is_empty(),
        }
    }

    /// Returns the name used for this converter in route patterns.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Str => "str",
            Self::Slug => "slug",
            Self::Uuid => "uuid",
            Self::Path => "path",
        }
    }
}

impl fmt::Display for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_known() {
        for name in ["int", "str", "slug", "uuid", "path"] {
            let conv = Converter::from_name(name, "/x").unwrap();
            assert_eq!(conv.name(), name);
        }
    }

    #[test]
    fn test_from_name_unknown() {
        let err = Converter::from_name("custom", "/x/<custom:y>").unwrap_err();
        assert!(err.is_registration_error());
        assert!(err.to_string().contains("custom"));
    }

    #[test]
    fn test_int_accepts() {
        assert!(Converter::Int.accepts("42"));
        assert!(!Converter::Int.accepts("99999999999999999999999"));
        assert!(!Converter::Int.accepts("abc"));
    }

    #[test]
    fn test_uuid_accepts() {
        assert!(Converter::Uuid.accepts("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!Converter::Uuid.accepts("not-a-uuid"));
    }

    #[test]
    fn test_regexes_compile() {
        for conv in [
            Converter::Int,
            Converter::Str,
            Converter::Slug,
            Converter::Uuid,
            Converter::Path,
        ] {
            assert!(regex::Regex::new(conv.regex()).is_ok(), "{conv}");
        }
    }

    #[test]
    fn test_str_regex_excludes_slash() {
        let re = regex::Regex::new(&format!("^{}$", Converter::Str.regex())).unwrap();
        assert!(re.is_match("alice"));
        assert!(!re.is_match("a/b"));
    }
}
