//! Cookie parsing and `Set-Cookie` formatting.

use std::collections::HashMap;
use std::fmt;

/// The `SameSite` attribute for cookies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// Only sent with same-site requests.
    Strict,
    /// Also sent with top-level cross-site navigations.
    Lax,
    /// Sent with every request; browsers require `Secure`.
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        })
    }
}

/// A cookie to be sent in a `Set-Cookie` header.
///
/// ```
/// use grove_http::cookies::{Cookie, SameSite};
///
/// let cookie = Cookie::new("_grove_session", "abc")
///     .httponly(true)
///     .samesite(SameSite::Lax);
/// assert_eq!(
///     cookie.to_set_cookie_header(),
///     "_grove_session=abc; Path=/; HttpOnly; SameSite=Lax"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// The cookie name.
    pub name: String,
    /// The cookie value.
    pub value: String,
    /// Lifetime in seconds. `None` makes a browser-session cookie.
    pub max_age: Option<u64>,
    /// The path the cookie is scoped to.
    pub path: String,
    /// The domain the cookie is scoped to.
    pub domain: Option<String>,
    /// Only send over HTTPS.
    pub secure: bool,
    /// Hide from scripts.
    pub httponly: bool,
    /// The `SameSite` policy.
    pub samesite: Option<SameSite>,
}

impl Cookie {
    /// Creates a cookie scoped to `/` with no other attributes.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age: None,
            path: "/".to_string(),
            domain: None,
            secure: false,
            httponly: false,
            samesite: None,
        }
    }

    /// Creates a cookie that instructs the client to drop `name`.
    pub fn removal(name: impl Into<String>) -> Self {
        Self::new(name, "").max_age(0)
    }

    /// Sets the max age in seconds.
    #[must_use]
    pub const fn max_age(mut self, max_age: u64) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Sets the path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the domain.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Sets the secure flag.
    #[must_use]
    pub const fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the httponly flag.
    #[must_use]
    pub const fn httponly(mut self, httponly: bool) -> Self {
        self.httponly = httponly;
        self
    }

    /// Sets the `SameSite` policy.
    #[must_use]
    pub const fn samesite(mut self, samesite: SameSite) -> Self {
        self.samesite = Some(samesite);
        self
    }

    /// Formats this cookie as a `Set-Cookie` header value.
    pub fn to_set_cookie_header(&self) -> String {
        let mut header = format!("{}={}", self.name, self.value);
        if let Some(max_age) = self.max_age {
            header.push_str(&format!("; Max-Age={max_age}"));
        }
        header.push_str(&format!("; Path={}", self.path));
        if let Some(domain) = &self.domain {
            header.push_str(&format!("; Domain={domain}"));
        }
        if self.secure {
            header.push_str("; Secure");
        }
        if self.httponly {
            header.push_str("; HttpOnly");
        }
        if let Some(samesite) = self.samesite {
            header.push_str(&format!("; SameSite={samesite}"));
        }
        header
    }
}

/// Parses a `Cookie` request header into name/value pairs.
///
/// Entries without `=` or with an empty name are skipped. When a name
/// repeats, the last value wins.
///
/// ```
/// use grove_http::cookies::parse_cookie_header;
///
/// let cookies = parse_cookie_header("a=1; b=x=y; junk; =none");
/// assert_eq!(cookies["a"], "1");
/// assert_eq!(cookies["b"], "x=y");
/// assert_eq!(cookies.len(), 2);
/// ```
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|part| {
            let (name, value) = part.trim().split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}
