//! Query string and form data.
//!
//! [`QueryDict`] holds the decoded `key=value` pairs of a query string or an
//! `application/x-www-form-urlencoded` body. A key may repeat; [`get`](QueryDict::get)
//! returns the last value and [`iter`](QueryDict::iter) visits all of them.

use percent_encoding::percent_decode_str;

/// An ordered multi-value dictionary of decoded parameters.
///
/// # Examples
///
/// ```
/// use grove_http::QueryDict;
///
/// let qd = QueryDict::parse("color=red&color=blue&size=large");
/// assert_eq!(qd.get("color"), Some("blue"));
/// assert_eq!(qd.len(), 3);
/// assert_eq!(qd.get("missing"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryDict {
    pairs: Vec<(String, String)>,
}

impl QueryDict {
    /// Creates an empty dictionary.
    pub const fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Parses a query string such as `"a=1&b=two+words"`.
    ///
    /// `+` decodes to a space and percent escapes are decoded as UTF-8
    /// (invalid sequences are replaced). A pair without `=` gets an empty value.
    pub fn parse(query_string: &str) -> Self {
        let pairs = query_string
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode(key), decode(value))
            })
            .collect();
        Self { pairs }
    }

    /// Returns the last value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if `key` has at least one value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Returns the number of pairs, counting repeated keys.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` if there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterates over all pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn decode(input: &str) -> String {
    let plus_decoded = input.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .into_owned()
}
