//! Route naming.
//!
//! Every route gets a symbolic name at registration time, used with
//! [`App::url_for`](crate::App::url_for). [`BaseRouteNamer`] derives names in
//! the resource style:
//!
//! | Method | Path | Name |
//! |---|---|---|
//! | GET | `/` | `rootPath` |
//! | GET | `/users` | `usersPath` |
//! | GET | `/users/new` | `newUsersPath` |
//! | GET | `/users/<int:id>` | `userPath` |
//! | GET | `/users/<int:id>/edit` | `editUserPath` |
//! | POST | `/users` | `postUsersPath` |
//! | DELETE | `/users/<int:id>` | `deleteUserPath` |

use http::Method;

/// Maps a route's method and full path to its symbolic name.
pub trait RouteNamer: Send + Sync {
    /// Returns the name for a route.
    fn name_route(&self, method: &Method, path: &str) -> String;
}

/// The default [`RouteNamer`].
///
/// ```
/// use grove_app::route_namer::{BaseRouteNamer, RouteNamer};
/// use http::Method;
///
/// let namer = BaseRouteNamer;
/// assert_eq!(namer.name_route(&Method::GET, "/articles/<slug:article_slug>/comments"), "articleCommentsPath");
/// assert_eq!(namer.name_route(&Method::PUT, "/users/<int:id>"), "putUserPath");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseRouteNamer;

impl RouteNamer for BaseRouteNamer {
    fn name_route(&self, method: &Method, path: &str) -> String {
        let words = path_words(path);
        let mut name = if *method == Method::GET {
            String::new()
        } else {
            method.as_str().to_ascii_lowercase()
        };
        for word in &words {
            push_camel(&mut name, word);
        }
        if words.is_empty() {
            push_camel(&mut name, "unnamed");
        }
        name.push_str("Path");
        name
    }
}

fn path_words(path: &str) -> Vec<String> {
    if path.trim_matches('/').is_empty() {
        return vec!["root".to_string()];
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut front = Vec::new();
    let mut words = Vec::new();
    for (index, segment) in segments.iter().enumerate() {
        if let Some(param) = param_name(segment) {
            let previous = index
                .checked_sub(1)
                .map(|i| segments[i])
                .filter(|s| param_name(s).is_none());
            if !is_identifier(param, previous) {
                words.push(param.to_string());
            }
            continue;
        }

        let followed_by_param = segments
            .get(index + 1)
            .is_some_and(|next| param_name(next).is_some());
        let word = if followed_by_param {
            singularize(segment)
        } else {
            (*segment).to_string()
        };

        if word == "new" || word == "edit" {
            front.push(word);
        } else {
            words.push(word);
        }
    }
    front.extend(words);
    front
}

fn param_name(segment: &str) -> Option<&str> {
    let inner = segment.strip_prefix('<')?.strip_suffix('>')?;
    Some(inner.split_once(':').map_or(inner, |(_, name)| name))
}

fn is_identifier(param: &str, previous: Option<&str>) -> bool {
    let param = param.to_ascii_lowercase();
    param == "id"
        || previous.is_some_and(|prev| {
            let singular = singularize(&prev.to_ascii_lowercase());
            !singular.is_empty() && param.contains(&singular)
        })
}

fn push_camel(out: &mut String, word: &str) {
    for part in word.split(|c: char| !c.is_ascii_alphanumeric()).filter(|p| !p.is_empty()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            if out.is_empty() {
                out.push(first.to_ascii_lowercase());
            } else {
                out.push(first.to_ascii_uppercase());
            }
            out.push_str(chars.as_str());
        }
    }
}

/// Returns the singular form of an English plural noun.
///
/// Handles the common suffix rules and a few irregular nouns; anything else
/// is returned unchanged.
///
/// ```
/// use grove_app::route_namer::singularize;
///
/// assert_eq!(singularize("users"), "user");
/// assert_eq!(singularize("categories"), "category");
/// assert_eq!(singularize("boxes"), "box");
/// assert_eq!(singularize("people"), "person");
/// assert_eq!(singularize("status"), "status");
/// assert_eq!(singularize("statuses"), "status");
/// ```
pub fn singularize(word: &str) -> String {
    const IRREGULAR: &[(&str, &str)] = &[
        ("people", "person"),
        ("children", "child"),
        ("men", "man"),
        ("women", "woman"),
        ("mice", "mouse"),
        ("geese", "goose"),
        ("teeth", "tooth"),
        ("feet", "foot"),
        ("buses", "bus"),
    ];
    const UNCHANGED_ENDINGS: &[&str] = &["ss", "us", "is", "news", "series", "species"];
    const ES_ENDINGS: &[&str] = &["sses", "xes", "zzes", "ches", "shes"];
    // Nouns in -us; most other words ending in "uses" come from -use.
    const US_PLURALS: &[&str] = &[
        "statuses",
        "campuses",
        "viruses",
        "bonuses",
        "censuses",
        "syllabuses",
    ];

    let lower = word.to_ascii_lowercase();
    if let Some((_, singular)) = IRREGULAR.iter().find(|(plural, _)| *plural == lower) {
        return (*singular).to_string();
    }
    if UNCHANGED_ENDINGS.iter().any(|e| lower.ends_with(e)) {
        return word.to_string();
    }
    if lower.ends_with("ies") && lower.len() > 3 {
        return format!("{}y", &word[..word.len() - 3]);
    }
    if ES_ENDINGS
        .iter()
        .chain(US_PLURALS)
        .any(|e| lower.ends_with(e))
    {
        return word[..word.len() - 2].to_string();
    }
    if lower.ends_with('s') && lower.len() > 1 {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(method: Method, path: &str) -> String {
        BaseRouteNamer.name_route(&method, path)
    }

    #[test]
    fn test_root() {
        assert_eq!(name(Method::GET, "/"), "rootPath");
        assert_eq!(name(Method::GET, ""), "rootPath");
        assert_eq!(name(Method::POST, "/"), "postRootPath");
    }

    #[test]
    fn test_resource_routes() {
        assert_eq!(name(Method::GET, "/users"), "usersPath");
        assert_eq!(name(Method::GET, "/users/new"), "newUsersPath");
        assert_eq!(name(Method::GET, "/users/<int:id>"), "userPath");
        assert_eq!(name(Method::GET, "/users/<id>/edit"), "editUserPath");
        assert_eq!(name(Method::POST, "/users"), "postUsersPath");
        assert_eq!(name(Method::PATCH, "/users/<int:id>"), "patchUserPath");
        assert_eq!(name(Method::DELETE, "/users/<int:id>"), "deleteUserPath");
    }

    #[test]
    fn test_nested_resources() {
        assert_eq!(
            name(Method::GET, "/users/<int:user_id>/posts/<int:post_id>"),
            "userPostPath"
        );
        assert_eq!(name(Method::GET, "/api/v1/users"), "apiV1UsersPath");
    }

    #[test]
    fn test_non_identifier_params_are_kept() {
        assert_eq!(name(Method::GET, "/files/<path:rest>"), "fileRestPath");
    }

    #[test]
    fn test_dashes_and_underscores_camelize() {
        assert_eq!(name(Method::GET, "/user-profiles"), "userProfilesPath");
        assert_eq!(name(Method::GET, "/admin_tools/stats"), "adminToolsStatsPath");
    }

    #[test]
    fn test_us_plurals_singularize_before_params() {
        assert_eq!(name(Method::GET, "/statuses/<int:id>"), "statusPath");
        assert_eq!(name(Method::GET, "/statuses"), "statusesPath");
        assert_eq!(name(Method::GET, "/houses/<int:id>"), "housePath");
    }

    #[test]
    fn test_unnamed() {
        assert_eq!(name(Method::GET, "/<id>"), "unnamedPath");
        assert_eq!(name(Method::PUT, "/<int:id>"), "putUnnamedPath");
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("posts"), "post");
        assert_eq!(singularize("addresses"), "address");
        assert_eq!(singularize("churches"), "church");
        assert_eq!(singularize("children"), "child");
        assert_eq!(singularize("bus"), "bus");
        assert_eq!(singularize("buses"), "bus");
        assert_eq!(singularize("statuses"), "status");
        assert_eq!(singularize("orderstatuses"), "orderstatus");
        assert_eq!(singularize("viruses"), "virus");
        assert_eq!(singularize("houses"), "house");
        assert_eq!(singularize("courses"), "course");
        assert_eq!(singularize("abuses"), "abuse");
        assert_eq!(singularize("s"), "s");
        assert_eq!(singularize("sheep"), "sheep");
    }

    #[test]
    fn test_deterministic() {
        let a = name(Method::GET, "/widgets/<int:id>/edit");
        let b = name(Method::GET, "/widgets/<int:id>/edit");
        assert_eq!(a, b);
    }
}
