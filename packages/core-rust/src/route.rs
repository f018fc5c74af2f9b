//! URL path pattern: `/{service}/{method}.{format}`, every segment optional.

use std::sync::LazyLock;

use regex::Regex;

/// Service and method are word characters; format follows a literal dot.
/// The match is anchored at the end only, so leading path segments are
/// ignored.
static ROUTE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(?P<service>\w+)?/?(?P<method>\w+)?\.?(?P<format>\w+)?$")
        .unwrap_or_else(|e| unreachable!("route pattern is a valid regex: {e}"))
});

/// The three stage inputs extracted from a request path. Absent segments
/// are empty strings, which select the registry defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMatch {
    pub service: String,
    pub method: String,
    pub format: String,
}

impl RouteMatch {
    /// Parses a request path (without query string).
    ///
    /// Paths that do not match at all yield all-empty segments.
    #[must_use]
    pub fn parse(path: &str) -> Self {
        let Some(caps) = ROUTE_PATTERN.captures(path) else {
            return Self::default();
        };
        let segment = |name: &str| {
            caps.name(name)
                .map_or_else(String::new, |m| m.as_str().to_string())
        };
        Self {
            service: segment("service"),
            method: segment("method"),
            format: segment("format"),
        }
    }
}
