//! Prefix routing for `/api/{service}/...` paths.
//!
//! `/api/{service}` and anything below it belong to `service`; the
//! `/api/{service}` prefix is removed and the remainder is forwarded as-is
//! (`/` when nothing remains). `/api/{service}x` does not match `{service}`.

/// Prefix under which every service is mounted
pub const API_PREFIX: &str = "/api/";

/// Result of splitting a request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    /// Service segment following `/api/`
    pub service: &'a str,
    /// Path to forward to the backend, always starting with `/`
    pub forward_path: &'a str,
}

/// Split a request path into its service segment and forwarded remainder.
///
/// Returns `None` for paths outside `/api/` or with an empty service segment.
pub fn split_api_path(path: &str) -> Option<RouteMatch<'_>> {
    let rest = path.strip_prefix(API_PREFIX)?;

    let (service, forward_path) = match rest.find('/') {
        Some(slash) => (&rest[..slash], &rest[slash..]),
        None => (rest, "/"),
    };

    if service.is_empty() {
        return None;
    }

    Some(RouteMatch {
        service,
        forward_path,
    })
}

/// Join a backend base URL with the forwarded path and the original query.
pub fn upstream_url(base_url: &str, forward_path: &str, query: Option<&str>) -> String {
    let mut url = String::with_capacity(base_url.len() + forward_path.len() + 16);
    url.push_str(base_url.trim_end_matches('/'));
    url.push_str(forward_path);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    url
}
