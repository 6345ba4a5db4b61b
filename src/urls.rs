//! URL normalization and documentation-shape heuristics.
//!
//! Every equality or set-membership check on source URLs goes through
//! [`normalize`] first, so two differently formatted URLs pointing at the
//! same resource collapse to one entry. [`looks_like_docs`] is the path
//! heuristic used to filter raw search results down to documentation-shaped
//! URLs before classification.

/// Path segments that mark a URL as documentation-shaped.
const DOCS_PATH_MARKERS: &[&str] = &[
    "/docs",
    "/documentation",
    "/guide",
    "/tutorial",
    "/api",
    "/reference",
    "/manual",
    "/learn",
    "/getting-started",
    "/quickstart",
    "/handbook",
    "/wiki",
];

/// Normalize a URL for identity comparison.
///
/// - scheme and host are lowercased
/// - the fragment is dropped
/// - default ports (`:80` for http, `:443` for https) are dropped
/// - a single trailing slash on the path is dropped
///
/// Inputs that do not look like absolute URLs are returned trimmed and
/// lowercase-hosted as best effort; normalization is total and never fails.
pub fn normalize(url: &str) -> String {
    let url = url.trim();
    let url = match url.split_once('#') {
        Some((before, _fragment)) => before,
        None => url,
    };

    let (scheme, rest) = match url.split_once("://") {
        Some((s, r)) => (s.to_ascii_lowercase(), r),
        None => return url.trim_end_matches('/').to_string(),
    };

    let (authority, path_and_query) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };

    let mut host = authority.to_ascii_lowercase();
    let default_port = match scheme.as_str() {
        "http" => Some(":80"),
        "https" => Some(":443"),
        _ => None,
    };
    if let Some(port) = default_port {
        if let Some(stripped) = host.strip_suffix(port) {
            host = stripped.to_string();
        }
    }

    let path = path_and_query.trim_end_matches('/');
    format!("{}://{}{}", scheme, host, path)
}

/// Extract the host portion of a URL (lowercased, without port).
///
/// Returns an empty string for inputs without an authority component.
pub fn host_of(url: &str) -> String {
    let rest = match url.split_once("://") {
        Some((_, r)) => r,
        None => return String::new(),
    };
    let authority = rest.split('/').next().unwrap_or(rest);
    let host = authority.split(':').next().unwrap_or(authority);
    host.to_ascii_lowercase()
}

/// Extract the path portion of a URL (without query or fragment).
pub fn path_of(url: &str) -> String {
    let rest = match url.split_once("://") {
        Some((_, r)) => r,
        None => url,
    };
    let path = match rest.find('/') {
        Some(idx) => &rest[idx..],
        None => "/",
    };
    let path = path.split('?').next().unwrap_or(path);
    let path = path.split('#').next().unwrap_or(path);
    path.to_string()
}

/// Heuristic: does this URL's path look like documentation?
pub fn looks_like_docs(url: &str) -> bool {
    let path = path_of(url).to_ascii_lowercase();
    DOCS_PATH_MARKERS.iter().any(|marker| path.contains(marker))
}
