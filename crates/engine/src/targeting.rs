//! Page targeting. A page matches a pattern when:
//!
//! - the pattern is `*` (every page), or
//! - the pattern ends in `*` and the path starts with the text before it, or
//! - the pattern and the path are equal.
//!
//! Both sides are normalized first: query string and fragment removed, a
//! trailing `/` dropped (the root path `/` is kept as is), empty treated as `/`.

/// Strip query and fragment and canonicalize trailing slashes.
pub fn normalize_path(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = path[..end].trim();
    if path.is_empty() {
        return "/";
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Whether `path` matches a single target pattern.
pub fn matches_pattern(pattern: &str, path: &str) -> bool {
    let pattern = pattern.trim();
    if pattern == "*" {
        return true;
    }
    let path = normalize_path(path);
    match pattern.strip_suffix('*') {
        Some(prefix) => path.starts_with(prefix) || normalize_path(prefix) == path,
        None => normalize_path(pattern) == path,
    }
}

/// Whether `path` matches any of `patterns`.
pub fn matches_any(patterns: &[String], path: &str) -> bool {
    patterns.iter().any(|p| matches_pattern(p, path))
}
