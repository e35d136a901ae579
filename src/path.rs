//! Lexical URL path normalization

/// Returns the shortest path equivalent to `path` by purely lexical processing.
///
/// Repeated slashes are collapsed, `.` segments dropped and `..` segments resolved
/// against the preceding segment. A rooted path never climbs above `/`, and the
/// trailing slash is removed unless the result is the root itself. An empty result
/// becomes `.` for relative input and `/` for rooted input.
pub(crate) fn clean(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                // Relative paths keep the `..` they can't resolve
                _ if !rooted => segments.push(".."),
                _ => {}
            },
            _ => segments.push(segment),
        }
    }

    let joined = segments.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_owned(),
        (false, false) => joined,
    }
}

/// Turns a configured route into the absolute, cleaned form requests are compared against
pub(crate) fn normalize_route(route: &str) -> String {
    if route.starts_with('/') {
        clean(route)
    } else {
        clean(&format!("/{route}"))
    }
}
