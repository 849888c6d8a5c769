//! Route pattern joining and compilation.
//!
//! Patterns are written with `:name` parameter segments and an optional
//! trailing `*name` catch-all, e.g. `/users/:id/files/*rest`. They are
//! compiled into matchit's `{name}` / `{*name}` syntax once, at registration.

use crate::error::RouteError;

/// Joins a group prefix and a sub-path on a single `/`.
///
/// `join("/users", "")` is `/users`, `join("/users/", "/:id")` is `/users/:id`
/// and `join("", "profile")` is `/profile`.
pub(crate) fn join(base: &str, sub: &str) -> String {
    let base = base.strip_suffix('/').unwrap_or(base);
    let mut out = String::with_capacity(base.len() + sub.len() + 1);
    if !base.is_empty() && !base.starts_with('/') {
        out.push('/');
    }
    out.push_str(base);
    if !sub.is_empty() {
        if !sub.starts_with('/') {
            out.push('/');
        }
        out.push_str(sub);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Translates a full `:name` pattern into matchit syntax, rejecting anything
/// that would only surface as a surprise at request time.
pub(crate) fn compile(pattern: &str) -> Result<String, RouteError> {
    let invalid = |reason| RouteError::InvalidPath { path: pattern.to_owned(), reason };

    if !pattern.starts_with('/') {
        return Err(invalid("must start with `/`"));
    }
    if pattern.contains(['{', '}']) {
        return Err(invalid("braces are not allowed; use `:name` for parameters"));
    }

    let segments: Vec<&str> = pattern[1..].split('/').collect();
    let last = segments.len() - 1;
    let mut names: Vec<&str> = Vec::new();
    let mut out = String::with_capacity(pattern.len() + 8);

    for (i, segment) in segments.iter().enumerate() {
        // A trailing empty segment is a trailing slash; anywhere else it's `//`.
        if segment.is_empty() && i != last {
            return Err(invalid("empty path segment"));
        }
        out.push('/');

        let (name, catch_all) = match segment.as_bytes().first() {
            Some(b':') => (&segment[1..], false),
            Some(b'*') => (&segment[1..], true),
            _ => {
                out.push_str(segment);
                continue;
            }
        };

        if name.is_empty() {
            return Err(invalid("parameter without a name"));
        }
        if name.contains([':', '*']) {
            return Err(invalid("parameter names may not contain `:` or `*`"));
        }
        if catch_all && i != last {
            return Err(invalid("catch-all must be the last segment"));
        }
        if names.contains(&name) {
            return Err(RouteError::DuplicateParam { path: pattern.to_owned(), name: name.to_owned() });
        }
        names.push(name);

        out.push('{');
        if catch_all {
            out.push('*');
        }
        out.push_str(name);
        out.push('}');
    }

    Ok(out)
}
