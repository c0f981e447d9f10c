// SPDX-License-Identifier: EUPL-1.2

//! Helpers for WebDav URL handling.
//!
//! Servers are sloppy with URLs: hrefs come back with or without trailing
//! slashes, percent-encoded differently from the request, sometimes relative
//! and sometimes absolute. The helpers here normalise and compare URLs the
//! way the protocol needs, independently of how a server spells them.

use http::uri::PathAndQuery;
use http::Uri;
use percent_encoding::percent_decode_str;

/// How an `href` in a multi-status response relates to the requested URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HrefRelation {
    /// The href is the requested resource itself.
    SelfRef,
    /// The href is a member (direct or transitive) of the requested collection.
    Member,
    /// The href is unrelated to the requested URL.
    Other,
}

/// Returns a copy of `uri` whose path ends with a single trailing slash.
#[must_use]
pub fn with_trailing_slash(uri: &Uri) -> Uri {
    let path = uri.path();
    if path.ends_with('/') {
        return uri.clone();
    }
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}/?{query}"),
        None => format!("{path}/"),
    };
    replace_path(uri, &path_and_query).unwrap_or_else(|| uri.clone())
}

/// Returns a copy of `uri` without a trailing slash on its path.
///
/// The root path `/` is kept as-is; stripping it would change the URL's
/// meaning rather than normalise it.
#[must_use]
pub fn omit_trailing_slash(uri: &Uri) -> Uri {
    let path = uri.path();
    if path == "/" || !path.ends_with('/') {
        return uri.clone();
    }
    let trimmed = &path[..path.len() - 1];
    let path_and_query = match uri.query() {
        Some(query) => format!("{trimmed}?{query}"),
        None => trimmed.to_string(),
    };
    replace_path(uri, &path_and_query).unwrap_or_else(|| uri.clone())
}

/// The port a request to `uri` would actually use.
#[must_use]
pub fn effective_port(uri: &Uri) -> u16 {
    uri.port_u16().unwrap_or_else(|| {
        if uri.scheme_str() == Some("https") {
            443
        } else {
            80
        }
    })
}

/// Compares two URLs the way WebDav servers do.
///
/// Scheme and host are compared case-insensitively, ports via their
/// defaults, and path segments after percent-decoding, so that
/// `https://HOST/a%2Fb` and `https://host:443/a%2Fb` are equal. Queries and
/// fragments do not name the resource and are ignored.
#[must_use]
pub fn eq_webdav(a: &Uri, b: &Uri) -> bool {
    a.scheme_str()
        .unwrap_or("http")
        .eq_ignore_ascii_case(b.scheme_str().unwrap_or("http"))
        && a.host()
            .unwrap_or("")
            .eq_ignore_ascii_case(b.host().unwrap_or(""))
        && effective_port(a) == effective_port(b)
        && decoded_segments(a) == decoded_segments(b)
}

/// Classifies `href` as the requested resource itself, a member of it, or
/// something else entirely.
///
/// Self comparison is slash-insensitive; membership requires every decoded
/// path segment of `location` to prefix the href's segments.
#[must_use]
pub fn classify_relation(location: &Uri, href: &Uri) -> HrefRelation {
    if eq_webdav(&omit_trailing_slash(href), &omit_trailing_slash(location)) {
        return HrefRelation::SelfRef;
    }

    let same_origin = location.scheme_str() == href.scheme_str()
        && location
            .host()
            .unwrap_or("")
            .eq_ignore_ascii_case(href.host().unwrap_or(""))
        && effective_port(location) == effective_port(href);
    if !same_origin {
        return HrefRelation::Other;
    }

    let mut base = decoded_segments(location);
    // A collection's trailing slash yields an empty final segment; it is not
    // part of the prefix to match.
    if base.last().map_or(false, Vec::is_empty) {
        base.pop();
    }
    let target = decoded_segments(href);
    if target.len() > base.len() && target[..base.len()] == base[..] {
        HrefRelation::Member
    } else {
        HrefRelation::Other
    }
}

/// Reduces a host name to the domain used for authentication scoping.
///
/// Strips a trailing dot and keeps the last two labels, so `dav.example.com`
/// and `example.com` scope to the same `example.com`.
#[must_use]
pub fn host_to_domain(host: &str) -> &str {
    let host = host.strip_suffix('.').unwrap_or(host);
    match host.rmatch_indices('.').nth(1) {
        Some((idx, _)) => &host[idx + 1..],
        None => host,
    }
}

/// The last path segment of `uri`.
///
/// Collections (paths with a trailing slash) have an empty file name.
#[must_use]
pub fn file_name(uri: &Uri) -> &str {
    uri.path().rsplit('/').next().unwrap_or("")
}

/// Resolves a raw `href` from a server response against a base URL.
///
/// Returns `None` (and logs) for hrefs that cannot be turned into a URL.
///
/// # Quirks
///
/// Some servers return relative hrefs whose first segment contains a colon
/// (e.g. `a:b.vcf`). A strict resolver would read that as a scheme, so such
/// hrefs are prefixed with `./` before resolution.
#[must_use]
pub fn resolve_href(base: &Uri, raw: &str) -> Option<Uri> {
    let raw = raw.trim();
    let resolved = if let Some(colon) = raw.find(':') {
        if !raw.starts_with('/') && !raw[colon..].starts_with("://") {
            resolve_reference(base, &format!("./{raw}"))
        } else {
            resolve_reference(base, raw)
        }
    } else {
        resolve_reference(base, raw)
    };
    if resolved.is_none() {
        log::warn!("could not resolve href '{raw}' against {base}");
    }
    resolved
}

/// Resolves a URI reference against `base`, RFC 3986 style.
///
/// [`Uri`] itself cannot do this; it only parses absolute URIs and
/// path-and-query strings.
fn resolve_reference(base: &Uri, reference: &str) -> Option<Uri> {
    // Fragments are client-side only and `Uri` refuses to parse them.
    let reference = reference.split('#').next().unwrap_or_default();
    if reference.is_empty() {
        return Some(base.clone());
    }

    if let Some(rest) = reference.strip_prefix("//") {
        let scheme = base.scheme_str()?;
        return Uri::try_from(format!("{scheme}://{rest}")).ok();
    }

    let (path, query) = match reference.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (reference, None),
    };

    let path = if path.starts_with('/') {
        remove_dot_segments(path)
    } else if reference.contains("://") {
        return Uri::try_from(reference).ok();
    } else {
        merge_paths(base.path(), path)
    };

    let path_and_query = match query {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };
    replace_path(base, &path_and_query)
}

/// Merges a relative path reference into the directory of `base_path` and
/// normalises `.` and `..` segments away.
fn merge_paths(base_path: &str, reference: &str) -> String {
    let dir = match base_path.rfind('/') {
        Some(idx) => &base_path[..=idx],
        None => "/",
    };
    remove_dot_segments(&format!("{dir}{reference}"))
}

fn remove_dot_segments(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        match segment {
            "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut result = String::from("/");
    result.push_str(&segments.join("/"));
    let keep_slash = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");
    if keep_slash && result.len() > 1 {
        result.push('/');
    }
    result
}

fn decoded_segments(uri: &Uri) -> Vec<Vec<u8>> {
    uri.path()
        .split('/')
        .map(|segment| percent_decode_str(segment).collect())
        .collect()
}

fn replace_path(uri: &Uri, path_and_query: &str) -> Option<Uri> {
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).ok()?);
    Uri::from_parts(parts).ok()
}
