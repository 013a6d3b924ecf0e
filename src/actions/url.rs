// src/actions/url.rs

//! Pure URL rewrites used by the redirect adapters and helpers.
//!
//! Each returns `None` when the rewrite would leave the URL unchanged, which
//! is what keeps redirects from looping.

use url::Url;

/// Replace the first occurrence of `pattern` in `href`.
pub fn replace_in_url(href: &str, pattern: &str, replacement: &str) -> Option<String> {
    if pattern.is_empty() || !href.contains(pattern) {
        return None;
    }
    let next = href.replacen(pattern, replacement, 1);
    (next != href).then_some(next)
}

/// Append `fragment` to the query string (before any `#hash`) unless `href`
/// already contains it. Leading `&`/`?` on the fragment are ignored.
pub fn with_query_fragment(href: &str, fragment: &str) -> Option<String> {
    if fragment.is_empty() || href.contains(fragment) {
        return None;
    }
    let fragment = fragment.trim_start_matches(['&', '?']);
    if fragment.is_empty() {
        return None;
    }

    let (base, hash) = match href.find('#') {
        Some(idx) => href.split_at(idx),
        None => (href, ""),
    };
    let sep = if base.contains('?') { '&' } else { '?' };
    Some(format!("{base}{sep}{fragment}{hash}"))
}

/// Move `href` to another origin, keeping path and query.
///
/// Trailing slashes on `domain` are dropped. Returns `None` if `href` does not
/// parse or the result is identical.
pub fn with_domain(href: &str, domain: &str) -> Option<String> {
    let domain = domain.trim_end_matches('/');
    if domain.is_empty() {
        return None;
    }
    let current = Url::parse(href).ok()?;
    let mut next = format!("{domain}{}", current.path());
    if let Some(query) = current.query() {
        next.push('?');
        next.push_str(query);
    }
    (next != href).then_some(next)
}
