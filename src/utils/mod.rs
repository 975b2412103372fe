//! Utility functions and helpers.

pub mod http;
pub mod log;

#[cfg(test)]
pub(crate) mod stub_server;

use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Undo the doubled host prefix left by naive link concatenation.
///
/// `https://host.tldhttps://host.tld/x` becomes `https://host.tld/x`.
pub fn repair_link(link: &str) -> Option<String> {
    let rest = link
        .strip_prefix("https://")
        .or_else(|| link.strip_prefix("http://"))?;
    let inner = rest.find("https://").or_else(|| rest.find("http://"))?;
    // Only a prefix made of a bare host counts as doubled.
    if rest[..inner].contains('/') {
        return None;
    }
    Some(rest[inner..].to_string())
}
