use storescore_core::Platform;
use url::Url;

use crate::ScrapeError;

/// Canonical form of a user-supplied storefront address: https by default,
/// no query, no fragment, no trailing slash.
pub fn normalize_url(input: &str) -> Result<Url, ScrapeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ScrapeError::InvalidUrl(input.to_string(), "empty".into()));
    }
    let with_scheme = if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    let mut url = Url::parse(&with_scheme)
        .map_err(|e| ScrapeError::InvalidUrl(input.to_string(), e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ScrapeError::InvalidUrl(
            input.to_string(),
            format!("unsupported scheme {}", url.scheme()),
        ));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ScrapeError::InvalidUrl(input.to_string(), "missing host".into()));
    }
    url.set_query(None);
    url.set_fragment(None);
    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(&path);
    Ok(url)
}

/// Whether `input` opens with `scheme://`. A `://` later on, say inside a
/// query parameter, does not count.
fn has_scheme(input: &str) -> bool {
    let Some((scheme, _)) = input.split_once("://") else {
        return false;
    };
    scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// String form stored on a `Store`. The root path renders without its slash.
pub fn canonical(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}

/// Platform implied by the host alone. Custom Shopify domains are not
/// recognizable and yield `None`.
pub fn detect_platform(url: &Url) -> Option<Platform> {
    let host = url.host_str()?.to_ascii_lowercase();
    if host.ends_with(".myshopify.com") {
        return Some(Platform::Shopify);
    }
    // eBay's own sites: `ebay` followed by a country suffix such as `com`,
    // `de` or `co.uk`.
    let labels: Vec<&str> = host.split('.').collect();
    let ebay = labels.iter().position(|l| *l == "ebay").is_some_and(|at| {
        let suffix = &labels[at + 1..];
        (1..=2).contains(&suffix.len())
            && suffix
                .iter()
                .all(|l| (2..=3).contains(&l.len()) && l.chars().all(|c| c.is_ascii_alphabetic()))
    });
    ebay.then_some(Platform::Ebay)
}

/// Explicit choice first, then host detection, then Shopify for custom domains.
pub fn resolve_platform(url: &Url, explicit: Option<Platform>) -> Platform {
    explicit
        .or_else(|| detect_platform(url))
        .unwrap_or(Platform::Shopify)
}
