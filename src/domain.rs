//! Utility functions for handling domain names and URLs.

use crate::error::{AppError, Result};
use url::Url;

/// Parses user input into an absolute URL, prepending `https://` when no
/// scheme is present.
///
/// # Arguments
/// * `input` - The raw URL string as typed by the user.
///
/// # Returns
/// * `Ok(Url)` for an absolute http(s) URL with a host.
/// * `Err(AppError::InvalidInput)` for empty input or anything without a host.
pub fn normalize_input_url(input: &str) -> Result<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput("Website URL is empty".to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&with_scheme).map_err(|e| {
        tracing::warn!("Failed to parse URL '{}' (original: {}): {}", with_scheme, input, e);
        AppError::InvalidInput(format!("'{}' is not a valid URL: {}", input, e))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::InvalidInput(format!(
            "Unsupported scheme '{}' in {}",
            url.scheme(),
            input
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(AppError::InvalidInput(format!(
            "Could not extract host from URL: {}",
            input
        ))),
    }
}

/// Resolves an `href` against the page it was found on and drops the fragment.
/// Returns `None` for anything that is not an http(s) link.
pub fn normalize_link(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// Returns the registrable domain (public suffix plus one label) of a host.
///
/// Suffixes come from the ICANN section of the Public Suffix List. Private
/// entries such as `github.io` are skipped, so `alice.github.io` and
/// `bob.github.io` share the registrable domain `github.io`. IP addresses,
/// bare suffixes and single-label hosts are returned unchanged.
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_lowercase();
    if host.parse::<std::net::IpAddr>().is_ok() || host.starts_with('[') {
        return host;
    }

    let Some(suffix) = icann_suffix(&host) else {
        return host;
    };
    let Some(prefix) = host
        .strip_suffix(suffix)
        .and_then(|rest| rest.strip_suffix('.'))
        .filter(|rest| !rest.is_empty())
    else {
        return host;
    };

    match prefix.rsplit('.').next() {
        Some(label) if !label.is_empty() => format!("{}.{}", label, suffix),
        _ => host.clone(),
    }
}

/// Longest ICANN public suffix of `host`. Unlisted TLDs fall back to the
/// list's implicit `*` rule, so `acme.test` has the suffix `test`.
fn icann_suffix(host: &str) -> Option<&str> {
    let mut suffix = psl::suffix_str(host)?;
    while matches!(
        psl::suffix(suffix.as_bytes()).and_then(|s| s.typ()),
        Some(psl::Type::Private)
    ) {
        let (_, parent) = suffix.split_once('.')?;
        suffix = psl::suffix_str(parent)?;
    }
    Some(suffix)
}

/// True when both URLs belong to the same registrable domain.
pub fn is_same_domain(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(ha), Some(hb)) => registrable_domain(ha) == registrable_domain(hb),
        _ => false,
    }
}

/// Lowercased domain part of an email address.
pub fn email_domain(email: &str) -> Option<String> {
    email
        .rsplit_once('@')
        .map(|(_, domain)| domain.to_lowercase())
        .filter(|d| !d.is_empty())
}
