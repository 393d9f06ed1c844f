//! Syntactic email validation and the placeholder-domain denylist.

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
        .expect("Failed to compile EMAIL_REGEX")
});

/// Domains that only ever show up in templates and placeholder copy.
pub const PLACEHOLDER_DOMAINS: &[&str] = &[
    "example.com",
    "sample.com",
    "domain.com",
    "email.com",
    "test.com",
    "yourcompany.com",
];

/// True when the whole string is a `local@domain.tld` address.
pub fn is_well_formed(candidate: &str) -> bool {
    EMAIL_REGEX.is_match(candidate)
}

/// True when `domain` is, or is a subdomain of, a placeholder domain.
pub fn is_placeholder_domain(domain: &str) -> bool {
    let domain = domain.to_lowercase();
    PLACEHOLDER_DOMAINS.iter().any(|placeholder| {
        domain == *placeholder
            || domain
                .strip_suffix(placeholder)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// Full validity check applied to every candidate before it is reported.
pub fn is_valid(candidate: &str) -> bool {
    if !is_well_formed(candidate) {
        return false;
    }
    match candidate.rsplit_once('@') {
        Some((_, domain)) => !is_placeholder_domain(domain),
        None => false,
    }
}
