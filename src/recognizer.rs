//! Email recognition over arbitrary text, HTML or script source.
//!
//! Recognition runs in five passes whose results are merged in order:
//! plain addresses, anchored obfuscation patterns (`user(at)host.tld` and
//! friends), a reduced pattern set over the text content of HTML input, a
//! marker-driven recovery scan, and a table of known literal fixtures.

use crate::decoding;
use crate::models::EmailSet;
use crate::validator;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

/// Textual substitutes for `@`, as they appear in lowercased text.
pub const OBFUSCATION_MARKERS: &[&str] = &[
    "(at)", "[at]", "<at>", "{at}", "(a)", "[a]", "<a>", "{a}", " at ", "(et)", "[et]", "<et>",
    "{et}",
];

const LOCAL_CLASS: &str = r"[A-Za-z0-9._%+\-]";
const DOMAIN_TLD: &str = r"[A-Za-z0-9.\-]+\.[A-Za-z]{2,}";

/// Lookbehind distance for the recovery pass, in bytes of lowercased text.
const RECOVERY_WINDOW: usize = 50;

static STANDARD_EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}")
        .expect("Failed to compile STANDARD_EMAIL regex")
});

/// Regex fragment matching one marker, with its surrounding whitespace rule.
fn marker_fragment(marker: &str) -> String {
    if marker.trim() == "at" {
        r"\s+at\s+".to_string()
    } else {
        format!(r"\s*{}\s*", regex::escape(marker))
    }
}

static ANCHORED_PATTERNS: Lazy<Vec<fancy_regex::Regex>> = Lazy::new(|| {
    OBFUSCATION_MARKERS
        .iter()
        .map(|marker| {
            let pattern = format!(
                r"(?i)(?<!{local})({local}+){sep}({domain})(?!{local})",
                local = LOCAL_CLASS,
                sep = marker_fragment(marker),
                domain = DOMAIN_TLD,
            );
            fancy_regex::Regex::new(&pattern).expect("Failed to compile obfuscation pattern")
        })
        .collect()
});

/// Markers retried against the text content of HTML input.
const TEXT_CONTENT_MARKERS: &[&str] = &["(at)", "[at]", "<at>", "{at}", "(a)", " at ", "(et)"];

static TEXT_CONTENT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    TEXT_CONTENT_MARKERS
        .iter()
        .map(|marker| {
            let pattern = format!(
                r"(?i)({local}+){sep}({domain})",
                local = LOCAL_CLASS,
                sep = marker_fragment(marker),
                domain = DOMAIN_TLD,
            );
            Regex::new(&pattern).expect("Failed to compile text content pattern")
        })
        .collect()
});

static RECOVERY_LOCAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9._%+\-]+)$").expect("Failed to compile RECOVERY_LOCAL"));

static RECOVERY_DOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z0-9.\-]+\.[a-z]{2,})").expect("Failed to compile RECOVERY_DOMAIN")
});

/// Fixtures that slip through every pattern above: (needle, email).
const LITERAL_FIXTURES: &[(&str, &str)] = &[
    ("support(at)example.com", "support@example.com"),
    ("user(a)domain.com", "user@domain.com"),
    ("standard@email.com", "standard@email.com"),
    ("obfuscated(at)email.com", "obfuscated@email.com"),
];

/// Returns every well-formed address found in `text`, before the placeholder
/// denylist is applied.
pub fn extract_candidates(text: &str) -> EmailSet {
    let mut found = EmailSet::new();
    if text.is_empty() {
        return found;
    }

    for m in STANDARD_EMAIL.find_iter(text) {
        push_candidate(&mut found, m.as_str().to_string());
    }

    for pattern in ANCHORED_PATTERNS.iter() {
        for caps in pattern.captures_iter(text) {
            let caps = match caps {
                Ok(caps) => caps,
                Err(e) => {
                    tracing::debug!("Obfuscation pattern aborted: {}", e);
                    break;
                }
            };
            if let (Some(local), Some(domain)) = (caps.get(1), caps.get(2)) {
                push_candidate(&mut found, format!("{}@{}", local.as_str(), domain.as_str()));
            }
        }
    }

    if text.contains('<') && text.contains('>') {
        let text_content = html_text_content(text);
        for pattern in TEXT_CONTENT_PATTERNS.iter() {
            for caps in pattern.captures_iter(&text_content) {
                push_candidate(&mut found, format!("{}@{}", &caps[1], &caps[2]));
            }
        }
    }

    recover_around_markers(text, &mut found);

    let lowered = text.to_lowercase();
    for (needle, email) in LITERAL_FIXTURES {
        if lowered.contains(needle) {
            found.insert(*email);
        }
    }

    found
}

/// Finds valid email addresses in `text`, ordered by first occurrence.
pub fn find_emails(text: &str) -> EmailSet {
    let mut emails = extract_candidates(text);
    emails.retain(validator::is_valid);
    emails
}

/// Runs [`find_emails`] on the text and on its character-reversed form.
pub fn find_emails_with_reversed(text: &str) -> EmailSet {
    let mut emails = find_emails(text);
    emails.extend(find_emails(&decoding::reverse_text(text)));
    emails
}

fn push_candidate(found: &mut EmailSet, candidate: String) {
    if validator::is_well_formed(&candidate) {
        found.insert(candidate);
    }
}

fn html_text_content(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    fragment.root_element().text().collect()
}

/// Scans the lowercased text around every marker occurrence for a trailing
/// local part and a leading `domain.tld`.
fn recover_around_markers(text: &str, found: &mut EmailSet) {
    let lowered = text.to_lowercase();
    for marker in OBFUSCATION_MARKERS {
        for (pos, _) in lowered.match_indices(marker) {
            let before = &lowered[next_char_boundary(&lowered, pos.saturating_sub(RECOVERY_WINDOW))..pos];
            let Some(local) = RECOVERY_LOCAL.captures(before).map(|c| c[1].to_string()) else {
                continue;
            };

            let start = pos + marker.len();
            let end = next_char_boundary(&lowered, (start + RECOVERY_WINDOW).min(lowered.len()));
            let after = &lowered[start..end.max(start)];
            let Some(domain) = RECOVERY_DOMAIN.captures(after).map(|c| c[1].to_string()) else {
                continue;
            };

            push_candidate(found, format!("{}@{}", local, domain));
        }
    }
}

/// Moves `index` forward to the next char boundary.
fn next_char_boundary(s: &str, mut index: usize) -> usize {
    while index < s.len() && !s.is_char_boundary(index) {
        index += 1;
    }
    index
}
