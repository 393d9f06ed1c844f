//! Contact-page relevance scoring of links.

use crate::keywords::{ALL_CONTACT_KEYWORDS, CONTACT_PATH_SET, is_contact_keyword};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

pub const MAX_SCORE: u8 = 10;

/// URLs longer than this are penalized.
const LONG_URL_THRESHOLD: usize = 100;

static LANGUAGE_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-z]{2,3}(?:[-_][a-z]{2,3})?/([^/?#]+)").expect("Failed to compile LANGUAGE_SEGMENT")
});

/// Scores how likely `url` (optionally reached through a link labelled
/// `link_text`) is a contact page.
///
/// # Arguments
/// * `url` - Absolute URL of the candidate page.
/// * `link_text` - Visible text of the anchor pointing at it, if any.
///
/// # Returns
/// * A score in `0..=10`. The function is pure.
pub fn score(url: &str, link_text: Option<&str>) -> u8 {
    let url_lower: String = match urlencoding::decode(url) {
        Ok(decoded) => decoded.to_lowercase(),
        Err(_) => url.to_lowercase(),
    };
    let path = url_path(&url_lower);
    let mut total: i32 = 0;

    if ALL_CONTACT_KEYWORDS
        .iter()
        .any(|k| path.contains(&format!("/{}", k)))
    {
        total += 7;
    } else if ALL_CONTACT_KEYWORDS.iter().any(|k| url_lower.contains(k)) {
        total += 5;
    }

    if let Some(text) = link_text.map(str::trim).filter(|t| !t.is_empty()) {
        let text_lower = text.to_lowercase();
        let contains_keyword = ALL_CONTACT_KEYWORDS.iter().any(|k| text_lower.contains(k));

        if is_contact_keyword(&text_lower) {
            total += 8;
        } else if contains_keyword {
            total += 5;
        }

        if is_all_uppercase(text) && contains_keyword {
            total += 2;
        }
    }

    if CONTACT_PATH_SET.is_match(path) {
        total += 3;
    }

    if ["/contact", "/kontakt", "/teave"]
        .iter()
        .any(|p| path.contains(p))
    {
        total += 2;
    }

    if let Some(caps) = LANGUAGE_SEGMENT.captures(path) {
        let segment = caps.get(1).map_or("", |m| m.as_str());
        if is_contact_keyword(segment) {
            total += 6;
        }
    }

    let dashed_url = url_lower.replace('_', "-");
    if ALL_CONTACT_KEYWORDS
        .iter()
        .map(|k| dashed_keyword(k))
        .any(|k| dashed_url.contains(k.as_ref()))
    {
        total += 1;
    }

    if url.chars().count() > LONG_URL_THRESHOLD {
        total -= 2;
    }

    total.clamp(0, MAX_SCORE as i32) as u8
}

/// Everything after `scheme://host[:port]`, or the whole input when it has no authority.
fn url_path(url: &str) -> &str {
    match url.find("://") {
        Some(i) => {
            let rest = &url[i + 3..];
            rest.find('/').map_or("", |j| &rest[j..])
        }
        None => url,
    }
}

fn dashed_keyword(keyword: &str) -> Cow<'_, str> {
    if keyword.contains(' ') {
        Cow::Owned(keyword.replace(' ', "-"))
    } else {
        Cow::Borrowed(keyword)
    }
}

/// Has at least one cased character and no lowercase ones.
fn is_all_uppercase(text: &str) -> bool {
    text.chars().any(|c| c.is_uppercase()) && !text.chars().any(|c| c.is_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_segment_and_exact_text() {
        let s = score("https://acme.test/en/kontakt", Some("Kontakt"));
        assert!(s >= 8, "score was {}", s);
        assert_eq!(s, 10);
    }

    #[test]
    fn test_exact_keyword_text_beats_partial_match() {
        let exact = score("https://acme.test/x", Some("Contact"));
        let partial = score("https://acme.test/x", Some("Contact form"));
        assert_eq!(exact, partial + 3);
    }

    #[test]
    fn test_contact_us_link() {
        assert_eq!(score("https://acme.test/contact", Some("Contact Us")), 10);
    }

    #[test]
    fn test_unrelated_link_scores_zero() {
        assert_eq!(score("https://acme.test/pricing", Some("Pricing")), 0);
        assert_eq!(score("https://acme.test/", None), 0);
    }

    #[test]
    fn test_keyword_in_query_only() {
        assert_eq!(score("https://acme.test/page?section=team", None), 6);
    }

    #[test]
    fn test_uppercase_text_bonus() {
        let plain = score("https://acme.test/x", Some("Get in touch now"));
        let shout = score("https://acme.test/x", Some("GET IN TOUCH NOW"));
        assert_eq!(shout, plain + 2);
    }

    #[test]
    fn test_long_urls_are_penalized() {
        let short = "https://acme.test/x/team";
        let long = format!("{}/{}", short, "x".repeat(100));
        assert_eq!(score(short, None), 8);
        assert_eq!(score(&long, None), 6);
        assert_eq!(score(&format!("https://acme.test/{}", "p".repeat(120)), None), 0);
    }

    #[test]
    fn test_percent_encoded_paths() {
        assert_eq!(score("https://acme.test/%C3%BCber-uns", None), 4);
    }

    #[test]
    fn test_score_is_deterministic_and_bounded() {
        let urls = [
            "https://acme.test/",
            "https://acme.test/en-gb/contact-us/",
            "https://acme.test/de_DE/impressum",
            "https://acme.test/a/b/c/d/e/f/g/h/i/j/k/l/m/n/o/p/q/r/s/t/u/v/w/x/y/z/0/1/2/3/4/5/6/7/8/9/about-us/team/privacy",
            "not a url at all",
            "",
        ];
        let texts = [None, Some(""), Some("ABOUT US"), Some("über uns"), Some("Blog")];
        for url in urls {
            for text in texts {
                let first = score(url, text);
                assert!(first <= MAX_SCORE);
                assert_eq!(first, score(url, text));
            }
        }
    }
}
