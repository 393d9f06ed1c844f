//! Defines the core data structures used in the email-harvester application.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use url::Url;

/// Ordered set of email addresses.
///
/// Order is first-discovered; uniqueness is case-insensitive and the first
/// seen casing is the one kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailSet {
    emails: Vec<String>,
    seen: HashSet<String>,
}

impl EmailSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an email, returning `false` when an equal address (ignoring case) is already present.
    pub fn insert(&mut self, email: impl Into<String>) -> bool {
        let email = email.into();
        if self.seen.insert(email.to_lowercase()) {
            self.emails.push(email);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, email: &str) -> bool {
        self.seen.contains(&email.to_lowercase())
    }

    /// Appends every address of `other` not yet present, keeping `other`'s order.
    pub fn extend(&mut self, other: EmailSet) {
        for email in other.emails {
            self.insert(email);
        }
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.emails.iter().map(String::as_str)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        let seen = &mut self.seen;
        self.emails.retain(|email| {
            let kept = keep(email);
            if !kept {
                seen.remove(&email.to_lowercase());
            }
            kept
        });
    }

    pub fn into_vec(self) -> Vec<String> {
        self.emails
    }
}

impl<S: Into<String>> FromIterator<S> for EmailSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = EmailSet::new();
        for email in iter {
            set.insert(email);
        }
        set
    }
}

impl IntoIterator for EmailSet {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.emails.into_iter()
    }
}

/// A point in time after which a site run stops starting new work.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn new(limit: Duration) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.start.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Clips a sub-operation timeout to what is left of this deadline.
    pub fn clip(&self, timeout: Duration) -> Duration {
        timeout.min(self.remaining())
    }
}

/// A scored link that looks like a contact page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactPageCandidate {
    pub url: Url,
    /// Relevance between 0 and 10.
    pub score: u8,
}

/// A page retrieved through the lightweight HTTP path.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: Url,
    pub html: String,
}

/// A page retrieved through the browser.
#[derive(Debug, Clone, Default)]
pub struct RenderedPage {
    pub html: String,
    /// Strings only visible at runtime (storage, shadow roots, generated content, innerText).
    pub dynamic_text: Vec<String>,
}

/// Result of one site run as reported by the CLI and the API.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SiteReport {
    /// The URL as given by the caller.
    pub url: String,
    pub emails: Vec<String>,
    /// Set when the input could not be processed at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_set_dedupes_case_insensitively() {
        let mut set = EmailSet::new();
        assert!(set.insert("Info@Acme.test"));
        assert!(!set.insert("info@acme.test"));
        assert!(set.insert("sales@acme.test"));

        assert_eq!(set.len(), 2);
        assert!(set.contains("INFO@ACME.TEST"));
        assert_eq!(set.into_vec(), vec!["Info@Acme.test", "sales@acme.test"]);
    }

    #[test]
    fn test_email_set_extend_and_retain() {
        let mut set: EmailSet = ["a@acme.test", "b@acme.test"].into_iter().collect();
        let other: EmailSet = ["B@acme.test", "c@acme.test"].into_iter().collect();
        set.extend(other);
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec!["a@acme.test", "b@acme.test", "c@acme.test"]
        );

        set.retain(|e| !e.starts_with('b'));
        assert!(!set.contains("b@acme.test"));
        assert!(set.insert("b@acme.test"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_deadline_zero_is_expired() {
        let deadline = Deadline::new(Duration::ZERO);
        assert!(deadline.is_expired());
        assert_eq!(deadline.clip(Duration::from_secs(5)), Duration::ZERO);
    }

    #[test]
    fn test_deadline_clips_to_remaining() {
        let deadline = Deadline::new(Duration::from_secs(3600));
        assert!(!deadline.is_expired());
        assert_eq!(deadline.clip(Duration::from_secs(10)), Duration::from_secs(10));
        assert!(deadline.clip(Duration::from_secs(7200)) <= Duration::from_secs(3600));
    }
}
