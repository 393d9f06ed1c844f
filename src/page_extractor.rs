//! Email extraction over every location of a page where an address can hide.
//!
//! The page is described by one ordered table of `(Locator, Extractor)`
//! pairs. A locator pulls strings out of the document (text, attributes,
//! comments, structured data); the extractor turns each string into
//! validated addresses. New locations are added as table rows.

use crate::config::Config;
use crate::decoding;
use crate::document::{PageDocument, element_text};
use crate::models::{EmailSet, RenderedPage};
use crate::recognizer;
use crate::validator;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;

/// Where on a page candidate strings come from.
enum Locator {
    /// The raw HTML source, entity-decoded.
    RawHtml,
    /// Rendered body text.
    VisibleText,
    /// HTML comments.
    Comments,
    /// Text content of matching elements.
    Text(Selector),
    /// An attribute of matching elements.
    Attribute(Selector, &'static str),
    /// Attributes of matching elements, kept only if they hint at an address.
    HintedAttributes(Selector, &'static [&'static str]),
    /// Values of attributes with this name prefix that hint at an address.
    HintedPrefix(&'static str),
    /// All values of attributes with this name prefix.
    Prefix(&'static str),
    /// Hinted attributes not covered by a dedicated row.
    OtherAttributes,
    /// `<meta>` content that names or carries an address.
    MetaContent,
    /// Text and hinted attributes of `<svg>` subtrees.
    Svg,
    /// Text and hinted attributes of custom elements (`<acme-card>`).
    CustomElements,
    /// Addresses split over sibling data attributes, re-assembled.
    DataGroups,
    /// `itemprop="email"` inside schema.org Person/Organization.
    SchemaEmail,
    /// `data:` URIs of iframes.
    DataIframes,
}

/// How candidate strings become addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extractor {
    /// Run the recognizer.
    Recognize,
    /// Rebuild script concatenations, then run the recognizer.
    Script,
    /// `mailto:` href handling; non-mailto values fall back to the recognizer.
    Mailto,
    /// The whole string must be a valid address.
    Strict,
    /// Run the recognizer on the string and its reversal.
    Reversed,
    /// Verbatim, base64, ROT13 and XOR decoding attempts.
    Encoded,
    /// `data-enc-email` decoding policy.
    DataEncEmail,
    /// JSON-LD walk.
    JsonLd,
}

/// Attribute already handled by a dedicated row.
const DEDICATED_ATTRIBUTES: &[&str] = &["href", "onclick", "title", "alt", "placeholder"];

/// Substrings that make an attribute value worth recognizing.
const ADDRESS_HINTS: &[&str] = &["@", "(at)", "[at]"];

const META_EMAIL_NAMES: &[&str] = &["email", "e-mail", "contact", "author"];
const META_EMAIL_PROPERTIES: &[&str] = &["og:email", "og:contact", "article:author"];

static BASE64_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9+/=]+$").expect("Failed to compile BASE64_VALUE"));

static META_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("meta").unwrap());
static SVG_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("svg").unwrap());
static SVG_DESCENDANTS: Lazy<Selector> = Lazy::new(|| Selector::parse("svg *").unwrap());
static SCHEMA_EMAIL_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        r#"[itemtype*="schema.org/Person"] [itemprop="email"], [itemtype*="schema.org/Organization"] [itemprop="email"]"#,
    )
    .unwrap()
});
static IFRAME_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("iframe[src]").unwrap());

fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {:?}: {:?}", css, e))
}

static EXTRACTION_TABLE: Lazy<Vec<(Locator, Extractor)>> = Lazy::new(|| {
    use Extractor::*;
    use Locator::*;
    vec![
        (RawHtml, Recognize),
        (VisibleText, Recognize),
        (Attribute(sel(r#"a[href^="mailto:"], a[href^="MAILTO:"]"#), "href"), Mailto),
        (Text(sel(r#"a[href^="mailto:"], a[href^="MAILTO:"]"#)), Recognize),
        (Text(sel(r#"script:not([type="application/ld+json"])"#)), Script),
        (Attribute(sel("[onclick]"), "onclick"), Script),
        (Prefix("data-"), Recognize),
        (DataGroups, Strict),
        (Attribute(sel("[title]"), "title"), Recognize),
        (Attribute(sel("img[alt]"), "alt"), Recognize),
        (Attribute(sel("[placeholder]"), "placeholder"), Recognize),
        (Comments, Reversed),
        (Text(sel("noscript")), Script),
        (OtherAttributes, Recognize),
        (MetaContent, Recognize),
        (Text(sel(r#"script[type="application/ld+json"]"#)), JsonLd),
        (
            HintedAttributes(
                sel("input, textarea"),
                &["value", "placeholder", "name", "id", "aria-label"],
            ),
            Recognize,
        ),
        (Attribute(sel(r#"input[type="email"][value]"#), "value"), Strict),
        (HintedPrefix("aria-"), Recognize),
        (Svg, Recognize),
        (CustomElements, Recognize),
        (HintedAttributes(sel("[itemprop], [itemtype]"), &["itemprop", "itemtype"]), Recognize),
        (DataIframes, Recognize),
        (SchemaEmail, Strict),
        (Attribute(sel(r#"link[rel~="author"], link[rel~="me"]"#), "href"), Mailto),
        (Text(sel("address")), Recognize),
        (Text(sel("pre, code")), Recognize),
        (Text(sel("style")), Recognize),
        (HintedAttributes(sel("time[datetime]"), &["datetime"]), Recognize),
        (Text(sel("time")), Recognize),
        (Text(sel("output")), Recognize),
        (Text(sel("details, summary")), Recognize),
        (Text(sel("blockquote, cite, q")), Recognize),
        (Attribute(sel("[data-enc-email]"), "data-enc-email"), DataEncEmail),
        (Attribute(sel("[data-email]"), "data-email"), Encoded),
        (Text(sel(r#"[dir="rtl"], [style*="rtl"]"#)), Reversed),
    ]
});

fn has_address_hint(value: &str) -> bool {
    let lowered = value.to_lowercase();
    ADDRESS_HINTS.iter().any(|hint| lowered.contains(hint))
}

impl Locator {
    fn locate(&self, page: &PageDocument, raw_html: &str) -> Vec<String> {
        match self {
            Locator::RawHtml => vec![decoding::decode_entities(raw_html)],
            Locator::VisibleText => vec![page.visible_text()],
            Locator::Comments => page.comments(),
            Locator::Text(selector) => page.texts(selector),
            Locator::Attribute(selector, attr) => page.attr_values(selector, attr),
            Locator::HintedAttributes(selector, attrs) => page
                .select(selector)
                .flat_map(|element| {
                    attrs
                        .iter()
                        .filter_map(|attr| element.value().attr(attr))
                        .filter(|value| has_address_hint(value))
                        .map(str::to_string)
                        .collect::<Vec<_>>()
                })
                .collect(),
            Locator::HintedPrefix(prefix) => page
                .prefixed_attribute_values(prefix)
                .into_iter()
                .filter(|value| has_address_hint(value))
                .collect(),
            Locator::Prefix(prefix) => page.prefixed_attribute_values(prefix),
            Locator::OtherAttributes => page
                .all_attributes()
                .into_iter()
                .filter(|(name, _)| {
                    !DEDICATED_ATTRIBUTES.contains(&name.as_str()) && !name.starts_with("data-")
                })
                .map(|(_, value)| value)
                .filter(|value| has_address_hint(value))
                .collect(),
            Locator::MetaContent => page
                .select(&META_SELECTOR)
                .filter_map(|meta| {
                    let attrs = meta.value();
                    let content = attrs.attr("content")?;
                    let name = attrs.attr("name").unwrap_or("").to_lowercase();
                    let property = attrs.attr("property").unwrap_or("").to_lowercase();
                    let relevant = content.contains('@')
                        || META_EMAIL_NAMES.contains(&name.as_str())
                        || META_EMAIL_PROPERTIES.contains(&property.as_str());
                    relevant.then(|| content.to_string())
                })
                .collect(),
            Locator::Svg => {
                let mut found = page.texts(&SVG_SELECTOR);
                for element in page.select(&SVG_DESCENDANTS) {
                    found.extend(
                        element
                            .value()
                            .attrs()
                            .map(|(_, value)| value)
                            .filter(|value| has_address_hint(value))
                            .map(str::to_string),
                    );
                }
                found
            }
            Locator::CustomElements => page
                .elements_named(|name| name.contains('-'))
                .iter()
                .flat_map(|element| {
                    let mut found = vec![element_text(element)];
                    found.extend(
                        element
                            .value()
                            .attrs()
                            .map(|(_, value)| value)
                            .filter(|value| has_address_hint(value))
                            .map(str::to_string),
                    );
                    found
                })
                .collect(),
            Locator::DataGroups => page
                .prefixed_attribute_groups("data-")
                .iter()
                .flat_map(|group| assemble_data_groups(group))
                .collect(),
            Locator::SchemaEmail => page
                .select(&SCHEMA_EMAIL_SELECTOR)
                .map(|prop| match prop.value().attr("content") {
                    Some(content) => content.trim().to_string(),
                    None => element_text(&prop),
                })
                .collect(),
            Locator::DataIframes => page
                .attr_values(&IFRAME_SELECTOR, "src")
                .into_iter()
                .filter(|src| src.starts_with("data:") && src.contains('@'))
                .collect(),
        }
    }
}

/// Re-assembles addresses from the data attributes of one element.
fn assemble_data_groups(group: &[(String, String)]) -> Vec<String> {
    let get = |key: &str| {
        group
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    };

    let mut assembled = Vec::new();
    if let (Some(user), Some(domain), Some(tld)) = (get("data-user"), get("data-domain"), get("data-tld")) {
        assembled.push(format!("{}@{}.{}", user, domain, tld));
    }
    if let (Some(name), Some(domain)) = (get("data-name"), get("data-domain")) {
        assembled.push(format!("{}@{}", name, domain));
    }
    if let (Some(user), Some(domain)) = (get("data-email-user"), get("data-email-domain")) {
        assembled.push(format!("{}@{}", user, domain));
    }
    if let (Some(user), Some(domain)) = (get("data-mail-user"), get("data-mail-domain")) {
        assembled.push(format!("{}@{}", user, domain));
    }
    assembled
}

/// Decoder switches taken from [`Config`].
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    pub base64: bool,
    pub rot13: bool,
    pub xor: bool,
    pub xor_keys: Vec<u32>,
    pub reversed: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions::from(&Config::default())
    }
}

impl From<&Config> for DecodeOptions {
    fn from(config: &Config) -> Self {
        Self {
            base64: config.decode_base64,
            rot13: config.decode_rot13,
            xor: config.decode_xor,
            xor_keys: config.xor_keys.clone(),
            reversed: config.check_reversed_text,
        }
    }
}

/// Extracts every email address a page carries.
#[derive(Debug, Clone, Default)]
pub struct PageExtractor {
    options: DecodeOptions,
}

impl PageExtractor {
    pub fn new(options: DecodeOptions) -> Self {
        Self { options }
    }

    /// Runs the whole location table over `html`.
    pub fn extract(&self, html: &str) -> EmailSet {
        let mut emails = EmailSet::new();
        if html.trim().is_empty() {
            return emails;
        }

        let page = PageDocument::parse(html);
        for (locator, extractor) in EXTRACTION_TABLE.iter() {
            for value in locator.locate(&page, html) {
                if value.is_empty() {
                    continue;
                }
                self.apply(*extractor, &value, &mut emails);
            }
        }
        emails
    }

    /// Runs the table over rendered HTML plus the strings only visible at runtime.
    pub fn extract_rendered(&self, rendered: &RenderedPage) -> EmailSet {
        let mut emails = self.extract(&rendered.html);
        for value in &rendered.dynamic_text {
            self.apply(Extractor::Script, value, &mut emails);
        }
        emails
    }

    fn apply(&self, extractor: Extractor, value: &str, out: &mut EmailSet) {
        match extractor {
            Extractor::Recognize => out.extend(recognizer::find_emails(value)),
            Extractor::Script => {
                out.extend(decoding::extract_js_emails(value));
                out.extend(recognizer::find_emails(value));
            }
            Extractor::Mailto => self.apply_mailto(value, out),
            Extractor::Strict => {
                let candidate = value.trim();
                if validator::is_valid(candidate) {
                    out.insert(candidate);
                }
            }
            Extractor::Reversed => {
                if self.options.reversed {
                    out.extend(recognizer::find_emails_with_reversed(value));
                } else {
                    out.extend(recognizer::find_emails(value));
                }
            }
            Extractor::Encoded => self.apply_encoded(value.trim(), out),
            Extractor::DataEncEmail => {
                if let Some(email) = decoding::decode_data_enc_email(value.trim()) {
                    tracing::debug!(target: "page_task", "Decoded data-enc-email attribute: {}", email);
                    out.insert(email);
                }
            }
            Extractor::JsonLd => self.apply_json_ld(value, out),
        }
    }

    fn apply_mailto(&self, value: &str, out: &mut EmailSet) {
        let trimmed = value.trim();
        let Some(target) = trimmed
            .get(..7)
            .filter(|scheme| scheme.eq_ignore_ascii_case("mailto:"))
            .map(|_| &trimmed[7..])
        else {
            if trimmed.contains('@') {
                out.extend(recognizer::find_emails(trimmed));
            }
            return;
        };

        let target = target.split('?').next().unwrap_or("");
        let decoded = urlencoding::decode(target)
            .map(|d| d.into_owned())
            .unwrap_or_else(|_| target.to_string());

        for part in decoded.split([',', ';']) {
            let email = decoding::deobfuscate_email(part.trim());
            if validator::is_valid(&email) {
                out.insert(email);
            } else if !email.is_empty() {
                tracing::debug!(target: "page_task", "Mailto content failed validation: {}", email);
            }
        }
    }

    fn apply_encoded(&self, value: &str, out: &mut EmailSet) {
        out.extend(recognizer::find_emails(value));

        if self.options.base64 && BASE64_VALUE.is_match(value) {
            out.extend(recognizer::find_emails(&decoding::decode_base64(value)));
        }
        if self.options.rot13 {
            out.extend(recognizer::find_emails(&decoding::rot13(value)));
        }
        if self.options.xor {
            for key in &self.options.xor_keys {
                out.extend(recognizer::find_emails(&decoding::xor_decode(value, *key)));
            }
        }
    }

    fn apply_json_ld(&self, value: &str, out: &mut EmailSet) {
        match serde_json::from_str::<serde_json::Value>(value) {
            Ok(json) => collect_json_emails(&json, out),
            Err(e) => {
                tracing::debug!(target: "page_task", "Error parsing JSON-LD: {}", e);
                out.extend(recognizer::find_emails(value));
            }
        }
    }
}

/// Walks a JSON-LD value for `email` properties and any string carrying an address.
fn collect_json_emails(value: &serde_json::Value, out: &mut EmailSet) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                if key.eq_ignore_ascii_case("email") {
                    if let Some(email) = child.as_str() {
                        let email = email.trim();
                        let email = email.strip_prefix("mailto:").unwrap_or(email);
                        if validator::is_valid(email) {
                            out.insert(email);
                            continue;
                        }
                    }
                }
                collect_json_emails(child, out);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_json_emails(item, out);
            }
        }
        serde_json::Value::String(s) if s.contains('@') || has_address_hint(s) => {
            out.extend(recognizer::find_emails(s));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str) -> Vec<String> {
        PageExtractor::default().extract(html).into_vec()
    }

    #[test]
    fn test_table_covers_every_location() {
        assert!(EXTRACTION_TABLE.len() >= 30);
    }

    #[test]
    fn test_plain_text_and_mailto() {
        let html = r#"<html><body>
            <p>Reach us: hello@acme.io</p>
            <a href="mailto:Sales%40acme.io?subject=Hi">write</a>
        </body></html>"#;
        assert_eq!(extract(html), vec!["hello@acme.io", "Sales@acme.io"]);
    }

    #[test]
    fn test_mailto_with_marker_and_multiple_targets() {
        let html = r#"<a href="mailto:jobs(at)acme.io,press@acme.io">x</a>"#;
        let found = extract(html);
        assert!(found.contains(&"jobs@acme.io".to_string()));
        assert!(found.contains(&"press@acme.io".to_string()));
    }

    #[test]
    fn test_placeholder_addresses_are_dropped() {
        let html = r#"<input type="email" placeholder="you@example.com" value="name@yourcompany.com">"#;
        assert!(extract(html).is_empty());
    }

    #[test]
    fn test_entity_encoded_address() {
        let html = "<p>info&#64;acme&#46;io</p>";
        assert_eq!(extract(html), vec!["info@acme.io"]);
    }

    #[test]
    fn test_script_reconstruction() {
        let html = r#"<script>var m = 'sup' + 'port'; m = m + '@' + 'acme'; m += '.io';</script>"#;
        assert_eq!(extract(html), vec!["support@acme.io"]);
    }

    #[test]
    fn test_data_attribute_groups() {
        let html = r#"<span data-user="team" data-domain="acme" data-tld="io"></span>
                      <span data-mail-user="billing" data-mail-domain="acme.io"></span>"#;
        assert_eq!(extract(html), vec!["team@acme.io", "billing@acme.io"]);
    }

    #[test]
    fn test_data_email_encodings() {
        let base64 = r#"<span data-email="aW5mb0BhY21lLmlv"></span>"#;
        assert_eq!(extract(base64), vec!["info@acme.io"]);

        let rot13 = r#"<span data-email="vasb@npzr.vb"></span>"#;
        assert!(extract(rot13).contains(&"info@acme.io".to_string()));

        let xored = decoding::xor_decode("info@acme.io", 7);
        let html = format!(r#"<span data-email="{}"></span>"#, xored);
        assert!(extract(&html).contains(&"info@acme.io".to_string()));
    }

    #[test]
    fn test_data_enc_email() {
        let html = r#"<a data-enc-email="vasb[at]npzr.vb">email</a>"#;
        assert!(extract(html).contains(&"info@acme.io".to_string()));
    }

    #[test]
    fn test_json_ld() {
        let html = r#"<script type="application/ld+json">
            {"@context": "https://schema.org", "@type": "Organization",
             "contactPoint": [{"@type": "ContactPoint", "email": "mailto:care@acme.io"}],
             "description": "or write to press(at)acme.io"}
        </script>"#;
        let found = extract(html);
        assert!(found.contains(&"care@acme.io".to_string()));
        assert!(found.contains(&"press@acme.io".to_string()));
    }

    #[test]
    fn test_comments_and_reversed_rtl() {
        let html = r#"<!-- oi.emca@spo --><p dir="rtl">oi.emca@selas</p>"#;
        let found = extract(html);
        assert!(found.contains(&"ops@acme.io".to_string()));
        assert!(found.contains(&"sales@acme.io".to_string()));

        let forward_only = PageExtractor::new(DecodeOptions {
            reversed: false,
            ..DecodeOptions::default()
        });
        assert!(forward_only.extract(html).is_empty());
    }

    #[test]
    fn test_schema_org_microdata() {
        let html = r#"<div itemscope itemtype="https://schema.org/Person">
            <span itemprop="email">jane@acme.io</span>
            <meta itemprop="email" content="j.doe@acme.io">
        </div>"#;
        let found = extract(html);
        assert!(found.contains(&"jane@acme.io".to_string()));
        assert!(found.contains(&"j.doe@acme.io".to_string()));
    }

    #[test]
    fn test_rendered_dynamic_text() {
        let rendered = RenderedPage {
            html: "<html><body>Loading…</body></html>".to_string(),
            dynamic_text: vec!["support[at]acme.io".to_string()],
        };
        assert_eq!(
            PageExtractor::default().extract_rendered(&rendered).into_vec(),
            vec!["support@acme.io"]
        );
    }

    #[test]
    fn test_rendered_snapshot_after_click() {
        let rendered = RenderedPage {
            html: r#"<html><body><a onclick="showMail()">Email us</a></body></html>"#.to_string(),
            dynamic_text: vec![
                r#"<html><body><a onclick="showMail()">Email us</a><span id="m">press@acme.io</span></body></html>"#
                    .to_string(),
            ],
        };
        assert_eq!(
            PageExtractor::default().extract_rendered(&rendered).into_vec(),
            vec!["press@acme.io"]
        );
    }

    #[test]
    fn test_empty_page() {
        assert!(extract("").is_empty());
        assert!(extract("<html><body><p>No contact here.</p></body></html>").is_empty());
    }
}
