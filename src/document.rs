//! Read-only view over a parsed HTML page.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());
static ANY_ELEMENT: Lazy<Selector> = Lazy::new(|| Selector::parse("*").unwrap());

/// Elements whose text never reaches the rendered page.
const HIDDEN_TEXT_PARENTS: &[&str] = &["script", "style", "noscript", "template"];

/// A parsed page.
///
/// Wraps [`scraper::Html`], which is not `Send`: build it, query it and drop
/// it without crossing an `.await`.
pub struct PageDocument {
    html: Html,
}

impl PageDocument {
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    pub fn select<'a>(&'a self, selector: &'a Selector) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        self.html.select(selector)
    }

    /// Text of the body (or the whole document), one space between fragments,
    /// excluding script and style content.
    pub fn visible_text(&self) -> String {
        let root = self
            .html
            .select(&BODY_SELECTOR)
            .next()
            .unwrap_or_else(|| self.html.root_element());

        let mut text_content = String::new();
        for node in root.descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            let hidden = node
                .parent()
                .and_then(|parent| parent.value().as_element().map(|e| e.name().to_string()))
                .is_some_and(|name| HIDDEN_TEXT_PARENTS.contains(&name.as_str()));
            let fragment = text.trim();
            if hidden || fragment.is_empty() {
                continue;
            }
            text_content.push_str(fragment);
            text_content.push(' ');
        }
        text_content
    }

    /// Text content of every element matching `selector`.
    pub fn texts(&self, selector: &Selector) -> Vec<String> {
        self.html
            .select(selector)
            .map(|element| element_text(&element))
            .filter(|text| !text.is_empty())
            .collect()
    }

    /// Values of `attr` on every element matching `selector`.
    pub fn attr_values(&self, selector: &Selector, attr: &str) -> Vec<String> {
        self.html
            .select(selector)
            .filter_map(|element| element.value().attr(attr))
            .map(str::to_string)
            .collect()
    }

    /// Every `(name, value)` attribute pair in the document, in document order.
    pub fn all_attributes(&self) -> Vec<(String, String)> {
        self.html
            .select(&ANY_ELEMENT)
            .flat_map(|element| {
                element
                    .value()
                    .attrs()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Values of all attributes whose name starts with `prefix`.
    pub fn prefixed_attribute_values(&self, prefix: &str) -> Vec<String> {
        self.all_attributes()
            .into_iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(_, value)| value)
            .collect()
    }

    /// Attributes starting with `prefix`, grouped per element. Elements without
    /// such attributes are skipped.
    pub fn prefixed_attribute_groups(&self, prefix: &str) -> Vec<Vec<(String, String)>> {
        self.html
            .select(&ANY_ELEMENT)
            .map(|element| {
                element
                    .value()
                    .attrs()
                    .filter(|(name, _)| name.starts_with(prefix))
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect::<Vec<_>>()
            })
            .filter(|group| !group.is_empty())
            .collect()
    }

    /// Elements whose tag name satisfies `predicate`.
    pub fn elements_named(&self, predicate: impl Fn(&str) -> bool) -> Vec<ElementRef<'_>> {
        self.html
            .select(&ANY_ELEMENT)
            .filter(|element| predicate(element.value().name()))
            .collect()
    }

    /// Contents of all HTML comments.
    pub fn comments(&self) -> Vec<String> {
        self.html
            .tree
            .nodes()
            .filter_map(|node| node.value().as_comment().map(|c| c.comment.to_string()))
            .collect()
    }
}

/// Text content of an element, fragments trimmed and joined by a space.
pub fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>Acme</title><style>.x { color: red }</style></head>
<body>
  <!-- contact: ops(at)acme.io -->
  <h1>Hello</h1>
  <p data-user="info" data-domain="acme" data-tld="io">Write  <b>us</b></p>
  <script>var hidden = 1;</script>
  <acme-card aria-label="card">Card</acme-card>
</body></html>"#;

    #[test]
    fn test_visible_text_skips_scripts() {
        let doc = PageDocument::parse(PAGE);
        let text = doc.visible_text();
        assert!(text.contains("Hello"));
        assert!(text.contains("Write us"));
        assert!(!text.contains("hidden"));
        assert!(!text.contains("color"));
    }

    #[test]
    fn test_comments() {
        let doc = PageDocument::parse(PAGE);
        assert_eq!(doc.comments(), vec![" contact: ops(at)acme.io "]);
    }

    #[test]
    fn test_attribute_queries() {
        let doc = PageDocument::parse(PAGE);
        let groups = doc.prefixed_attribute_groups("data-");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 3);
        assert_eq!(doc.prefixed_attribute_values("aria-"), vec!["card"]);

        let p = Selector::parse("p").unwrap();
        assert_eq!(doc.attr_values(&p, "data-user"), vec!["info"]);
        assert_eq!(doc.texts(&p), vec!["Write us"]);
    }

    #[test]
    fn test_custom_elements() {
        let doc = PageDocument::parse(PAGE);
        let custom = doc.elements_named(|name| name.contains('-'));
        assert_eq!(custom.len(), 1);
        assert_eq!(element_text(&custom[0]), "Card");
    }
}
