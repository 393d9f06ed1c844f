//! Bounded same-domain crawl that collects likely contact pages.

use crate::browser::PageRenderer;
use crate::config::Config;
use crate::document::{PageDocument, element_text};
use crate::domain::{is_same_domain, normalize_link};
use crate::fetch::PageFetcher;
use crate::models::{ContactPageCandidate, Deadline, FetchedPage};
use crate::scorer;
use once_cell::sync::Lazy;
use scraper::Selector;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::time::timeout;
use url::Url;

static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

const SKIPPED_HREF_PREFIXES: &[&str] = &["javascript:", "#", "tel:", "mailto:"];

/// Scores every link of a page and returns the ones that look like contact
/// pages, best first. Each URL appears once, with its highest score.
pub fn score_links(html: &str, base: &Url) -> Vec<ContactPageCandidate> {
    let document = PageDocument::parse(html);
    let mut candidates: Vec<ContactPageCandidate> = document
        .select(&LINK_SELECTOR)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?.trim();
            let lowered = href.to_lowercase();
            if SKIPPED_HREF_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
                return None;
            }
            let url = normalize_link(href, base)?;
            let text = element_text(&anchor);
            let text = (!text.is_empty()).then_some(text.as_str());
            let score = scorer::score(url.as_str(), text);
            (score > 0).then_some(ContactPageCandidate { url, score })
        })
        .collect();

    candidates.sort_by(|a, b| b.score.cmp(&a.score));
    let mut seen = HashSet::new();
    candidates.retain(|c| seen.insert(c.url.as_str().to_string()));
    candidates
}

/// Mutable state of one discovery run. Never shared between site runs.
#[derive(Debug)]
pub struct CrawlState {
    start: Url,
    visited: HashSet<String>,
    contact_pages: Vec<Url>,
    deadline: Deadline,
    max_pages: usize,
    max_contact_pages: usize,
}

impl CrawlState {
    pub fn new(start: Url, deadline: Deadline, config: &Config) -> Self {
        Self {
            start,
            visited: HashSet::new(),
            contact_pages: Vec::new(),
            deadline,
            max_pages: config.max_pages_per_domain,
            max_contact_pages: config.max_contact_pages,
        }
    }

    /// Whether `url` may still be fetched in this run.
    pub fn should_visit(&self, url: &Url) -> bool {
        !self.visited.contains(url.as_str())
            && is_same_domain(url, &self.start)
            && self.visited.len() < self.max_pages
            && !self.deadline.is_expired()
    }

    pub fn mark_visited(&mut self, url: &Url) {
        self.visited.insert(url.as_str().to_string());
    }

    /// Accepts a contact page while under the cap. Returns `false` for
    /// duplicates, the start page and other-domain links.
    pub fn accept(&mut self, url: &Url) -> bool {
        if self.is_full()
            || url == &self.start
            || !is_same_domain(url, &self.start)
            || self.contact_pages.contains(url)
        {
            return false;
        }
        self.contact_pages.push(url.clone());
        true
    }

    pub fn is_full(&self) -> bool {
        self.contact_pages.len() >= self.max_contact_pages
    }

    pub fn is_done(&self) -> bool {
        self.is_full() || self.deadline.is_expired()
    }

    pub fn into_contact_pages(self) -> Vec<Url> {
        self.contact_pages
    }
}

/// Runs contact-page discovery for a site.
pub struct ContactCrawler {
    config: Arc<Config>,
    fetcher: Arc<dyn PageFetcher>,
    renderer: Option<Arc<dyn PageRenderer>>,
}

impl ContactCrawler {
    pub fn new(
        config: Arc<Config>,
        fetcher: Arc<dyn PageFetcher>,
        renderer: Option<Arc<dyn PageRenderer>>,
    ) -> Self {
        Self {
            config,
            fetcher,
            renderer,
        }
    }

    /// Finds up to `max_contact_pages` contact pages reachable from `start`.
    ///
    /// # Arguments
    /// * `start` - The site's homepage.
    /// * `seed` - The homepage when it was already fetched, to avoid a second request.
    /// * `deadline` - The site run's global deadline.
    ///
    /// # Returns
    /// * The accepted contact pages in discovery order. Empty when the search
    ///   timed out; never an error.
    pub async fn discover(
        &self,
        start: &Url,
        seed: Option<&FetchedPage>,
        deadline: &Deadline,
    ) -> Vec<Url> {
        let budget = deadline.clip(self.config.contact_page_search_timeout);
        let search_deadline = Deadline::new(budget);

        match timeout(budget, self.crawl(start, seed, search_deadline)).await {
            Ok(pages) => {
                tracing::info!(target: "crawl_task", "Found {} contact page(s) for {}", pages.len(), start);
                pages
            }
            Err(_) => {
                tracing::warn!(target: "crawl_task", "Contact page search timed out for {} after {:?}", start, budget);
                Vec::new()
            }
        }
    }

    async fn crawl(&self, start: &Url, seed: Option<&FetchedPage>, deadline: Deadline) -> Vec<Url> {
        let mut state = CrawlState::new(start.clone(), deadline, &self.config);
        let mut queue = VecDeque::from([(start.clone(), 0usize)]);

        while let Some((url, depth)) = queue.pop_front() {
            if state.is_done() {
                break;
            }
            if !state.should_visit(&url) {
                continue;
            }
            state.mark_visited(&url);

            let loaded = match seed.filter(|_| &url == start) {
                Some(page) => Some((page.url.clone(), page.html.clone())),
                None => self.load(&url).await,
            };
            let Some((base, html)) = loaded else {
                continue;
            };

            let candidates = score_links(&html, &base);
            tracing::debug!(target: "crawl_task", "{} scored {} candidate link(s) on {}", start, candidates.len(), base);

            for candidate in candidates {
                if state.accept(&candidate.url) {
                    tracing::debug!(target: "crawl_task", "Accepted contact page {} (score {})", candidate.url, candidate.score);
                }
                if depth < self.config.max_depth {
                    queue.push_back((candidate.url, depth + 1));
                }
            }
        }

        state.into_contact_pages()
    }

    /// HTTP first, browser when HTTP yields nothing.
    async fn load(&self, url: &Url) -> Option<(Url, String)> {
        match self.fetcher.fetch_page(url).await {
            Ok(page) if !page.html.trim().is_empty() => return Some((page.url, page.html)),
            Ok(_) => tracing::debug!(target: "crawl_task", "Empty body from {}", url),
            Err(e) => tracing::debug!(target: "crawl_task", "HTTP fetch failed for {}: {}", url, e),
        }

        let renderer = self.renderer.as_ref()?;
        match renderer.render_page(url).await {
            Ok(rendered) if !rendered.html.trim().is_empty() => Some((url.clone(), rendered.html)),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(target: "crawl_task", "Browser fallback failed for {}: {}", url, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, Result};
    use crate::models::RenderedPage;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    struct MapFetcher {
        pages: HashMap<String, String>,
        requested: Mutex<Vec<String>>,
    }

    impl MapFetcher {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(url, html)| (url.to_string(), html.to_string()))
                    .collect(),
                requested: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for MapFetcher {
        async fn fetch_page(&self, url: &Url) -> Result<FetchedPage> {
            self.requested.lock().unwrap().push(url.as_str().to_string());
            match self.pages.get(url.as_str()) {
                Some(html) => Ok(FetchedPage {
                    url: url.clone(),
                    html: html.clone(),
                }),
                None => Err(AppError::fetch(url.as_str(), "HTTP status 404 Not Found")),
            }
        }
    }

    struct StaticRenderer(String);

    #[async_trait]
    impl PageRenderer for StaticRenderer {
        async fn render_page(&self, _url: &Url) -> Result<RenderedPage> {
            Ok(RenderedPage {
                html: self.0.clone(),
                dynamic_text: Vec::new(),
            })
        }
    }

    const HOME: &str = r#"<html><body>
        <a href="/about">About</a>
        <a href="/products">Products</a>
        <a href="/contact">Contact Us</a>
        <a href="https://other.test/contact">Elsewhere</a>
        <a href="mailto:info@acme.test">Mail</a>
        <a href="javascript:void(0)">Contact</a>
        <a href="/contact#form">Contact form</a>
    </body></html>"#;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_score_links_ranks_and_dedupes() {
        let candidates = score_links(HOME, &url("https://acme.test/"));
        let urls: Vec<&str> = candidates.iter().map(|c| c.url.as_str()).collect();

        assert_eq!(urls.first(), Some(&"https://acme.test/contact"));
        assert_eq!(urls.iter().filter(|u| **u == "https://acme.test/contact").count(), 1);
        assert!(urls.contains(&"https://acme.test/about"));
        assert!(!urls.contains(&"https://acme.test/products"));
        assert!(!urls.iter().any(|u| u.starts_with("mailto") || u.starts_with("javascript")));
        assert!(candidates.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_crawl_state_eligibility() {
        let config = Config {
            max_pages_per_domain: 2,
            max_contact_pages: 1,
            ..Config::default()
        };
        let start = url("https://www.acme.test/");
        let mut state = CrawlState::new(start.clone(), Deadline::new(Duration::from_secs(60)), &config);

        assert!(state.should_visit(&start));
        assert!(state.should_visit(&url("https://shop.acme.test/")));
        assert!(!state.should_visit(&url("https://other.test/")));

        state.mark_visited(&start);
        assert!(!state.should_visit(&start));
        state.mark_visited(&url("https://www.acme.test/a"));
        assert!(!state.should_visit(&url("https://www.acme.test/b")));

        assert!(!state.accept(&start));
        assert!(state.accept(&url("https://www.acme.test/contact")));
        assert!(state.is_full());
        assert!(!state.accept(&url("https://www.acme.test/kontakt")));
    }

    #[test]
    fn test_expired_deadline_blocks_visits() {
        let config = Config::default();
        let start = url("https://acme.test/");
        let state = CrawlState::new(start.clone(), Deadline::new(Duration::ZERO), &config);
        assert!(!state.should_visit(&start));
        assert!(state.is_done());
    }

    #[tokio::test]
    async fn test_discover_finds_contact_page() {
        let fetcher = Arc::new(MapFetcher::new(&[
            ("https://acme.test/", HOME),
            ("https://acme.test/contact", "<html><body>info@acme.test</body></html>"),
        ]));
        let crawler = ContactCrawler::new(Arc::new(Config::default()), fetcher, None);

        let pages = crawler
            .discover(&url("https://acme.test/"), None, &Deadline::new(Duration::from_secs(60)))
            .await;

        assert_eq!(pages.first().map(Url::as_str), Some("https://acme.test/contact"));
        assert!(pages.len() <= 3);
        assert!(pages.iter().all(|p| p.host_str() == Some("acme.test")));
    }

    #[tokio::test]
    async fn test_discover_uses_seed_page() {
        let fetcher = Arc::new(MapFetcher::new(&[]));
        let crawler = ContactCrawler::new(Arc::new(Config::default()), fetcher.clone(), None);
        let start = url("https://acme.test/");
        let seed = FetchedPage {
            url: start.clone(),
            html: HOME.to_string(),
        };

        let pages = crawler
            .discover(&start, Some(&seed), &Deadline::new(Duration::from_secs(60)))
            .await;

        assert_eq!(pages.first().map(Url::as_str), Some("https://acme.test/contact"));
        assert!(!fetcher.requested().contains(&start.as_str().to_string()));
    }

    #[tokio::test]
    async fn test_discover_falls_back_to_renderer() {
        let fetcher = Arc::new(MapFetcher::new(&[]));
        let renderer = Arc::new(StaticRenderer(HOME.to_string()));
        let crawler = ContactCrawler::new(Arc::new(Config::default()), fetcher, Some(renderer));

        let pages = crawler
            .discover(&url("https://acme.test/"), None, &Deadline::new(Duration::from_secs(60)))
            .await;

        assert_eq!(pages.first().map(Url::as_str), Some("https://acme.test/contact"));
    }

    #[tokio::test]
    async fn test_discover_stays_on_site_under_shared_suffix() {
        let home = r#"<html><body>
            <a href="/contact">Contact</a>
            <a href="https://www.economie.gouv.fr/contact">Contact</a>
        </body></html>"#;
        let fetcher = Arc::new(MapFetcher::new(&[
            ("https://www.interieur.gouv.fr/", home),
            ("https://www.interieur.gouv.fr/contact", "<html><body></body></html>"),
            ("https://www.economie.gouv.fr/contact", "<html><body></body></html>"),
        ]));
        let crawler = ContactCrawler::new(Arc::new(Config::default()), fetcher.clone(), None);

        let pages = crawler
            .discover(
                &url("https://www.interieur.gouv.fr/"),
                None,
                &Deadline::new(Duration::from_secs(60)),
            )
            .await;

        let pages: Vec<&str> = pages.iter().map(Url::as_str).collect();
        assert_eq!(pages, vec!["https://www.interieur.gouv.fr/contact"]);
        assert!(
            !fetcher
                .requested()
                .iter()
                .any(|u| u.contains("economie.gouv.fr"))
        );
    }

    #[tokio::test]
    async fn test_discover_with_expired_deadline_is_empty() {
        let fetcher = Arc::new(MapFetcher::new(&[("https://acme.test/", HOME)]));
        let crawler = ContactCrawler::new(Arc::new(Config::default()), fetcher.clone(), None);

        let pages = crawler
            .discover(&url("https://acme.test/"), None, &Deadline::new(Duration::ZERO))
            .await;

        assert!(pages.is_empty());
        assert!(fetcher.requested().is_empty());
    }
}
