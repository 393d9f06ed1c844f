//! Site-level extraction policy: cheap HTTP passes first, the browser only
//! when nothing was found.

use crate::browser::PageRenderer;
use crate::config::Config;
use crate::crawler::{ContactCrawler, score_links};
use crate::dns::MxVerifier;
use crate::domain::{email_domain, is_same_domain, normalize_input_url};
use crate::fetch::PageFetcher;
use crate::models::{Deadline, EmailSet, FetchedPage};
use crate::page_extractor::{DecodeOptions, PageExtractor};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::timeout;
use url::Url;

/// Stages of a site run, in the order they are attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    HomepageHttp,
    DiscoverContactPages,
    ContactHttp,
    HomepageBrowser,
    ContactBrowser,
}

/// State owned by one `extract_emails_from_site` call.
struct SiteExtractionSession {
    start: Url,
    deadline: Deadline,
    emails: EmailSet,
    mx_cache: HashMap<String, bool>,
}

impl SiteExtractionSession {
    fn new(start: Url, deadline: Deadline) -> Self {
        Self {
            start,
            deadline,
            emails: EmailSet::new(),
            mx_cache: HashMap::new(),
        }
    }

    fn is_done(&self) -> bool {
        !self.emails.is_empty()
    }

    /// Whether `stage` may start. Logs the reason when it may not.
    fn enter(&self, stage: Stage) -> bool {
        if self.deadline.is_expired() {
            tracing::info!(target: "site_task",
                "Global deadline reached for {} after {:?}, skipping {:?}",
                self.start, self.deadline.elapsed(), stage
            );
            return false;
        }
        tracing::debug!(target: "site_task", "{}: entering {:?}", self.start, stage);
        true
    }
}

/// Finds email addresses on websites.
///
/// Holds the network capabilities; every call owns its own crawl and
/// session state, so one instance can serve concurrent site runs.
pub struct EmailExtractor {
    config: Arc<Config>,
    fetcher: Arc<dyn PageFetcher>,
    renderer: Option<Arc<dyn PageRenderer>>,
    mx: Option<Arc<dyn MxVerifier>>,
    pages: PageExtractor,
}

impl EmailExtractor {
    pub fn new(config: Arc<Config>, fetcher: Arc<dyn PageFetcher>) -> Self {
        let pages = PageExtractor::new(DecodeOptions::from(config.as_ref()));
        Self {
            config,
            fetcher,
            renderer: None,
            mx: None,
            pages,
        }
    }

    /// Enables the browser stages. Ignored when the browser is disabled in config.
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        if self.config.browser_enabled {
            self.renderer = Some(renderer);
        }
        self
    }

    /// Enables MX filtering. Ignored when MX verification is disabled in config.
    pub fn with_mx_verifier(mut self, mx: Arc<dyn MxVerifier>) -> Self {
        if self.config.verify_mx_records {
            self.mx = Some(mx);
        }
        self
    }

    fn crawler(&self) -> ContactCrawler {
        ContactCrawler::new(
            self.config.clone(),
            self.fetcher.clone(),
            self.renderer.clone(),
        )
    }

    /// Returns up to `max_contact_pages` likely contact pages of a site.
    pub async fn extract_contact_pages(&self, site_url: &str) -> Vec<Url> {
        let start = match normalize_input_url(site_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(target: "crawl_task", "Skipping contact page search: {}", e);
                return Vec::new();
            }
        };
        let deadline = Deadline::new(self.config.global_timeout);
        self.crawler().discover(&start, None, &deadline).await
    }

    /// Extracts the emails of a single page: HTTP first, browser when HTTP
    /// finds nothing. MX filtering applies.
    pub async fn extract_emails_from_page(&self, url: &str) -> EmailSet {
        let page_url = match normalize_input_url(url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(target: "page_task", "Skipping page: {}", e);
                return EmailSet::new();
            }
        };
        let mut session =
            SiteExtractionSession::new(page_url.clone(), Deadline::new(self.config.global_timeout));

        let (found, _) = self.fetch_and_extract(&page_url).await;
        self.accept(&mut session, found).await;

        if !session.is_done() && !session.deadline.is_expired() {
            let (found, _) = self.render_and_extract(&page_url, &session.deadline).await;
            self.accept(&mut session, found).await;
        }
        session.emails
    }

    /// Runs the full site policy and returns every email found before the
    /// run ended. Never fails: problems are logged and yield a partial or
    /// empty set.
    ///
    /// # Arguments
    /// * `url` - The site, with or without scheme.
    ///
    /// # Returns
    /// * The ordered, deduplicated emails accumulated across the stages attempted.
    pub async fn extract_emails_from_site(&self, url: &str) -> EmailSet {
        let start = match normalize_input_url(url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(target: "site_task", "Rejected input '{}': {}", url, e);
                return EmailSet::new();
            }
        };

        tracing::info!(target: "site_task", "Starting extraction for {}", start);
        let deadline = Deadline::new(self.config.global_timeout);
        let mut session = SiteExtractionSession::new(start.clone(), deadline);

        if timeout(deadline.remaining(), self.run_stages(&mut session))
            .await
            .is_err()
        {
            tracing::warn!(target: "site_task", "Extraction for {} timed out after {:?}", start, deadline.elapsed());
        }

        tracing::info!(target: "site_task",
            "Finished {} with {} email(s) in {:?}", start, session.emails.len(), deadline.elapsed()
        );
        session.emails
    }

    async fn run_stages(&self, session: &mut SiteExtractionSession) {
        let start = session.start.clone();

        if !session.enter(Stage::HomepageHttp) {
            return;
        }
        let (found, homepage) = self.fetch_and_extract(&start).await;
        self.accept(session, found).await;
        if session.is_done() {
            return;
        }

        if !session.enter(Stage::DiscoverContactPages) {
            return;
        }
        let contact_pages = self
            .crawler()
            .discover(&start, homepage.as_ref(), &session.deadline)
            .await;

        if !session.enter(Stage::ContactHttp) {
            return;
        }
        for page in &contact_pages {
            if session.deadline.is_expired() {
                break;
            }
            let (found, _) = self.fetch_and_extract(page).await;
            self.accept(session, found).await;
        }
        if session.is_done() || self.renderer.is_none() {
            return;
        }

        if !session.enter(Stage::HomepageBrowser) {
            return;
        }
        let (found, rendered_home) = self.render_and_extract(&start, &session.deadline).await;
        self.accept(session, found).await;
        if session.is_done() {
            return;
        }

        if !session.enter(Stage::ContactBrowser) {
            return;
        }
        let mut browser_pages = contact_pages;
        if let Some(html) = rendered_home {
            for candidate in score_links(&html, &start) {
                if browser_pages.len() >= self.config.max_contact_pages {
                    break;
                }
                if candidate.url != start
                    && is_same_domain(&candidate.url, &start)
                    && !browser_pages.contains(&candidate.url)
                {
                    browser_pages.push(candidate.url);
                }
            }
        }
        for page in &browser_pages {
            if session.deadline.is_expired() {
                break;
            }
            let (found, _) = self.render_and_extract(page, &session.deadline).await;
            self.accept(session, found).await;
        }
    }

    /// Extracts a page fetched over HTTP. Also returns the page for reuse.
    async fn fetch_and_extract(&self, url: &Url) -> (EmailSet, Option<FetchedPage>) {
        match self.fetcher.fetch_page(url).await {
            Ok(page) => {
                let found = self.pages.extract(&page.html);
                tracing::debug!(target: "page_task", "HTTP {} yielded {} email(s)", url, found.len());
                (found, Some(page))
            }
            Err(e) => {
                tracing::debug!(target: "page_task", "HTTP fetch of {} failed: {}", url, e);
                (EmailSet::new(), None)
            }
        }
    }

    /// Extracts a page through the browser, bounded by the browser timeout
    /// clipped to `deadline`. Also returns the rendered HTML.
    async fn render_and_extract(&self, url: &Url, deadline: &Deadline) -> (EmailSet, Option<String>) {
        let Some(renderer) = &self.renderer else {
            return (EmailSet::new(), None);
        };
        let budget = deadline.clip(self.config.browser_timeout);

        match timeout(budget, renderer.render_page(url)).await {
            Ok(Ok(rendered)) => {
                let found = self.pages.extract_rendered(&rendered);
                tracing::debug!(target: "browser_task", "Browser {} yielded {} email(s)", url, found.len());
                (found, Some(rendered.html))
            }
            Ok(Err(e)) => {
                tracing::warn!(target: "browser_task", "Browser extraction failed for {}: {}", url, e);
                (EmailSet::new(), None)
            }
            Err(_) => {
                tracing::warn!(target: "browser_task", "Browser extraction timed out for {} after {:?}", url, budget);
                (EmailSet::new(), None)
            }
        }
    }

    /// Adds `found` to the session, dropping emails whose domain has no MX record.
    async fn accept(&self, session: &mut SiteExtractionSession, found: EmailSet) {
        for email in found {
            if session.emails.contains(&email) {
                continue;
            }
            if self.passes_mx(session, &email).await {
                session.emails.insert(email);
            } else {
                tracing::info!(target: "mx_task", "Dropping {}: domain has no MX record", email);
            }
        }
    }

    async fn passes_mx(&self, session: &mut SiteExtractionSession, email: &str) -> bool {
        let Some(mx) = &self.mx else {
            return true;
        };
        let Some(domain) = email_domain(email) else {
            return true;
        };
        if let Some(known) = session.mx_cache.get(&domain) {
            return *known;
        }

        let budget = session.deadline.clip(self.config.dns_timeout * 2);
        let has_mx = match timeout(budget, mx.has_mx(&domain)).await {
            Ok(has_mx) => has_mx,
            Err(_) => {
                tracing::warn!(target: "mx_task", "MX check for {} ran out of time, keeping its emails", domain);
                true
            }
        };
        session.mx_cache.insert(domain, has_mx);
        has_mx
    }
}
