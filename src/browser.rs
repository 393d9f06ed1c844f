//! Browser rendering through a WebDriver session.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::RenderedPage;
use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::map::Map as JsonMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use url::Url;

/// Retrieves a page after scripts ran, with runtime-only strings.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render_page(&self, url: &Url) -> Result<RenderedPage>;
}

/// Clicks the first visible control whose label matches an accept keyword.
const DISMISS_COOKIE_BANNER: &str = r##"
const keywords = arguments[0];
const controls = document.querySelectorAll(
  'button, a, [role="button"], input[type="button"], input[type="submit"]');
for (const el of controls) {
  const label = (el.innerText || el.value || '').trim().toLowerCase();
  if (!label) continue;
  const rect = el.getBoundingClientRect();
  if (rect.width === 0 || rect.height === 0) continue;
  if (keywords.some(k => label === k || label.startsWith(k + ' '))) {
    el.click();
    return label;
  }
}
return null;
"##;

const SCROLL_STEP: &str = r##"
window.scrollBy(0, arguments[0]);
return document.body ? document.body.scrollHeight : 0;
"##;

/// Elements whose click handlers tend to write out a hidden address.
const REVEAL_ON_CLICK: &str = r#"[onclick*="mail"], [onclick*="email"]"#;

/// Storage values, open shadow roots, generated content and live innerText.
const COLLECT_DYNAMIC_TEXT: &str = r##"
const out = [];
const push = v => { if (typeof v === 'string' && v.trim()) out.push(v); };
for (const store of [window.localStorage, window.sessionStorage]) {
  try {
    for (let i = 0; i < store.length; i++) push(store.getItem(store.key(i)));
  } catch (e) {}
}
for (const el of document.querySelectorAll('*')) {
  if (el.shadowRoot) push(el.shadowRoot.textContent);
  for (const pseudo of ['::before', '::after']) {
    const content = getComputedStyle(el, pseudo).content;
    if (content && content !== 'none' && content !== 'normal') {
      push(content.replace(/^["']|["']$/g, ''));
    }
  }
}
if (document.body) push(document.body.innerText);
return out;
"##;

/// [`PageRenderer`] driving one WebDriver session.
///
/// The session is opened on first use and shared by every render of a
/// batch; the mutex serializes navigation since the session has one tab.
/// Call [`BrowserRenderer::close`] when the batch is done.
pub struct BrowserRenderer {
    config: Arc<Config>,
    client: Mutex<Option<Client>>,
    unavailable: AtomicBool,
}

impl BrowserRenderer {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            client: Mutex::new(None),
            unavailable: AtomicBool::new(false),
        }
    }

    async fn connect(&self) -> Result<Client> {
        let webdriver_url = &self.config.webdriver_url;
        tracing::debug!(target: "browser_task", "Connecting to WebDriver at {}...", webdriver_url);

        let mut args = vec![
            "--no-sandbox",
            "--disable-gpu",
            "--disable-dev-shm-usage",
            "--window-size=1280,1024",
            "--disable-extensions",
            "--disable-background-networking",
            "--disable-sync",
            "--mute-audio",
            "--ignore-certificate-errors",
            "--log-level=1",
        ];
        if self.config.headless {
            args.insert(0, "--headless=new");
        }
        let user_agent = format!("--user-agent={}", self.config.random_user_agent());

        let mut chrome_opts = JsonMap::new();
        chrome_opts.insert(
            "args".to_string(),
            serde_json::json!(args.into_iter().map(String::from).chain([user_agent]).collect::<Vec<_>>()),
        );

        let mut caps = JsonMap::new();
        caps.insert("browserName".to_string(), serde_json::json!("chrome"));
        caps.insert("goog:chromeOptions".to_string(), serde_json::json!(chrome_opts));
        tracing::trace!(target: "browser_task", "WebDriver capabilities: {:?}", caps);

        let mut builder = ClientBuilder::native();
        builder.capabilities(caps);

        match builder.connect(webdriver_url).await {
            Ok(client) => {
                tracing::info!(target: "browser_task", "WebDriver client connected successfully.");
                Ok(client)
            }
            Err(e) => {
                tracing::error!(target: "browser_task", "Failed to connect to WebDriver at {}: {}", webdriver_url, e);
                Err(e.into())
            }
        }
    }

    /// Closes the WebDriver session if one was opened.
    pub async fn close(&self) {
        let Some(client) = self.client.lock().await.take() else {
            return;
        };
        tracing::debug!(target: "browser_task", "Closing WebDriver client...");
        if let Err(e) = client.close().await {
            tracing::warn!(target: "browser_task", "Failed to close WebDriver client cleanly: {}", e);
        }
    }

    async fn dismiss_cookie_banner(&self, client: &Client) {
        let keywords: Vec<String> = self
            .config
            .accept_cookie_keywords
            .iter()
            .map(|k| k.to_lowercase())
            .collect();
        let attempt = client.execute(DISMISS_COOKIE_BANNER, vec![serde_json::json!(keywords)]);

        match timeout(self.config.cookie_banner_timeout, attempt).await {
            Ok(Ok(serde_json::Value::String(label))) => {
                tracing::debug!(target: "browser_task", "Dismissed cookie banner via '{}'", label);
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::debug!(target: "browser_task", "Cookie banner check failed: {}", e);
            }
            Err(_) => {
                tracing::debug!(target: "browser_task", "Cookie banner check timed out");
            }
        }
    }

    async fn scroll(&self, client: &Client) {
        for _ in 0..self.config.scroll_steps {
            if let Err(e) = client
                .execute(SCROLL_STEP, vec![serde_json::json!(self.config.scroll_step)])
                .await
            {
                tracing::debug!(target: "browser_task", "Scrolling stopped: {}", e);
                break;
            }
            sleep(self.config.scroll_pause).await;
        }
    }

    async fn collect_dynamic_text(&self, client: &Client) -> Vec<String> {
        match client.execute(COLLECT_DYNAMIC_TEXT, vec![]).await {
            Ok(serde_json::Value::Array(values)) => values
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Ok(_) => Vec::new(),
            Err(e) => {
                tracing::debug!(target: "browser_task", "Could not collect dynamic text: {}", e);
                Vec::new()
            }
        }
    }

    /// Clicks up to `max_interactions` reveal handlers and returns each page
    /// source that differs from the last one seen.
    async fn reveal_hidden_content(&self, client: &Client, html: &str) -> Vec<String> {
        let limit = interaction_limit(&self.config);
        if limit == 0 {
            return Vec::new();
        }

        let elements = match client.find_all(Locator::Css(REVEAL_ON_CLICK)).await {
            Ok(elements) => elements,
            Err(e) => {
                tracing::debug!(target: "browser_task", "Could not look up click handlers: {}", e);
                return Vec::new();
            }
        };

        let mut revealed = Vec::new();
        let mut last = html.to_string();
        for element in elements.into_iter().take(limit) {
            if let Err(e) = element.click().await {
                tracing::debug!(target: "browser_task", "Click on reveal handler failed: {}", e);
                continue;
            }
            sleep(self.config.interaction_pause).await;

            match client.source().await {
                Ok(updated) if updated != last => {
                    last = updated.clone();
                    revealed.push(updated);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(target: "browser_task", "Page source unavailable after click: {}", e);
                    break;
                }
            }
        }

        if !revealed.is_empty() {
            tracing::debug!(target: "browser_task", "Clicks revealed {} updated snapshot(s)", revealed.len());
        }
        revealed
    }
}

/// Number of reveal handlers to click per page; zero when interactions are off.
fn interaction_limit(config: &Config) -> usize {
    if config.simulate_interactions {
        config.max_interactions
    } else {
        0
    }
}

#[async_trait]
impl PageRenderer for BrowserRenderer {
    async fn render_page(&self, url: &Url) -> Result<RenderedPage> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(AppError::fetch(url.as_str(), "browser unavailable"));
        }

        let mut guard = self.client.lock().await;
        let client = match guard.as_ref() {
            Some(client) => client.clone(),
            None => match self.connect().await {
                Ok(client) => {
                    *guard = Some(client.clone());
                    client
                }
                Err(e) => {
                    self.unavailable.store(true, Ordering::Relaxed);
                    return Err(e);
                }
            },
        };

        tracing::debug!(target: "browser_task", "Navigating to {}", url);
        match timeout(self.config.navigation_timeout, client.goto(url.as_str())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(AppError::Timeout(format!("navigation to {}", url))),
        }

        self.dismiss_cookie_banner(&client).await;
        self.scroll(&client).await;

        let html = client.source().await?;
        let mut dynamic_text = self.collect_dynamic_text(&client).await;
        dynamic_text.extend(self.reveal_hidden_content(&client, &html).await);
        drop(guard);

        tracing::debug!(target: "browser_task",
            "Rendered {} ({} bytes, {} dynamic strings)", url, html.len(), dynamic_text.len()
        );
        Ok(RenderedPage { html, dynamic_text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interaction_limit_follows_config() {
        let config = Config::default();
        assert_eq!(interaction_limit(&config), 5);

        let disabled = Config {
            simulate_interactions: false,
            ..Config::default()
        };
        assert_eq!(interaction_limit(&disabled), 0);

        let capped = Config {
            max_interactions: 1,
            ..Config::default()
        };
        assert_eq!(interaction_limit(&capped), 1);
    }

    #[tokio::test]
    async fn test_unavailable_browser_fails_fast() {
        let renderer = BrowserRenderer::new(Arc::new(Config::default()));
        renderer.unavailable.store(true, Ordering::Relaxed);

        let result = renderer
            .render_page(&Url::parse("https://acme.test/").unwrap())
            .await;
        assert!(matches!(result, Err(AppError::Fetch { .. })));
    }
}
