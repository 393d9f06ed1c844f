//! Lightweight HTTP page retrieval.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::FetchedPage;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use std::sync::Arc;
use url::Url;

/// Retrieves the HTML of a page without running scripts.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage>;
}

/// [`PageFetcher`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    config: Arc<Config>,
}

impl HttpFetcher {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.http_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| AppError::Generic(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    async fn fetch_once(&self, url: &Url) -> std::result::Result<FetchedPage, Attempt> {
        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, self.config.random_user_agent())
            .send()
            .await
            .map_err(Attempt::Transport)?;

        let status = response.status();
        tracing::debug!(target: "page_task", "GET {} status: {}", url, status);
        if status != reqwest::StatusCode::OK {
            return Err(Attempt::Rejected(format!("HTTP status {}", status)));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        if !content_type.contains("text/html") {
            return Err(Attempt::Rejected(format!(
                "non-HTML content type '{}'",
                content_type
            )));
        }

        let final_url = response.url().clone();
        let html = response.text().await.map_err(Attempt::Transport)?;
        Ok(FetchedPage {
            url: final_url,
            html,
        })
    }
}

/// Outcome of a failed attempt: transport errors are retried, rejections are not.
enum Attempt {
    Transport(reqwest::Error),
    Rejected(String),
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage> {
        let attempts = self.config.max_retries.max(1);
        let mut attempt = 1;

        loop {
            match self.fetch_once(url).await {
                Ok(page) => return Ok(page),
                Err(Attempt::Rejected(reason)) => {
                    tracing::debug!(target: "page_task", "Skipping {}: {}", url, reason);
                    return Err(AppError::fetch(url.as_str(), reason));
                }
                Err(Attempt::Transport(e)) => {
                    if e.is_timeout() {
                        tracing::warn!(target: "page_task", "Timeout fetching {} (attempt {}/{}): {}", url, attempt, attempts, e);
                    } else if e.is_connect() || e.is_request() {
                        tracing::warn!(target: "page_task", "Request/Connection error fetching {} (attempt {}/{}): {}", url, attempt, attempts, e);
                    } else {
                        tracing::warn!(target: "page_task", "Unexpected error fetching {} (attempt {}/{}): {}", url, attempt, attempts, e);
                    }

                    if attempt >= attempts {
                        return Err(AppError::Request(e));
                    }
                    let backoff = self.config.backoff_for_attempt(attempt);
                    tracing::debug!(target: "page_task", "Retrying {} in {:?}", url, backoff);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}
