//! Runs site extractions for the CLI and the API and persists their results.

use crate::browser::BrowserRenderer;
use crate::config::Config;
use crate::dns::DnsMxVerifier;
use crate::domain::normalize_input_url;
use crate::error::Result;
use crate::extractor::EmailExtractor;
use crate::fetch::HttpFetcher;
use crate::models::SiteReport;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::OpenOptions;
use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Everything a batch needs: the configured extractor and the browser
/// session it may open.
///
/// The browser session is shared by all sites of the batch and must be
/// released with [`Harvester::shutdown`].
pub struct Harvester {
    config: Arc<Config>,
    extractor: Arc<EmailExtractor>,
    browser: Option<Arc<BrowserRenderer>>,
}

impl Harvester {
    /// Builds the HTTP client, the DNS resolver and the (lazily connected)
    /// browser from `config`.
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(config.clone())?);
        let mut extractor = EmailExtractor::new(config.clone(), fetcher);

        if config.verify_mx_records {
            match DnsMxVerifier::new(&config) {
                Ok(mx) => extractor = extractor.with_mx_verifier(Arc::new(mx)),
                Err(e) => {
                    tracing::warn!(target: "batch_task", "MX verification unavailable, keeping all emails: {}", e);
                }
            }
        }

        let browser = config
            .browser_enabled
            .then(|| Arc::new(BrowserRenderer::new(config.clone())));
        if let Some(browser) = &browser {
            extractor = extractor.with_renderer(browser.clone());
        }

        Ok(Self {
            config,
            extractor: Arc::new(extractor),
            browser,
        })
    }

    /// Wraps an already configured extractor, without a browser session to manage.
    pub fn from_extractor(config: Arc<Config>, extractor: EmailExtractor) -> Self {
        Self {
            config,
            extractor: Arc::new(extractor),
            browser: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Closes the browser session if one was opened.
    pub async fn shutdown(&self) {
        if let Some(browser) = &self.browser {
            browser.close().await;
        }
    }

    pub async fn process_url(&self, url: &str) -> SiteReport {
        process_url(&self.extractor, url).await
    }

    /// Processes `urls` with at most `max_concurrency` sites in flight.
    /// Reports come back in input order; a failing site never stops the batch.
    pub async fn process_batch(&self, urls: Vec<String>, show_progress: bool) -> Vec<SiteReport> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let progress_bar = if show_progress {
            let bar = ProgressBar::new(urls.len() as u64);
            match ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            {
                Ok(style) => bar.set_style(style.progress_chars("##-")),
                Err(e) => tracing::debug!(target: "batch_task", "Keeping default progress style: {}", e),
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        tracing::info!(target: "batch_task", "Processing {} site(s) with concurrency {}", urls.len(), self.config.max_concurrency);

        let tasks: Vec<_> = urls
            .iter()
            .cloned()
            .map(|url| {
                let extractor = self.extractor.clone();
                let semaphore = semaphore.clone();
                let progress_bar = progress_bar.clone();
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    progress_bar.set_message(url.clone());
                    let report = process_url(&extractor, &url).await;
                    progress_bar.inc(1);
                    report
                })
            })
            .collect();

        let mut reports = Vec::with_capacity(urls.len());
        for (url, joined) in urls.into_iter().zip(futures::future::join_all(tasks).await) {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(target: "batch_task", "Task for {} failed: {}", url, e);
                    reports.push(SiteReport {
                        url,
                        emails: Vec::new(),
                        error: Some(format!("Task failed: {}", e)),
                    });
                }
            }
        }

        progress_bar.finish_with_message("Processing complete");
        reports
    }
}

/// Extracts the emails of one site into a [`SiteReport`].
///
/// # Arguments
/// * `extractor` - The shared extractor.
/// * `url` - The site as typed by the user.
///
/// # Returns
/// * A report whose `error` is set only when the input is not a usable URL.
pub async fn process_url(extractor: &EmailExtractor, url: &str) -> SiteReport {
    let url = url.trim();
    if let Err(e) = normalize_input_url(url) {
        tracing::warn!(target: "batch_task", "Skipping '{}': {}", url, e);
        return SiteReport {
            url: url.to_string(),
            emails: Vec::new(),
            error: Some(e.to_string()),
        };
    }

    let emails = extractor.extract_emails_from_site(url).await.into_vec();
    if emails.is_empty() {
        tracing::info!(target: "batch_task", "✗ No emails found for {}", url);
    } else {
        tracing::info!(target: "batch_task", "✓ Found {} email(s) for {}", emails.len(), url);
    }
    SiteReport {
        url: url.to_string(),
        emails,
        error: None,
    }
}

/// Drives `work` until it finishes or `cancel` resolves, whichever comes
/// first. `None` means the work was dropped unfinished.
pub async fn until_cancelled<T>(
    work: impl Future<Output = T>,
    cancel: impl Future<Output = ()>,
) -> Option<T> {
    tokio::select! {
        output = work => Some(output),
        _ = cancel => {
            tracing::warn!(target: "batch_task", "Run cancelled before it finished");
            None
        }
    }
}

/// Appends the emails of `reports` to `path`, one per line.
///
/// Returns how many lines were written.
pub fn append_emails(path: impl AsRef<Path>, reports: &[SiteReport]) -> Result<usize> {
    let lines: Vec<&str> = reports
        .iter()
        .flat_map(|report| report.emails.iter().map(String::as_str))
        .collect();
    if lines.is_empty() {
        return Ok(0);
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_ref())?;
    for line in &lines {
        writeln!(file, "{}", line)?;
    }
    tracing::debug!(target: "batch_task", "Appended {} email(s) to {}", lines.len(), path.as_ref().display());
    Ok(lines.len())
}

/// Reads one URL per line, skipping blank lines and `#` comments.
pub fn read_url_list(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_url_list(&content))
}

fn parse_url_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::fetch::PageFetcher;
    use crate::models::FetchedPage;
    use async_trait::async_trait;
    use url::Url;

    struct OnePage;

    #[async_trait]
    impl PageFetcher for OnePage {
        async fn fetch_page(&self, url: &Url) -> Result<FetchedPage> {
            if url.host_str() == Some("acme.test") {
                Ok(FetchedPage {
                    url: url.clone(),
                    html: "<p>Write to hello@acme.test</p>".to_string(),
                })
            } else {
                Err(AppError::fetch(url.as_str(), "connection refused"))
            }
        }
    }

    fn harvester() -> Harvester {
        let config = Arc::new(Config {
            verify_mx_records: false,
            browser_enabled: false,
            ..Config::default()
        });
        let extractor = EmailExtractor::new(config.clone(), Arc::new(OnePage));
        Harvester::from_extractor(config, extractor)
    }

    #[tokio::test]
    async fn test_process_url_reports_invalid_input() {
        let report = harvester().process_url("   ").await;
        assert!(report.emails.is_empty());
        assert!(report.error.is_some());
    }

    #[tokio::test]
    async fn test_batch_keeps_order_and_survives_failures() {
        let reports = harvester()
            .process_batch(
                vec![
                    "acme.test".to_string(),
                    "down.test".to_string(),
                    "ftp://bad".to_string(),
                ],
                false,
            )
            .await;

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].emails, vec!["hello@acme.test"]);
        assert!(reports[1].emails.is_empty() && reports[1].error.is_none());
        assert!(reports[2].error.is_some());
    }

    #[tokio::test]
    async fn test_until_cancelled_returns_finished_work() {
        let output = until_cancelled(async { 7 }, std::future::pending()).await;
        assert_eq!(output, Some(7));
    }

    #[tokio::test]
    async fn test_until_cancelled_drops_pending_batch() {
        let harvester = harvester();
        let stuck = async {
            std::future::pending::<()>().await;
            harvester.process_batch(vec!["acme.test".to_string()], false).await
        };
        let output = until_cancelled(stuck, async {}).await;
        assert!(output.is_none());
    }

    #[tokio::test]
    async fn test_until_cancelled_stops_on_signal_mid_run() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let cancel = async {
            let _ = rx.await;
        };
        let work = async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        };

        tx.send(()).unwrap();
        assert!(until_cancelled(work, cancel).await.is_none());
    }

    #[test]
    fn test_append_emails() {
        let path = std::env::temp_dir().join(format!("email-harvester-test-{}.txt", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let reports = vec![
            SiteReport {
                url: "a".to_string(),
                emails: vec!["one@acme.test".to_string(), "two@acme.test".to_string()],
                error: None,
            },
            SiteReport::default(),
        ];

        assert_eq!(append_emails(&path, &reports).unwrap(), 2);
        assert_eq!(append_emails(&path, &reports[..1]).unwrap(), 2);
        assert_eq!(append_emails(&path, &[]).unwrap(), 0);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 4);
        assert!(content.starts_with("one@acme.test\ntwo@acme.test\n"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_parse_url_list() {
        let urls = parse_url_list("acme.test\n\n  # comment\n https://other.test/ \n");
        assert_eq!(urls, vec!["acme.test", "https://other.test/"]);
    }
}
