//! Defines the configuration settings for the email-harvester application.

use anyhow::Context;
use clap::Args;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Command line / environment overrides shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Path to configuration file (TOML format)
    #[arg(long, global = true, env = "EMAIL_HARVESTER_CONFIG")]
    pub config_file: Option<String>,

    /// Path of the append-only file that receives one email per line
    #[arg(short, long, global = true, env = "EMAIL_HARVESTER_OUTPUT")]
    pub output: Option<String>,

    /// Maximum number of sites processed concurrently
    #[arg(short, long, global = true, env = "EMAIL_HARVESTER_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Global per-site timeout in seconds
    #[arg(long, global = true, env = "EMAIL_HARVESTER_GLOBAL_TIMEOUT")]
    pub global_timeout: Option<u64>,

    /// HTTP request timeout in seconds
    #[arg(long, global = true, env = "EMAIL_HARVESTER_HTTP_TIMEOUT")]
    pub http_timeout: Option<u64>,

    /// User agent string for HTTP requests (replaces the rotating list)
    #[arg(long, global = true, env = "EMAIL_HARVESTER_USER_AGENT")]
    pub user_agent: Option<String>,

    /// WebDriver endpoint used for browser rendering
    #[arg(long, global = true, env = "EMAIL_HARVESTER_WEBDRIVER_URL")]
    pub webdriver_url: Option<String>,

    /// Disable the browser-rendering fallback
    #[arg(long, global = true, env = "EMAIL_HARVESTER_NO_BROWSER")]
    pub no_browser: bool,

    /// Disable MX record verification of extracted emails
    #[arg(long, global = true, env = "EMAIL_HARVESTER_NO_MX")]
    pub no_mx: bool,

    /// Comma-separated list of DNS servers
    #[arg(long, global = true, env = "EMAIL_HARVESTER_DNS_SERVERS")]
    pub dns_servers: Option<String>,

    /// Maximum number of contact pages visited per site
    #[arg(long, global = true, env = "EMAIL_HARVESTER_MAX_CONTACT_PAGES")]
    pub max_contact_pages: Option<usize>,
}

/// TOML Configuration file structure
#[derive(Deserialize, Debug, Default)]
struct ConfigFile {
    network: Option<NetworkConfig>,
    browser: Option<BrowserConfig>,
    crawler: Option<CrawlerConfig>,
    extraction: Option<ExtractionConfig>,
    dns: Option<DnsConfig>,
    output: Option<OutputConfig>,
}

#[derive(Deserialize, Debug, Default)]
struct NetworkConfig {
    http_timeout: Option<u64>,
    max_retries: Option<u32>,
    retry_backoff_factor: Option<f32>,
    user_agents: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
struct BrowserConfig {
    enabled: Option<bool>,
    webdriver_url: Option<String>,
    headless: Option<bool>,
    page_timeout: Option<u64>,
    navigation_timeout: Option<u64>,
    cookie_banner_timeout: Option<u64>,
    scroll_step: Option<u32>,
    scroll_steps: Option<u32>,
    scroll_pause_ms: Option<u64>,
    accept_cookie_keywords: Option<Vec<String>>,
    simulate_interactions: Option<bool>,
    max_interactions: Option<usize>,
    interaction_pause_ms: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
struct CrawlerConfig {
    max_contact_pages: Option<usize>,
    max_depth: Option<usize>,
    max_pages_per_domain: Option<usize>,
    contact_page_search_timeout: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
struct ExtractionConfig {
    global_timeout: Option<u64>,
    verify_mx_records: Option<bool>,
    decode_base64: Option<bool>,
    decode_rot13: Option<bool>,
    decode_xor: Option<bool>,
    xor_keys: Option<Vec<u32>>,
    check_reversed_text: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
struct DnsConfig {
    dns_timeout: Option<u64>,
    dns_servers: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
struct OutputConfig {
    output_file: Option<String>,
    max_concurrency: Option<usize>,
}

/// Application configuration settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Timeout for individual HTTP requests.
    pub http_timeout: Duration,
    /// Total attempts for a page fetch that fails at the transport level.
    pub max_retries: u32,
    /// Multiplier of the exponential backoff between fetch attempts (seconds).
    pub retry_backoff_factor: f32,
    /// User agents rotated across requests.
    pub user_agents: Vec<String>,

    /// Whether the browser-rendering fallback may be used at all.
    pub browser_enabled: bool,
    /// WebDriver endpoint (chromedriver, geckodriver, selenium).
    pub webdriver_url: String,
    /// Run the browser without a window.
    pub headless: bool,
    /// Upper bound for one single-page browser extraction.
    pub browser_timeout: Duration,
    /// Upper bound for one page navigation.
    pub navigation_timeout: Duration,
    /// Upper bound for cookie banner dismissal.
    pub cookie_banner_timeout: Duration,
    /// Pixels scrolled per step while loading lazy content.
    pub scroll_step: u32,
    /// Number of scroll steps per rendered page.
    pub scroll_steps: u32,
    /// Pause after each scroll step.
    pub scroll_pause: Duration,
    /// Button/link texts that accept a cookie banner.
    pub accept_cookie_keywords: Vec<String>,
    /// Click `onclick` mail handlers after rendering to reveal hidden addresses.
    pub simulate_interactions: bool,
    /// Cap on the elements clicked per rendered page.
    pub max_interactions: usize,
    /// Pause after each click.
    pub interaction_pause: Duration,

    /// Cap on the number of contact pages kept per site.
    pub max_contact_pages: usize,
    /// Link depth explored from the start page during discovery.
    pub max_depth: usize,
    /// Page budget of one discovery run.
    pub max_pages_per_domain: usize,
    /// Timeout for one contact page discovery call.
    pub contact_page_search_timeout: Duration,

    /// Global deadline for one site extraction.
    pub global_timeout: Duration,
    /// Drop emails whose domain has no MX record.
    pub verify_mx_records: bool,
    pub decode_base64: bool,
    pub decode_rot13: bool,
    pub decode_xor: bool,
    /// Keys tried by the XOR brute-force decoder.
    pub xor_keys: Vec<u32>,
    /// Also try the character-reversed text of suspicious locations.
    pub check_reversed_text: bool,

    /// Timeout for DNS resolution queries.
    pub dns_timeout: Duration,
    /// DNS servers to use for resolution.
    pub dns_servers: Vec<String>,

    /// Append-only file receiving one email per line.
    pub output_file: String,
    /// Maximum number of sites processed concurrently.
    pub max_concurrency: usize,
}

pub(crate) static DEFAULT_USER_AGENTS: Lazy<Vec<String>> = Lazy::new(|| {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.107 Safari/537.36",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
});

const DEFAULT_XOR_KEYS: [u32; 4] = [13, 42, 7, 1];

impl Default for Config {
    fn default() -> Self {
        let accept_cookie_keywords = [
            "accept",
            "accept all",
            "agree",
            "ok",
            "got it",
            "i understand",
            "akzeptieren",
            "accepter",
            "aceptar",
            "aceitar",
            "accetto",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let dns_servers = vec![
            "8.8.8.8".to_string(),
            "8.8.4.4".to_string(),
            "1.1.1.1".to_string(),
            "1.0.0.1".to_string(),
        ];

        Config {
            http_timeout: Duration::from_secs(15),
            max_retries: 2,
            retry_backoff_factor: 1.0,
            user_agents: DEFAULT_USER_AGENTS.clone(),
            browser_enabled: true,
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            browser_timeout: Duration::from_secs(20),
            navigation_timeout: Duration::from_secs(15),
            cookie_banner_timeout: Duration::from_secs(3),
            scroll_step: 300,
            scroll_steps: 10,
            scroll_pause: Duration::from_millis(200),
            accept_cookie_keywords,
            simulate_interactions: true,
            max_interactions: 5,
            interaction_pause: Duration::from_millis(300),
            max_contact_pages: 3,
            max_depth: 2,
            max_pages_per_domain: 10,
            contact_page_search_timeout: Duration::from_secs(10),
            global_timeout: Duration::from_secs(120),
            verify_mx_records: true,
            decode_base64: true,
            decode_rot13: true,
            decode_xor: true,
            xor_keys: DEFAULT_XOR_KEYS.to_vec(),
            check_reversed_text: true,
            dns_timeout: Duration::from_secs(5),
            dns_servers,
            output_file: "output.txt".to_string(),
            max_concurrency: 4,
        }
    }
}

/// Load configuration from a TOML file
fn load_config_file(file_path: &str) -> anyhow::Result<ConfigFile> {
    let path = Path::new(file_path);
    if !path.exists() {
        tracing::warn!("Configuration file {} not found, using defaults", file_path);
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", file_path))?;

    let config: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML configuration from {}", file_path))?;

    tracing::info!("Loaded configuration from {}", file_path);
    Ok(config)
}

fn apply_file_config(config: &mut Config, file_config: &ConfigFile) {
    if let Some(network) = &file_config.network {
        if let Some(timeout) = network.http_timeout {
            config.http_timeout = Duration::from_secs(timeout);
        }
        if let Some(retries) = network.max_retries {
            config.max_retries = retries;
        }
        if let Some(factor) = network.retry_backoff_factor {
            config.retry_backoff_factor = factor;
        }
        if let Some(agents) = &network.user_agents {
            config.user_agents = agents.clone();
        }
    }

    if let Some(browser) = &file_config.browser {
        if let Some(enabled) = browser.enabled {
            config.browser_enabled = enabled;
        }
        if let Some(url) = &browser.webdriver_url {
            config.webdriver_url = url.clone();
        }
        if let Some(headless) = browser.headless {
            config.headless = headless;
        }
        if let Some(timeout) = browser.page_timeout {
            config.browser_timeout = Duration::from_secs(timeout);
        }
        if let Some(timeout) = browser.navigation_timeout {
            config.navigation_timeout = Duration::from_secs(timeout);
        }
        if let Some(timeout) = browser.cookie_banner_timeout {
            config.cookie_banner_timeout = Duration::from_secs(timeout);
        }
        if let Some(step) = browser.scroll_step {
            config.scroll_step = step;
        }
        if let Some(steps) = browser.scroll_steps {
            config.scroll_steps = steps;
        }
        if let Some(pause) = browser.scroll_pause_ms {
            config.scroll_pause = Duration::from_millis(pause);
        }
        if let Some(keywords) = &browser.accept_cookie_keywords {
            config.accept_cookie_keywords = keywords.clone();
        }
        if let Some(simulate) = browser.simulate_interactions {
            config.simulate_interactions = simulate;
        }
        if let Some(max) = browser.max_interactions {
            config.max_interactions = max;
        }
        if let Some(pause) = browser.interaction_pause_ms {
            config.interaction_pause = Duration::from_millis(pause);
        }
    }

    if let Some(crawler) = &file_config.crawler {
        if let Some(max) = crawler.max_contact_pages {
            config.max_contact_pages = max;
        }
        if let Some(depth) = crawler.max_depth {
            config.max_depth = depth;
        }
        if let Some(pages) = crawler.max_pages_per_domain {
            config.max_pages_per_domain = pages;
        }
        if let Some(timeout) = crawler.contact_page_search_timeout {
            config.contact_page_search_timeout = Duration::from_secs(timeout);
        }
    }

    if let Some(extraction) = &file_config.extraction {
        if let Some(timeout) = extraction.global_timeout {
            config.global_timeout = Duration::from_secs(timeout);
        }
        if let Some(verify) = extraction.verify_mx_records {
            config.verify_mx_records = verify;
        }
        if let Some(flag) = extraction.decode_base64 {
            config.decode_base64 = flag;
        }
        if let Some(flag) = extraction.decode_rot13 {
            config.decode_rot13 = flag;
        }
        if let Some(flag) = extraction.decode_xor {
            config.decode_xor = flag;
        }
        if let Some(keys) = &extraction.xor_keys {
            config.xor_keys = keys.clone();
        }
        if let Some(flag) = extraction.check_reversed_text {
            config.check_reversed_text = flag;
        }
    }

    if let Some(dns) = &file_config.dns {
        if let Some(timeout) = dns.dns_timeout {
            config.dns_timeout = Duration::from_secs(timeout);
        }
        if let Some(servers) = &dns.dns_servers {
            config.dns_servers = servers.clone();
        }
    }

    if let Some(output) = &file_config.output {
        if let Some(file) = &output.output_file {
            config.output_file = file.clone();
        }
        if let Some(concurrency) = output.max_concurrency {
            config.max_concurrency = concurrency;
        }
    }
}

/// Apply command line arguments to the Config instance
fn apply_cli_args(config: &mut Config, args: &ConfigOverrides) {
    if let Some(ref output) = args.output {
        config.output_file = output.clone();
    }

    if let Some(concurrency) = args.concurrency {
        config.max_concurrency = concurrency;
    }

    if let Some(timeout) = args.global_timeout {
        config.global_timeout = Duration::from_secs(timeout);
    }

    if let Some(timeout) = args.http_timeout {
        config.http_timeout = Duration::from_secs(timeout);
    }

    if let Some(ref agent) = args.user_agent {
        config.user_agents = vec![agent.clone()];
    }

    if let Some(ref url) = args.webdriver_url {
        config.webdriver_url = url.clone();
    }

    if args.no_browser {
        config.browser_enabled = false;
    }

    if args.no_mx {
        config.verify_mx_records = false;
    }

    if let Some(ref servers) = args.dns_servers {
        config.dns_servers = servers
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    if let Some(max) = args.max_contact_pages {
        config.max_contact_pages = max;
    }
}

fn validate_config(config: &mut Config) {
    if config.dns_servers.is_empty() {
        config.dns_servers = vec!["8.8.8.8".to_string(), "1.1.1.1".to_string()];
        tracing::warn!("DNS servers list was empty. Setting to default public DNS servers.");
    }

    if config.user_agents.is_empty() {
        config.user_agents = DEFAULT_USER_AGENTS.clone();
        tracing::warn!("User agent list was empty. Restoring the default rotation.");
    }

    if config.xor_keys.is_empty() {
        config.xor_keys = DEFAULT_XOR_KEYS.to_vec();
        tracing::warn!("XOR key list was empty. Restoring the default keys.");
    }

    if config.max_retries == 0 {
        config.max_retries = 1;
        tracing::warn!("Max retries was set to 0. Setting to 1 attempt.");
    }

    if config.max_contact_pages == 0 {
        config.max_contact_pages = 1;
        tracing::warn!("Contact page cap was set to 0. Setting to 1.");
    }

    if config.max_pages_per_domain == 0 {
        config.max_pages_per_domain = 1;
        tracing::warn!("Page budget was set to 0. Setting to 1.");
    }

    if config.max_concurrency == 0 {
        config.max_concurrency = 1;
        tracing::warn!("Concurrency was set to 0. Setting to 1.");
    }

    if config.contact_page_search_timeout > config.global_timeout {
        config.contact_page_search_timeout = config.global_timeout;
        tracing::warn!(
            "Contact page search timeout exceeded the global timeout. Setting to {:?}",
            config.global_timeout
        );
    }
}

/// Builds the effective configuration: defaults, then the TOML file, then
/// command line / environment overrides.
pub fn build_config(args: &ConfigOverrides) -> anyhow::Result<Config> {
    let mut config = Config::default();

    if let Some(ref file_path) = args.config_file {
        let file_config = load_config_file(file_path)?;
        apply_file_config(&mut config, &file_config);
    } else {
        for path in ["./email-harvester.toml", "./config.toml"].iter() {
            if Path::new(path).exists() {
                match load_config_file(path) {
                    Ok(file_config) => {
                        apply_file_config(&mut config, &file_config);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load configuration from {}: {}", path, e);
                    }
                }
            }
        }
    }

    apply_cli_args(&mut config, args);

    validate_config(&mut config);

    tracing::debug!("Final configuration: {:?}", config);

    Ok(config)
}

impl Config {
    /// Picks a user agent for the next request.
    pub(crate) fn random_user_agent(&self) -> &str {
        use rand::seq::SliceRandom;
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENTS[0].as_str())
    }

    /// Exponential backoff before retry number `attempt` (1-based), clamped to [1s, 10s].
    pub(crate) fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exp = 2f32.powi(attempt.saturating_sub(1).min(16) as i32);
        let secs = (self.retry_backoff_factor * exp).clamp(1.0, 10.0);
        Duration::from_secs_f32(secs)
    }
}
