//! Defines the custom error types for the email-harvester application.

use std::io;
use thiserror::Error;
use url::ParseError as UrlParseError;

/// The primary error type for the extraction process.
///
/// Only configuration, IO and server start-up errors ever reach the binary.
/// Everything raised inside a site run (`Fetch`, `Timeout`, `Decode`,
/// `Browser`, `Dns`) is logged and turned into a partial or empty result.
#[derive(Error, Debug)]
pub enum AppError {
    /// Error occurring during configuration loading or validation.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// Error related to file input/output operations.
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// Error during JSON serialization or deserialization.
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error parsing a URL.
    #[error("URL Parsing Error: {0}")]
    UrlParse(#[from] UrlParseError),

    /// Error making HTTP requests via reqwest.
    #[error("HTTP Request Error: {0}")]
    Request(#[from] reqwest::Error),

    /// Error during DNS resolution.
    #[error("DNS Resolution Error: {0}")]
    Dns(#[from] trust_dns_resolver::error::ResolveError),

    /// The input URL is malformed. Terminal for that site, empty result.
    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    /// A page could not be retrieved or was not usable HTML.
    #[error("Fetch Failure for {url}: {reason}")]
    Fetch {
        /// The URL that was requested.
        url: String,
        /// Why the page was rejected.
        reason: String,
    },

    /// A stage ran past its deadline.
    #[error("Timeout during {0}")]
    Timeout(String),

    /// A decoding attempt (base64, XOR, ROT13, JSON-LD) produced nothing usable.
    #[error("Decode Failure: {0}")]
    Decode(String),

    /// WebDriver session could not be created.
    #[error("Browser Session Error: {0}")]
    BrowserSession(#[from] fantoccini::error::NewSessionError),

    /// A WebDriver command failed.
    #[error("Browser Command Error: {0}")]
    BrowserCommand(#[from] fantoccini::error::CmdError),

    /// An underlying error that doesn't fit other categories, using anyhow.
    #[error("Generic Error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl AppError {
    pub(crate) fn fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Fetch {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
