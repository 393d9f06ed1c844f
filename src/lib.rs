//! Crawls a website's homepage and likely contact pages and extracts the
//! email addresses published on them.

pub mod api;
pub mod browser;
pub mod config;
pub mod crawler;
pub mod decoding;
pub mod document;
pub mod dns;
pub mod domain;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod keywords;
pub mod models;
pub mod page_extractor;
pub mod processor;
pub mod recognizer;
pub mod scorer;
pub mod validator;

pub use extractor::EmailExtractor;
pub use models::{EmailSet, SiteReport};
