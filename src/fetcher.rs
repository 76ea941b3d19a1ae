//! # Page Content Fetcher
//!
//! Loads a URL and hands back the DOM as it stood once the document was parsed.
//! Municipal sites often keep tracker connections open forever, so the browser
//! path returns at `DOMContentLoaded` instead of waiting for network idle.
//!
//! ## Key Components
//!
//! - `PageFetcher`: the capability the orchestrator depends on
//! - `Fetcher`: default implementation dispatching on `FetchMode`
//! - `HttpFetcher`: plain HTTP for server-rendered boards
//! - `BrowserPool`: bounded pool of headless Chrome pages
//! - `StaticFetcher`: canned responses for tests and dry runs
//!
//! Retry policy deliberately lives in the orchestrator, not here.

mod browser;
mod config;
mod error;
mod http;
mod stub;

pub use browser::BrowserPool;
pub use config::{FetcherConfig, FetcherConfigBuilder};
pub use error::FetchError;
pub use http::HttpFetcher;
pub use stub::StaticFetcher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// How a page should be loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Headless browser, for pages rendered by JavaScript
    #[default]
    Browser,
    /// Plain HTTP GET
    Http,
}

/// A loaded page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Serialized DOM
    pub html: String,

    /// URL after redirects
    pub final_url: String,
}

/// Capability to load a page
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Load `url` and return its DOM, failing with `FetchError::Timeout`,
    /// `FetchError::Navigation` or `FetchError::Blocked`
    async fn fetch(&self, url: &str, mode: FetchMode) -> Result<FetchedPage, FetchError>;
}

/// Default fetcher: HTTP always available, browser when compiled in
pub struct Fetcher {
    http: HttpFetcher,
    browser: BrowserPool,
}

impl Fetcher {
    /// Create a fetcher from configuration. The browser is launched lazily
    /// on the first browser-mode fetch.
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        Ok(Self {
            http: HttpFetcher::new(config.clone())?,
            browser: BrowserPool::new(config),
        })
    }
}

#[async_trait]
impl PageFetcher for Fetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str, mode: FetchMode) -> Result<FetchedPage, FetchError> {
        match mode {
            FetchMode::Http => self.http.get(url).await,
            FetchMode::Browser => self.browser.load(url).await,
        }
    }
}

/// Markers of bot-detection interstitials and access-denied pages
const BLOCK_MARKERS: &[&str] = &[
    "cf-challenge",
    "captcha",
    "access denied",
    "request rejected",
    "비정상적인 접근",
    "접근이 차단",
    "접근이 거부",
];

/// Whether a fetched body is a bot-detection or access-denied page rather
/// than real content
pub(crate) fn looks_blocked(html: &str) -> bool {
    // Real pages can mention "captcha" in scripts; only short bodies count
    if html.len() > 20_000 {
        return false;
    }
    let lower = html.to_lowercase();
    BLOCK_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_blocked() {
        assert!(looks_blocked(
            "<html><body><h1>Access Denied</h1></body></html>"
        ));
        assert!(looks_blocked("<p>비정상적인 접근이 감지되었습니다</p>"));
        assert!(!looks_blocked(
            "<html><body><div class='board_view'>보조금 지원사업 공고</div></body></html>"
        ));
    }

    #[test]
    fn test_fetch_mode_default_is_browser() {
        assert_eq!(FetchMode::default(), FetchMode::Browser);
        let mode: FetchMode = serde_json::from_str("\"http\"").unwrap();
        assert_eq!(mode, FetchMode::Http);
    }
}
