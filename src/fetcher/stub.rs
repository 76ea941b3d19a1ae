//! Canned-response fetcher

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{FetchError, FetchMode, FetchedPage, PageFetcher};

#[derive(Debug, Clone)]
enum Canned {
    Page(String),
    Timeout,
    Navigation(String),
    Blocked,
}

#[derive(Debug, Default)]
struct Entry {
    response: Option<Canned>,
    delay: Option<Duration>,
    fail_first: usize,
    calls: usize,
}

/// Serves pre-registered pages by URL. Unknown URLs fail with a navigation
/// error. Useful for tests and for replaying saved pages.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    entries: Mutex<HashMap<String, Entry>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(self, url: &str, canned: Canned) -> Self {
        if let Ok(mut entries) = self.entries.lock() {
            entries.entry(url.to_string()).or_default().response = Some(canned);
        }
        self
    }

    /// Serve `html` for `url`
    pub fn with_page(self, url: &str, html: impl Into<String>) -> Self {
        self.set(url, Canned::Page(html.into()))
    }

    /// Time out every fetch of `url`
    pub fn with_timeout(self, url: &str) -> Self {
        self.set(url, Canned::Timeout)
    }

    /// Fail every fetch of `url` with a navigation error
    pub fn with_navigation_error(self, url: &str, reason: &str) -> Self {
        self.set(url, Canned::Navigation(reason.to_string()))
    }

    /// Answer every fetch of `url` with a block
    pub fn with_block(self, url: &str) -> Self {
        self.set(url, Canned::Blocked)
    }

    /// Time out the first `n` fetches of `url` before serving its response
    pub fn failing_first(self, url: &str, n: usize) -> Self {
        if let Ok(mut entries) = self.entries.lock() {
            entries.entry(url.to_string()).or_default().fail_first = n;
        }
        self
    }

    /// Wait `delay` before answering each fetch of `url`
    pub fn with_delay(self, url: &str, delay: Duration) -> Self {
        if let Ok(mut entries) = self.entries.lock() {
            entries.entry(url.to_string()).or_default().delay = Some(delay);
        }
        self
    }

    /// Number of fetches made for `url`
    pub fn calls(&self, url: &str) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.get(url).map(|e| e.calls).unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str, _mode: FetchMode) -> Result<FetchedPage, FetchError> {
        let (canned, delay) = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|e| FetchError::Browser(e.to_string()))?;
            let entry = entries.entry(url.to_string()).or_default();
            entry.calls += 1;
            let canned = if entry.calls <= entry.fail_first {
                Some(Canned::Timeout)
            } else {
                entry.response.clone()
            };
            (canned, entry.delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match canned {
            Some(Canned::Page(html)) => Ok(FetchedPage {
                html,
                final_url: url.to_string(),
            }),
            Some(Canned::Timeout) => Err(FetchError::Timeout {
                url: url.to_string(),
                after: Duration::from_secs(15),
            }),
            Some(Canned::Navigation(reason)) => Err(FetchError::Navigation {
                url: url.to_string(),
                reason,
            }),
            Some(Canned::Blocked) => Err(FetchError::Blocked {
                url: url.to_string(),
                status: Some(403),
            }),
            None => Err(FetchError::Navigation {
                url: url.to_string(),
                reason: "no page registered".to_string(),
            }),
        }
    }
}
