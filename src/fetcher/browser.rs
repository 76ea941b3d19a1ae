//! Headless Chrome page pool

use std::sync::Arc;

use tokio::sync::Semaphore;

use super::{FetchError, FetchedPage, FetcherConfig};

#[cfg(feature = "browser")]
pub use enabled::BrowserPool;

#[cfg(not(feature = "browser"))]
pub use disabled::BrowserPool;

#[cfg(feature = "browser")]
mod enabled {
    use std::fmt::Display;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
    use chromiumoxide::{Browser, BrowserConfig, Page};
    use futures::future::BoxFuture;
    use futures::{Stream, StreamExt};
    use tokio::sync::Mutex;
    use tracing::{debug, info, warn};

    use super::*;
    use crate::fetcher::looks_blocked;

    const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// A launched or connected browser and whether its event loop is alive
    struct Session {
        browser: Browser,
        alive: Arc<AtomicBool>,
    }

    /// Shared browser with a bounded number of concurrently open pages.
    ///
    /// The browser is launched (or connected to) on first use and reused for
    /// every later fetch. A browser whose connection died is dropped and
    /// relaunched on the next fetch. Each fetch opens a fresh page that is
    /// closed even when the fetch is cancelled.
    pub struct BrowserPool {
        config: FetcherConfig,
        session: Mutex<Option<Arc<Session>>>,
        permits: Arc<Semaphore>,
    }

    impl BrowserPool {
        /// Create a pool; nothing is launched yet
        pub fn new(config: FetcherConfig) -> Self {
            let permits = Arc::new(Semaphore::new(config.pool_size.max(1)));
            Self {
                config,
                session: Mutex::new(None),
                permits,
            }
        }

        /// Load `url` in a pooled page, returning once the DOM is parsed
        pub async fn load(&self, url: &str) -> Result<FetchedPage, FetchError> {
            url::Url::parse(url)?;

            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|e| FetchError::Browser(e.to_string()))?;

            let page = CloseOnDrop::new(self.open_page().await?, close_page);

            let loading = load_page(&page.resource, url);
            let result = tokio::time::timeout(self.config.page_timeout, loading)
                .await
                .unwrap_or_else(|_| {
                    Err(FetchError::Timeout {
                        url: url.to_string(),
                        after: self.config.page_timeout,
                    })
                });

            page.close().await;
            result
        }

        /// Open a blank page, relaunching the browser once if the current
        /// one no longer answers
        async fn open_page(&self) -> Result<Page, FetchError> {
            let session = self.session().await?;
            match session.browser.new_page("about:blank").await {
                Ok(page) => Ok(page),
                Err(e) => {
                    warn!("Browser did not open a page ({}), relaunching", e);
                    self.discard(&session).await;
                    self.session()
                        .await?
                        .browser
                        .new_page("about:blank")
                        .await
                        .map_err(|e| FetchError::Browser(e.to_string()))
                }
            }
        }

        async fn session(&self) -> Result<Arc<Session>, FetchError> {
            let mut current = self.session.lock().await;
            if let Some(session) = current.as_ref() {
                if session.alive.load(Ordering::SeqCst) {
                    return Ok(session.clone());
                }
                warn!("Browser connection closed, relaunching");
            }
            let session = Arc::new(self.start_browser().await?);
            *current = Some(session.clone());
            Ok(session)
        }

        /// Forget `dead` unless another fetch already replaced it
        async fn discard(&self, dead: &Arc<Session>) {
            let mut current = self.session.lock().await;
            if current.as_ref().is_some_and(|s| Arc::ptr_eq(s, dead)) {
                *current = None;
            }
        }

        async fn start_browser(&self) -> Result<Session, FetchError> {
            let (browser, handler) = match &self.config.remote_url {
                Some(remote) => {
                    let ws_url = resolve_ws_url(remote).await?;
                    info!("Connecting to remote browser at {}", ws_url);
                    Browser::connect(ws_url)
                        .await
                        .map_err(|e| FetchError::Browser(e.to_string()))?
                }
                None => {
                    info!("Launching browser (headless={})", self.config.headless);
                    let mut builder = BrowserConfig::builder()
                        .arg(format!("--user-agent={}", self.config.user_agent))
                        .arg("--disable-dev-shm-usage")
                        .arg("--no-first-run")
                        .arg("--no-sandbox")
                        .arg("--disable-gpu");
                    if !self.config.headless {
                        builder = builder.with_head();
                    }
                    for arg in &self.config.chrome_args {
                        builder = builder.arg(arg);
                    }
                    let config = builder.build().map_err(FetchError::Browser)?;
                    Browser::launch(config)
                        .await
                        .map_err(|e| FetchError::Browser(e.to_string()))?
                }
            };

            let alive = Arc::new(AtomicBool::new(true));
            tokio::spawn(drive_events(handler, alive.clone()));

            Ok(Session { browser, alive })
        }
    }

    /// Pump browser events until the connection ends. Errors on single
    /// events are logged and skipped.
    async fn drive_events<S, T, E>(mut events: S, alive: Arc<AtomicBool>) -> usize
    where
        S: Stream<Item = Result<T, E>> + Unpin,
        E: Display,
    {
        let mut errors = 0;
        while let Some(event) = events.next().await {
            if let Err(e) = event {
                errors += 1;
                debug!("Browser event error: {}", e);
            }
        }
        alive.store(false, Ordering::SeqCst);
        info!("Browser event loop ended after {} errors", errors);
        errors
    }

    fn close_page(page: Page) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if let Err(e) = page.close().await {
                debug!("Failed to close page: {}", e);
            }
        })
    }

    /// Holds a resource and hands it to `release` when dropped, so a
    /// cancelled future still gives it back
    struct CloseOnDrop<T: Clone + Send + 'static> {
        resource: T,
        release: fn(T) -> BoxFuture<'static, ()>,
        armed: bool,
    }

    impl<T: Clone + Send + 'static> CloseOnDrop<T> {
        fn new(resource: T, release: fn(T) -> BoxFuture<'static, ()>) -> Self {
            Self {
                resource,
                release,
                armed: true,
            }
        }

        /// Release now and wait for it
        async fn close(mut self) {
            self.armed = false;
            (self.release)(self.resource.clone()).await;
        }
    }

    impl<T: Clone + Send + 'static> Drop for CloseOnDrop<T> {
        fn drop(&mut self) {
            if !self.armed {
                return;
            }
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn((self.release)(self.resource.clone()));
                }
                Err(_) => debug!("No runtime left to release a browser page"),
            }
        }
    }

    async fn load_page(page: &Page, url: &str) -> Result<FetchedPage, FetchError> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|reason| FetchError::Navigation {
                url: url.to_string(),
                reason,
            })?;

        let response = page
            .execute(params)
            .await
            .map_err(|e| FetchError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if let Some(reason) = response.result.error_text.clone() {
            return Err(FetchError::Navigation {
                url: url.to_string(),
                reason,
            });
        }

        wait_for_dom(page).await;

        let html = page.content().await.map_err(|e| FetchError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if looks_blocked(&html) {
            warn!("{} served a block page", url);
            return Err(FetchError::Blocked {
                url: url.to_string(),
                status: None,
            });
        }

        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());

        Ok(FetchedPage { html, final_url })
    }

    /// Poll until the document is at least `interactive`. The caller bounds
    /// this with the page timeout.
    async fn wait_for_dom(page: &Page) {
        loop {
            match page.evaluate("document.readyState").await {
                Ok(result) => {
                    let state: String = result.into_value().unwrap_or_default();
                    if state == "interactive" || state == "complete" {
                        debug!("Page ready state: {}", state);
                        return;
                    }
                }
                Err(e) => debug!("Could not read ready state: {}", e),
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Turn an http(s) debugging endpoint into its WebSocket URL
    async fn resolve_ws_url(remote: &str) -> Result<String, FetchError> {
        if remote.starts_with("ws://") || remote.starts_with("wss://") {
            return Ok(remote.to_string());
        }

        let version_url = format!("{}/json/version", remote.trim_end_matches('/'));
        let info: serde_json::Value = reqwest::get(&version_url).await?.json().await?;

        info.get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| FetchError::Browser(format!("no webSocketDebuggerUrl at {}", version_url)))
    }

}

#[cfg(not(feature = "browser"))]
mod disabled {
    use super::*;

    /// Stand-in used when the crate is built without the `browser` feature
    pub struct BrowserPool {
        _permits: Arc<Semaphore>,
    }

    impl BrowserPool {
        pub fn new(config: FetcherConfig) -> Self {
            Self {
                _permits: Arc::new(Semaphore::new(config.pool_size.max(1))),
            }
        }

        pub async fn load(&self, url: &str) -> Result<FetchedPage, FetchError> {
            Err(FetchError::Browser(format!(
                "cannot load {}: built without the browser feature",
                url
            )))
        }
    }
}
