//! Fetcher configuration

use std::time::Duration;

/// Configuration for page fetching
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Hard per-page timeout
    pub page_timeout: Duration,

    /// User agent sent with every request
    pub user_agent: String,

    /// Run Chrome without a window
    pub headless: bool,

    /// Maximum pages open at once across the pool
    pub pool_size: usize,

    /// Connect to an already running Chrome instead of launching one
    pub remote_url: Option<String>,

    /// Extra Chrome command line arguments
    pub chrome_args: Vec<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(15),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
            headless: true,
            pool_size: 2,
            remote_url: None,
            chrome_args: Vec::new(),
        }
    }
}

/// Builder for FetcherConfig
#[derive(Debug, Default)]
pub struct FetcherConfigBuilder {
    config: FetcherConfig,
}

impl FetcherConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: FetcherConfig::default(),
        }
    }

    /// Set the per-page timeout
    pub fn page_timeout(mut self, page_timeout: Duration) -> Self {
        self.config.page_timeout = page_timeout;
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set whether Chrome runs headless
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    /// Set the number of concurrently open pages
    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.config.pool_size = pool_size.max(1);
        self
    }

    /// Connect to a remote Chrome at this WebSocket/HTTP debugging URL
    pub fn remote_url(mut self, remote_url: Option<String>) -> Self {
        self.config.remote_url = remote_url;
        self
    }

    /// Add an extra Chrome argument
    pub fn chrome_arg(mut self, arg: impl Into<String>) -> Self {
        self.config.chrome_args.push(arg.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> FetcherConfig {
        self.config
    }
}

impl FetcherConfig {
    /// Create a new builder
    pub fn builder() -> FetcherConfigBuilder {
        FetcherConfigBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FetcherConfig::default();
        assert_eq!(config.page_timeout, Duration::from_secs(15));
        assert!(config.headless);
    }

    #[test]
    fn test_builder_clamps_pool_size() {
        let config = FetcherConfig::builder()
            .pool_size(0)
            .page_timeout(Duration::from_secs(3))
            .build();
        assert_eq!(config.pool_size, 1);
        assert_eq!(config.page_timeout, Duration::from_secs(3));
    }
}
