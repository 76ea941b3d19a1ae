//! Orchestrator configuration

use std::time::Duration;

use crate::fetcher::FetchMode;

/// Configuration for crawl runs
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Regions processed concurrently per batch
    pub batch_size: usize,

    /// Wall-clock bound for one region, independent of stage timeouts
    pub region_timeout: Duration,

    /// Extra fetch attempts after a timeout or navigation error
    pub fetch_retries: u32,

    /// First delay between fetch attempts, doubled per attempt
    pub fetch_backoff: Duration,

    /// How pages are loaded
    pub fetch_mode: FetchMode,

    /// Follow detail links on listing pages
    pub follow_details: bool,

    /// Reclassify even when content is unchanged
    pub force: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            region_timeout: Duration::from_secs(180),
            fetch_retries: 1,
            fetch_backoff: Duration::from_secs(2),
            fetch_mode: FetchMode::Browser,
            follow_details: true,
            force: false,
        }
    }
}

/// Builder for OrchestratorConfig
#[derive(Debug, Default)]
pub struct OrchestratorConfigBuilder {
    config: OrchestratorConfig,
}

impl OrchestratorConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
        }
    }

    /// Set the number of regions processed concurrently
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size.max(1);
        self
    }

    /// Set the per-region watchdog
    pub fn region_timeout(mut self, timeout: Duration) -> Self {
        self.config.region_timeout = timeout;
        self
    }

    /// Set fetch retries and the first backoff delay
    pub fn fetch_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.config.fetch_retries = retries;
        self.config.fetch_backoff = backoff;
        self
    }

    /// Set the fetch mode
    pub fn fetch_mode(mut self, mode: FetchMode) -> Self {
        self.config.fetch_mode = mode;
        self
    }

    /// Set whether listing pages fan out to detail pages
    pub fn follow_details(mut self, follow: bool) -> Self {
        self.config.follow_details = follow;
        self
    }

    /// Set whether unchanged content is reclassified
    pub fn force(mut self, force: bool) -> Self {
        self.config.force = force;
        self
    }

    /// Build the configuration
    pub fn build(self) -> OrchestratorConfig {
        self.config
    }
}

impl OrchestratorConfig {
    /// Create a new builder
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::new()
    }
}
