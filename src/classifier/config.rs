//! Classifier configuration

use std::time::Duration;

use crate::model::{DEFAULT_MODEL, DEFAULT_REQUESTS_PER_MINUTE};

/// Configuration for the relevance classifier
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Model name passed to the provider
    pub model: String,

    /// Client-side rate limit
    pub requests_per_minute: u32,

    /// Timeout for a single classification call
    pub call_timeout: Duration,

    /// Content beyond this many characters is cut before sending
    pub max_content_chars: usize,

    /// Extra attempts after a retryable failure
    pub retry_attempts: u32,

    /// First backoff delay, doubled per attempt
    pub base_backoff: Duration,

    /// Upper bound on a single backoff delay
    pub max_backoff: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            call_timeout: Duration::from_secs(30),
            max_content_chars: 6000,
            retry_attempts: 2,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Builder for ClassifierConfig
#[derive(Debug, Default)]
pub struct ClassifierConfigBuilder {
    config: ClassifierConfig,
}

impl ClassifierConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ClassifierConfig::default(),
        }
    }

    /// Set the model name
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Set the client-side rate limit
    pub fn requests_per_minute(mut self, rpm: u32) -> Self {
        self.config.requests_per_minute = rpm;
        self
    }

    /// Set the per-call timeout
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Set how much content is sent to the model
    pub fn max_content_chars(mut self, chars: usize) -> Self {
        self.config.max_content_chars = chars;
        self
    }

    /// Set retry attempts and the first backoff delay
    pub fn retries(mut self, attempts: u32, base_backoff: Duration) -> Self {
        self.config.retry_attempts = attempts;
        self.config.base_backoff = base_backoff;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ClassifierConfig {
        self.config
    }
}

impl ClassifierConfig {
    /// Create a new builder
    pub fn builder() -> ClassifierConfigBuilder {
        ClassifierConfigBuilder::new()
    }
}
