//! # LLM Client Module
//!
//! Completion-model plumbing for the relevance classifier, with built-in rate
//! limiting so a crawl across hundreds of regions cannot exhaust the provider
//! quota.
//!
//! ## Key Components
//!
//! - `Client`: wraps a completion model
//! - `RateLimitedCompletionModel`: adds a governor rate limiter to any model
//! - `MockCompletionModel`: canned responses for tests

use std::num::NonZeroU32;

use governor::{Quota, RateLimiter};
use rig::{completion::CompletionModel, providers::gemini};

use crate::error::{Error, Result};

pub mod mock_model;
pub mod ratelimited_completion;

pub use mock_model::MockCompletionModel;
pub use ratelimited_completion::RateLimitedCompletionModel;

/// Default Gemini model used for classification
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default requests per minute against the completion endpoint
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

#[derive(Debug, Clone)]
pub struct Client<C>
where
    C: CompletionModel,
{
    completion_model: C,
}

impl Client<RateLimitedCompletionModel<gemini::completion::CompletionModel>> {
    /// Build a client from `GEMINI_API_KEY`. Returns `Error::Config` when the
    /// variable is missing or empty.
    pub fn new_gemini_from_env(model: &str, requests_per_minute: u32) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::Config("GEMINI_API_KEY is not set".to_string()))?;
        let gemini_client = gemini::Client::new(&api_key);
        Ok(Self::new_gemini(gemini_client, model, requests_per_minute))
    }

    pub fn new_gemini(gemini_client: gemini::Client, model: &str, requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_minute(per_minute));
        let completion_model =
            RateLimitedCompletionModel::new(gemini_client.completion_model(model), limiter);
        Self { completion_model }
    }
}

impl<C> Client<C>
where
    C: CompletionModel,
{
    /// Wrap an arbitrary completion model
    pub fn from_model(completion_model: C) -> Self {
        Self { completion_model }
    }

    pub fn completion(&self) -> &C {
        &self.completion_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_wraps_any_model() {
        let client = Client::from_model(MockCompletionModel::new());
        assert_eq!(client.completion().calls(), 0);
    }
}
