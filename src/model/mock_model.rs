//! # Mock Completion Model for Testing
//!
//! `MockCompletionModel` implements `CompletionModel` with a canned reply or a
//! canned provider error, and counts calls so retry behavior can be asserted
//! without touching the network.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rig::{
    completion::{
        AssistantContent, CompletionError, CompletionModel, CompletionRequest, CompletionResponse,
    },
    one_or_many::OneOrMany,
};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Error(String),
}

/// A mock completion model for testing purposes
#[derive(Debug, Clone)]
pub struct MockCompletionModel {
    reply: Arc<Mutex<Reply>>,
    calls: Arc<AtomicUsize>,
}

impl MockCompletionModel {
    /// A model that answers with empty text
    pub fn new() -> Self {
        Self::with_text("")
    }

    /// A model that answers every request with `text`
    pub fn with_text(text: &str) -> Self {
        Self {
            reply: Arc::new(Mutex::new(Reply::Text(text.to_string()))),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A model that fails every request with a provider error
    pub fn with_error(message: &str) -> Self {
        Self {
            reply: Arc::new(Mutex::new(Reply::Error(message.to_string()))),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replace the reply text
    pub async fn set_text_response(&self, text: &str) {
        *self.reply.lock().await = Reply::Text(text.to_string());
    }

    /// Number of completion calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockCompletionModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionModel for MockCompletionModel {
    type Response = String;

    async fn completion(
        &self,
        _completion_request: CompletionRequest,
    ) -> Result<CompletionResponse<Self::Response>, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.reply.lock().await.clone();
        match reply {
            Reply::Text(text) => Ok(CompletionResponse {
                choice: OneOrMany::one(AssistantContent::text(&text)),
                raw_response: text,
            }),
            Reply::Error(message) => Err(CompletionError::ProviderError(message)),
        }
    }
}
