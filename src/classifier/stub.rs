//! Fixed-result classifier

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{ClassificationError, Classifier, ClassifyRequest, GeminiAnalysisResult};

/// Answers with a fixed result per URL, a default otherwise. Deterministic
/// stand-in for the AI service.
#[derive(Debug)]
pub struct StaticClassifier {
    default: GeminiAnalysisResult,
    results: HashMap<String, GeminiAnalysisResult>,
    errors: HashMap<String, ClassificationError>,
    fail_first: Mutex<HashMap<String, usize>>,
    low_trust_seen: Mutex<HashMap<String, bool>>,
    calls: AtomicUsize,
}

impl StaticClassifier {
    pub fn new(default: GeminiAnalysisResult) -> Self {
        Self {
            default,
            results: HashMap::new(),
            errors: HashMap::new(),
            fail_first: Mutex::new(HashMap::new()),
            low_trust_seen: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer `url` with `result`
    pub fn with_result(mut self, url: &str, result: GeminiAnalysisResult) -> Self {
        self.results.insert(url.to_string(), result);
        self
    }

    /// Fail every call for `url`
    pub fn with_error(mut self, url: &str, error: ClassificationError) -> Self {
        self.errors.insert(url.to_string(), error);
        self
    }

    /// Fail the first `n` calls for `url` with a retryable request error
    pub fn failing_first(self, url: &str, n: usize) -> Self {
        if let Ok(mut fail_first) = self.fail_first.lock() {
            fail_first.insert(url.to_string(), n);
        }
        self
    }

    /// Total calls across all URLs
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Low-trust flag of the latest request for `url`, if it was classified
    pub fn low_trust_for(&self, url: &str) -> Option<bool> {
        self.low_trust_seen
            .lock()
            .ok()
            .and_then(|seen| seen.get(url).copied())
    }
}

#[async_trait]
impl Classifier for StaticClassifier {
    async fn classify(
        &self,
        request: ClassifyRequest<'_>,
    ) -> Result<GeminiAnalysisResult, ClassificationError> {
        let url = request.url;
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.low_trust_seen.lock() {
            seen.insert(url.to_string(), request.low_trust);
        }

        if let Some(error) = self.errors.get(url) {
            return Err(error.clone());
        }

        let should_fail = self
            .fail_first
            .lock()
            .map(|mut remaining| match remaining.get_mut(url) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            })
            .unwrap_or(false);
        if should_fail {
            return Err(ClassificationError::Request("service unavailable".to_string()));
        }

        Ok(self
            .results
            .get(url)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
            .normalized())
    }
}
