//! Retry with exponential backoff around any classifier

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::{Rng, thread_rng};
use tracing::{debug, warn};

use super::{
    ClassificationError, Classifier, ClassifierConfig, ClassifyRequest, GeminiAnalysisResult,
};

/// Retries retryable failures of an inner classifier.
///
/// Delay is `base * 2^attempt` with ±20% jitter, capped, and never shorter
/// than a quota error's `retry_after_secs`.
pub struct RetryingClassifier {
    inner: Arc<dyn Classifier>,
    retries: u32,
    base_backoff: Duration,
    max_backoff: Duration,
}

impl RetryingClassifier {
    pub fn new(inner: Arc<dyn Classifier>, config: &ClassifierConfig) -> Self {
        Self {
            inner,
            retries: config.retry_attempts,
            base_backoff: config.base_backoff,
            max_backoff: config.max_backoff,
        }
    }

    fn delay(&self, attempt: u32, err: &ClassificationError) -> Duration {
        let exp = self.base_backoff.saturating_mul(2u32.saturating_pow(attempt));
        let mut delay = exp.mul_f64(thread_rng().gen_range(0.8..1.2));
        if let ClassificationError::Quota {
            retry_after_secs: Some(secs),
        } = err
        {
            delay = delay.max(Duration::from_secs(*secs));
        }
        delay.min(self.max_backoff)
    }
}

#[async_trait]
impl Classifier for RetryingClassifier {
    async fn classify(
        &self,
        request: ClassifyRequest<'_>,
    ) -> Result<GeminiAnalysisResult, ClassificationError> {
        let url = request.url;
        let mut attempt = 0;
        loop {
            match self.inner.classify(request).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    let delay = self.delay(attempt, &e);
                    debug!(
                        "Classification of {} failed ({}), retrying in {:?} (attempt {}/{})",
                        url,
                        e,
                        delay,
                        attempt + 1,
                        self.retries
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Classification of {} failed: {}", url, e);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::StaticClassifier;

    fn config(retries: u32) -> ClassifierConfig {
        ClassifierConfig::builder()
            .retries(retries, Duration::from_millis(1))
            .build()
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let inner = Arc::new(
            StaticClassifier::new(GeminiAnalysisResult::scored(true, 0.9)).failing_first("u", 2),
        );
        let retrying = RetryingClassifier::new(inner.clone(), &config(2));

        let result = retrying.classify(ClassifyRequest::new("t", "c", "u")).await.unwrap();
        assert!(result.is_relevant);
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let inner = Arc::new(
            StaticClassifier::new(GeminiAnalysisResult::scored(true, 0.9)).failing_first("u", 5),
        );
        let retrying = RetryingClassifier::new(inner.clone(), &config(1));

        assert!(retrying.classify(ClassifyRequest::new("t", "c", "u")).await.is_err());
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_malformed_is_not_retried() {
        let inner = Arc::new(
            StaticClassifier::new(GeminiAnalysisResult::default())
                .with_error("u", ClassificationError::MalformedResponse("x".into())),
        );
        let retrying = RetryingClassifier::new(inner.clone(), &config(3));

        assert!(retrying.classify(ClassifyRequest::new("t", "c", "u")).await.is_err());
        assert_eq!(inner.calls(), 1);
    }

    #[test]
    fn test_quota_delay_respects_retry_after() {
        let retrying = RetryingClassifier::new(
            Arc::new(StaticClassifier::new(GeminiAnalysisResult::default())),
            &config(1),
        );
        let delay = retrying.delay(
            0,
            &ClassificationError::Quota {
                retry_after_secs: Some(7),
            },
        );
        assert_eq!(delay, Duration::from_secs(7));
    }
}
