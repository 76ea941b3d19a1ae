//! # Relevance & Field Classifier
//!
//! Decides whether an announcement concerns environmental-equipment subsidies
//! and pulls structured fields (application period, budget, target, support
//! amount) out of its text.
//!
//! The AI service is an external, rate-limited, non-deterministic dependency,
//! so the pipeline only ever talks to the narrow `Classifier` trait:
//!
//! - `GeminiClassifier`: rig completion model behind a JSON prompt
//! - `RetryingClassifier`: exponential backoff around any classifier
//! - `KeywordClassifier`: deterministic keyword rules, used without an API key
//! - `StaticClassifier`: fixed results per URL for tests
//!
//! Every result passes through `GeminiAnalysisResult::normalized` so dates are
//! strict ISO or `None` whichever implementation produced them.

mod config;
pub mod dates;
mod error;
mod gemini;
mod keyword;
mod retry;
mod stub;

pub use config::{ClassifierConfig, ClassifierConfigBuilder};
pub use dates::{extract_period, normalize_date};
pub use error::ClassificationError;
pub use gemini::GeminiClassifier;
pub use keyword::KeywordClassifier;
pub use retry::RetryingClassifier;
pub use stub::StaticClassifier;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Structured fields pulled out of an announcement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedInfo {
    pub application_period_start: Option<String>,
    pub application_period_end: Option<String>,
    pub budget: Option<String>,
    pub target_description: Option<String>,
    pub support_amount: Option<String>,
}

/// Classification outcome for one announcement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiAnalysisResult {
    pub is_relevant: bool,
    /// In `[0, 1]` after normalization
    pub relevance_score: f64,
    pub keywords_matched: Vec<String>,
    pub extracted_info: ExtractedInfo,
    pub reasoning: String,
}

/// Placeholder answers models give instead of leaving a field empty
const EMPTY_MARKERS: &[&str] = &["null", "none", "n/a", "-", "없음", "미정", "해당없음", "정보 없음"];

impl GeminiAnalysisResult {
    /// Result with a verdict and score and nothing else
    pub fn scored(is_relevant: bool, relevance_score: f64) -> Self {
        Self {
            is_relevant,
            relevance_score,
            ..Default::default()
        }
    }

    /// Clamp the score, normalize dates, drop placeholder strings and
    /// duplicate keywords
    pub fn normalized(mut self) -> Self {
        self.relevance_score = if self.relevance_score.is_finite() {
            self.relevance_score.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let info = &mut self.extracted_info;
        info.application_period_start = normalize_period_field(info.application_period_start.take(), true);
        info.application_period_end = normalize_period_field(info.application_period_end.take(), false);
        info.budget = clean_field(info.budget.take());
        info.target_description = clean_field(info.target_description.take());
        info.support_amount = clean_field(info.support_amount.take());

        let mut seen = std::collections::HashSet::new();
        self.keywords_matched = self
            .keywords_matched
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && seen.insert(k.clone()))
            .collect();

        self.reasoning = self.reasoning.trim().to_string();
        self
    }
}

/// A period field may hold a single date or a whole range; take the
/// matching end of a range
fn normalize_period_field(value: Option<String>, is_start: bool) -> Option<String> {
    let value = clean_field(value)?;
    normalize_date(&value).or_else(|| {
        let (start, end) = extract_period(&value);
        if is_start { start } else { end }
    })
}

fn clean_field(value: Option<String>) -> Option<String> {
    let value = value?.trim().to_string();
    let lower = value.to_lowercase();
    if value.is_empty() || EMPTY_MARKERS.contains(&lower.as_str()) {
        None
    } else {
        Some(value)
    }
}

/// One announcement to judge
#[derive(Debug, Clone, Copy)]
pub struct ClassifyRequest<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub url: &'a str,
    /// No extraction strategy cleared the quality threshold, so the text may
    /// be menus or an unrelated block rather than the announcement body
    pub low_trust: bool,
}

impl<'a> ClassifyRequest<'a> {
    pub fn new(title: &'a str, content: &'a str, url: &'a str) -> Self {
        Self {
            title,
            content,
            url,
            low_trust: false,
        }
    }

    pub fn low_trust(mut self, low_trust: bool) -> Self {
        self.low_trust = low_trust;
        self
    }
}

/// Capability to judge an announcement
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify one announcement. Failures are `ClassificationError`s and
    /// never abort a crawl.
    async fn classify(
        &self,
        request: ClassifyRequest<'_>,
    ) -> Result<GeminiAnalysisResult, ClassificationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_cleans_fields() {
        let raw = GeminiAnalysisResult {
            is_relevant: true,
            relevance_score: 1.7,
            keywords_matched: vec!["집진".into(), " 집진 ".into(), "".into(), "보조금".into()],
            extracted_info: ExtractedInfo {
                application_period_start: Some("2025.03.01 ~ 2025.03.31".into()),
                application_period_end: Some("2025.03.31 ~".into()),
                budget: Some("  5억원 ".into()),
                target_description: Some("없음".into()),
                support_amount: Some("null".into()),
            },
            reasoning: " ok ".into(),
        };

        let result = raw.normalized();
        assert_eq!(result.relevance_score, 1.0);
        assert_eq!(result.keywords_matched, vec!["집진", "보조금"]);
        assert_eq!(
            result.extracted_info.application_period_start.as_deref(),
            Some("2025-03-01")
        );
        assert_eq!(result.extracted_info.application_period_end, None);
        assert_eq!(result.extracted_info.budget.as_deref(), Some("5억원"));
        assert_eq!(result.extracted_info.target_description, None);
        assert_eq!(result.extracted_info.support_amount, None);
        assert_eq!(result.reasoning, "ok");
    }

    #[test]
    fn test_range_in_end_field_takes_end() {
        let mut raw = GeminiAnalysisResult::scored(true, 0.9);
        raw.extracted_info.application_period_end = Some("2025년 4월 1일부터 4월 30일까지".into());
        let result = raw.normalized();
        assert_eq!(
            result.extracted_info.application_period_end.as_deref(),
            Some("2025-04-30")
        );
    }

    #[test]
    fn test_nan_score_becomes_zero() {
        let result = GeminiAnalysisResult::scored(false, f64::NAN).normalized();
        assert_eq!(result.relevance_score, 0.0);
    }

    #[test]
    fn test_missing_fields_deserialize_to_defaults() {
        let result: GeminiAnalysisResult =
            serde_json::from_str(r#"{"is_relevant": true, "relevance_score": 0.8}"#).unwrap();
        assert!(result.keywords_matched.is_empty());
        assert_eq!(result.extracted_info, ExtractedInfo::default());
    }
}
