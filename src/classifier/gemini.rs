//! Completion-model classifier

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use rig::completion::{AssistantContent, CompletionError, CompletionModel};
use tracing::{debug, instrument, warn};

use super::{
    ClassificationError, Classifier, ClassifierConfig, ClassifyRequest, GeminiAnalysisResult,
};

const PREAMBLE: &str = r#"You screen Korean local-government announcements for a company that sells and installs environmental equipment: air-pollution prevention facilities (대기오염방지시설), dust collectors (집진기, 집진시설), odor abatement (악취방지, 탈취설비), VOC treatment, fine-dust reduction (미세먼지 저감), and related environmental facilities.

An announcement is relevant only if it offers a subsidy, grant or support program (보조금, 지원사업, 설치 지원) that such a company's customers could apply for. General notices, hiring, events and unrelated subsidies are not relevant.

Answer with a single JSON object and nothing else:
{
  "is_relevant": boolean,
  "relevance_score": number between 0 and 1,
  "keywords_matched": [strings found in the text that drove the decision],
  "extracted_info": {
    "application_period_start": "YYYY-MM-DD" or null,
    "application_period_end": "YYYY-MM-DD" or null,
    "budget": string or null,
    "target_description": string or null,
    "support_amount": string or null
  },
  "reasoning": one or two sentences
}

Use null for any field the text does not state. Never invent dates: if the deadline is "until the budget runs out" (예산 소진 시) or otherwise unstated, the end date is null."#;

const LOW_TRUST_NOTE: &str = "Note: the content below was extracted with low confidence and may be navigation or an unrelated part of the page. Only mark it relevant if the text itself clearly describes a subsidy program, and lower the score accordingly.\n";

/// `"retryDelay": "37s"` in a Gemini 429 body, or a `Retry-After: 37` header
static RETRY_DELAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:"?retry_?delay"?\s*:\s*"?|retry-after\s*:?\s*)(\d+)(?:\.\d+)?"#)
        .expect("valid regex")
});

/// Classifier backed by a rig completion model
#[derive(Clone)]
pub struct GeminiClassifier<M: CompletionModel> {
    model: M,
    config: ClassifierConfig,
}

impl<M: CompletionModel> GeminiClassifier<M> {
    pub fn new(model: M, config: ClassifierConfig) -> Self {
        Self { model, config }
    }

    fn prompt(&self, request: &ClassifyRequest<'_>) -> String {
        let content: String = request
            .content
            .chars()
            .take(self.config.max_content_chars)
            .collect();
        let note = if request.low_trust { LOW_TRUST_NOTE } else { "" };
        format!(
            "Title: {}\nURL: {}\n{note}\nContent:\n{content}",
            request.title, request.url
        )
    }
}

#[async_trait]
impl<M> Classifier for GeminiClassifier<M>
where
    M: CompletionModel + 'static,
{
    #[instrument(skip(self, request), fields(model = %self.config.model, url = request.url, low_trust = request.low_trust))]
    async fn classify(
        &self,
        request: ClassifyRequest<'_>,
    ) -> Result<GeminiAnalysisResult, ClassificationError> {
        let completion = self
            .model
            .completion_request(self.prompt(&request))
            .preamble(PREAMBLE.to_string())
            .temperature(0.1);

        let response = tokio::time::timeout(self.config.call_timeout, completion.send())
            .await
            .map_err(|_| ClassificationError::Timeout(self.config.call_timeout))?
            .map_err(map_completion_error)?;

        let text = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        let result = parse_analysis(&text)?;
        debug!(
            is_relevant = result.is_relevant,
            score = result.relevance_score,
            "Classified"
        );
        Ok(result)
    }
}

fn map_completion_error(err: CompletionError) -> ClassificationError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("429") || lower.contains("resource_exhausted") || lower.contains("quota") {
        warn!("Classification quota exhausted: {}", message);
        ClassificationError::Quota {
            retry_after_secs: retry_after_secs(&message),
        }
    } else {
        ClassificationError::Request(message)
    }
}

fn retry_after_secs(message: &str) -> Option<u64> {
    RETRY_DELAY
        .captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Parse the model's answer, tolerating markdown fences and chatter around
/// the JSON object
pub(crate) fn parse_analysis(text: &str) -> Result<GeminiAnalysisResult, ClassificationError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => {
            return Err(ClassificationError::MalformedResponse(format!(
                "no JSON object in response: {}",
                text.chars().take(200).collect::<String>()
            )));
        }
    };

    serde_json::from_str::<GeminiAnalysisResult>(json)
        .map(GeminiAnalysisResult::normalized)
        .map_err(|e| ClassificationError::MalformedResponse(e.to_string()))
}
