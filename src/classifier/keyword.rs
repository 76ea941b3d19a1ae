//! Deterministic keyword classifier

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::{
    ClassificationError, Classifier, ClassifyRequest, ExtractedInfo, GeminiAnalysisResult,
    extract_period,
};

/// Keyword verdicts never reach the AI-verified threshold
pub const KEYWORD_SCORE_CAP: f64 = 0.6;

/// Score multiplier for text the extractor did not trust
const LOW_TRUST_FACTOR: f64 = 0.5;

static BUDGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:총\s*)?(?:사업비|예산)\s*[:：]?\s*(?:총\s*)?([\d,.]+\s*(?:억|천만|백만|만)?\s*(?:천)?\s*원)")
        .expect("valid regex")
});

static SUPPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:지원\s*(?:금액|한도|규모|내용)|보조\s*(?:금액|비율))\s*[:：]?\s*([^\n]{1,120})")
        .expect("valid regex")
});

static TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:지원\s*대상|신청\s*대상|참여\s*대상)\s*[:：]?\s*([^\n]{1,200})").expect("valid regex")
});

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Relevance from keyword co-occurrence: an announcement must mention both
/// the equipment domain and a subsidy to count. Used when no AI key is
/// configured.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    equipment: Vec<String>,
    subsidy: Vec<String>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self {
            equipment: strings(&[
                "방지시설",
                "대기오염",
                "집진",
                "악취",
                "미세먼지",
                "환경설비",
                "VOC",
                "휘발성유기화합물",
                "탈취",
                "저감장치",
                "저감시설",
                "배출시설",
            ]),
            subsidy: strings(&["보조금", "지원사업", "지원금", "설치 지원", "설치지원", "공모", "모집"]),
        }
    }
}

impl KeywordClassifier {
    pub fn new(equipment: Vec<String>, subsidy: Vec<String>) -> Self {
        Self { equipment, subsidy }
    }

    fn hits<'a>(keywords: &'a [String], text: &str) -> Vec<&'a String> {
        keywords.iter().filter(|k| text.contains(k.as_str())).collect()
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(
        &self,
        request: ClassifyRequest<'_>,
    ) -> Result<GeminiAnalysisResult, ClassificationError> {
        let content = request.content;
        let text = format!("{}\n{}", request.title, content);
        let equipment = Self::hits(&self.equipment, &text);
        let subsidy = Self::hits(&self.subsidy, &text);

        let coverage = |n: usize| (n as f64 / 2.0).min(1.0);
        let mut score = KEYWORD_SCORE_CAP * (coverage(equipment.len()) + coverage(subsidy.len())) / 2.0;
        if request.low_trust {
            score *= LOW_TRUST_FACTOR;
        }
        let is_relevant = !equipment.is_empty() && !subsidy.is_empty();

        let (start, end) = extract_period(content);
        let capture = |re: &Regex| {
            re.captures(content)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
        };

        let keywords_matched: Vec<String> =
            equipment.iter().chain(subsidy.iter()).map(|k| k.to_string()).collect();
        let mut reasoning = format!("keyword match: {}", keywords_matched.join(", "));
        if request.low_trust {
            reasoning.push_str(" (low-confidence extraction)");
        }

        Ok(GeminiAnalysisResult {
            is_relevant,
            relevance_score: score,
            reasoning,
            keywords_matched,
            extracted_info: ExtractedInfo {
                application_period_start: start,
                application_period_end: end,
                budget: capture(&BUDGET),
                target_description: capture(&TARGET),
                support_amount: capture(&SUPPORT),
            },
        }
        .normalized())
    }
}
