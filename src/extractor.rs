//! # Smart Content Extractor
//!
//! Picks the meaningful content block out of heterogeneous municipal HTML and
//! resolves detail links on listing pages.
//!
//! No single selector generalizes across hundreds of independently built
//! sites, and "biggest text block" alone is fooled by sidebar menus, so
//! extraction runs a ranked chain of strategies (see `strategies`) and scores
//! each candidate. The first candidate whose score clears the acceptance
//! threshold wins. When none does, the best-scoring candidate is returned with
//! its confidence capped below the threshold so callers can treat it as
//! low-trust. Extraction never fails.
//!
//! ## Key Components
//!
//! - `Extractor`: compiled configuration, entry point for a page
//! - `ExtractedContent`: the chosen block with method and confidence
//! - `PageAnalysis`: content, title and detail links from one parse
//! - `ExtractorConfig`: tunable selectors, keywords and threshold

mod config;
mod error;
mod links;
mod scoring;
mod strategies;
mod title;

pub use config::{ExtractorConfig, ExtractorConfigBuilder};
pub use error::ExtractError;
pub use links::DetailLinks;

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use strategies::{Candidate, STRATEGY_CHAIN};

/// How the content block was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// A known CMS selector matched
    Selector,
    /// A structural heuristic picked the block
    Heuristic,
    /// Whole-body fallback
    Fallback,
}

/// Best-guess meaningful content of a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub method: ExtractionMethod,
    pub selector: Option<String>,
    /// Quality in `[0, 1]`
    pub confidence: f32,
    pub text: String,
    /// Threshold the confidence was judged against
    #[serde(skip)]
    pub(crate) threshold: f32,
}

impl ExtractedContent {
    /// Whether no strategy cleared the acceptance threshold. Low-trust
    /// content is still usable, just flagged.
    pub fn is_low_trust(&self) -> bool {
        self.confidence <= self.threshold
    }
}

/// Everything the pipeline needs from one fetched page
#[derive(Debug, Clone)]
pub struct PageAnalysis {
    pub content: ExtractedContent,
    pub title: Option<String>,
    /// True when the page looks like a board listing or the region says so
    pub is_listing: bool,
    pub detail_links: DetailLinks,
}

/// Configuration compiled into selectors and regexes
#[derive(Debug)]
pub(crate) struct Rules {
    pub known_selectors: Vec<(String, Selector)>,
    pub domain_keywords: Vec<String>,
    pub noise_markers: Vec<String>,
    pub min_text_len: usize,
    pub max_text_len: usize,
    pub acceptance_threshold: f32,
    pub low_trust_cap: f32,
    pub max_detail_links: usize,
    pub min_listing_links: usize,
    pub detail_patterns: Vec<Regex>,
}

impl Rules {
    pub(crate) fn compile(config: &ExtractorConfig) -> Result<Self, ExtractError> {
        let known_selectors = config
            .known_selectors
            .iter()
            .map(|raw| {
                Selector::parse(raw)
                    .map(|selector| (raw.clone(), selector))
                    .map_err(|e| ExtractError::InvalidSelector {
                        selector: raw.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let detail_patterns = config
            .detail_url_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            known_selectors,
            domain_keywords: config.domain_keywords.clone(),
            noise_markers: config.noise_markers.clone(),
            min_text_len: config.min_text_len,
            max_text_len: config.max_text_len,
            acceptance_threshold: config.acceptance_threshold,
            low_trust_cap: clamp_cap(config.low_trust_cap, config.acceptance_threshold),
            max_detail_links: config.max_detail_links,
            min_listing_links: config.min_listing_links,
            detail_patterns,
        })
    }
}

/// Unaccepted candidates must score strictly below the threshold, even when
/// the configured cap is not
fn clamp_cap(cap: f32, threshold: f32) -> f32 {
    cap.min(threshold - f32::EPSILON).max(0.0)
}

/// Content extractor with compiled configuration
#[derive(Debug)]
pub struct Extractor {
    rules: Rules,
}

impl Extractor {
    /// Compile a configuration; fails only on invalid selectors or patterns
    pub fn new(config: &ExtractorConfig) -> Result<Self, ExtractError> {
        Ok(Self {
            rules: Rules::compile(config)?,
        })
    }

    /// Acceptance threshold in use
    pub fn threshold(&self) -> f32 {
        self.rules.acceptance_threshold
    }

    /// Extract the content block of an HTML page
    pub fn extract(&self, html: &str) -> ExtractedContent {
        let document = Html::parse_document(html);
        self.extract_document(&document)
    }

    /// Extract content, title and detail links from a fetched page.
    ///
    /// # Arguments
    ///
    /// * `html` - The page DOM
    /// * `page_url` - Final URL of the page, used to resolve relative links
    /// * `force_listing` - Treat the page as a listing regardless of links
    #[instrument(skip(self, html), fields(len = html.len()))]
    pub fn analyze(&self, html: &str, page_url: &str, force_listing: bool) -> PageAnalysis {
        let document = Html::parse_document(html);
        let content = self.extract_document(&document);

        let block = content
            .selector
            .as_deref()
            .and_then(|raw| Selector::parse(raw).ok());
        let title = title::extract_title(&document, block.as_ref());

        let detail_links = match Url::parse(page_url) {
            Ok(base) => links::detail_links(&document, &base, &self.rules),
            Err(e) => {
                debug!("Cannot resolve links against {}: {}", page_url, e);
                DetailLinks::default()
            }
        };
        let is_listing = force_listing || detail_links.total_found >= self.rules.min_listing_links;

        PageAnalysis {
            content,
            title,
            is_listing,
            detail_links,
        }
    }

    fn extract_document(&self, document: &Html) -> ExtractedContent {
        let mut best: Option<(Candidate, f32)> = None;

        for strategy in STRATEGY_CHAIN {
            let Some(candidate) = strategy(document, &self.rules) else {
                continue;
            };
            let score = scoring::quality_score(&candidate.text, &self.rules);

            if score > self.rules.acceptance_threshold {
                debug!(method = ?candidate.method, selector = ?candidate.selector, score, "Accepted candidate");
                return self.finish(candidate, score);
            }

            let better = best.as_ref().is_none_or(|(_, s)| score > *s);
            if better {
                best = Some((candidate, score));
            }
        }

        match best {
            Some((candidate, score)) => {
                debug!(method = ?candidate.method, score, "No candidate accepted, using best");
                let capped = score.min(self.rules.low_trust_cap);
                self.finish(candidate, capped)
            }
            None => self.finish(
                Candidate {
                    method: ExtractionMethod::Fallback,
                    selector: None,
                    text: String::new(),
                },
                0.0,
            ),
        }
    }

    fn finish(&self, candidate: Candidate, confidence: f32) -> ExtractedContent {
        ExtractedContent {
            method: candidate.method,
            selector: candidate.selector,
            confidence,
            text: candidate.text,
            threshold: self.rules.acceptance_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> Extractor {
        Extractor::new(&ExtractorConfig::default()).unwrap()
    }

    const ANNOUNCEMENT: &str = r#"<html><head><title>환경정책과</title></head><body>
        <nav><a href="/">홈</a> 전체메뉴 로그인</nav>
        <div class="board_view">
          <h3>2025년 소규모 사업장 방지시설 설치 지원사업 공고</h3>
          <p>신청기간: 2025.03.01 ~ 2025.03.31</p>
          <p>지원대상: 관내 대기배출시설 설치 사업장</p>
          <p>예산: 12억원, 보조금 90% 지원 (자부담 10%)</p>
          <p>신청방법: 시청 환경정책과 방문 또는 우편 접수. 자세한 사항은 첨부파일을 확인하시기 바랍니다.</p>
        </div>
        <footer>저작권 시청</footer>
    </body></html>"#;

    #[test]
    fn test_known_template_is_accepted() {
        let extractor = extractor();
        let content = extractor.extract(ANNOUNCEMENT);

        assert_eq!(content.method, ExtractionMethod::Selector);
        assert_eq!(content.selector.as_deref(), Some(".board_view"));
        assert!(content.confidence > extractor.threshold());
        assert!(!content.is_low_trust());
        assert!(content.text.contains("신청기간"));
        assert!(!content.text.contains("로그인"));
    }

    #[test]
    fn test_unknown_template_falls_back_below_threshold() {
        let html = format!(
            "<html><body><span>{}</span></body></html>",
            "동네 소식을 전해드립니다. 이번 주말에는 체육대회가 열립니다. ".repeat(4)
        );
        let extractor = extractor();
        let content = extractor.extract(&html);

        assert!(!content.text.is_empty());
        assert!(content.confidence < extractor.threshold());
        assert!(content.is_low_trust());
    }

    #[test]
    fn test_cap_at_threshold_still_falls_below() {
        let config = ExtractorConfig {
            low_trust_cap: 0.5,
            acceptance_threshold: 0.5,
            ..ExtractorConfig::default()
        };
        let extractor = Extractor::new(&config).unwrap();
        let html = format!(
            "<html><body><span>{}</span></body></html>",
            "동네 소식을 전해드립니다. 이번 주말에는 체육대회가 열립니다. ".repeat(4)
        );

        let content = extractor.extract(&html);
        assert!(content.confidence < extractor.threshold());
        assert!(content.is_low_trust());
        assert!(clamp_cap(0.9, 0.5) < 0.5);
        assert_eq!(clamp_cap(0.45, 0.5), 0.45);
    }

    #[test]
    fn test_empty_document_does_not_fail() {
        let content = extractor().extract("");
        assert!(content.text.is_empty());
        assert!(content.is_low_trust());
    }

    #[test]
    fn test_analyze_detects_listing() {
        let rows: String = (1..=5)
            .map(|i| format!(r#"<tr><td><a href="/board/view.do?nttId={i}">공고 {i}</a></td></tr>"#))
            .collect();
        let html = format!("<html><body><table>{rows}</table></body></html>");

        let analysis = extractor().analyze(&html, "https://gu.go.kr/board/list.do", false);
        assert!(analysis.is_listing);
        assert_eq!(analysis.detail_links.urls.len(), 5);
    }

    #[test]
    fn test_analyze_detail_page_has_title() {
        let analysis = extractor().analyze(
            ANNOUNCEMENT,
            "https://city.go.kr/board/view.do?nttId=7",
            false,
        );
        assert!(!analysis.is_listing);
        assert_eq!(
            analysis.title.as_deref(),
            Some("2025년 소규모 사업장 방지시설 설치 지원사업 공고")
        );
    }

    #[test]
    fn test_invalid_selector_is_rejected() {
        let config = ExtractorConfig::builder()
            .known_selectors(vec!["div[".to_string()])
            .build();
        assert!(matches!(
            Extractor::new(&config),
            Err(ExtractError::InvalidSelector { .. })
        ));
    }
}
