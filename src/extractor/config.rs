//! # Extractor Configuration
//!
//! The acceptance threshold, keyword lists and selector list are empirically
//! tuned and expected to change as new municipal templates show up, so they
//! are all plain configuration rather than constants baked into the
//! strategies.
//!
//! ## Key Components
//!
//! - `ExtractorConfig`: selectors, keyword lists, length window and threshold
//! - `ExtractorConfigBuilder`: builder pattern implementation

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Configuration for content extraction and link resolution
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// CSS selectors of known CMS board-view templates, tried in order
    pub known_selectors: Vec<String>,

    /// Domain keywords whose presence signals announcement content
    pub domain_keywords: Vec<String>,

    /// Markers of navigation chrome
    pub noise_markers: Vec<String>,

    /// Shortest plausible announcement body, in characters
    pub min_text_len: usize,

    /// Longest plausible announcement body, in characters
    pub max_text_len: usize,

    /// A candidate must score strictly above this to be accepted
    pub acceptance_threshold: f32,

    /// Confidence assigned to an unaccepted best candidate never exceeds this
    pub low_trust_cap: f32,

    /// Fan-out cap for detail links resolved from one listing
    pub max_detail_links: usize,

    /// Minimum matching anchors for a page to count as a listing
    pub min_listing_links: usize,

    /// Regex patterns recognising detail-page URLs
    pub detail_url_patterns: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            known_selectors: strings(&[
                ".board_view",
                ".bbs_view",
                ".board-view",
                "#board_view",
                ".bod_view",
                ".view_cont",
                ".view_content",
                ".view-content",
                ".cont_view",
                "#content_view",
                ".board_detail",
                ".bbs_detail",
                ".bbsView",
                ".p-table.type-view",
            ]),
            domain_keywords: strings(&[
                "신청기간",
                "접수기간",
                "예산",
                "지원대상",
                "지원내용",
                "지원금액",
                "보조금",
                "공고",
                "모집",
                "사업비",
                "신청방법",
                "자부담",
            ]),
            noise_markers: strings(&[
                "메뉴",
                "로그인",
                "바로가기",
                "회원가입",
                "사이트맵",
                "전체메뉴",
                "개인정보처리방침",
                "저작권",
            ]),
            min_text_len: 80,
            max_text_len: 20_000,
            acceptance_threshold: 0.5,
            low_trust_cap: 0.45,
            max_detail_links: 20,
            min_listing_links: 3,
            detail_url_patterns: strings(&[
                r"(?i)[?&](nttid|nttsn|nttno|bbsidx|articleno|seq|idx|no|bidx|dataid|board_seq|list_no)=\d+",
                r"(?i)/(view|detail|read)(\.do|\.jsp|\.php|\.asp|/)",
            ]),
        }
    }
}

/// Builder for ExtractorConfig
#[derive(Debug, Default)]
pub struct ExtractorConfigBuilder {
    config: ExtractorConfig,
}

impl ExtractorConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ExtractorConfig::default(),
        }
    }

    /// Replace the known CMS selectors
    pub fn known_selectors(mut self, selectors: Vec<String>) -> Self {
        self.config.known_selectors = selectors;
        self
    }

    /// Replace the domain keyword list
    pub fn domain_keywords(mut self, keywords: Vec<String>) -> Self {
        self.config.domain_keywords = keywords;
        self
    }

    /// Replace the noise marker list
    pub fn noise_markers(mut self, markers: Vec<String>) -> Self {
        self.config.noise_markers = markers;
        self
    }

    /// Set the plausible text length window
    pub fn text_len_window(mut self, min: usize, max: usize) -> Self {
        self.config.min_text_len = min.max(1);
        self.config.max_text_len = max.max(self.config.min_text_len);
        self
    }

    /// Set the acceptance threshold; the low-trust cap follows it
    pub fn acceptance_threshold(mut self, threshold: f32) -> Self {
        let threshold = threshold.clamp(0.05, 1.0);
        self.config.acceptance_threshold = threshold;
        self.config.low_trust_cap = threshold - 0.05;
        self
    }

    /// Set the maximum number of detail links followed per listing
    pub fn max_detail_links(mut self, max: usize) -> Self {
        self.config.max_detail_links = max;
        self
    }

    /// Replace the detail URL patterns
    pub fn detail_url_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.detail_url_patterns = patterns;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ExtractorConfig {
        self.config
    }
}

impl ExtractorConfig {
    /// Create a new builder
    pub fn builder() -> ExtractorConfigBuilder {
        ExtractorConfigBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_stays_below_threshold() {
        let config = ExtractorConfig::default();
        assert!(config.low_trust_cap < config.acceptance_threshold);

        let config = ExtractorConfig::builder().acceptance_threshold(0.7).build();
        assert!(config.low_trust_cap < 0.7);
        assert!((config.acceptance_threshold - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_text_len_window_is_ordered() {
        let config = ExtractorConfig::builder().text_len_window(500, 100).build();
        assert_eq!(config.min_text_len, 500);
        assert_eq!(config.max_text_len, 500);
    }
}
