//! Quality score for candidate content blocks

use super::Rules;

const LENGTH_WEIGHT: f32 = 0.3;
const KEYWORD_WEIGHT: f32 = 0.5;
const CLEAN_WEIGHT: f32 = 0.2;

/// Distinct keyword hits needed for a full keyword score
const KEYWORD_SATURATION: usize = 4;

/// Score a candidate text in `[0, 1]`.
///
/// Combines how plausible the length is, how many domain keywords appear,
/// and how free the text is of navigation markers. Text with no domain
/// keyword at all can never score above `LENGTH_WEIGHT + CLEAN_WEIGHT`.
pub(crate) fn quality_score(text: &str, rules: &Rules) -> f32 {
    let keyword = keyword_score(text, rules);
    let length = length_score(text.chars().count(), keyword, rules);
    let clean = clean_score(text, rules);

    (LENGTH_WEIGHT * length + KEYWORD_WEIGHT * keyword + CLEAN_WEIGHT * clean).clamp(0.0, 1.0)
}

fn keyword_score(text: &str, rules: &Rules) -> f32 {
    if rules.domain_keywords.is_empty() {
        return 0.0;
    }
    let hits = rules
        .domain_keywords
        .iter()
        .filter(|keyword| text.contains(keyword.as_str()))
        .count();
    let needed = rules.domain_keywords.len().min(KEYWORD_SATURATION);
    (hits as f32 / needed as f32).min(1.0)
}

fn length_score(len: usize, keyword: f32, rules: &Rules) -> f32 {
    if len == 0 {
        return 0.0;
    }
    if len < rules.min_text_len {
        // Short blocks are usually menus or breadcrumbs
        return 0.3 * len as f32 / rules.min_text_len as f32;
    }
    if len <= rules.max_text_len {
        return 1.0;
    }
    let ratio = rules.max_text_len as f32 / len as f32;
    if keyword < 0.5 { ratio * 0.5 } else { ratio }
}

fn clean_score(text: &str, rules: &Rules) -> f32 {
    let noise_hits = rules
        .noise_markers
        .iter()
        .filter(|marker| text.contains(marker.as_str()))
        .count();
    1.0 - (noise_hits as f32 * 0.2).min(1.0)
}
