//! List/detail link resolution

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

use super::Rules;

static HREF: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid anchor selector"));

/// Detail-shaped links found on a page, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailLinks {
    /// Distinct matching links before the fan-out cap
    pub total_found: usize,

    /// Links to follow, capped
    pub urls: Vec<String>,
}

/// Collect same-host anchors whose URL looks like a board detail view.
///
/// Fragments are dropped, `javascript:` and `mailto:` hrefs ignored, the page
/// itself excluded, and duplicates removed keeping first occurrence.
pub(crate) fn detail_links(document: &Html, page_url: &Url, rules: &Rules) -> DetailLinks {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for anchor in document.select(&HREF) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        let lower = href.to_ascii_lowercase();
        if href.is_empty()
            || href.starts_with('#')
            || lower.starts_with("javascript:")
            || lower.starts_with("mailto:")
        {
            continue;
        }

        let Ok(mut resolved) = page_url.join(href) else {
            continue;
        };
        resolved.set_fragment(None);

        if resolved.host_str() != page_url.host_str() || resolved == *page_url {
            continue;
        }

        let candidate = resolved.to_string();
        if !rules.detail_patterns.iter().any(|re| re.is_match(&candidate)) {
            continue;
        }
        if seen.insert(candidate.clone()) {
            urls.push(candidate);
        }
    }

    let total_found = urls.len();
    urls.truncate(rules.max_detail_links);
    DetailLinks { total_found, urls }
}
