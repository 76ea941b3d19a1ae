//! Announcement title extraction

use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::strategies::normalize_whitespace;

static OG_TITLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[property="og:title"]"#).expect("valid og:title selector")
});

static HEADINGS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3").expect("valid heading selector"));

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid title selector"));

/// Longest title we keep; anything longer is almost certainly body text
const MAX_TITLE_CHARS: usize = 300;

/// Best-effort title: `og:title`, then the first heading inside the content
/// block (or the page when no block selector is known), then `<title>`
pub(crate) fn extract_title(document: &Html, block: Option<&Selector>) -> Option<String> {
    let og = document
        .select(&OG_TITLE)
        .filter_map(|meta| meta.value().attr("content"))
        .map(normalize_whitespace)
        .find(|t| !t.is_empty());

    let heading = || {
        let from_block = block.and_then(|selector| {
            document
                .select(selector)
                .flat_map(|el| el.select(&HEADINGS))
                .map(|h| normalize_whitespace(&h.text().collect::<Vec<_>>().join(" ")))
                .find(|t| !t.is_empty())
        });
        from_block.or_else(|| {
            document
                .select(&HEADINGS)
                .map(|h| normalize_whitespace(&h.text().collect::<Vec<_>>().join(" ")))
                .find(|t| !t.is_empty())
        })
    };

    let page_title = || {
        document
            .select(&TITLE)
            .map(|t| normalize_whitespace(&t.text().collect::<String>()))
            .find(|t| !t.is_empty())
    };

    og.or_else(heading)
        .or_else(page_title)
        .map(|t| t.replace('\n', " ").chars().take(MAX_TITLE_CHARS).collect())
}
