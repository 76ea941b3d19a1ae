//! Candidate content-region strategies.
//!
//! Each strategy is an independent pure function over the parsed document.
//! `STRATEGY_CHAIN` fixes the order in which they are consulted.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};

use super::{ExtractionMethod, Rules};

/// A content block proposed by a strategy, not yet scored
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub method: ExtractionMethod,
    pub selector: Option<String>,
    pub text: String,
}

pub(crate) type Strategy = fn(&Html, &Rules) -> Option<Candidate>;

/// Strategies in priority order: known CMS selectors, structural heuristics,
/// then the whole body
pub(crate) const STRATEGY_CHAIN: &[Strategy] = &[
    by_known_selectors,
    by_semantic_container,
    by_largest_table,
    by_largest_block,
    full_body,
];

static SEMANTIC: LazyLock<Vec<(&'static str, Selector)>> = LazyLock::new(|| {
    ["main", "article", "[role=main]", "#content", "#contents", ".content", "#container"]
        .into_iter()
        .map(|s| (s, Selector::parse(s).expect("valid semantic selector")))
        .collect()
});

static TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("valid table selector"));

static BLOCKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div, section, td").expect("valid block selector"));

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("valid anchor selector"));

static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("valid body selector"));

/// Never contribute text
const ALWAYS_SKIP: &[&str] = &["script", "style", "noscript", "template", "iframe"];

/// Page chrome, skipped by the whole-body fallback
const CHROME: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "nav", "header", "footer", "aside",
];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "li", "tr", "table", "br", "h1", "h2", "h3", "h4", "h5",
    "h6", "ul", "ol", "dl", "dt", "dd", "pre", "blockquote",
];

/// Link-heavy blocks are menus, not content
const MAX_LINK_DENSITY: f32 = 0.5;

fn by_known_selectors(document: &Html, rules: &Rules) -> Option<Candidate> {
    rules.known_selectors.iter().find_map(|(raw, selector)| {
        let text = document
            .select(selector)
            .map(|el| element_text(el, ALWAYS_SKIP))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        (!text.is_empty()).then(|| Candidate {
            method: ExtractionMethod::Selector,
            selector: Some(raw.clone()),
            text,
        })
    })
}

fn by_semantic_container(document: &Html, _rules: &Rules) -> Option<Candidate> {
    SEMANTIC
        .iter()
        .flat_map(|(raw, selector)| document.select(selector).map(move |el| (*raw, el)))
        .map(|(raw, el)| (raw, element_text(el, CHROME)))
        .filter(|(_, text)| !text.is_empty())
        .max_by_key(|(_, text)| text.chars().count())
        .map(|(raw, text)| Candidate {
            method: ExtractionMethod::Heuristic,
            selector: Some(raw.to_string()),
            text,
        })
}

fn by_largest_table(document: &Html, _rules: &Rules) -> Option<Candidate> {
    document
        .select(&TABLE)
        .map(|el| element_text(el, ALWAYS_SKIP))
        .filter(|text| !text.is_empty())
        .max_by_key(|text| text.chars().count())
        .map(|text| Candidate {
            method: ExtractionMethod::Heuristic,
            selector: Some("table".to_string()),
            text,
        })
}

/// Innermost block carrying most of the page's non-link text.
///
/// Wrappers always contain at least as much text as their children, so the
/// biggest block is usually `body`'s direct child. Taking the smallest block
/// that still holds 80% of the maximum avoids that.
fn by_largest_block(document: &Html, _rules: &Rules) -> Option<Candidate> {
    let blocks: Vec<(String, usize, usize)> = document
        .select(&BLOCKS)
        .filter_map(|el| {
            let text = element_text(el, CHROME);
            let total = text.chars().count();
            if total == 0 {
                return None;
            }
            let link_len = link_text_len(el);
            if link_len as f32 / total as f32 >= MAX_LINK_DENSITY {
                return None;
            }
            Some((text, total, total.saturating_sub(link_len)))
        })
        .collect();

    let best = blocks.iter().map(|(_, _, plain)| *plain).max()?;
    let floor = best * 4 / 5;

    blocks
        .into_iter()
        .filter(|(_, _, plain)| *plain >= floor)
        .min_by_key(|(_, total, _)| *total)
        .map(|(text, _, _)| Candidate {
            method: ExtractionMethod::Heuristic,
            selector: None,
            text,
        })
}

/// Last resort: everything in `body` except page chrome. Always yields a
/// candidate, even an empty one.
fn full_body(document: &Html, _rules: &Rules) -> Option<Candidate> {
    let text = match document.select(&BODY).next() {
        Some(body) => element_text(body, CHROME),
        None => element_text(document.root_element(), CHROME),
    };
    Some(Candidate {
        method: ExtractionMethod::Fallback,
        selector: None,
        text,
    })
}

fn link_text_len(element: ElementRef<'_>) -> usize {
    element
        .select(&ANCHOR)
        .map(|a| normalize_whitespace(&a.text().collect::<String>()).chars().count())
        .sum()
}

/// Visible text of an element with block boundaries kept as line breaks
pub(crate) fn element_text(element: ElementRef<'_>, skip: &[&str]) -> String {
    let mut raw = String::new();
    collect_text(element, skip, &mut raw);
    normalize_whitespace(&raw)
}

fn collect_text(element: ElementRef<'_>, skip: &[&str], out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if skip.contains(&name) {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push('\n');
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, skip, out);
                }
                if block {
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

/// Collapse runs of whitespace within lines and drop blank lines
pub(crate) fn normalize_whitespace(raw: &str) -> String {
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::ExtractorConfig;

    fn rules() -> Rules {
        Rules::compile(&ExtractorConfig::default()).unwrap()
    }

    #[test]
    fn test_element_text_skips_scripts_and_keeps_lines() {
        let html = Html::parse_document(
            "<body><div><p>첫째   줄</p><script>var x = 1;</script><p>둘째 줄</p></div></body>",
        );
        let body = html.select(&BODY).next().unwrap();
        assert_eq!(element_text(body, ALWAYS_SKIP), "첫째 줄\n둘째 줄");
    }

    #[test]
    fn test_known_selector_wins_first() {
        let html = Html::parse_document(
            "<body><main>메인 영역</main><div class='board_view'>게시물 본문</div></body>",
        );
        let candidate = by_known_selectors(&html, &rules()).unwrap();
        assert_eq!(candidate.method, ExtractionMethod::Selector);
        assert_eq!(candidate.selector.as_deref(), Some(".board_view"));
        assert_eq!(candidate.text, "게시물 본문");
    }

    #[test]
    fn test_full_body_skips_chrome() {
        let html = Html::parse_document(
            "<body><nav>전체메뉴</nav><header>로그인</header><p>본문 내용</p><footer>저작권</footer></body>",
        );
        let candidate = full_body(&html, &rules()).unwrap();
        assert_eq!(candidate.method, ExtractionMethod::Fallback);
        assert_eq!(candidate.text, "본문 내용");
    }

    #[test]
    fn test_largest_block_ignores_link_menus() {
        let menu: String = (0..20)
            .map(|i| format!("<a href='/m{i}'>메뉴 항목 {i}</a>"))
            .collect();
        let html = Html::parse_document(&format!(
            "<body><div id='wrap'><div class='menu'>{menu}</div>\
             <div class='text'><p>{}</p></div></div></body>",
            "대기오염방지시설 지원 안내문입니다. ".repeat(5)
        ));
        let candidate = by_largest_block(&html, &rules()).unwrap();
        assert!(candidate.text.starts_with("대기오염방지시설"));
        assert!(!candidate.text.contains("메뉴 항목"));
    }
}
