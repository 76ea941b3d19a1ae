//! Date normalization for application periods.
//!
//! Municipal pages write dates every way imaginable. Output is strict ISO
//! `YYYY-MM-DD` or `None`; nothing here guesses. A missing year, a two-digit
//! year, an impossible calendar date or free text such as "상시" or
//! "예산 소진 시까지" all give `None`, which keeps "no deadline" distinct from
//! a wrong deadline.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

static DOTTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})\s*[./-]\s*(\d{1,2})\s*[./-]\s*(\d{1,2})\s*\.?$").expect("valid regex")
});

static KOREAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})\s*년\s*(\d{1,2})\s*월\s*(\d{1,2})\s*일$").expect("valid regex")
});

static COMPACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})(\d{2})(\d{2})$").expect("valid regex"));

static WEEKDAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(\s*[월화수목금토일]\s*\)").expect("valid regex"));

static TRAILING_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+(?:(?:오전|오후)\s*)?\d{1,2}\s*(?::\s*\d{2}|시)(?:\s*:\s*\d{2}|\s*\d{1,2}\s*분)?$")
        .expect("valid regex")
});

static RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?P<sy>\d{4})\s*(?:[./-]|년)\s*(?P<sm>\d{1,2})\s*(?:[./-]|월)\s*(?P<sd>\d{1,2})\s*일?\.?",
        r"\s*(?:\(\s*[월화수목금토일]\s*\))?\s*(?:(?:오전|오후)\s*)?(?:\d{1,2}\s*:\s*\d{2})?",
        r"\s*(?:~|∼|〜|–|—|-|부터)\s*",
        r"(?:(?P<ey>\d{4})\s*(?:[./-]|년)\s*)?(?P<em>\d{1,2})\s*(?:[./-]|월)\s*(?P<ed>\d{1,2})",
    ))
    .expect("valid regex")
});

/// Normalize a single date to ISO `YYYY-MM-DD`.
///
/// Accepts `2025.03.01`, `2025-3-1`, `2025/03/01`, `2025. 3. 1.`,
/// `2025년 3월 1일`, `20250301`, optionally followed by a weekday in
/// parentheses, a time, or `까지`. Anything else is `None`.
pub fn normalize_date(raw: &str) -> Option<String> {
    let cleaned = clean(raw);
    if cleaned.is_empty() {
        return None;
    }

    let caps = DOTTED
        .captures(&cleaned)
        .or_else(|| KOREAN.captures(&cleaned))
        .or_else(|| COMPACT.captures(&cleaned))?;

    iso(&caps[1], &caps[2], &caps[3])
}

/// Find the first date range in prose and normalize both ends.
///
/// An end date without a year takes the start's year. If that puts the end
/// before the start (a period spanning new year written without years), the
/// end is left unknown rather than guessed.
pub fn extract_period(text: &str) -> (Option<String>, Option<String>) {
    let Some(caps) = RANGE.captures(text) else {
        return (None, None);
    };

    let Some(start) = iso(&caps["sy"], &caps["sm"], &caps["sd"]) else {
        return (None, None);
    };

    let end_year = caps.name("ey").map(|m| m.as_str()).unwrap_or(&caps["sy"]);
    let end = iso(end_year, &caps["em"], &caps["ed"]).filter(|end| *end >= start);

    (Some(start), end)
}

fn clean(raw: &str) -> String {
    let mut s = raw.trim().to_string();
    if let Some(stripped) = s.strip_suffix("까지") {
        s = stripped.trim_end().to_string();
    }
    let s = WEEKDAY.replace_all(&s, "");
    let s = TRAILING_TIME.replace(&s, "");
    s.trim().to_string()
}

fn iso(year: &str, month: &str, day: &str) -> Option<String> {
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.format("%Y-%m-%d").to_string())
}
