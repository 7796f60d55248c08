use crate::schema::FiscalYear;
use chrono::{Days, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;

static FY_SHORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^fy\s*'?(\d{2})$").expect("valid regex"));

static FY_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:fy\s*)?(\d{4})\s*-\s*(\d{2}|\d{4})$").expect("valid regex")
});

static FY_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:fy\s*)?(\d{4})(?:\.0+)?$").expect("valid regex"));

// Alternation order matters: ranges before short FY codes before bare years.
static FY_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:fy\s*)?(\d{4})\s*-\s*(\d{2}|\d{4})\b|\bfy\s*'?(\d{2})\b|\b(?:fy\s*)?((?:19|20)\d{2})\b",
    )
    .expect("valid regex")
});

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d", "%d-%b-%Y", "%d %b %Y", "%d.%m.%Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M"];

/// Parses a fiscal-year cell.
///
/// Three mutually exclusive patterns are tried in order:
/// - `FY23` → 2023-24
/// - `2022-23` / `2022-2023` → 2022-23
/// - `2023` → 2023-24
///
/// Anything else, including ranges that do not span exactly one year, yields `None`.
pub fn parse_fiscal_year(raw: &str) -> Option<FiscalYear> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = FY_SHORT.captures(text) {
        let short: i32 = caps[1].parse().ok()?;
        return Some(FiscalYear::new(2000 + short));
    }

    if let Some(caps) = FY_RANGE.captures(text) {
        let start: i32 = caps[1].parse().ok()?;
        let end = normalize_end_year(start, &caps[2])?;
        return (end == start + 1).then(|| FiscalYear::new(start));
    }

    if let Some(caps) = FY_BARE.captures(text) {
        let start: i32 = caps[1].parse().ok()?;
        return Some(FiscalYear::new(start));
    }

    None
}

/// Expands a two digit end year relative to the start year's century.
fn normalize_end_year(start: i32, end: &str) -> Option<i32> {
    let value: i32 = end.parse().ok()?;
    if end.len() == 4 {
        return Some(value);
    }

    let mut year = start - start.rem_euclid(100) + value;
    if year < start {
        year += 100;
    }
    Some(year)
}

/// Every fiscal year mentioned in free text, in order of appearance, without duplicates.
pub fn extract_fiscal_years(text: &str) -> Vec<FiscalYear> {
    let mut years = Vec::new();

    for caps in FY_IN_TEXT.captures_iter(text) {
        let parsed = if let (Some(start), Some(end)) = (caps.get(1), caps.get(2)) {
            start.as_str().parse::<i32>().ok().and_then(|start| {
                normalize_end_year(start, end.as_str())
                    .filter(|end| *end == start + 1)
                    .map(|_| FiscalYear::new(start))
            })
        } else if let Some(short) = caps.get(3) {
            short
                .as_str()
                .parse::<i32>()
                .ok()
                .map(|short| FiscalYear::new(2000 + short))
        } else {
            caps.get(4)
                .and_then(|year| year.as_str().parse::<i32>().ok())
                .map(FiscalYear::new)
        };

        if let Some(year) = parsed {
            if !years.contains(&year) {
                years.push(year);
            }
        }
    }

    years
}

/// Parses a posting date cell; returns `None` for anything unrecognised.
///
/// Spreadsheet exports sometimes carry dates as serial day numbers, which are
/// accepted as well.
pub fn parse_posting_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if is_blank(text) {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.date());
        }
    }

    excel_serial_to_date(text)
}

fn excel_serial_to_date(text: &str) -> Option<NaiveDate> {
    let serial: f64 = text.parse().ok()?;
    if !(20_000.0..=80_000.0).contains(&serial) {
        return None;
    }

    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(serial.trunc() as u64))
}

/// Parses a monetary cell such as `"1,23,456.50"`, `"₹ 500"` or `"(250)"`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let text = raw.trim();
    if is_blank(text) {
        return None;
    }

    let (negative, body) = match text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, text),
    };

    let cleaned: String = body
        .trim_start_matches("Rs.")
        .trim_start_matches("INR")
        .chars()
        .filter(|c| !matches!(c, ',' | '₹' | ' ' | '\u{a0}'))
        .collect();

    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Spreadsheet exports spell "no value" in several ways.
pub fn is_blank(cell: &str) -> bool {
    let text = cell.trim();
    text.is_empty()
        || ["nan", "null", "none", "n/a", "na", "-", "#n/a"]
            .iter()
            .any(|marker| text.eq_ignore_ascii_case(marker))
}
