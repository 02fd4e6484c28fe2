//! Parsing of the loosely formatted size and peer counts scraped from sources.

use once_cell::sync::Lazy;
use regex_lite::Regex;

static SIZE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d[\d\s.,]*)\s*(bytes?|[kmgt]i?b|[кмгтКМГТ][бБ]|[бБ]|b)?").unwrap()
});

/// Parse a human readable size ("1.46 GB", "700,5 МБ", "1234") into bytes.
///
/// Units are base 1024. A bare number is a byte count. Returns `None` when
/// no number is present.
pub fn parse_size(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let caps = SIZE_PATTERN.captures(text)?;
    let number = normalize_decimal(caps.get(1)?.as_str())?;
    let multiplier = caps
        .get(2)
        .map(|unit| unit_multiplier(unit.as_str()))
        .unwrap_or(1.0);

    let bytes = (number * multiplier).round();
    if bytes.is_finite() && bytes >= 0.0 {
        Some(bytes as u64)
    } else {
        None
    }
}

/// Parse a seed/peer count; anything that isn't a number counts as zero.
pub fn parse_count(text: &str) -> u32 {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '\u{a0}'))
        .collect();
    cleaned.parse::<u32>().unwrap_or(0)
}

fn normalize_decimal(raw: &str) -> Option<f64> {
    let raw: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let raw = raw.trim_end_matches(['.', ',']);
    let has_dot = raw.contains('.');
    let has_comma = raw.contains(',');

    let cleaned = match (has_dot, has_comma) {
        // "1,234.5": comma groups thousands
        (true, true) => raw.replace(',', ""),
        // "1,024": a lone comma before exactly three digits groups thousands
        (false, true) if is_thousands_group(raw) => raw.replace(',', ""),
        // "700,5": comma is the decimal separator
        (false, true) if raw.matches(',').count() == 1 => raw.replace(',', "."),
        (false, true) => raw.replace(',', ""),
        _ => raw.to_string(),
    };
    cleaned.parse::<f64>().ok()
}

fn is_thousands_group(raw: &str) -> bool {
    match raw.split_once(',') {
        Some((head, tail)) => {
            !head.is_empty()
                && head.len() <= 3
                && tail.len() == 3
                && tail.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

fn unit_multiplier(unit: &str) -> f64 {
    let unit = unit.to_lowercase();
    let prefix = unit.chars().next().unwrap_or('b');
    let power = match prefix {
        'k' | 'к' => 1,
        'm' | 'м' => 2,
        'g' | 'г' => 3,
        't' | 'т' => 4,
        _ => 0,
    };
    1024f64.powi(power)
}
