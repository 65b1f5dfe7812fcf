use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{round_cents, EntryKind};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Digits with an optional fraction. Commas are only allowed as thousands
/// separators, so `12,50` and `1.234,56` do not match.
static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?|\.\d+)$").unwrap());

/// Parse a bank-style amount into a signed value rounded to cents.
///
/// Accepts thousands separators, currency symbols, a leading `+` or `-`, and
/// both `(12.50)` and `12.50-` for negatives. Returns `None` for anything that
/// is not a plain finite number, including decimal commas.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '"' | '$' | '€' | '£' | '¥' | '₹' | ' ' | '\u{a0}'))
        .collect();
    let mut s = cleaned.as_str();
    let mut negative = false;

    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        negative = true;
        s = inner;
    } else if let Some(head) = s.strip_suffix('-') {
        negative = true;
        s = head;
    } else if let Some(tail) = s.strip_prefix('-') {
        negative = true;
        s = tail;
    } else if let Some(tail) = s.strip_prefix('+') {
        s = tail;
    }
    if !NUMBER_RE.is_match(s) {
        return None;
    }

    let value: f64 = s.replace(',', "").parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let value = if negative { -value } else { value };
    Some(round_cents(value))
}

/// Parse the date formats banks commonly export. A trailing time component is ignored.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.trim().split([' ', 'T']).next()?;

    let date = if head.len() == 8 && head.bytes().all(|b| b.is_ascii_digit()) {
        let y: i32 = head[0..4].parse().ok()?;
        let m: u32 = head[4..6].parse().ok()?;
        let d: u32 = head[6..8].parse().ok()?;
        NaiveDate::from_ymd_opt(y, m, d)?
    } else {
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(head, fmt).ok())?
    };

    // "1/5/25" parses as year 25 under %Y
    if !(1900..=2200).contains(&date.year()) {
        return None;
    }
    Some(date)
}

pub fn parse_kind(raw: &str) -> Option<EntryKind> {
    match raw.trim().to_lowercase().as_str() {
        "income" | "credit" | "deposit" | "in" | "inflow" | "cr" => Some(EntryKind::Income),
        "expense" | "debit" | "withdrawal" | "out" | "outflow" | "dr" => Some(EntryKind::Expense),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("\"$1,000.00\""), Some(1000.0));
        assert_eq!(parse_amount("(50.25)"), Some(-50.25));
        assert_eq!(parse_amount("-45.678"), Some(-45.68));
        assert_eq!(parse_amount("12.50-"), Some(-12.5));
        assert_eq!(parse_amount("+7"), Some(7.0));
        assert_eq!(parse_amount("€ 19.99"), Some(19.99));
        assert_eq!(parse_amount("0"), Some(0.0));
        assert_eq!(parse_amount("₹500"), Some(500.0));
        assert_eq!(parse_amount("₹1,00,000"), None);
        assert_eq!(parse_amount("-1,234,567.8"), Some(-1234567.8));
        assert_eq!(parse_amount(".75"), Some(0.75));
    }

    #[test]
    fn test_parse_amount_rejects_decimal_comma() {
        assert_eq!(parse_amount("12,50"), None);
        assert_eq!(parse_amount("1.234,56"), None);
        assert_eq!(parse_amount("-0,99"), None);
        assert_eq!(parse_amount("1,23"), None);
        assert_eq!(parse_amount(",500"), None);
    }

    #[test]
    fn test_parse_amount_rejects_garbage() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("  "), None);
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("NaN"), None);
        assert_eq!(parse_amount("inf"), None);
        assert_eq!(parse_amount("()"), None);
        assert_eq!(parse_amount("1.2.3"), None);
        assert_eq!(parse_amount("--5"), None);
        assert_eq!(parse_amount("1e5"), None);
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2025-01-15"), Some(ymd(2025, 1, 15)));
        assert_eq!(parse_date("2025/01/15"), Some(ymd(2025, 1, 15)));
        assert_eq!(parse_date("01/15/2025"), Some(ymd(2025, 1, 15)));
        assert_eq!(parse_date("1/5/2025"), Some(ymd(2025, 1, 5)));
        assert_eq!(parse_date("15.01.2025"), Some(ymd(2025, 1, 15)));
        assert_eq!(parse_date("20250115"), Some(ymd(2025, 1, 15)));
        assert_eq!(parse_date(" 2025-01-15 10:42:00 "), Some(ymd(2025, 1, 15)));
        assert_eq!(parse_date("2025-01-15T10:42:00Z"), Some(ymd(2025, 1, 15)));
    }

    #[test]
    fn test_parse_date_rejects_invalid() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("2025-02-30"), None);
        assert_eq!(parse_date("13/01/2025"), None);
        assert_eq!(parse_date("1/5/25"), None);
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(parse_date("20251345"), None);
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!(parse_kind("Income"), Some(EntryKind::Income));
        assert_eq!(parse_kind(" DEPOSIT "), Some(EntryKind::Income));
        assert_eq!(parse_kind("withdrawal"), Some(EntryKind::Expense));
        assert_eq!(parse_kind("out"), Some(EntryKind::Expense));
        assert_eq!(parse_kind("transfer"), None);
    }
}
