use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, TallyError};

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 255;

static COLOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").unwrap());
static CURRENCY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{3}$").unwrap());
static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_.-]{2,32}$").unwrap());

/// Trimmed, non-empty, bounded display name for an account/category/tag.
pub fn name(label: &str, raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TallyError::Validation(format!("{label} name is required")));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(TallyError::Validation(format!(
            "{label} name contains control characters"
        )));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(TallyError::Validation(format!(
            "{label} name is longer than {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Case-folded form of a name. Two names with the same key are the same entity.
pub fn name_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn description(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TallyError::Validation("Description is required".into()));
    }
    if trimmed.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(TallyError::Validation(format!(
            "Description is longer than {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn color(raw: Option<&str>) -> Result<Option<String>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(c) if COLOR_RE.is_match(c) => Ok(Some(c.to_lowercase())),
        Some(c) => Err(TallyError::Validation(format!(
            "Invalid color: {c} (expected #rrggbb)"
        ))),
    }
}

pub fn currency(raw: &str) -> Result<String> {
    let upper = raw.trim().to_uppercase();
    if CURRENCY_RE.is_match(&upper) {
        Ok(upper)
    } else {
        Err(TallyError::Validation(format!(
            "Invalid currency code: {raw} (expected a 3-letter ISO code)"
        )))
    }
}

pub fn username(raw: &str) -> Result<String> {
    let lower = raw.trim().to_lowercase();
    if USERNAME_RE.is_match(&lower) {
        Ok(lower)
    } else {
        Err(TallyError::Validation(format!(
            "Invalid username: {raw} (2-32 characters: letters, digits, '_', '.', '-')"
        )))
    }
}

pub fn positive_amount(amount: f64) -> Result<f64> {
    let rounded = crate::models::round_cents(amount);
    if !rounded.is_finite() || rounded <= 0.0 {
        return Err(TallyError::Validation(format!(
            "Amount must be greater than zero (got {amount})"
        )));
    }
    Ok(rounded)
}
