// Validation utilities module
// Custom validators for checkout requests that the validator derive cannot express

use chrono::NaiveTime;
use regex::Regex;
use std::sync::OnceLock;
use validator::ValidationError;

use crate::coupons::CustomerIdentity;

fn coupon_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,50}$").expect("coupon code regex is valid"))
}

fn time_window_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(\d{1,2}:\d{2})\s*-\s*(\d{1,2}:\d{2})\s*$").expect("time window regex is valid")
    })
}

/// Validates a coupon code: letters, digits, `-` and `_`, at most 50 characters
pub fn validate_coupon_code(code: &str) -> Result<(), ValidationError> {
    if coupon_code_regex().is_match(code.trim()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_coupon_code"))
    }
}

/// Validates that a customer identity carries a user id, an email or a phone
pub fn validate_customer_identity(identity: &CustomerIdentity) -> Result<(), ValidationError> {
    if identity.is_anonymous() {
        Err(ValidationError::new("customer_identity_required"))
    } else {
        Ok(())
    }
}

/// Splits an `HH:MM-HH:MM` string into its two times
///
/// Returns `None` for anything that is not two valid wall-clock times.
/// Ordering of the two bounds is left to the caller.
pub fn parse_time_window(raw: &str) -> Option<(NaiveTime, NaiveTime)> {
    let captures = time_window_regex().captures(raw)?;
    let start = NaiveTime::parse_from_str(captures.get(1)?.as_str(), "%H:%M").ok()?;
    let end = NaiveTime::parse_from_str(captures.get(2)?.as_str(), "%H:%M").ok()?;
    Some((start, end))
}
