use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};

use tally_core::Ledger;
use tally_core::models::{User, today};

/// Accepts `YYYY-MM-DD` or today/yesterday/tomorrow; `None` means today.
pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    let today = today();
    match date_str.as_deref() {
        None | Some("today") => Ok(today),
        Some("yesterday") => today.checked_sub_days(Days::new(1)).context("date out of range"),
        Some("tomorrow") => today.checked_add_days(Days::new(1)).context("date out of range"),
        Some(s) => tally_core::models::parse_date(s)
            .with_context(|| format!("Use YYYY-MM-DD or today/yesterday/tomorrow, got '{s}'")),
    }
}

/// The command line acts on behalf of a user identified by email.
pub(crate) fn find_user(ledger: &Ledger, email: &str) -> Result<User> {
    ledger
        .database()
        .get_user_by_email(email.trim())?
        .with_context(|| format!("No user registered with email '{email}'"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn fmt_opt(v: Option<f64>, unit: &str) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{v:.0}{unit}"))
}

/// Shorten to at most `max` characters, ending in `...` when there is room.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max <= 3 {
        return s.chars().take(max).collect();
    }
    let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
    format!("{}...", &s[..end])
}
