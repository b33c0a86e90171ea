//! Date canonicalisation.
//!
//! Users type dates however they like; letters must show one consistent
//! format. [`canonical_date`] recognises the common spellings, re-renders
//! them with the configured `chrono` format, and passes anything it cannot
//! parse through unchanged so free-form text ("end of April") still works.

use crate::error::LetterError;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write;
use tracing::debug;

/// Input formats tried in order. Day-first wins for ambiguous numeric dates.
const INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d.%m.%Y",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%d-%m-%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
];

/// `28th` → `28`.
static RE_ORDINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").unwrap());

static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// True if `format` is a valid `chrono` strftime string.
pub fn is_valid_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Today's date on the wall clock of `tz`.
pub fn today(tz: Tz) -> NaiveDate {
    date_in(Utc::now(), tz)
}

/// Calendar date of the instant `now` in `tz`. DST is applied, so a London
/// summer night just after midnight is already the next day.
pub fn date_in(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// Parse a user-typed date. Returns `None` for free-form text.
pub fn parse_date(input: &str, tz: Tz) -> Option<NaiveDate> {
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("today") {
        return Some(today(tz));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive());
    }

    let cleaned = RE_ORDINAL.replace_all(trimmed, "$1");
    let cleaned = RE_SPACES.replace_all(&cleaned, " ");
    INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok())
}

/// Render a date with `format`.
pub fn format_date(date: NaiveDate, format: &str) -> Result<String, LetterError> {
    let mut out = String::new();
    write!(out, "{}", date.format(format))
        .map_err(|_| LetterError::InvalidConfig(format!("Invalid date format '{format}'")))?;
    Ok(out)
}

/// Normalise `input` to the canonical date string written into letters.
///
/// Empty input is rejected; unparseable input is returned trimmed.
pub fn canonical_date(
    input: &str,
    format: &str,
    tz: Tz,
) -> Result<String, LetterError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(LetterError::InvalidRequest("date must not be empty".into()));
    }
    match parse_date(trimmed, tz) {
        Some(date) => format_date(date, format),
        None => {
            debug!("Date '{}' not recognised; using it verbatim", trimmed);
            Ok(trimmed.to_string())
        }
    }
}
