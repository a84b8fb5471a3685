use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::{
    error::{Error, Result},
    submission::Hemisphere,
};

/// Dates are stored as `%y%m%d` throughout the log.
pub const DATE_FORMAT: &str = "%y%m%d";

/// Formats the production form has been observed to submit, tried in order
/// after the six-digit fast path.
const FREE_FORM_DATES: &[&str] = &[
    "%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%Y/%m/%d", "%m-%d-%Y", "%m-%d-%y", "%B %d, %Y",
    "%b %d, %Y", "%d %B %Y", "%Y%m%d",
];

/// # Errors
/// Fails with [`Error::DateParse`] when the input is neither a valid
/// six-digit `%y%m%d` date nor parseable by any known free-form format.
pub fn normalize_date(input: &str) -> Result<String> {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 6 && NaiveDate::parse_from_str(&digits, DATE_FORMAT).is_ok() {
        return Ok(digits);
    }

    let trimmed = input.trim();
    for format in FREE_FORM_DATES {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date.format(DATE_FORMAT).to_string());
        }
    }

    Err(Error::DateParse {
        input: input.to_string(),
    })
}

/// Rotates a sequencing index into the canonical `{letter}{digit}{digit}`
/// shape. Returns `None` for shapes the sequencing core does not issue.
#[must_use]
pub fn normalize_sequencing_index(input: &str) -> Option<String> {
    let index = input.trim().to_uppercase();
    let chars: Vec<char> = index.chars().collect();

    match chars.as_slice() {
        [a, b, c] if a.is_ascii_digit() && b.is_ascii_digit() && c.is_ascii_alphabetic() => {
            Some(format!("{c}{a}{b}"))
        }
        [a, b, c] if a.is_ascii_alphabetic() && b.is_ascii_digit() && c.is_ascii_digit() => {
            Some(index)
        }
        [a, b] if a.is_ascii_digit() && b.is_ascii_alphabetic() => Some(format!("{b}0{a}")),
        [a, b] if a.is_ascii_alphabetic() && b.is_ascii_digit() => Some(format!("{a}0{b}")),
        _ => None,
    }
}

/// Left-pads a `{letter}{digit}` index to `{letter}0{digit}`. Idempotent, and
/// the identity on anything already three characters wide.
#[must_use]
pub fn pad_index(index: &str) -> String {
    let chars: Vec<char> = index.chars().collect();

    match chars.as_slice() {
        [a, b] if a.is_ascii_alphabetic() && b.is_ascii_digit() => format!("{a}0{b}"),
        _ => index.to_string(),
    }
}

/// Single-slab projects fold the hemisphere into the slab number: RIGHT adds
/// 40, BOTH adds 90, LEFT keeps it. Always zero-padded to width 2.
///
/// # Errors
pub fn resolve_single_slab(raw: &str, hemisphere: Hemisphere) -> Result<String> {
    let n: u32 = raw
        .trim()
        .parse()
        .map_err(|_| Error::malformed("slab", format!("expected a slab number, got {raw:?}")))?;

    let n = match hemisphere {
        Hemisphere::Left => n,
        Hemisphere::Right => n + 40,
        Hemisphere::Both => n + 90,
    };

    Ok(format!("{n:02}"))
}

/// Multi-slab projects take a comma-separated slab list. Entries are padded
/// independently, order preserved, no hemisphere offset.
///
/// # Errors
pub fn resolve_slab_list(raw: &str) -> Result<Vec<String>> {
    let entries: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("{s:0>2}"))
        .collect();

    if entries.is_empty() {
        return Err(Error::malformed("slab", "no slab numbers provided"));
    }

    Ok(entries)
}

/// Numeric tiles are zero-padded to two digits; anatomical tokens (e.g. "EC")
/// pass through untouched.
#[must_use]
pub fn resolve_tile(raw: &str) -> String {
    let tile = raw.trim();

    match tile.parse::<u32>() {
        Ok(n) => format!("{n:02}"),
        Err(_) => tile.to_string(),
    }
}

static USER_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]+").unwrap());

/// Collapses anything outside `[A-Za-z0-9_-]` to `_`; empty input falls back
/// to `unknown`. The result names the user's log object, so it has to be
/// path-safe.
#[must_use]
pub fn sanitize_user_key(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        return "unknown".to_string();
    }

    let key = USER_KEY.replace_all(name, "_");
    if key.is_empty() {
        "unknown".to_string()
    } else {
        key.into_owned()
    }
}
