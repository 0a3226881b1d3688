//! Field extractors
//!
//! Pure functions that pull structured values (pincode, state/district,
//! birth year, authority parts) out of noisy cell text. Malformed input is
//! the normal case here: every extractor returns `None` instead of failing.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::pensioner::{AgeCategory, AuthorityParts};
use crate::domain::sheet::{excel_serial_to_date, CellValue};

pub const MIN_BIRTH_YEAR: i32 = 1900;

/// Numbers below this are treated as years; at or above, as Excel serials
/// (3000 is 1908-03-18).
const MIN_EXCEL_SERIAL: f64 = 3000.0;

// Pincode patterns in priority order. Each captures the whole digit run so a
// 5- or 7-digit number is rejected instead of being truncated to six.
static PIN_DASH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bpin(?:\s*code)?\s*-\s*([0-9]+)").unwrap());
static PIN_LABEL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bpin(?:\s*code)?\s*(?:no\.?)?\s*[:.]?\s*([0-9]+)").unwrap()
});
static TRAILING_DASH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-\s*([0-9]+)\s*\.?\s*$").unwrap());
static BARE_PINCODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^0-9])([0-9]{6})(?:[^0-9]|$)").unwrap());

static BARE_YEAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^0-9])((?:19|20)[0-9]{2})(?:[^0-9]|$)").unwrap());

static DISTRICT_MARKER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bDIS(?:TRICT|TT|T)\b\.?\s*[:\-]?\s*").unwrap());

/// Date layouts tried, in order, before falling back to a bare year
const DATE_FORMATS: &[&str] = &[
    "%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y", "%Y-%m-%d", "%Y/%m/%d", "%d-%b-%Y", "%d %b %Y",
    "%d-%B-%Y", "%d %B %Y", "%b %d, %Y", "%m/%d/%Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d/%m/%Y %H:%M",
];

pub fn current_year() -> i32 {
    Local::now().year()
}

/// Find a 6-digit postal code in free text.
///
/// Patterns are tried in priority order: `Pin-123456`, `PIN: 123456`,
/// trailing `-123456`, then any bare 6-digit run.
pub fn extract_pincode(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for pattern in [&*PIN_DASH_PATTERN, &*PIN_LABEL_PATTERN, &*TRAILING_DASH_PATTERN] {
        let found = pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .find(|digits| digits.len() == 6);
        if let Some(digits) = found {
            return Some(digits.to_string());
        }
    }

    BARE_PINCODE_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Pincode from a dedicated pincode column. Numeric cells are accepted as-is
/// when they have exactly six digits; text falls back to `extract_pincode`.
pub fn clean_pincode(cell: &CellValue) -> Option<String> {
    match cell {
        CellValue::Int(n) => six_digit_number(*n),
        CellValue::Float(f) if f.fract() == 0.0 && f.is_finite() => six_digit_number(*f as i64),
        CellValue::Text(s) => {
            let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
            if is_pincode(&compact) {
                Some(compact)
            } else {
                extract_pincode(s)
            }
        }
        _ => None,
    }
}

pub fn is_pincode(value: &str) -> bool {
    value.len() == 6 && value.bytes().all(|b| b.is_ascii_digit())
}

fn six_digit_number(n: i64) -> Option<String> {
    if (100_000..=999_999).contains(&n) {
        Some(n.to_string())
    } else {
        None
    }
}

/// Locate a known state in an address and take the district from the text
/// just before it.
///
/// The text is upper-cased; the earliest state occurrence on word boundaries
/// wins (longer names win ties). The district is the comma-delimited segment
/// preceding the state, or the text after a `DIST`/`DISTRICT` marker, or the
/// last word when the address has no commas. Both are `None` when no state
/// is present.
pub fn extract_state_district(
    text: &str,
    known_states: &[String],
) -> (Option<String>, Option<String>) {
    let upper = text.to_uppercase();
    if upper.trim().is_empty() {
        return (None, None);
    }

    let mut best: Option<(usize, &str)> = None;
    for state in known_states {
        let state = state.trim();
        if state.is_empty() {
            continue;
        }
        let state_upper = state.to_uppercase();
        if let Some(idx) = find_word(&upper, &state_upper) {
            let better = match best {
                None => true,
                Some((best_idx, best_state)) => {
                    idx < best_idx || (idx == best_idx && state.len() > best_state.len())
                }
            };
            if better {
                best = Some((idx, state));
            }
        }
    }

    let Some((idx, state)) = best else {
        return (None, None);
    };

    let district = district_before(&upper[..idx]).filter(|d| d != &state.to_uppercase());
    (Some(state.to_uppercase()), district)
}

fn find_word(haystack: &str, needle: &str) -> Option<usize> {
    haystack.match_indices(needle).map(|(idx, _)| idx).find(|&idx| {
        let before_ok = haystack[..idx]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[idx + needle.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

fn district_before(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim_end_matches(|c: char| {
        c.is_whitespace() || c.is_ascii_digit() || ",-:;./()".contains(c)
    });
    if trimmed.is_empty() {
        return None;
    }

    let has_comma = trimmed.contains(',');
    let segment = trimmed.rsplit(',').next().unwrap_or(trimmed).trim();

    let candidate = if let Some(m) = DISTRICT_MARKER_PATTERN.find_iter(segment).last() {
        segment[m.end()..].trim().to_string()
    } else {
        let words: Vec<&str> = segment.split_whitespace().collect();
        if has_comma && words.len() <= 3 {
            words.join(" ")
        } else {
            words.last().map(|w| w.to_string()).unwrap_or_default()
        }
    };

    let cleaned = candidate
        .trim_matches(|c: char| !c.is_alphanumeric())
        .trim()
        .to_string();

    if cleaned.is_empty() || cleaned.chars().all(|c| c.is_ascii_digit()) {
        None
    } else {
        Some(cleaned)
    }
}

/// Birth year from a date cell, a year number, or date-like text.
///
/// Text is tried against `DATE_FORMATS` first, then a bare 4-digit year.
/// Anything outside `1900..=reference_year` is rejected.
pub fn extract_birth_year(value: &CellValue, reference_year: i32) -> Option<i32> {
    let plausible = |year: i32| (MIN_BIRTH_YEAR..=reference_year).contains(&year);

    match value {
        CellValue::Empty | CellValue::Bool(_) => None,
        CellValue::Date(d) => Some(d.year()).filter(|y| plausible(*y)),
        CellValue::Int(n) => year_from_number(*n as f64, reference_year),
        CellValue::Float(f) => year_from_number(*f, reference_year),
        CellValue::Text(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(n) = s.parse::<f64>() {
                return year_from_number(n, reference_year);
            }
            if let Some(date) = parse_date_text(s) {
                return Some(date.year()).filter(|y| plausible(*y));
            }
            BARE_YEAR_PATTERN
                .captures_iter(s)
                .filter_map(|caps| caps.get(1))
                .filter_map(|m| m.as_str().parse::<i32>().ok())
                .find(|y| plausible(*y))
        }
    }
}

fn year_from_number(n: f64, reference_year: i32) -> Option<i32> {
    if !n.is_finite() {
        return None;
    }
    let plausible = |year: i32| (MIN_BIRTH_YEAR..=reference_year).contains(&year);

    if n < MIN_EXCEL_SERIAL {
        // Year-sized numbers are read as years, never as serial days.
        return Some(n as i32).filter(|y| n.fract() == 0.0 && plausible(*y));
    }
    // Unformatted date cells arrive as Excel serial numbers.
    excel_serial_to_date(n)
        .map(|d| d.year())
        .filter(|y| plausible(*y))
}

pub fn parse_date_text(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

pub fn compute_age(birth_year: Option<i32>, reference_year: i32) -> Option<i32> {
    birth_year.map(|y| reference_year - y).filter(|age| *age >= 0)
}

pub fn age_category(age: Option<i32>) -> AgeCategory {
    AgeCategory::from_age(age)
}

/// Split a comma/hyphen delimited sanctioning-authority text into its parts.
///
/// `SPOs,Goalpara Div, Dhubri-783301` gives type `SPOs`, division
/// `Goalpara Div`, area `Dhubri`, pincode `783301`. Text without any
/// delimiter yields empty parts.
pub fn parse_authority(text: &str) -> AuthorityParts {
    let text = text.trim();
    if text.is_empty() || !(text.contains(',') || text.contains('-')) {
        return AuthorityParts::default();
    }

    let comma_parts: Vec<String> = split_clean(text, ',');
    let mut parts = if comma_parts.len() > 1 {
        comma_parts
    } else {
        split_clean(text, '-')
    };

    let mut pincode = None;
    if parts.len() > 1 && parts.last().map_or(false, |p| is_pincode(p)) {
        pincode = parts.pop();
    }

    let (area, area_pincode) = match parts.len() {
        0 | 1 => (None, None),
        _ => parts
            .pop()
            .map(|last| split_area_pincode(&last))
            .unwrap_or((None, None)),
    };

    let authority_type = if parts.is_empty() {
        None
    } else {
        Some(parts.remove(0))
    };
    let division = if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    };

    AuthorityParts {
        authority_type,
        authority_division: division,
        authority_area: area,
        authority_pincode: pincode.or(area_pincode),
    }
}

fn split_clean(text: &str, sep: char) -> Vec<String> {
    text.split(sep)
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect()
}

fn split_area_pincode(part: &str) -> (Option<String>, Option<String>) {
    let pincode = extract_pincode(part);
    let area: String = match &pincode {
        Some(pin) => part.replacen(pin.as_str(), "", 1),
        None => part.to_string(),
    };
    let area = area
        .trim()
        .trim_end_matches(|c: char| c == '-' || c == ':' || c.is_whitespace())
        .trim()
        .to_string();
    let area = if area.is_empty() || is_pin_label(&area) {
        None
    } else {
        Some(area)
    };
    (area, pincode)
}

fn is_pin_label(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    lower == "pin" || lower == "pincode" || lower == "pin code"
}
