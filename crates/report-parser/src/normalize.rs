//! Raw string to typed value conversion

use chrono::NaiveDate;
use shared_types::{FieldKind, FieldValue};

/// Date layouts accepted for date fields, tried in order
pub const DATE_FORMATS: [&str; 3] = ["%m/%d/%y", "%m/%d/%Y", "%Y-%m-%d"];

/// Convert a raw match to the declared kind; `None` means the value is unusable
pub fn normalize_value(raw: &str, kind: FieldKind) -> Option<FieldValue> {
    match kind {
        FieldKind::Text => normalize_text(raw).map(FieldValue::Text),
        FieldKind::Number => parse_number(raw).map(FieldValue::Number),
        FieldKind::Date => parse_date(raw).map(FieldValue::Date),
    }
}

pub fn normalize_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Parse amounts like `1,234.56`, `.00`, `-12.5` or accounting-style `(12.00)`
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let (body, negate) = match trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
    {
        Some(inner) => (inner.trim(), true),
        None => (trimmed, false),
    };

    let cleaned: String = body.chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty()
        || (negate && cleaned.starts_with('-'))
        || !cleaned
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == '-')
    {
        return None;
    }
    let value = cleaned.parse::<f64>().ok().filter(|n| n.is_finite())?;
    Some(if negate { -value } else { value })
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Capitalise the first letter of every alphabetic run and lowercase the rest
pub fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_is_letter = false;
    for ch in raw.chars() {
        if ch.is_alphabetic() {
            if prev_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(ch);
            prev_is_letter = false;
        }
    }
    out
}
