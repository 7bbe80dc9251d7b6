//! Tolerant value conversion for wire tokens
//!
//! Every value arrives as text. A failed conversion is never an error:
//! the caller keeps the old value and skips the rest of the tuple.

/// Parse a signed integer. Falls back to a float parse rounded half away
/// from zero, since some firmware sends "25.0" for integer fields.
pub fn parse_int(text: &str) -> Option<i32> {
    if text.is_empty() {
        return None;
    }
    if let Ok(value) = text.parse::<i32>() {
        return Some(value);
    }
    parse_float(text).map(|f| f.round() as i32)
}

/// Parse an unsigned integer. No float fallback.
pub fn parse_uint(text: &str) -> Option<u32> {
    if text.is_empty() {
        return None;
    }
    text.parse::<u32>().ok()
}

pub fn parse_float(text: &str) -> Option<f32> {
    if text.is_empty() {
        return None;
    }
    text.parse::<f32>().ok().filter(|f| f.is_finite())
}

/// Case-insensitive "true" is true; any other non-empty text is false.
pub fn parse_bool(text: &str) -> Option<bool> {
    if text.is_empty() {
        return None;
    }
    Some(text.eq_ignore_ascii_case("true"))
}

/// Convert a 0..1 fraction into a rounded percentage.
pub fn fraction_to_percent(fraction: f32) -> i32 {
    (fraction * 100.0 + 0.5) as i32
}
