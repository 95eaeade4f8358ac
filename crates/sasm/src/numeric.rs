//! Numeric literal parsing and signed-term folding.
//!
//! SASM literals carry their base as a suffix: `b` → binary, `d` → decimal,
//! `h` → hexadecimal (first character must be a digit so that `cafe` stays a
//! name while `0cafeh` is a number). A bare digit string is decimal. The
//! folder collapses `+`/`-` chains inside bracketed expressions, summing the
//! literal terms and keeping everything else verbatim.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

/// Is `b` an ASCII hex digit (`0-9a-f`)? The preprocessor lowercases
/// everything outside string literals, so uppercase never reaches here.
#[inline]
pub(crate) fn is_hex_digit(b: u8) -> bool {
    b.is_ascii_digit() || (b'a'..=b'f').contains(&b)
}

/// Parse a base-suffixed literal to its signed 32-bit value.
///
/// Accepts an optional leading `+`/`-`. Returns `None` when the text is not
/// a literal (so callers can fall through to name classification) or when
/// the value fits neither `i32` nor `u32`. Values in the `u32` range are
/// reinterpreted as their two's-complement `i32`.
pub fn parse_literal(s: &str) -> Option<i32> {
    let (neg, digits) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    let bytes = digits.as_bytes();
    let last = *bytes.last()?;

    let value = if last == b'h' {
        let body = &digits[..digits.len() - 1];
        if body.is_empty() || !bytes[0].is_ascii_digit() || !body.bytes().all(is_hex_digit) {
            return None;
        }
        i64::from_str_radix(body, 16).ok()?
    } else if digits
        .bytes()
        .all(|b| b.is_ascii_digit() || b == b'b' || b == b'd')
    {
        match last {
            b'b' => i64::from_str_radix(&digits[..digits.len() - 1], 2).ok()?,
            b'd' => digits[..digits.len() - 1].parse::<i64>().ok()?,
            _ => digits.parse::<i64>().ok()?,
        }
    } else {
        return None;
    };

    let value = if neg { -value } else { value };
    if value < i64::from(i32::MIN) || value > i64::from(u32::MAX) {
        return None;
    }
    Some(value as i32)
}

/// Does `s` look like a numeric literal once an optional `h` suffix is
/// stripped? Label names matching this are rejected as ambiguous.
pub(crate) fn is_hexish_name(s: &str) -> bool {
    let body = s.strip_suffix('h').unwrap_or(s);
    !body.is_empty() && body.bytes().all(is_hex_digit)
}

/// Split `s` into `(negated, term)` pairs on top-level `+`/`-`.
///
/// Empty terms (as produced by a leading sign) are dropped; the sign is
/// carried to the following term.
pub(crate) fn signed_terms(s: &str) -> Vec<(bool, &str)> {
    let mut out = Vec::new();
    let mut neg = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if c == '+' || c == '-' {
            if i > start {
                out.push((neg, &s[start..i]));
            }
            neg = c == '-';
            start = i + 1;
        }
    }
    if s.len() > start {
        out.push((neg, &s[start..]));
    }
    out
}

/// Fold the sum-of-signed-terms form of a bracketed expression.
///
/// Literal terms are summed; unrecognized terms (registers, scaled index
/// expressions, names) are concatenated in order with their signs. The
/// result is `unrecognized_terms` followed by the signed sum in decimal,
/// with a zero sum omitted when anything else survived.
pub fn fold_terms(s: &str) -> String {
    let mut sum: i64 = 0;
    let mut rest = String::new();
    for (neg, term) in signed_terms(s) {
        if let Some(v) = parse_literal(term) {
            if neg {
                sum -= i64::from(v);
            } else {
                sum += i64::from(v);
            }
        } else {
            if !rest.is_empty() {
                rest.push(if neg { '-' } else { '+' });
            } else if neg {
                rest.push('-');
            }
            rest.push_str(term);
        }
    }
    let sum = sum as i32;
    if rest.is_empty() {
        format!("{}", sum)
    } else if sum == 0 {
        rest
    } else if sum < 0 {
        format!("{}{}", rest, sum)
    } else {
        format!("{}+{}", rest, sum)
    }
}

/// Fold `s` to a constant when every signed term is a literal.
pub fn fold_constant(s: &str) -> Option<i32> {
    let terms = signed_terms(s);
    if terms.is_empty() {
        return None;
    }
    let mut sum: i64 = 0;
    for (neg, term) in terms {
        let v = i64::from(parse_literal(term)?);
        sum = if neg { sum - v } else { sum + v };
    }
    Some(sum as i32)
}
