//! Bounded text helpers shared by the log, program and sync codecs.
//!
//! Sensor values travel as signed tenths (`235` = 23.5) everywhere in the
//! core; they only become decimal text at the file and JSON boundary.

use core::cmp::Ordering;
use core::fmt;

/// Copy `s` into a fixed-capacity string, or `None` if it does not fit.
pub fn bounded<const N: usize>(s: &str) -> Option<heapless::String<N>> {
    let mut out = heapless::String::new();
    out.push_str(s).ok()?;
    Some(out)
}

/// ASCII case-insensitive ordering (file names on FAT media).
pub fn cmp_ignore_ascii_case(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_uppercase())
        .cmp(b.bytes().map(|c| c.to_ascii_uppercase()))
}

/// A fixed-point value with one fractional digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tenths(pub i16);

impl fmt::Display for Tenths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = i32::from(self.0);
        // Sign is written separately so that -0.5 keeps its minus.
        let sign = if v < 0 { "-" } else { "" };
        let abs = v.abs();
        write!(f, "{sign}{}.{}", abs / 10, abs % 10)
    }
}

/// Parse decimal text (`"23"`, `"-0.5"`, `"27.55"`) into tenths.
///
/// Digits beyond the first fractional one are truncated.  Returns `None`
/// for anything that is not a plain decimal number or does not fit `i16`.
pub fn parse_tenths(s: &str) -> Option<i16> {
    let s = s.trim();
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|c| c.is_ascii_digit()) || !frac_part.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let mut value: i32 = 0;
    for c in int_part.bytes() {
        value = value.checked_mul(10)?.checked_add(i32::from(c - b'0'))?;
        if value > i32::from(i16::MAX) {
            return None;
        }
    }
    value *= 10;
    if let Some(first) = frac_part.bytes().next() {
        value += i32::from(first - b'0');
    }
    if negative {
        value = -value;
    }
    i16::try_from(value).ok()
}
