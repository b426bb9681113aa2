//! String → number conversion shared by the lexer, `tonumber`, and the
//! arithmetic coercion paths.
//!
//! Accepts optional surrounding whitespace and sign, decimal and hex
//! integers, decimal floats, and hex floats (`0x1.8p3`). Hex integer
//! literals wrap modulo 2^64; decimal integers that overflow fall back
//! to float.

use crate::value::LuaValue;

fn trim_ascii(s: &[u8]) -> &[u8] {
    let mut start = 0;
    let mut end = s.len();
    while start < end && s[start].is_ascii_whitespace() {
        start += 1;
    }
    while end > start && s[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    &s[start..end]
}

fn split_sign(s: &[u8]) -> (bool, &[u8]) {
    match s.first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    }
}

fn is_hex_prefixed(s: &[u8]) -> bool {
    s.len() > 2 && s[0] == b'0' && (s[1] == b'x' || s[1] == b'X')
}

/// Parse an integer spelling (decimal or hex). Hex wraps; decimal
/// overflow fails.
pub fn parse_integer(s: &[u8]) -> Option<i64> {
    let s = trim_ascii(s);
    let (neg, digits) = split_sign(s);
    if digits.is_empty() {
        return None;
    }
    let value = if is_hex_prefixed(digits) {
        let mut acc: u64 = 0;
        for &c in &digits[2..] {
            let d = (c as char).to_digit(16)? as u64;
            acc = acc.wrapping_mul(16).wrapping_add(d);
        }
        acc as i64
    } else {
        if !digits.iter().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let text = std::str::from_utf8(digits).ok()?;
        match text.parse::<i64>() {
            Ok(v) => v,
            Err(_) => {
                // Allow the one decimal spelling of i64::MIN.
                if neg {
                    let full = format!("-{}", text);
                    return full.parse::<i64>().ok();
                }
                return None;
            }
        }
    };
    Some(if neg { value.wrapping_neg() } else { value })
}

/// Parse a number spelling: integer first, then float.
pub fn parse_number(s: &[u8]) -> Option<LuaValue> {
    let s = trim_ascii(s);
    if s.is_empty() {
        return None;
    }
    if let Some(i) = parse_integer(s) {
        return Some(LuaValue::Integer(i));
    }
    let (neg, rest) = split_sign(s);
    let f = if is_hex_prefixed(rest) {
        parse_hex_float(&rest[2..])?
    } else {
        parse_dec_float(rest)?
    };
    Some(LuaValue::Float(if neg { -f } else { f }))
}

fn parse_dec_float(s: &[u8]) -> Option<f64> {
    // Validate shape by hand: Rust's float parser also accepts "inf"
    // and "NaN", which are not Lua numerals.
    if s.is_empty() {
        return None;
    }
    let mut saw_digit = false;
    let mut saw_dot = false;
    let mut saw_exp = false;
    let mut i = 0;
    while i < s.len() {
        match s[i] {
            b'0'..=b'9' => saw_digit = true,
            b'.' if !saw_dot && !saw_exp => saw_dot = true,
            b'e' | b'E' if saw_digit && !saw_exp => {
                saw_exp = true;
                if i + 1 < s.len() && (s[i + 1] == b'+' || s[i + 1] == b'-') {
                    i += 1;
                }
                if i + 1 >= s.len() || !s[i + 1].is_ascii_digit() {
                    return None;
                }
            }
            _ => return None,
        }
        i += 1;
    }
    if !saw_digit {
        return None;
    }
    std::str::from_utf8(s).ok()?.parse::<f64>().ok()
}

/// Hex float body (after `0x`): hex digits with an optional hex point
/// and an optional binary exponent `p±d`.
fn parse_hex_float(s: &[u8]) -> Option<f64> {
    let mut mantissa: f64 = 0.0;
    let mut scale: i32 = 0;
    let mut saw_digit = false;
    let mut saw_dot = false;
    let mut i = 0;
    while i < s.len() {
        match s[i] {
            b'.' if !saw_dot => saw_dot = true,
            c if c.is_ascii_hexdigit() => {
                saw_digit = true;
                mantissa = mantissa * 16.0 + (c as char).to_digit(16).unwrap() as f64;
                if saw_dot {
                    scale -= 4;
                }
            }
            b'p' | b'P' => break,
            _ => return None,
        }
        i += 1;
    }
    if !saw_digit {
        return None;
    }
    let mut exp: i32 = 0;
    if i < s.len() {
        // Binary exponent.
        i += 1;
        let mut neg = false;
        if i < s.len() && (s[i] == b'+' || s[i] == b'-') {
            neg = s[i] == b'-';
            i += 1;
        }
        if i >= s.len() || !s[i].is_ascii_digit() {
            return None;
        }
        while i < s.len() {
            if !s[i].is_ascii_digit() {
                return None;
            }
            exp = exp.saturating_mul(10).saturating_add((s[i] - b'0') as i32);
            i += 1;
        }
        if neg {
            exp = -exp;
        }
    }
    Some(mantissa * 2f64.powi(scale.saturating_add(exp)))
}
