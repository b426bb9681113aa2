//! The numeric kernel: uniform arithmetic over 64-bit integers and
//! IEEE-754 doubles with Lua's conversion and overflow rules.
//!
//! Integer arithmetic wraps modulo 2^64 interpreted as signed. `/` and
//! `^` always produce floats; `//` and `%` stay integral when both
//! operands are integers; floor division rounds toward negative
//! infinity and the sign of `%` follows the divisor.

mod parse;

pub use parse::{parse_integer, parse_number};

use crate::value::LuaValue;

/// Failures the kernel reports without consulting metamethods.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NumError {
    /// Integer division or modulo by zero.
    DivByZero,
    /// A bitwise operand has no exact integer representation.
    NoIntegerRepr,
}

// ===== integer primitives =====

#[inline(always)]
pub fn int_add(a: i64, b: i64) -> i64 {
    a.wrapping_add(b)
}

#[inline(always)]
pub fn int_sub(a: i64, b: i64) -> i64 {
    a.wrapping_sub(b)
}

#[inline(always)]
pub fn int_mul(a: i64, b: i64) -> i64 {
    a.wrapping_mul(b)
}

/// Floor division on integers. Division by zero is an error; division
/// of `i64::MIN` by `-1` wraps like the other operators.
pub fn int_floordiv(a: i64, b: i64) -> Result<i64, NumError> {
    if b == 0 {
        return Err(NumError::DivByZero);
    }
    if b == -1 {
        return Ok(a.wrapping_neg());
    }
    let q = a.wrapping_div(b);
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

/// Integer modulo; the result takes the sign of the divisor.
pub fn int_mod(a: i64, b: i64) -> Result<i64, NumError> {
    if b == 0 {
        return Err(NumError::DivByZero);
    }
    if b == -1 {
        return Ok(0);
    }
    let r = a.wrapping_rem(b);
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

// ===== float primitives =====

#[inline(always)]
pub fn float_floordiv(a: f64, b: f64) -> f64 {
    (a / b).floor()
}

/// Float modulo with Lua semantics: the result follows the divisor's
/// sign, unlike `f64::rem`.
pub fn float_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

// ===== shifts =====

/// Left shift. The count is taken modulo 64; a negative count shifts
/// the other way.
pub fn int_shl(a: i64, b: i64) -> i64 {
    if b < 0 {
        return int_shr(a, b.wrapping_neg());
    }
    let n = (b as u64) % 64;
    ((a as u64) << n) as i64
}

/// Logical right shift with the same count rules as `int_shl`.
pub fn int_shr(a: i64, b: i64) -> i64 {
    if b < 0 {
        return int_shl(a, b.wrapping_neg());
    }
    let n = (b as u64) % 64;
    ((a as u64) >> n) as i64
}

// ===== conversions =====

/// Exact float→integer conversion: succeeds iff the float is finite and
/// representable as `i64` without rounding.
pub fn float_to_integer(f: f64) -> Option<i64> {
    if !f.is_finite() || f.fract() != 0.0 {
        return None;
    }
    // 2^63 is exactly representable; i64::MAX is not, so compare
    // against the half-open range [-2^63, 2^63).
    const MIN_F: f64 = -9_223_372_036_854_775_808.0;
    const MAX_PLUS_ONE: f64 = 9_223_372_036_854_775_808.0;
    if (MIN_F..MAX_PLUS_ONE).contains(&f) {
        Some(f as i64)
    } else {
        None
    }
}

/// `tointeger`: integer as-is, exact float, or a string spelling an
/// integer (decimal or hex).
pub fn to_integer(v: &LuaValue) -> Option<i64> {
    match v {
        LuaValue::Integer(i) => Some(*i),
        LuaValue::Float(f) => float_to_integer(*f),
        LuaValue::String(s) => parse_integer(s.as_bytes()),
        _ => None,
    }
}

/// `tonumber`: numbers pass through; strings parse as integer first,
/// then float (decimal, hex, hex-float).
pub fn to_number(v: &LuaValue) -> Option<LuaValue> {
    match v {
        LuaValue::Integer(_) | LuaValue::Float(_) => Some(v.clone()),
        LuaValue::String(s) => parse_number(s.as_bytes()),
        _ => None,
    }
}

/// Operand of a bitwise operator: must have an exact integer
/// representation.
pub fn bit_operand(v: &LuaValue) -> Result<i64, NumError> {
    match v {
        LuaValue::Integer(i) => Ok(*i),
        LuaValue::Float(f) => float_to_integer(*f).ok_or(NumError::NoIntegerRepr),
        _ => Err(NumError::NoIntegerRepr),
    }
}

// ===== mixed comparisons =====
//
// Integer/float order comparisons cannot go through a float cast: a
// large i64 loses precision as f64. The float is split at its floor or
// ceiling instead, which is exact in the overlapping range.

pub fn lt_int_float(i: i64, f: f64) -> bool {
    if f.is_nan() {
        return false;
    }
    if f >= 9_223_372_036_854_775_808.0 {
        return true;
    }
    if f < -9_223_372_036_854_775_808.0 {
        return false;
    }
    let fl = f.floor();
    let fi = fl as i64;
    i < fi || (i == fi && f != fl)
}

pub fn le_int_float(i: i64, f: f64) -> bool {
    if f.is_nan() {
        return false;
    }
    if f >= 9_223_372_036_854_775_808.0 {
        return true;
    }
    if f < -9_223_372_036_854_775_808.0 {
        return false;
    }
    i <= f.floor() as i64
}

pub fn lt_float_int(f: f64, i: i64) -> bool {
    if f.is_nan() {
        return false;
    }
    if f >= 9_223_372_036_854_775_808.0 {
        return false;
    }
    if f < -9_223_372_036_854_775_808.0 {
        return true;
    }
    let cl = f.ceil();
    let ci = cl as i64;
    ci < i || (ci == i && f != cl)
}

pub fn le_float_int(f: f64, i: i64) -> bool {
    if f.is_nan() {
        return false;
    }
    if f >= 9_223_372_036_854_775_808.0 {
        return false;
    }
    if f < -9_223_372_036_854_775_808.0 {
        return true;
    }
    f.ceil() as i64 <= i
}

/// Number equality across the integer/float split.
pub fn num_eq(a: &LuaValue, b: &LuaValue) -> Option<bool> {
    match (a, b) {
        (LuaValue::Integer(x), LuaValue::Integer(y)) => Some(x == y),
        (LuaValue::Float(x), LuaValue::Float(y)) => Some(x == y),
        (LuaValue::Integer(x), LuaValue::Float(y)) => Some((*x as f64) == *y),
        (LuaValue::Float(x), LuaValue::Integer(y)) => Some(*x == (*y as f64)),
        _ => None,
    }
}

pub fn num_lt(a: &LuaValue, b: &LuaValue) -> Option<bool> {
    match (a, b) {
        (LuaValue::Integer(x), LuaValue::Integer(y)) => Some(x < y),
        (LuaValue::Float(x), LuaValue::Float(y)) => Some(x < y),
        (LuaValue::Integer(x), LuaValue::Float(y)) => Some(lt_int_float(*x, *y)),
        (LuaValue::Float(x), LuaValue::Integer(y)) => Some(lt_float_int(*x, *y)),
        _ => None,
    }
}

pub fn num_le(a: &LuaValue, b: &LuaValue) -> Option<bool> {
    match (a, b) {
        (LuaValue::Integer(x), LuaValue::Integer(y)) => Some(x <= y),
        (LuaValue::Float(x), LuaValue::Float(y)) => Some(x <= y),
        (LuaValue::Integer(x), LuaValue::Float(y)) => Some(le_int_float(*x, *y)),
        (LuaValue::Float(x), LuaValue::Integer(y)) => Some(le_float_int(*x, *y)),
        _ => None,
    }
}

// ===== formatting =====

/// Render a number the way `tostring` does: integers via the fast
/// formatter, floats with `%.14g` plus a trailing `.0` when the result
/// would read as an integer.
pub fn number_to_string(v: &LuaValue) -> Option<String> {
    match v {
        LuaValue::Integer(i) => {
            let mut buf = itoa::Buffer::new();
            Some(buf.format(*i).to_string())
        }
        LuaValue::Float(f) => Some(float_to_string(*f)),
        _ => None,
    }
}

pub fn float_to_string(f: f64) -> String {
    if f.is_nan() {
        return if f.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if f.is_infinite() {
        return if f < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    let mut s = format_g(f, 14);
    if !s.contains(['.', 'e', 'n', 'i']) {
        s.push_str(".0");
    }
    s
}

/// C's `%.<prec>g`: scientific notation for very small or very large
/// exponents, fixed otherwise, trailing zeros stripped.
pub fn format_g(f: f64, prec: usize) -> String {
    if f == 0.0 {
        return if f.is_sign_negative() { "-0".to_string() } else { "0".to_string() };
    }
    let prec = prec.max(1);
    let exp = f.abs().log10().floor() as i32;
    // The exponent of the rounded value may differ from the raw one;
    // rendering decides conclusively below.
    if exp < -4 || exp >= prec as i32 {
        let s = format!("{:.*e}", prec - 1, f);
        // Rust renders "1.5e3"; C renders "1.5e+03".
        let (mantissa, e) = s.split_once('e').unwrap();
        let mantissa = strip_zeros(mantissa);
        let eval: i32 = e.parse().unwrap_or(0);
        format!("{}e{}{:02}", mantissa, if eval < 0 { "-" } else { "+" }, eval.abs())
    } else {
        let decimals = (prec as i32 - 1 - exp).max(0) as usize;
        let s = format!("{:.*}", decimals, f);
        strip_zeros(&s).to_string()
    }
}

fn strip_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn floor_div_and_mod_agree() {
        // a // b * b + a % b == a for all non-zero divisors.
        for &(a, b) in &[(7i64, 2i64), (-7, 2), (7, -2), (-7, -2), (9, 3), (-9, 3)] {
            let q = int_floordiv(a, b).unwrap();
            let r = int_mod(a, b).unwrap();
            assert_eq!(q * b + r, a, "a={} b={}", a, b);
            // Sign of the remainder follows the divisor.
            assert!(r == 0 || (r < 0) == (b < 0));
        }
    }

    #[test]
    fn div_by_zero_is_an_error() {
        assert_eq!(int_floordiv(1, 0), Err(NumError::DivByZero));
        assert_eq!(int_mod(1, 0), Err(NumError::DivByZero));
    }

    #[test]
    fn wrap_around() {
        assert_eq!(int_add(i64::MAX, 1), i64::MIN);
        assert_eq!(int_floordiv(i64::MIN, -1).unwrap(), i64::MIN);
    }

    #[test]
    fn float_mod_sign() {
        assert_eq!(float_mod(5.5, -2.0), -0.5);
        assert_eq!(float_mod(-5.5, 2.0), 0.5);
    }

    #[test]
    fn shifts() {
        assert_eq!(int_shl(1, 4), 16);
        assert_eq!(int_shr(16, 4), 1);
        assert_eq!(int_shl(1, -4), 0);
        assert_eq!(int_shr(-1, 1), i64::MAX);
        // Counts are modulo 64.
        assert_eq!(int_shl(1, 64), 1);
        assert_eq!(int_shl(1, 65), 2);
    }

    #[test]
    fn exact_float_conversion() {
        assert_eq!(float_to_integer(3.0), Some(3));
        assert_eq!(float_to_integer(3.5), None);
        assert_eq!(float_to_integer(f64::INFINITY), None);
        assert_eq!(float_to_integer(9_223_372_036_854_775_808.0), None);
        assert_eq!(float_to_integer(-9_223_372_036_854_775_808.0), Some(i64::MIN));
    }

    #[test]
    fn mixed_comparisons_near_the_edge() {
        assert!(lt_int_float(i64::MAX, f64::INFINITY));
        assert!(!lt_int_float(i64::MAX, f64::NEG_INFINITY));
        assert!(lt_int_float(5, 5.5));
        assert!(!lt_int_float(5, 5.0));
        assert!(le_int_float(5, 5.0));
        assert!(lt_float_int(4.5, 5));
        assert!(!lt_float_int(5.0, 5));
        assert!(le_float_int(5.0, 5));
        assert!(!num_lt(&LuaValue::Float(f64::NAN), &LuaValue::Float(0.0)).unwrap());
    }

    #[test]
    fn float_formatting() {
        assert_eq!(float_to_string(1.0), "1.0");
        assert_eq!(float_to_string(1.5), "1.5");
        assert_eq!(float_to_string(0.1), "0.1");
        assert_eq!(float_to_string(f64::INFINITY), "inf");
        assert_eq!(float_to_string(1e100), "1e+100");
    }
}
