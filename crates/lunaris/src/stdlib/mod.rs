//! Standard libraries, registered through the library registry and
//! dispatched through the builtin-function interface.

pub mod basic;
pub mod coroutine;
pub mod math;
pub mod os;
pub mod string;
pub mod table;

use crate::error::{LuaError, LuaResult};
use crate::eval::native::Args;
use crate::eval::LuaInterp;
use crate::gc::TableId;
use crate::number;
use crate::value::{LuaStr, LuaValue};

/// Standard "bad argument" error.
pub(crate) fn bad_arg(
    l: &mut LuaInterp,
    n: usize,
    fname: &str,
    expected: &str,
    got: &LuaValue,
) -> LuaError {
    let got = if got.is_nil() {
        "no value".to_string()
    } else {
        got.type_name().to_string()
    };
    l.rt_error(format!(
        "bad argument #{} to '{}' ({} expected, got {})",
        n, fname, expected, got
    ))
}

pub(crate) fn check_any(
    l: &mut LuaInterp,
    args: &Args,
    n: usize,
    fname: &str,
) -> LuaResult<LuaValue> {
    if n > args.len() {
        return Err(l.rt_error(format!(
            "bad argument #{} to '{}' (value expected)",
            n, fname
        )));
    }
    Ok(args.get(n))
}

pub(crate) fn check_int(
    l: &mut LuaInterp,
    args: &Args,
    n: usize,
    fname: &str,
) -> LuaResult<i64> {
    let v = args.get(n);
    match number::to_integer(&v) {
        Some(i) => Ok(i),
        None => {
            if v.as_number().is_some() {
                Err(l.rt_error("number has no integer representation"))
            } else {
                Err(bad_arg(l, n, fname, "number", &v))
            }
        }
    }
}

pub(crate) fn opt_int(
    l: &mut LuaInterp,
    args: &Args,
    n: usize,
    fname: &str,
    default: i64,
) -> LuaResult<i64> {
    if args.get(n).is_nil() {
        Ok(default)
    } else {
        check_int(l, args, n, fname)
    }
}

pub(crate) fn check_number(
    l: &mut LuaInterp,
    args: &Args,
    n: usize,
    fname: &str,
) -> LuaResult<f64> {
    let v = args.get(n);
    match number::to_number(&v) {
        Some(x) => Ok(x.as_number().unwrap()),
        None => Err(bad_arg(l, n, fname, "number", &v)),
    }
}

/// Strings, with the usual number→string coercion.
pub(crate) fn check_str(
    l: &mut LuaInterp,
    args: &Args,
    n: usize,
    fname: &str,
) -> LuaResult<LuaStr> {
    let v = args.get(n);
    match &v {
        LuaValue::String(s) => Ok(s.clone()),
        LuaValue::Integer(_) | LuaValue::Float(_) => {
            let text = number::number_to_string(&v).unwrap_or_default();
            match l.take_string(text.into_bytes()) {
                LuaValue::String(s) => Ok(s),
                _ => unreachable!(),
            }
        }
        _ => Err(bad_arg(l, n, fname, "string", &v)),
    }
}

pub(crate) fn check_table(
    l: &mut LuaInterp,
    args: &Args,
    n: usize,
    fname: &str,
) -> LuaResult<TableId> {
    let v = args.get(n);
    v.as_table().ok_or_else(|| bad_arg(l, n, fname, "table", &v))
}

pub(crate) fn check_function(
    l: &mut LuaInterp,
    args: &Args,
    n: usize,
    fname: &str,
) -> LuaResult<LuaValue> {
    let v = args.get(n);
    match v {
        LuaValue::Function(_) => Ok(v),
        _ => Err(bad_arg(l, n, fname, "function", &v)),
    }
}
