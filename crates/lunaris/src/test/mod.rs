//! Integration tests driving the interpreter with Lua chunks.

mod test_basic;
mod test_closures;
mod test_control;
mod test_coroutine;
mod test_env;
mod test_errors;
mod test_host;
mod test_load;
mod test_operators;
mod test_string;
mod test_table;
mod test_tbc;

use crate::value::LuaValue;

/// Run a chunk on a fresh interpreter with the standard libraries,
/// returning its top-level results.
pub fn run(src: &str) -> Vec<LuaValue> {
    match crate::execute(src) {
        Ok(vals) => vals,
        Err(e) => panic!("execution failed: {}", e),
    }
}

/// Run a chunk that is expected to fail; returns the error message.
pub fn run_err(src: &str) -> String {
    match crate::execute(src) {
        Ok(vals) => panic!("expected error, got {} values", vals.len()),
        Err(e) => e.message(),
    }
}

pub fn run_int(src: &str) -> i64 {
    match run(src).into_iter().next() {
        Some(LuaValue::Integer(i)) => i,
        other => panic!("expected integer result, got {:?}", other),
    }
}

pub fn run_float(src: &str) -> f64 {
    match run(src).into_iter().next() {
        Some(LuaValue::Float(f)) => f,
        Some(LuaValue::Integer(i)) => panic!("expected float, got integer {}", i),
        other => panic!("expected float result, got {:?}", other),
    }
}

pub fn run_str(src: &str) -> String {
    match run(src).into_iter().next() {
        Some(LuaValue::String(s)) => s.to_string_lossy(),
        other => panic!("expected string result, got {:?}", other),
    }
}

pub fn run_bool(src: &str) -> bool {
    match run(src).into_iter().next() {
        Some(LuaValue::Boolean(b)) => b,
        other => panic!("expected boolean result, got {:?}", other),
    }
}

/// Shape-check a multi-value result against simple expectations.
pub fn ints(vals: &[LuaValue]) -> Vec<i64> {
    vals.iter()
        .map(|v| v.as_integer().unwrap_or_else(|| panic!("not an integer: {:?}", v)))
        .collect()
}
