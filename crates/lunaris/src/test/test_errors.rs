/// The error model: pcall, xpcall, error levels, error objects.
use super::*;
use crate::value::LuaValue;

#[test]
fn pcall_captures_and_passes_results() {
    let vals = run("return pcall(function(a, b) return a + b, a * b end, 3, 4)");
    assert!(vals[0].is_truthy());
    assert_eq!(vals[1].as_integer(), Some(7));
    assert_eq!(vals[2].as_integer(), Some(12));
    let vals = run("return pcall(function() error('oops') end)");
    assert!(!vals[0].is_truthy());
    assert!(vals[1].as_str().unwrap().to_string_lossy().contains("oops"));
}

#[test]
fn pcall_of_a_non_function_is_caught() {
    let vals = run("return pcall(42)");
    assert!(!vals[0].is_truthy());
    assert!(
        vals[1]
            .as_str()
            .unwrap()
            .to_string_lossy()
            .contains("attempt to call")
    );
}

#[test]
fn nested_pcall() {
    let vals = run(
        "return pcall(pcall, function() error('deep') end)",
    );
    assert!(vals[0].is_truthy());
    assert!(!vals[1].is_truthy());
    assert!(vals[2].as_str().unwrap().to_string_lossy().contains("deep"));
}

#[test]
fn error_objects_can_be_any_value() {
    let vals = run("return pcall(function() error({code = 42}) end)");
    assert!(!vals[0].is_truthy());
    assert!(matches!(vals[1], LuaValue::Table(_)));
    let vals = run(
        "local ok, e = pcall(function() error({code = 42}) end) return ok, e.code",
    );
    assert_eq!(vals[1].as_integer(), Some(42));
    // Non-string error objects get no location prefix.
    let vals = run("local ok, e = pcall(function() error(99) end) return e");
    assert_eq!(vals[0].as_integer(), Some(99));
}

#[test]
fn error_level_annotation() {
    // level 1: the line of the error() call itself.
    let vals = run(
        "local ok, e = pcall(function() error('tagged') end) return e",
    );
    let msg = vals[0].as_str().unwrap().to_string_lossy();
    assert!(msg.contains("main:"), "{}", msg);
    assert!(msg.ends_with("tagged"), "{}", msg);
    // level 0 suppresses annotation entirely.
    let vals = run(
        "local ok, e = pcall(function() error('bare', 0) end) return e",
    );
    assert_eq!(vals[0].as_str().unwrap().to_string_lossy(), "bare");
    // level 2 blames the caller.
    let vals = run(
        r#"
        local function fail() error("blamed", 2) end
        local ok, e = pcall(function() fail() end)
        return e
    "#,
    );
    let msg = vals[0].as_str().unwrap().to_string_lossy();
    assert!(msg.contains("blamed"), "{}", msg);
}

#[test]
fn xpcall_invokes_the_handler() {
    let vals = run(
        r#"
        local seen
        local ok, v = xpcall(function() error("original") end, function(e)
            seen = e
            return "handled: " .. e
        end)
        return ok, v, seen
    "#,
    );
    assert!(!vals[0].is_truthy());
    let handled = vals[1].as_str().unwrap().to_string_lossy();
    assert!(handled.starts_with("handled: "), "{}", handled);
    assert!(
        vals[2]
            .as_str()
            .unwrap()
            .to_string_lossy()
            .contains("original")
    );
}

#[test]
fn xpcall_passes_extra_arguments() {
    let vals = run(
        "return xpcall(function(a, b) return a - b end, function(e) return e end, 10, 4)",
    );
    assert!(vals[0].is_truthy());
    assert_eq!(vals[1].as_integer(), Some(6));
}

#[test]
fn error_in_handler_is_contained() {
    let vals = run(
        r#"
        local ok, v = xpcall(function() error("first") end, function()
            error("second")
        end)
        return ok, v
    "#,
    );
    assert!(!vals[0].is_truthy());
}

#[test]
fn uncaught_errors_carry_location() {
    let msg = run_err("local x = nil\nreturn x.field");
    assert!(msg.contains("attempt to index a nil value"), "{}", msg);
    assert!(msg.contains("main:2"), "{}", msg);
}

#[test]
fn type_errors_from_operators() {
    assert!(run_err("return {} + 1").contains("arithmetic"));
    assert!(run_err("return {} .. 'x'").contains("concatenate"));
    assert!(run_err("return #5").contains("length"));
    assert!(run_err("return {} < {}").contains("compare"));
    assert!(run_err("local f f()").contains("attempt to call a nil value"));
}

#[test]
fn stack_overflow_is_a_lua_error() {
    let vals = run(
        "local function rec(n) return rec(n + 1) + 1 end return pcall(rec, 0)",
    );
    assert!(!vals[0].is_truthy());
    assert!(
        vals[1]
            .as_str()
            .unwrap()
            .to_string_lossy()
            .contains("stack overflow")
    );
}

#[test]
fn traceback_reports_frames() {
    let err = crate::execute(
        "local function inner() error('trace me') end\n\
         local function outer() inner() end\n\
         outer()",
    )
    .unwrap_err();
    match err {
        crate::LuaError::Runtime { traceback, .. } => {
            assert!(!traceback.frames.is_empty());
            let rendered = traceback.to_string();
            assert!(rendered.contains("main"), "{}", rendered);
        }
        other => panic!("expected a runtime error, got {:?}", other),
    }
}

#[test]
fn syntax_errors_surface_from_execute() {
    let err = crate::execute("local = 5").unwrap_err();
    assert!(matches!(err, crate::LuaError::Syntax { .. }));
    // load() turns them into (nil, message) instead.
    let vals = run("return load('local = 5')");
    assert!(vals[0].is_nil());
    assert!(matches!(vals[1], LuaValue::String(_)));
}
