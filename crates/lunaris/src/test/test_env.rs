/// `_ENV` and global resolution.
use super::*;

#[test]
fn env_rebinding_does_not_touch_locals() {
    // Rebinding _ENV changes what "global" means without affecting
    // previously resolved locals.
    let vals = run(
        r#"
        local x = 10
        _ENV = setmetatable({}, {__index = _G})
        x = 20
        return rawget(_ENV, "x"), x
    "#,
    );
    assert!(vals[0].is_nil());
    assert_eq!(vals[1].as_integer(), Some(20));
}

#[test]
fn globals_are_env_fields() {
    let vals = run(
        r#"
        g = 1                      -- plain global write
        local before = g
        local rg = rawget          -- the fresh environment has no fallback
        _ENV = {probe = 99}
        return before, probe, rg(_ENV, "g")
    "#,
    );
    assert_eq!(vals[0].as_integer(), Some(1));
    assert_eq!(vals[1].as_integer(), Some(99));
    assert!(vals[2].is_nil());
}

#[test]
fn functions_capture_their_defining_env() {
    // A closure built before the rebinding keeps the old environment.
    assert_eq!(
        run_int(
            r#"
            marker = 7
            local function read() return marker end
            _ENV = {marker = 8}
            return read()
        "#
        ),
        7
    );
}

#[test]
fn g_table_is_the_global_table() {
    assert!(run_bool("some_global = 42 return _G.some_global == 42"));
    assert!(run_bool("_G.other = 5 return other == 5"));
}

#[test]
fn load_with_custom_env() {
    let vals = run(
        r#"
        local env = {result = 11}
        local f = load("return result", "chunk", "t", env)
        return f()
    "#,
    );
    assert_eq!(vals[0].as_integer(), Some(11));
}

#[test]
fn host_arg_vector_layout() {
    let mut interp = crate::LuaInterp::default();
    interp.set_arg_vector("lunaris", Some("script.lua"), &["a", "b"]);
    let vals = interp
        .execute("return arg[-1], arg[0], arg[1], arg[2]")
        .unwrap();
    assert_eq!(vals[0].as_str().unwrap().to_string_lossy(), "lunaris");
    assert_eq!(vals[1].as_str().unwrap().to_string_lossy(), "script.lua");
    assert_eq!(vals[2].as_str().unwrap().to_string_lossy(), "a");
    assert_eq!(vals[3].as_str().unwrap().to_string_lossy(), "b");
}
