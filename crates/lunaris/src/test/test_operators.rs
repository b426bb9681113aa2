/// Metatable-driven operator dispatch.
use super::*;

#[test]
fn arithmetic_metamethods() {
    assert_eq!(
        run_int(
            r#"
            local v = setmetatable({n = 3}, {
                __add = function(a, b)
                    local an = type(a) == "table" and a.n or a
                    local bn = type(b) == "table" and b.n or b
                    return an + bn
                end,
            })
            return v + 4, 4 + v
        "#
        ),
        7
    );
    assert_eq!(
        run_int(
            r#"
            local mt = {__unm = function(v) return -v.n end}
            local v = setmetatable({n = 5}, mt)
            return -v
        "#
        ),
        -5
    );
}

#[test]
fn arith_metamethod_only_when_primitive_fails() {
    // Numbers never consult metamethods.
    assert_eq!(run_int("return 2 + 3"), 5);
}

#[test]
fn index_function_and_table_chains() {
    assert_eq!(
        run_int(
            r#"
            local t = setmetatable({}, {__index = function(_, k) return #k end})
            return t.abc
        "#
        ),
        3
    );
    // Table-form __index probes recursively.
    assert_eq!(
        run_int(
            r#"
            local base = {answer = 42}
            local mid = setmetatable({}, {__index = base})
            local top = setmetatable({}, {__index = mid})
            return top.answer
        "#
        ),
        42
    );
    // Cyclic chains terminate with an error instead of hanging.
    let msg = run_err(
        r#"
        local a, b = {}, {}
        setmetatable(a, {__index = b})
        setmetatable(b, {__index = a})
        return a.missing
    "#,
    );
    assert!(msg.contains("'__index'"), "{}", msg);
}

#[test]
fn newindex_fires_only_for_absent_keys() {
    let vals = run(
        r#"
        local called = 0
        local t = setmetatable({x = 1}, {
            __newindex = function(_, _, _) called = called + 1 end,
        })
        t.x = 2      -- raw key present: direct write
        t.y = 3      -- absent: handler, no write
        return t.x, called, rawget(t, "y")
    "#,
    );
    assert_eq!(vals[0].as_integer(), Some(2));
    assert_eq!(vals[1].as_integer(), Some(1));
    assert!(vals[2].is_nil());
}

#[test]
fn newindex_table_form_redirects_writes() {
    assert!(run_bool(
        r#"
        local store = {}
        local t = setmetatable({}, {__newindex = store})
        t.k = 99
        return rawget(t, "k") == nil and store.k == 99
    "#
    ));
}

#[test]
fn eq_requires_same_kind_and_fires_on_tables() {
    assert!(run_bool(
        r#"
        local mt = {__eq = function(a, b) return a.id == b.id end}
        local x = setmetatable({id = 1}, mt)
        local y = setmetatable({id = 1}, mt)
        local z = setmetatable({id = 2}, mt)
        return x == y and x ~= z
    "#
    ));
    // __eq is not consulted across kinds.
    assert!(run_bool(
        r#"
        local mt = {__eq = function() return true end}
        local x = setmetatable({}, mt)
        return not (x == 5)
    "#
    ));
    // Raw-equal operands never reach __eq.
    assert!(run_bool(
        r#"
        local hits = 0
        local mt = {__eq = function() hits = hits + 1 return false end}
        local x = setmetatable({}, mt)
        return x == x and hits == 0
    "#
    ));
}

#[test]
fn comparison_metamethods() {
    assert!(run_bool(
        r#"
        local mt = {
            __lt = function(a, b) return a.w < b.w end,
            __le = function(a, b) return a.w <= b.w end,
        }
        local light = setmetatable({w = 1}, mt)
        local heavy = setmetatable({w = 9}, mt)
        return light < heavy and light <= heavy and heavy > light and heavy >= light
    "#
    ));
}

#[test]
fn len_and_concat_metamethods() {
    assert_eq!(
        run_int(
            "local t = setmetatable({}, {__len = function() return 77 end}) return #t"
        ),
        77
    );
    assert_eq!(
        run_str(
            r#"
            local tag = setmetatable({}, {
                __concat = function(a, b)
                    if type(a) == "table" then a = "<tag>" end
                    if type(b) == "table" then b = "<tag>" end
                    return a .. b
                end,
            })
            return "x" .. tag
        "#
        ),
        "x<tag>"
    );
}

#[test]
fn bitwise_metamethods() {
    assert_eq!(
        run_int(
            r#"
            local v = setmetatable({bits = 6}, {
                __band = function(a, b)
                    local an = type(a) == "table" and a.bits or a
                    local bn = type(b) == "table" and b.bits or b
                    return an & bn
                end,
            })
            return v & 12
        "#
        ),
        4
    );
}

#[test]
fn tostring_metamethod_and_name() {
    assert_eq!(
        run_str(
            "local t = setmetatable({}, {__tostring = function() return 'custom' end}) \
             return tostring(t)"
        ),
        "custom"
    );
    let s = run_str(
        "local t = setmetatable({}, {__name = 'Widget'}) return tostring(t)",
    );
    assert!(s.starts_with("Widget: "), "{}", s);
}

#[test]
fn protected_metatables() {
    assert_eq!(
        run_str(
            r#"
            local t = setmetatable({}, {__metatable = "locked"})
            return getmetatable(t)
        "#
        ),
        "locked"
    );
    let msg = run_err(
        r#"
        local t = setmetatable({}, {__metatable = "locked"})
        setmetatable(t, {})
    "#,
    );
    assert!(msg.contains("protected metatable"), "{}", msg);
}

#[test]
fn string_methods_via_shared_metatable() {
    assert_eq!(run_str("return ('hello'):upper()"), "HELLO");
    assert_eq!(run_int("local s = 'abc' return s:len()"), 3);
    assert_eq!(run_str("return ('%d!'):format(7)"), "7!");
}

#[test]
fn metamethods_yield_inside_coroutines() {
    // Operator dispatch runs on machine frames, so a metamethod can
    // suspend the coroutine mid-expression.
    let vals = run(
        r#"
        local v = setmetatable({}, {
            __add = function(_, n) return coroutine.yield(n) end,
        })
        local co = coroutine.create(function()
            return (v + 5) * 10
        end)
        local _, yielded = coroutine.resume(co)
        local _, result = coroutine.resume(co, 7)
        return yielded, result
    "#,
    );
    assert_eq!(ints(&vals), vec![5, 70]);
}
