/// Closures and upvalue sharing.
use super::*;

#[test]
fn counter_shares_its_upvalue() {
    let vals = run(
        "local function mk() local n = 0 return function() n = n + 1 return n end end \
         local f = mk() return f(), f(), f()",
    );
    assert_eq!(ints(&vals), vec![1, 2, 3]);
}

#[test]
fn two_closures_share_one_box() {
    let vals = run(
        r#"
        local function make_getset()
            local value = 10
            return function() return value end,
                   function(v) value = v end
        end
        local get, set = make_getset()
        local a = get()
        set(20)
        local b = get()
        set(30)
        return a, b, get()
    "#,
    );
    assert_eq!(ints(&vals), vec![10, 20, 30]);
}

#[test]
fn independent_instances_do_not_share() {
    let vals = run(
        "local function mk() local n = 0 return function() n = n + 1 return n end end \
         local f, g = mk(), mk() return f(), f(), g()",
    );
    assert_eq!(ints(&vals), vec![1, 2, 1]);
}

#[test]
fn loop_variables_are_fresh_per_iteration() {
    let vals = run(
        r#"
        local fns = {}
        for i = 1, 3 do
            fns[i] = function() return i end
        end
        return fns[1](), fns[2](), fns[3]()
    "#,
    );
    assert_eq!(ints(&vals), vec![1, 2, 3]);
}

#[test]
fn generic_for_variables_are_fresh_per_iteration() {
    let vals = run(
        r#"
        local fns = {}
        for _, v in ipairs({10, 20, 30}) do
            fns[#fns + 1] = function() return v end
        end
        return fns[1](), fns[2](), fns[3]()
    "#,
    );
    assert_eq!(ints(&vals), vec![10, 20, 30]);
}

#[test]
fn repeat_scope_is_fresh_per_iteration() {
    let vals = run(
        r#"
        local fns = {}
        local i = 0
        repeat
            i = i + 1
            local captured = i
            fns[i] = function() return captured end
        until i >= 3
        return fns[1](), fns[2](), fns[3]()
    "#,
    );
    assert_eq!(ints(&vals), vec![1, 2, 3]);
}

#[test]
fn nested_closures_capture_through_levels() {
    assert_eq!(
        run_int(
            "local function outer(x) return function(y) return function(z) \
             return x + y + z end end end return outer(1)(2)(3)"
        ),
        6
    );
}

#[test]
fn local_function_sees_itself() {
    assert_eq!(
        run_int(
            "local function fact(n) if n <= 1 then return 1 end \
             return n * fact(n - 1) end return fact(5)"
        ),
        120
    );
}

#[test]
fn upvalue_mutation_is_visible_to_every_clone() {
    // The testable-properties invariant: mutation through any closure
    // over a box is visible to all of them.
    assert!(run_bool(
        r#"
        local u = 0
        local clones = {}
        for i = 1, 4 do
            clones[i] = function(d) u = u + d return u end
        end
        clones[1](1)
        clones[2](10)
        clones[3](100)
        return clones[4](0) == 111 and u == 111
    "#
    ));
}
