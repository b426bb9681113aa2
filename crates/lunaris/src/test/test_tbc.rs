/// To-be-closed variables: `<close>` locals and the generic-for guard.
use super::*;

#[test]
fn close_runs_on_normal_scope_exit() {
    let vals = run(
        r#"
        local log = {}
        local function closable(name)
            return setmetatable({}, {
                __close = function() log[#log + 1] = name end,
            })
        end
        do
            local a <close> = closable("a")
            local b <close> = closable("b")
        end
        return #log, log[1], log[2]
    "#,
    );
    assert_eq!(vals[0].as_integer(), Some(2));
    // Reverse declaration order.
    assert_eq!(vals[1].as_str().unwrap().to_string_lossy(), "b");
    assert_eq!(vals[2].as_str().unwrap().to_string_lossy(), "a");
}

#[test]
fn close_runs_on_break_and_return() {
    let vals = run(
        r#"
        local log = {}
        local function closable(tag)
            return setmetatable({}, {
                __close = function() log[#log + 1] = tag end,
            })
        end
        for i = 1, 3 do
            local guard <close> = closable("loop" .. i)
            if i == 2 then break end
        end
        local function f()
            local guard <close> = closable("fn")
            return 42
        end
        local r = f()
        return r, #log, log[1], log[2], log[3]
    "#,
    );
    assert_eq!(vals[0].as_integer(), Some(42));
    assert_eq!(vals[1].as_integer(), Some(3));
    let tags: Vec<String> = vals[2..]
        .iter()
        .map(|v| v.as_str().unwrap().to_string_lossy())
        .collect();
    assert_eq!(tags, vec!["loop1", "loop2", "fn"]);
}

#[test]
fn close_runs_during_error_unwinding_with_the_error() {
    let vals = run(
        r#"
        local seen_err
        local ok, e = pcall(function()
            local guard <close> = setmetatable({}, {
                __close = function(_, err) seen_err = err end,
            })
            error("inner failure")
        end)
        return ok, e, seen_err
    "#,
    );
    assert!(!vals[0].is_truthy());
    let e = vals[1].as_str().unwrap().to_string_lossy();
    let seen = vals[2].as_str().unwrap().to_string_lossy();
    assert!(e.contains("inner failure"));
    assert!(seen.contains("inner failure"));
}

#[test]
fn nil_and_false_close_to_nothing() {
    assert_eq!(
        run_int(
            "do local a <close> = nil local b <close> = false end return 1"
        ),
        1
    );
}

#[test]
fn non_closable_value_is_a_convention_error() {
    let msg = run_err("local x <close> = {}");
    assert!(msg.contains("non-closable"), "{}", msg);
}

#[test]
fn const_assignment_is_rejected_at_parse_time() {
    let err = crate::execute("local c <const> = 1 c = 2").unwrap_err();
    assert!(matches!(err, crate::LuaError::Syntax { .. }));
}

#[test]
fn generic_for_tbc_closes_on_every_exit_path() {
    // Normal exhaustion, break, and error must each close exactly once.
    let vals = run(
        r#"
        local closed = 0
        local function guarded_iter(n)
            local i = 0
            local function iter()
                i = i + 1
                if i <= n then return i end
            end
            local guard = setmetatable({}, {
                __close = function() closed = closed + 1 end,
            })
            return iter, nil, nil, guard
        end

        for i in guarded_iter(2) do end            -- exhaustion
        for i in guarded_iter(5) do break end      -- break
        pcall(function()
            for i in guarded_iter(5) do error("x") end
        end)                                       -- error
        return closed
    "#,
    );
    assert_eq!(vals[0].as_integer(), Some(3));
}

#[test]
fn for_in_tbc_must_be_closable() {
    let msg = run_err(
        "for i in function() end, nil, nil, {} do end",
    );
    assert!(msg.contains("non-closable"), "{}", msg);
}

#[test]
fn close_errors_supersede_normal_completion() {
    let vals = run(
        r#"
        local ok, e = pcall(function()
            do
                local guard <close> = setmetatable({}, {
                    __close = function() error("close failed") end,
                })
            end
            return "unreachable"
        end)
        return ok, e
    "#,
    );
    assert!(!vals[0].is_truthy());
    assert!(
        vals[1]
            .as_str()
            .unwrap()
            .to_string_lossy()
            .contains("close failed")
    );
}
