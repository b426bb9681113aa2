/// Coroutines: create, resume, yield, status, wrap, close.
use super::*;

#[test]
fn resume_yield_round_trip() {
    let vals = run(
        r#"
        local co = coroutine.create(function(a, b)
            local c = coroutine.yield(a + b)
            return c * 2
        end)
        local ok1, v1 = coroutine.resume(co, 3, 4)
        local ok2, v2 = coroutine.resume(co, 10)
        return ok1 and 1 or 0, v1, ok2 and 1 or 0, v2
    "#,
    );
    assert_eq!(ints(&vals), vec![1, 7, 1, 20]);
}

#[test]
fn yield_passes_multiple_values_both_ways() {
    let vals = run(
        r#"
        local co = coroutine.create(function()
            local a, b = coroutine.yield(1, 2)
            return a + b
        end)
        local _, x, y = coroutine.resume(co)
        local _, sum = coroutine.resume(co, 10, 20)
        return x, y, sum
    "#,
    );
    assert_eq!(ints(&vals), vec![1, 2, 30]);
}

#[test]
fn status_lifecycle() {
    let vals = run(
        r#"
        local co
        local observed = {}
        co = coroutine.create(function()
            observed[#observed + 1] = coroutine.status(co) -- running
            coroutine.yield()
        end)
        observed[#observed + 1] = coroutine.status(co)     -- suspended
        coroutine.resume(co)
        observed[#observed + 1] = coroutine.status(co)     -- suspended (at yield)
        coroutine.resume(co)
        observed[#observed + 1] = coroutine.status(co)     -- dead
        return table.concat(observed, ",")
    "#,
    );
    assert_eq!(
        vals[0].as_str().unwrap().to_string_lossy(),
        "suspended,running,suspended,dead"
    );
}

#[test]
fn normal_status_for_resumers() {
    assert_eq!(
        run_str(
            r#"
            local outer
            local inner = coroutine.create(function()
                return coroutine.status(outer)
            end)
            outer = coroutine.create(function()
                local _, s = coroutine.resume(inner)
                return s
            end)
            local _, s = coroutine.resume(outer)
            return s
        "#
        ),
        "normal"
    );
}

#[test]
fn resume_dead_coroutine_fails() {
    let vals = run(
        r#"
        local co = coroutine.create(function() return 1 end)
        coroutine.resume(co)
        local ok, msg = coroutine.resume(co)
        return ok, msg
    "#,
    );
    assert!(!vals[0].is_truthy());
    assert!(
        vals[1]
            .as_str()
            .unwrap()
            .to_string_lossy()
            .contains("cannot resume dead coroutine")
    );
}

#[test]
fn errors_become_false_results() {
    let vals = run(
        r#"
        local co = coroutine.create(function() error("boom") end)
        local ok, msg = coroutine.resume(co)
        return ok, msg, coroutine.status(co)
    "#,
    );
    assert!(!vals[0].is_truthy());
    assert!(vals[1].as_str().unwrap().to_string_lossy().contains("boom"));
    assert_eq!(vals[2].as_str().unwrap().to_string_lossy(), "dead");
}

#[test]
fn wrap_propagates_values_and_errors() {
    let vals = run(
        r#"
        local gen = coroutine.wrap(function(n)
            for i = 1, n do coroutine.yield(i) end
        end)
        return gen(3), gen(), gen()
    "#,
    );
    assert_eq!(ints(&vals), vec![1, 2, 3]);
    let msg = run_err(
        "local f = coroutine.wrap(function() error('inner') end) f()",
    );
    assert!(msg.contains("inner"), "{}", msg);
}

#[test]
fn yield_through_pcall() {
    // 5.4 semantics: protected calls are machine frames, so a yield
    // inside pcall suspends the whole coroutine.
    let vals = run(
        r#"
        local co = coroutine.create(function()
            local ok, v = pcall(function()
                return coroutine.yield(1) + 10
            end)
            return ok, v
        end)
        local _, first = coroutine.resume(co)
        local _, ok, v = coroutine.resume(co, 5)
        return first, ok and 1 or 0, v
    "#,
    );
    assert_eq!(ints(&vals), vec![1, 1, 15]);
}

#[test]
fn yield_from_main_fails() {
    let msg = run_err("coroutine.yield(1)");
    assert!(msg.contains("outside a coroutine"), "{}", msg);
}

#[test]
fn isyieldable() {
    assert!(!run_bool("return coroutine.isyieldable()"));
    assert!(run_bool(
        r#"
        local co = coroutine.create(function()
            return coroutine.isyieldable()
        end)
        local _, v = coroutine.resume(co)
        return v
    "#
    ));
}

#[test]
fn running_identifies_the_current_thread() {
    let vals = run(
        r#"
        local main, is_main = coroutine.running()
        local co = coroutine.create(function()
            local me, meta_main = coroutine.running()
            coroutine.yield(meta_main)
        end)
        local _, inner_is_main = coroutine.resume(co)
        return is_main, inner_is_main
    "#,
    );
    assert!(vals[0].is_truthy());
    assert!(!vals[1].is_truthy());
}

#[test]
fn close_a_fresh_and_a_dead_coroutine() {
    assert!(run_bool(
        "local co = coroutine.create(function() end) return coroutine.close(co)"
    ));
    assert!(run_bool(
        r#"
        local co = coroutine.create(function() end)
        coroutine.resume(co)
        return coroutine.close(co)
    "#
    ));
    assert_eq!(
        run_str(
            r#"
            local co = coroutine.create(function() coroutine.yield() end)
            coroutine.resume(co)
            coroutine.close(co)
            return coroutine.status(co)
        "#
        ),
        "dead"
    );
}

#[test]
fn close_runs_pending_to_be_closed() {
    let vals = run(
        r#"
        local log = {}
        local co = coroutine.create(function()
            local guard <close> = setmetatable({}, {
                __close = function() log[#log + 1] = "closed" end,
            })
            coroutine.yield()
            log[#log + 1] = "never reached"
        end)
        coroutine.resume(co)
        coroutine.close(co)
        return #log, log[1]
    "#,
    );
    assert_eq!(vals[0].as_integer(), Some(1));
    assert_eq!(vals[1].as_str().unwrap().to_string_lossy(), "closed");
}

#[test]
fn nested_resume_chain_is_lifo() {
    let vals = run(
        r#"
        local inner = coroutine.create(function()
            coroutine.yield("inner1")
            return "inner2"
        end)
        local outer = coroutine.create(function()
            local _, a = coroutine.resume(inner)
            coroutine.yield(a)
            local _, b = coroutine.resume(inner)
            return b
        end)
        local _, x = coroutine.resume(outer)
        local _, y = coroutine.resume(outer)
        return x, y
    "#,
    );
    assert_eq!(vals[0].as_str().unwrap().to_string_lossy(), "inner1");
    assert_eq!(vals[1].as_str().unwrap().to_string_lossy(), "inner2");
}
