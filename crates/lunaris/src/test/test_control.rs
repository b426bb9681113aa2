/// Control flow: conditionals, loops, break, goto.
use super::*;

#[test]
fn if_elseif_else() {
    let src = "local function pick(n) \
               if n < 0 then return 'neg' elseif n == 0 then return 'zero' \
               else return 'pos' end end \
               return pick(-1), pick(0), pick(1)";
    let vals = run(src);
    let strs: Vec<String> = vals
        .iter()
        .map(|v| v.as_str().unwrap().to_string_lossy())
        .collect();
    assert_eq!(strs, vec!["neg", "zero", "pos"]);
}

#[test]
fn while_and_repeat() {
    assert_eq!(
        run_int("local n, s = 0, 0 while n < 5 do n = n + 1 s = s + n end return s"),
        15
    );
    // repeat's condition sees body locals.
    assert_eq!(
        run_int("local n = 0 repeat local next = n + 1 n = next until next >= 4 return n"),
        4
    );
}

#[test]
fn numeric_for_basics() {
    assert_eq!(run_int("local s = 0 for i = 1, 10 do s = s + i end return s"), 55);
    assert_eq!(run_int("local s = 0 for i = 10, 1, -2 do s = s + i end return s"), 30);
    assert_eq!(run_int("local n = 0 for i = 1, 0 do n = n + 1 end return n"), 0);
    // Float loop.
    assert_eq!(
        run_int("local n = 0 for x = 1.0, 2.0, 0.5 do n = n + 1 end return n"),
        3
    );
}

#[test]
fn numeric_for_step_zero_raises() {
    let msg = run_err("for i = 1, 10, 0 do end");
    assert!(msg.contains("'for' step is zero"), "{}", msg);
}

#[test]
fn numeric_for_overflow_guard() {
    // Exactly two iterations at the top of the integer range; no wrap.
    assert_eq!(
        run_int(
            "local n = 0 for i = math.maxinteger - 1, math.maxinteger do n = n + 1 end \
             return n"
        ),
        2
    );
    assert_eq!(
        run_int(
            "local n = 0 for i = math.mininteger, math.mininteger + 1 do n = n + 1 end \
             return n"
        ),
        2
    );
}

#[test]
fn generic_for_protocol() {
    // Explicit iterator triple.
    assert_eq!(
        run_int(
            r#"
            local function iter(s, c)
                if c < s then return c + 1, (c + 1) * 10 end
            end
            local total = 0
            for i, v in iter, 3, 0 do total = total + v end
            return total
        "#
        ),
        60
    );
}

#[test]
fn pairs_and_next() {
    assert_eq!(
        run_int(
            "local t = {a = 1, b = 2, c = 3} local s = 0 \
             for _, v in pairs(t) do s = s + v end return s"
        ),
        6
    );
    assert_eq!(
        run_int(
            "local t = {10, 20, 30} local s = 0 \
             for k, v in next, t do s = s + k * v end return s"
        ),
        140
    );
}

#[test]
fn ipairs_stops_at_first_hole() {
    assert_eq!(
        run_int(
            "local t = {1, 2, 3} t[5] = 5 local n = 0 \
             for i in ipairs(t) do n = i end return n"
        ),
        3
    );
}

#[test]
fn break_leaves_innermost_loop() {
    assert_eq!(
        run_int(
            r#"
            local hits = 0
            for i = 1, 3 do
                for j = 1, 10 do
                    if j == 2 then break end
                    hits = hits + 1
                end
            end
            return hits
        "#
        ),
        3
    );
    assert_eq!(
        run_int("local n = 0 while true do n = n + 1 if n == 7 then break end end return n"),
        7
    );
}

#[test]
fn goto_forward_and_continue_pattern() {
    assert_eq!(
        run_int(
            r#"
            local skipped = 0
            for i = 1, 10 do
                if i % 2 == 0 then goto continue end
                skipped = skipped + 1
                ::continue::
            end
            return skipped
        "#
        ),
        5
    );
    assert_eq!(
        run_int("do goto out end error('unreachable') ::out:: return 9"),
        9
    );
}

#[test]
fn goto_backward() {
    assert_eq!(
        run_int(
            r#"
            local n = 0
            ::top::
            n = n + 1
            if n < 3 then goto top end
            return n
        "#
        ),
        3
    );
}

#[test]
fn method_calls_evaluate_receiver_once() {
    assert_eq!(
        run_int(
            r#"
            local evals = 0
            local obj = {base = 5}
            function obj:add(n) return self.base + n end
            local function get()
                evals = evals + 1
                return obj
            end
            local r = get():add(2)
            return r * 10 + evals
        "#
        ),
        71
    );
}

#[test]
fn table_constructor_semantics() {
    let vals = run(
        "local k = 'key' \
         local function two() return 2, 3 end \
         local t = {1, [k] = 9, two()} \
         return #t, t[1], t[2], t[3], t.key",
    );
    assert_eq!(ints(&vals), vec![3, 1, 2, 3, 9]);
    // Non-tail calls in constructors truncate to one value.
    let vals = run(
        "local function two() return 2, 3 end local t = {two(), 10} return #t, t[1], t[2]",
    );
    assert_eq!(ints(&vals), vec![2, 2, 10]);
}

#[test]
fn assignment_order() {
    // All right-hand values evaluate before any assignment.
    let vals = run("local a, b = 1, 2 a, b = b, a return a, b");
    assert_eq!(ints(&vals), vec![2, 1]);
    // Extra values are dropped, missing padded.
    let vals = run("local a, b, c = 1, 2 local x, y = 5, 6, 7 return x, y, a, b");
    assert_eq!(ints(&vals), vec![5, 6, 1, 2]);
}

#[test]
fn varargs() {
    let vals = run(
        "local function f(...) local a, b = ... return a, b, select('#', ...) end \
         return f(10, 20, 30)",
    );
    assert_eq!(ints(&vals), vec![10, 20, 3]);
    // Vararg spreads only in tail position.
    let vals = run("local function f(...) return {...} end return #f(1, 2, 3)");
    assert_eq!(ints(&vals), vec![3]);
    let vals = run(
        "local function f(...) local t = {..., 99} return #t, t[1], t[2] end return f(1, 2, 3)",
    );
    assert_eq!(ints(&vals), vec![2, 1, 99]);
}
