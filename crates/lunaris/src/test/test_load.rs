/// `load` and the `string.dump` round trip.
use super::*;

#[test]
fn load_compiles_and_defers_execution() {
    assert_eq!(run_int("local f = load('return 1 + 2') return f()"), 3);
    // Loading does not execute.
    assert_eq!(
        run_int(
            "hits = 0 local f = load('hits = hits + 1') \
             local before = hits f() return before * 10 + hits"
        ),
        1
    );
}

#[test]
fn load_reports_syntax_errors_as_values() {
    let vals = run("return load('this is not lua')");
    assert!(vals[0].is_nil());
    assert!(vals[1].as_str().is_some());
}

#[test]
fn load_accepts_a_reader_function() {
    assert_eq!(
        run_int(
            r#"
            local parts = {"return ", "40", " + 2"}
            local i = 0
            local f = load(function()
                i = i + 1
                return parts[i]
            end)
            return f()
        "#
        ),
        42
    );
}

#[test]
fn dump_round_trips_a_pure_closure() {
    assert_eq!(
        run_int(
            r#"
            local function add(a, b)
                return a + b
            end
            local image = string.dump(add)
            local back = load(image)
            return back(30, 12)
        "#
        ),
        42
    );
}

#[test]
fn dump_round_trips_varargs() {
    assert_eq!(
        run_int(
            r##"
            local function count(...)
                return select("#", ...)
            end
            local back = load(string.dump(count))
            return back(1, 2, 3, 4)
        "##
        ),
        4
    );
}

#[test]
fn dumped_functions_bind_the_loading_environment() {
    assert_eq!(
        run_int(
            r#"
            local function read_global()
                return marker
            end
            marker = 5
            local back = load(string.dump(read_global))
            return back()
        "#
        ),
        5
    );
}

#[test]
fn dump_rejects_builtins() {
    let vals = run("return pcall(string.dump, print)");
    assert!(!vals[0].is_truthy());
}
