/// Values, arithmetic rules, and the basic library.
use super::*;
use crate::value::LuaValue;

#[test]
fn integer_float_distinction() {
    assert_eq!(run_int("return 1 + 2"), 3);
    assert_eq!(run_float("return 1 + 2.0"), 3.0);
    // Division and exponentiation always produce floats.
    assert_eq!(run_float("return 4 / 2"), 2.0);
    assert_eq!(run_float("return 2 ^ 2"), 4.0);
    // Floor division stays integral on integers.
    assert_eq!(run_int("return 7 // 2"), 3);
    assert_eq!(run_int("return -7 // 2"), -4);
    assert_eq!(run_float("return 7.0 // 2"), 3.0);
}

#[test]
fn modulo_follows_divisor() {
    assert_eq!(run_int("return 7 % 3"), 1);
    assert_eq!(run_int("return -7 % 3"), 2);
    assert_eq!(run_int("return 7 % -3"), -2);
    assert_eq!(run_float("return -5.5 % 2"), 0.5);
}

#[test]
fn floordiv_mod_identity() {
    // a // b * b + a % b == a
    assert!(run_bool(
        r#"
        for _, a in ipairs({7, -7, 9, -13}) do
            for _, b in ipairs({2, -2, 3, -5}) do
                if (a // b) * b + a % b ~= a then return false end
            end
        end
        return true
    "#
    ));
}

#[test]
fn integer_overflow_wraps() {
    assert_eq!(run_int("return math.maxinteger + 1"), i64::MIN);
    assert_eq!(run_int("return math.mininteger - 1"), i64::MAX);
}

#[test]
fn integer_div_by_zero_raises() {
    let msg = run_err("return 1 // 0");
    assert!(msg.contains("'n//0'"), "{}", msg);
    // Float division by zero is inf, not an error.
    assert_eq!(run_float("return 1 / 0"), f64::INFINITY);
}

#[test]
fn bitwise_ops() {
    assert_eq!(run_int("return 0xF0 & 0x3C"), 0x30);
    assert_eq!(run_int("return 0xF0 | 0x0F"), 0xFF);
    assert_eq!(run_int("return 5 ~ 3"), 6);
    assert_eq!(run_int("return ~0"), -1);
    assert_eq!(run_int("return 1 << 4"), 16);
    assert_eq!(run_int("return 256 >> 4"), 16);
    assert_eq!(run_int("return 1 << -1"), 0);
    // Exact floats convert; fractional ones fail.
    assert_eq!(run_int("return 3.0 & 1"), 1);
    let msg = run_err("return 3.5 & 1");
    assert!(msg.contains("no integer representation"), "{}", msg);
}

#[test]
fn number_equality_across_kinds() {
    assert!(run_bool("return 1 == 1.0"));
    assert!(run_bool("return 1.5 ~= 1"));
    assert!(run_bool("return math.maxinteger < math.huge"));
    assert!(run_bool("return -math.huge < math.mininteger"));
    assert!(run_bool("return not (0/0 == 0/0)"));
}

#[test]
fn string_number_coercion_in_arithmetic() {
    assert_eq!(run_int("return '10' + 5"), 15);
    assert_eq!(run_float("return '1.5' * 2"), 3.0);
}

#[test]
fn tostring_and_tonumber() {
    assert_eq!(run_str("return tostring(42)"), "42");
    assert_eq!(run_str("return tostring(1.5)"), "1.5");
    assert_eq!(run_str("return tostring(1.0)"), "1.0");
    assert_eq!(run_str("return tostring(nil)"), "nil");
    assert_eq!(run_str("return tostring(true)"), "true");
    assert_eq!(run_int("return tonumber('42')"), 42);
    assert_eq!(run_int("return tonumber('0x10')"), 16);
    assert_eq!(run_float("return tonumber('0x1.8p3')"), 12.0);
    assert_eq!(run_float("return tonumber('  3.5  ')"), 3.5);
    assert!(run("return tonumber('not a number')")[0].is_nil());
    assert_eq!(run_int("return tonumber('ff', 16)"), 255);
    assert_eq!(run_int("return tonumber('101', 2)"), 5);
}

#[test]
fn type_names() {
    assert_eq!(run_str("return type(nil)"), "nil");
    assert_eq!(run_str("return type(true)"), "boolean");
    assert_eq!(run_str("return type(1)"), "number");
    assert_eq!(run_str("return type(1.5)"), "number");
    assert_eq!(run_str("return type('s')"), "string");
    assert_eq!(run_str("return type({})"), "table");
    assert_eq!(run_str("return type(print)"), "function");
    assert_eq!(run_str("return type(coroutine.create(function() end))"), "thread");
    assert_eq!(run_str("return math.type(1)"), "integer");
    assert_eq!(run_str("return math.type(1.0)"), "float");
    assert!(run("return math.type('1')")[0].is_nil());
}

#[test]
fn short_circuit_returns_deciding_value() {
    assert_eq!(run_int("return false or 7"), 7);
    assert_eq!(run_int("return nil and 1 or 9"), 9);
    assert!(run("return nil and error('never evaluated')")[0].is_nil());
    assert_eq!(run_str("return 'x' and 'y'"), "y");
    // The result is the deciding value, not a coerced boolean.
    assert_eq!(run_int("return 0 and 5"), 5);
}

#[test]
fn select_and_rawops() {
    assert_eq!(run_int("return select('#', 1, 2, 3)"), 3);
    assert_eq!(run_int("return select(2, 10, 20, 30)"), 20);
    assert_eq!(run_int("return select(-1, 10, 20, 30)"), 30);
    assert!(run_bool("return rawequal('a', 'a')"));
    assert!(run_bool(
        "local t = setmetatable({}, {__eq = function() return true end})
         return not rawequal(t, {})"
    ));
    assert_eq!(run_int("return rawlen({1, 2, 3})"), 3);
    assert_eq!(run_int("return rawlen('abcd')"), 4);
}

#[test]
fn nil_and_nan_keys_are_rejected() {
    let msg = run_err("local t = {} t[nil] = 1");
    assert!(msg.contains("table index is nil"), "{}", msg);
    let msg = run_err("local t = {} t[0/0] = 1");
    assert!(msg.contains("table index is NaN"), "{}", msg);
    // Reads of nil keys are just nil.
    assert!(run("local t = {} return t[nil]")[0].is_nil());
}

#[test]
fn integral_float_keys_normalize() {
    assert_eq!(run_int("local t = {} t[2.0] = 7 return t[2]"), 7);
    assert_eq!(run_int("local t = {} t[2] = 7 return t[2.0]"), 7);
}

#[test]
fn multivalue_adjustment() {
    let vals = run("local function f() return 1, 2, 3 end return f()");
    assert_eq!(ints(&vals), vec![1, 2, 3]);
    // Grouping truncates to one.
    let vals = run("local function f() return 1, 2, 3 end return (f())");
    assert_eq!(ints(&vals), vec![1]);
    // Non-tail call positions truncate too.
    let vals = run("local function f() return 1, 2 end return f(), 10");
    assert_eq!(ints(&vals), vec![1, 10]);
    // Local lists pad with nil.
    assert!(run("local a, b = 1 return b")[0].is_nil());
}

#[test]
fn string_results_are_bytes() {
    assert_eq!(run_int("return #'héllo'"), 6);
    assert_eq!(run_str("return 'a' .. 'b' .. 'c'"), "abc");
    assert_eq!(run_int("return #('x' .. 'yz')"), 3);
    assert_eq!(run_str("return 1 .. 2"), "12");
    assert!(run_bool("return 'abc' < 'abd'"));
    assert!(run_bool("return 'ab' < 'abc'"));
    assert!(run_bool("return 'Z' < 'a'"));
}

#[test]
fn assert_builtin() {
    assert_eq!(run_int("return assert(42)"), 42);
    let msg = run_err("assert(false)");
    assert!(msg.contains("assertion failed"), "{}", msg);
    let msg = run_err("assert(nil, 'custom message')");
    assert!(msg.contains("custom message"), "{}", msg);
}

#[test]
fn escape_decoding() {
    assert_eq!(run_int(r#"return #"\65\66\67""#), 3);
    assert_eq!(run_str(r#"return "\65\66\67""#), "ABC");
    assert_eq!(run_str(r#"return "\x41\x42""#), "AB");
    assert_eq!(run_str(r#"return "\u{48}\u{49}""#), "HI");
    assert_eq!(run_int(r#"return #"\u{10FFFF}""#), 4);
    assert_eq!(run_str("return \"a\\z  \n  b\""), "ab");
}

#[test]
fn long_strings_and_comments() {
    assert_eq!(run_str("return [[hello]]"), "hello");
    assert_eq!(run_str("return [==[a]]b]==]"), "a]]b");
    assert_eq!(run_int("--[==[ long comment ]==] return 1"), 1);
}

#[test]
fn version_global() {
    assert_eq!(run_str("return _VERSION"), "Lua 5.4");
}

#[test]
fn spec_invariant_type_name_is_total() {
    let vals = run(
        "return type(nil), type(true), type(0), type(''), type({}), \
         type(type), type(coroutine.create(function() end))",
    );
    let names: Vec<String> = vals
        .iter()
        .map(|v| match v {
            LuaValue::String(s) => s.to_string_lossy(),
            _ => panic!("type() must return a string"),
        })
        .collect();
    for n in names {
        assert!(
            ["nil", "boolean", "number", "string", "table", "function", "thread", "userdata"]
                .contains(&n.as_str()),
            "unexpected type name {}",
            n
        );
    }
}
