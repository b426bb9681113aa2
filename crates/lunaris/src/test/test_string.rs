/// The string library and the pattern matcher's Lua-facing contract.
use super::*;

#[test]
fn basic_ops() {
    assert_eq!(run_int("return string.len('hello')"), 5);
    assert_eq!(run_str("return string.sub('hello', 2, 4)"), "ell");
    assert_eq!(run_str("return string.sub('hello', -3)"), "llo");
    assert_eq!(run_str("return string.sub('hello', 2)"), "ello");
    assert_eq!(run_str("return string.sub('hello', 10)"), "");
    assert_eq!(run_str("return string.upper('mIx')"), "MIX");
    assert_eq!(run_str("return string.lower('mIx')"), "mix");
    assert_eq!(run_str("return string.rep('ab', 3)"), "ababab");
    assert_eq!(run_str("return string.rep('a', 3, '-')"), "a-a-a");
    assert_eq!(run_str("return string.reverse('abc')"), "cba");
}

#[test]
fn byte_and_char() {
    assert_eq!(run_int("return string.byte('A')"), 65);
    let vals = run("return string.byte('ABC', 1, 3)");
    assert_eq!(ints(&vals), vec![65, 66, 67]);
    assert_eq!(run_str("return string.char(72, 105)"), "Hi");
    let msg = run_err("return string.char(300)");
    assert!(msg.contains("out of range"), "{}", msg);
}

#[test]
fn find_returns_positions_and_captures() {
    let vals = run("return string.find('hello', 'l+')");
    assert_eq!(ints(&vals), vec![3, 4]);
    let vals = run("return string.find('key=value', '(%w+)=(%w+)')");
    assert_eq!(vals[0].as_integer(), Some(1));
    assert_eq!(vals[1].as_integer(), Some(9));
    assert_eq!(vals[2].as_str().unwrap().to_string_lossy(), "key");
    assert_eq!(vals[3].as_str().unwrap().to_string_lossy(), "value");
    assert!(run("return string.find('abc', 'z')")[0].is_nil());
    // init offset and plain mode.
    let vals = run("return string.find('aXaXa', 'X', 3)");
    assert_eq!(ints(&vals), vec![4, 4]);
    let vals = run("return string.find('a.c', '.', 1, true)");
    assert_eq!(ints(&vals), vec![2, 2]);
}

#[test]
fn match_returns_captures_or_whole() {
    assert_eq!(run_str("return string.match('hello 42!', '%d+')"), "42");
    let vals = run("return string.match('2026-08-01', '(%d+)-(%d+)-(%d+)')");
    let parts: Vec<String> = vals
        .iter()
        .map(|v| v.as_str().unwrap().to_string_lossy())
        .collect();
    assert_eq!(parts, vec!["2026", "08", "01"]);
    // Position captures.
    let vals = run("return string.match('hello', '()ll()')");
    assert_eq!(ints(&vals), vec![3, 5]);
}

#[test]
fn gmatch_iterates_lazily() {
    assert_eq!(
        run_int(
            "local s = 0 for n in string.gmatch('1 22 333', '%d+') do s = s + #n end \
             return s"
        ),
        6
    );
    let vals = run(
        r#"
        local keys = {}
        for k, v in string.gmatch("a=1,b=2", "(%w+)=(%w+)") do
            keys[#keys + 1] = k .. v
        end
        return keys[1], keys[2]
    "#,
    );
    assert_eq!(vals[0].as_str().unwrap().to_string_lossy(), "a1");
    assert_eq!(vals[1].as_str().unwrap().to_string_lossy(), "b2");
    // Empty matches advance one byte and terminate.
    assert_eq!(
        run_int("local n = 0 for _ in string.gmatch('abc', 'x*') do n = n + 1 end return n"),
        4
    );
}

#[test]
fn gsub_with_string_replacement() {
    let vals = run("return string.gsub('hello world', 'o', '0')");
    assert_eq!(vals[0].as_str().unwrap().to_string_lossy(), "hell0 w0rld");
    assert_eq!(vals[1].as_integer(), Some(2));
    // %0 and %1 references.
    assert_eq!(
        run_str("return (string.gsub('abc', '%a', '[%0]'))"),
        "[a][b][c]"
    );
    assert_eq!(
        run_str("return (string.gsub('key=val', '(%w+)=(%w+)', '%2=%1'))"),
        "val=key"
    );
    // Replacement limit.
    let vals = run("return string.gsub('aaaa', 'a', 'b', 2)");
    assert_eq!(vals[0].as_str().unwrap().to_string_lossy(), "bbaa");
    assert_eq!(vals[1].as_integer(), Some(2));
}

#[test]
fn gsub_with_table_and_function() {
    assert_eq!(
        run_str(
            "return (string.gsub('$name is $age', '%$(%w+)', {name = 'lua', age = '30'}))"
        ),
        "lua is 30"
    );
    assert_eq!(
        run_str(
            "return (string.gsub('abc', '%a', function(c) return c:upper() end))"
        ),
        "ABC"
    );
    // nil/false results keep the original text.
    assert_eq!(
        run_str(
            "return (string.gsub('a1b2', '%w', function(c) \
             if c:match('%d') then return nil end return c:upper() end))"
        ),
        "A1B2"
    );
    let msg = run_err(
        "return string.gsub('x', 'x', function() return {} end)",
    );
    assert!(msg.contains("invalid replacement value"), "{}", msg);
}

#[test]
fn balanced_and_frontier() {
    assert_eq!(
        run_str("return string.match('fn(a, b(c)) rest', '%b()')"),
        "(a, b(c))"
    );
    assert_eq!(
        run_str("return string.match('THE quick fox', '%f[%l]%a+')"),
        "quick"
    );
}

#[test]
fn anchors_are_positional() {
    assert!(run("return string.match('hello', '^h')")[0].as_str().is_some());
    assert!(run("return string.match('hello', '^e')")[0].is_nil());
    assert_eq!(run_str("return string.match('ab$cd', 'b$c')"), "b$c");
}

#[test]
fn format_directives() {
    assert_eq!(run_str("return string.format('%d+%d=%d', 2, 3, 5)"), "2+3=5");
    assert_eq!(run_str("return string.format('%5d', 42)"), "   42");
    assert_eq!(run_str("return string.format('%-5d|', 42)"), "42   |");
    assert_eq!(run_str("return string.format('%05d', 42)"), "00042");
    assert_eq!(run_str("return string.format('%x', 255)"), "ff");
    assert_eq!(run_str("return string.format('%X', 255)"), "FF");
    assert_eq!(run_str("return string.format('%o', 8)"), "10");
    assert_eq!(run_str("return string.format('%c', 65)"), "A");
    assert_eq!(run_str("return string.format('%.2f', 3.14159)"), "3.14");
    assert_eq!(run_str("return string.format('%s and %s', 'a', 'b')"), "a and b");
    assert_eq!(run_str("return string.format('%.3s', 'abcdef')"), "abc");
    assert_eq!(run_str("return string.format('100%%')"), "100%");
    assert_eq!(run_str("return string.format('%q', 'a\"b')"), r#""a\"b""#);
}

#[test]
fn format_s_uses_tostring() {
    assert_eq!(
        run_str(
            "local t = setmetatable({}, {__tostring = function() return 'T!' end}) \
             return string.format('<%s>', t)"
        ),
        "<T!>"
    );
}

#[test]
fn pattern_errors_are_lua_errors() {
    let msg = run_err("return string.match('x', '%')");
    assert!(msg.contains("malformed pattern"), "{}", msg);
    let msg = run_err("return string.match('x', '(a')");
    assert!(msg.contains("capture"), "{}", msg);
}

#[test]
fn patterns_are_bytewise() {
    // A non-UTF-8 byte in a pattern set still matches by byte value.
    assert_eq!(run_int("return #string.match('\\xFF\\xFEa', '[\\xFE\\xFF]+')"), 2);
    assert_eq!(run_int("local s = '\\0abc' return #s"), 4);
    assert_eq!(run_str("return string.match('\\0abc', '\\0(abc)')"), "abc");
}
