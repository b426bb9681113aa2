/// The table library and raw table behavior.
use super::*;

#[test]
fn insert_and_remove() {
    let vals = run(
        "local t = {1, 2, 3} table.insert(t, 4) table.insert(t, 1, 0) \
         return #t, t[1], t[5]",
    );
    assert_eq!(ints(&vals), vec![5, 0, 4]);
    let vals = run(
        "local t = {1, 2, 3} local last = table.remove(t) \
         local first = table.remove(t, 1) return last, first, #t, t[1]",
    );
    assert_eq!(ints(&vals), vec![3, 1, 1, 2]);
    let msg = run_err("local t = {1} table.insert(t, 9, 'x')");
    assert!(msg.contains("position out of bounds"), "{}", msg);
}

#[test]
fn concat() {
    assert_eq!(run_str("return table.concat({1, 2, 3})"), "123");
    assert_eq!(run_str("return table.concat({'a', 'b'}, '-')"), "a-b");
    assert_eq!(run_str("return table.concat({1, 2, 3, 4}, ',', 2, 3)"), "2,3");
    assert_eq!(run_str("return table.concat({})"), "");
    let msg = run_err("return table.concat({{}})");
    assert!(msg.contains("invalid value"), "{}", msg);
}

#[test]
fn pack_and_unpack() {
    let vals = run("return table.unpack({10, 20, 30})");
    assert_eq!(ints(&vals), vec![10, 20, 30]);
    let vals = run("return table.unpack({10, 20, 30}, 2)");
    assert_eq!(ints(&vals), vec![20, 30]);
    let vals = run("return table.unpack({10, 20, 30}, 2, 2)");
    assert_eq!(ints(&vals), vec![20]);
    let vals = run("local p = table.pack(7, nil, 9) return p.n, p[1], p[3]");
    assert_eq!(vals[0].as_integer(), Some(3));
    assert_eq!(vals[1].as_integer(), Some(7));
    assert_eq!(vals[2].as_integer(), Some(9));
}

#[test]
fn sort_default_and_custom_order() {
    assert_eq!(
        run_str(
            "local t = {3, 1, 4, 1, 5, 9, 2, 6} table.sort(t) \
             return table.concat(t, ',')"
        ),
        "1,1,2,3,4,5,6,9"
    );
    assert_eq!(
        run_str(
            "local t = {3, 1, 4, 1, 5} table.sort(t, function(a, b) return a > b end) \
             return table.concat(t, ',')"
        ),
        "5,4,3,1,1"
    );
    assert_eq!(
        run_str(
            "local t = {'banana', 'apple', 'cherry'} table.sort(t) \
             return table.concat(t, ' ')"
        ),
        "apple banana cherry"
    );
}

#[test]
fn sort_comparator_errors_propagate() {
    let vals = run(
        "local t = {2, 1} \
         return pcall(table.sort, t, function() error('cmp') end)",
    );
    assert!(!vals[0].is_truthy());
}

#[test]
fn length_border_semantics() {
    assert_eq!(run_int("return #{1, 2, 3}"), 3);
    assert_eq!(run_int("return #{}"), 0);
    // Hash-resident integer keys extend the border when contiguous.
    assert_eq!(
        run_int("local t = {} for i = 1, 10 do t[i] = i end return #t"),
        10
    );
    // Removing the last element moves the border back.
    assert_eq!(
        run_int("local t = {1, 2, 3} t[3] = nil return #t"),
        2
    );
}

#[test]
fn raw_set_nil_removes_entries() {
    assert!(run_bool(
        r#"
        local t = {}
        t.a = 1
        t.a = nil
        local count = 0
        for _ in pairs(t) do count = count + 1 end
        return count == 0 and rawget(t, "a") == nil
    "#
    ));
}

#[test]
fn next_covers_both_parts() {
    assert_eq!(
        run_int(
            r#"
            local t = {1, 2, 3, x = 10, y = 20}
            local sum = 0
            local k, v = next(t)
            while k do
                sum = sum + v
                k, v = next(t, k)
            end
            return sum
        "#
        ),
        36
    );
}

#[test]
fn tables_have_identity() {
    assert!(run_bool("local a, b = {}, {} return a ~= b and a == a"));
    assert!(run_bool("local a = {} local b = a return a == b"));
    assert!(run_bool("local t = {} return ({[t] = true})[t]"));
}
