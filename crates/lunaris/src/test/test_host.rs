/// The host bridge: registering callables, globals, invoking Lua from
/// Rust, userdata.
use crate::eval::native::{Args, Dispatch};
use crate::eval::LuaInterp;
use crate::value::{LuaUserdata, LuaValue, MetaMethod};
use crate::LuaResult;

fn host_double(_l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let n = args.get(1).as_integer().unwrap_or(0);
    Ok(Dispatch::Return(vec![LuaValue::Integer(n * 2)]))
}

#[test]
fn registered_functions_are_callable_from_lua() {
    let mut interp = LuaInterp::default();
    interp.register_function("host_double", host_double);
    let vals = interp.execute("return host_double(21)").unwrap();
    assert_eq!(vals[0].as_integer(), Some(42));
}

#[test]
fn globals_round_trip() {
    let mut interp = LuaInterp::default();
    interp.set_global("answer", LuaValue::Integer(42));
    let vals = interp.execute("return answer + 1").unwrap();
    assert_eq!(vals[0].as_integer(), Some(43));
    interp.execute("reply = 'ok'").unwrap();
    let v = interp.get_global("reply");
    assert_eq!(v.as_str().unwrap().to_string_lossy(), "ok");
}

#[test]
fn call_function_by_name() {
    let mut interp = LuaInterp::default();
    interp
        .execute("function combine(a, b) return a .. '/' .. b end")
        .unwrap();
    let a = interp.new_string_from("left");
    let b = interp.new_string_from("right");
    let vals = interp.call_function("combine", vec![a, b]).unwrap();
    assert_eq!(vals[0].as_str().unwrap().to_string_lossy(), "left/right");
}

#[test]
fn call_errors_surface_to_the_host() {
    let mut interp = LuaInterp::default();
    interp.execute("function boom() error('from lua') end").unwrap();
    let err = interp.call_function("boom", Vec::new()).unwrap_err();
    assert!(err.message().contains("from lua"));
}

#[test]
fn host_values_passed_through_the_value_model() {
    let mut interp = LuaInterp::default();
    interp
        .execute("function describe(v) return type(v) end")
        .unwrap();
    for (value, expected) in [
        (LuaValue::Nil, "nil"),
        (LuaValue::Boolean(true), "boolean"),
        (LuaValue::Integer(1), "number"),
        (LuaValue::Float(1.5), "number"),
    ] {
        let vals = interp.call_function("describe", vec![value]).unwrap();
        assert_eq!(vals[0].as_str().unwrap().to_string_lossy(), expected);
    }
}

#[test]
fn userdata_with_metatable() {
    struct Counter {
        hits: i64,
    }

    fn bump(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
        let ud = args.get(1).as_userdata().expect("userdata receiver");
        let counter = l
            .heap
            .userdata
            .get_mut(ud.index() as u32)
            .data
            .downcast_mut::<Counter>()
            .expect("counter payload");
        counter.hits += 1;
        let hits = counter.hits;
        Ok(Dispatch::Return(vec![LuaValue::Integer(hits)]))
    }

    let mut interp = LuaInterp::default();
    let ud = interp.new_userdata(LuaUserdata::new(Box::new(Counter { hits: 0 })));
    let meta = interp.new_table();
    let methods = interp.new_table();
    let bump_fn = interp.new_native_function("bump", bump);
    let key = interp.new_string(b"bump");
    let key = interp.table_key(&key).unwrap();
    interp.heap.table_mut(methods).raw_set(key, bump_fn);
    let index_key = interp.heap.meta_name(MetaMethod::Index).clone();
    interp.heap.table_mut(meta).raw_set(
        crate::value::LuaKey::String(index_key),
        LuaValue::Table(methods),
    );
    if let LuaValue::Userdata(id) = ud {
        interp
            .heap
            .userdata
            .get_mut(id.index() as u32)
            .data
            .set_metatable(Some(meta));
    }
    interp.set_global("counter", ud);
    let vals = interp
        .execute("counter:bump() counter:bump() return counter:bump(), type(counter)")
        .unwrap();
    assert_eq!(vals[0].as_integer(), Some(3));
    assert_eq!(vals[1].as_str().unwrap().to_string_lossy(), "userdata");
}

#[test]
fn pins_keep_host_held_values_alive() {
    let mut interp = LuaInterp::default();
    let t = interp.new_table();
    let token = interp.pin(LuaValue::Table(t));
    interp.execute("collectgarbage('collect')").unwrap();
    // Still valid: writable without resurrecting anything stale.
    interp
        .heap
        .table_mut(t)
        .raw_set_int(1, LuaValue::Integer(5));
    assert_eq!(interp.heap.table(t).raw_get_int(1).as_integer(), Some(5));
    interp.unpin(token);
}

#[test]
fn interpreter_state_persists_across_chunks() {
    let mut interp = LuaInterp::default();
    interp.execute("state = {count = 0}").unwrap();
    interp.execute("state.count = state.count + 10").unwrap();
    let vals = interp.execute("return state.count").unwrap();
    assert_eq!(vals[0].as_integer(), Some(10));
}
