// Basic library (_G global functions)
// Implements: print, type, assert, error, tonumber, tostring, select,
// ipairs, pairs, next, pcall, xpcall, getmetatable, setmetatable,
// rawget, rawset, rawlen, rawequal, collectgarbage, load, warn

use crate::error::LuaResult;
use crate::eval::native::{Args, Dispatch};
use crate::eval::LuaInterp;
use crate::gc::GcRef;
use crate::lib_registry::LibraryModule;
use crate::number;
use crate::stdlib::{bad_arg, check_any, check_table};
use crate::value::{LuaValue, MetaMethod};

pub fn create_basic_lib() -> LibraryModule {
    crate::lib_module!("_G", {
        "print" => lua_print,
        "type" => lua_type,
        "assert" => lua_assert,
        "error" => lua_error,
        "tonumber" => lua_tonumber,
        "tostring" => lua_tostring,
        "select" => lua_select,
        "ipairs" => lua_ipairs,
        "pairs" => lua_pairs,
        "next" => lua_next,
        "pcall" => lua_pcall,
        "xpcall" => lua_xpcall,
        "getmetatable" => lua_getmetatable,
        "setmetatable" => lua_setmetatable,
        "rawget" => lua_rawget,
        "rawset" => lua_rawset,
        "rawlen" => lua_rawlen,
        "rawequal" => lua_rawequal,
        "collectgarbage" => lua_collectgarbage,
        "load" => lua_load,
        "warn" => lua_warn,
    })
    .with_value("_VERSION", |l| l.new_string_from("Lua 5.4"))
    .with_initializer(|l| {
        // _G refers to the global table itself.
        let globals = l.globals;
        l.set_global("_G", LuaValue::Table(globals));
        Ok(())
    })
}

fn lua_print(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let mut pieces = Vec::with_capacity(args.len());
    for v in args.values() {
        pieces.push(l.tostring_value(v)?.to_string_lossy());
    }
    println!("{}", pieces.join("\t"));
    Ok(Dispatch::Return(Vec::new()))
}

fn lua_type(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let v = check_any(l, &args, 1, "type")?;
    let name = l.new_string_from(v.type_name());
    Ok(Dispatch::Return(vec![name]))
}

fn lua_assert(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let v = check_any(l, &args, 1, "assert")?;
    if v.is_truthy() {
        return Ok(Dispatch::Return(args.into_values()));
    }
    match args.opt(2) {
        Some(msg) => Err(l.raise_value(msg.clone(), 0)),
        None => Err(l.rt_error("assertion failed!")),
    }
}

fn lua_error(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let value = args.get(1);
    let level = match args.opt(2) {
        Some(v) => number::to_integer(v).unwrap_or(1),
        None => 1,
    };
    Err(l.raise_value(value, level))
}

fn lua_tonumber(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let v = check_any(l, &args, 1, "tonumber")?;
    if args.get(2).is_nil() {
        return Ok(Dispatch::Return(vec![
            number::to_number(&v).unwrap_or(LuaValue::Nil),
        ]));
    }
    // Explicit base: the subject must be a string of digits in that
    // base.
    let base = crate::stdlib::check_int(l, &args, 2, "tonumber")?;
    if !(2..=36).contains(&base) {
        return Err(l.rt_error("bad argument #2 to 'tonumber' (base out of range)"));
    }
    let s = match &v {
        LuaValue::String(s) => s.clone(),
        _ => return Err(bad_arg(l, 1, "tonumber", "string", &v)),
    };
    let text = s.to_string_lossy();
    let text = text.trim();
    let (neg, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if digits.is_empty() {
        return Ok(Dispatch::Return(vec![LuaValue::Nil]));
    }
    let mut acc: i64 = 0;
    for c in digits.chars() {
        match c.to_digit(base as u32) {
            Some(d) => acc = acc.wrapping_mul(base).wrapping_add(d as i64),
            None => return Ok(Dispatch::Return(vec![LuaValue::Nil])),
        }
    }
    let n = if neg { acc.wrapping_neg() } else { acc };
    Ok(Dispatch::Return(vec![LuaValue::Integer(n)]))
}

fn lua_tostring(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let v = check_any(l, &args, 1, "tostring")?;
    let s = l.tostring_value(&v)?;
    Ok(Dispatch::Return(vec![LuaValue::String(s)]))
}

fn lua_select(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let selector = check_any(l, &args, 1, "select")?;
    if let LuaValue::String(s) = &selector
        && s.as_bytes() == b"#"
    {
        return Ok(Dispatch::Return(vec![LuaValue::Integer(
            args.len() as i64 - 1,
        )]));
    }
    let n = crate::stdlib::check_int(l, &args, 1, "select")?;
    let rest = args.len() as i64 - 1;
    let start = if n < 0 {
        let start = rest + n;
        if start < 0 {
            return Err(l.rt_error("bad argument #1 to 'select' (index out of range)"));
        }
        start
    } else if n == 0 {
        return Err(l.rt_error("bad argument #1 to 'select' (index out of range)"));
    } else {
        n - 1
    };
    let values = args.into_values();
    Ok(Dispatch::Return(
        values.into_iter().skip(1 + start as usize).collect(),
    ))
}

fn lua_next(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let t = check_table(l, &args, 1, "next")?;
    let key = args.get(2);
    let entry = if key.is_nil() {
        l.heap.table(t).next_entry(None)
    } else {
        let k = l.table_key(&key)?;
        l.heap.table(t).next_entry(Some(&k))
    };
    Ok(Dispatch::Return(match entry {
        Some((k, v)) => vec![k, v],
        None => vec![LuaValue::Nil],
    }))
}

fn lua_pairs(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let v = check_any(l, &args, 1, "pairs")?;
    let mm = l.get_mm(&v, MetaMethod::Pairs);
    if !mm.is_nil() {
        let mut results = l.call_value(mm, vec![v])?;
        results.resize(3, LuaValue::Nil);
        return Ok(Dispatch::Return(results));
    }
    check_table(l, &args, 1, "pairs")?;
    let next = l.new_native_function("next", lua_next);
    Ok(Dispatch::Return(vec![next, v, LuaValue::Nil]))
}

fn lua_ipairs(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let v = check_any(l, &args, 1, "ipairs")?;
    let iter = l.new_native_function("ipairs_iter", ipairs_iter);
    Ok(Dispatch::Return(vec![iter, v, LuaValue::Integer(0)]))
}

/// The `ipairs` iterator respects `__index`.
fn ipairs_iter(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let t = args.get(1);
    let i = crate::stdlib::check_int(l, &args, 2, "ipairs")?;
    let next = i + 1;
    let v = l.index_value(t, LuaValue::Integer(next))?;
    Ok(Dispatch::Return(if v.is_nil() {
        vec![LuaValue::Nil]
    } else {
        vec![LuaValue::Integer(next), v]
    }))
}

fn lua_pcall(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let func = check_any(l, &args, 1, "pcall")?;
    let rest = args.into_values().split_off(1);
    Ok(Dispatch::Protect {
        func,
        args: rest,
        handler: None,
    })
}

fn lua_xpcall(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let func = check_any(l, &args, 1, "xpcall")?;
    let handler = check_any(l, &args, 2, "xpcall")?;
    let rest = args.into_values().split_off(2);
    Ok(Dispatch::Protect {
        func,
        args: rest,
        handler: Some(handler),
    })
}

fn lua_getmetatable(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let v = check_any(l, &args, 1, "getmetatable")?;
    let Some(meta) = l.metatable_for(&v) else {
        return Ok(Dispatch::Return(vec![LuaValue::Nil]));
    };
    // A `__metatable` field protects the real table.
    let protected = l
        .heap
        .get_metamethod_of_table(meta, MetaMethod::Metatable);
    Ok(Dispatch::Return(vec![if protected.is_nil() {
        LuaValue::Table(meta)
    } else {
        protected
    }]))
}

fn lua_setmetatable(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let t = check_table(l, &args, 1, "setmetatable")?;
    let meta = args.get(2);
    let new_meta = match &meta {
        LuaValue::Nil => None,
        LuaValue::Table(m) => Some(*m),
        other => return Err(bad_arg(l, 2, "setmetatable", "nil or table", other)),
    };
    if let Some(old) = l.heap.table(t).metatable()
        && !l
            .heap
            .get_metamethod_of_table(old, MetaMethod::Metatable)
            .is_nil()
    {
        return Err(l.rt_error("cannot change a protected metatable"));
    }
    l.heap.table_mut(t).set_metatable(new_meta);
    // Objects whose metatable carries __gc become finalizable now.
    if let Some(m) = new_meta
        && !l.heap.get_metamethod_of_table(m, MetaMethod::Gc).is_nil()
    {
        l.heap.mark_finalizable(GcRef::Table(t));
    }
    Ok(Dispatch::Return(vec![LuaValue::Table(t)]))
}

fn lua_rawget(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let t = check_table(l, &args, 1, "rawget")?;
    let key = args.get(2);
    let v = l.heap.table(t).raw_get_value(&key);
    Ok(Dispatch::Return(vec![v]))
}

fn lua_rawset(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let t = check_table(l, &args, 1, "rawset")?;
    let key = args.get(2);
    let value = args.get(3);
    let k = l.table_key(&key)?;
    l.heap.table_mut(t).raw_set(k, value);
    Ok(Dispatch::Return(vec![LuaValue::Table(t)]))
}

fn lua_rawlen(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let v = check_any(l, &args, 1, "rawlen")?;
    let n = match &v {
        LuaValue::Table(t) => l.heap.table(*t).raw_len(),
        LuaValue::String(s) => s.len() as i64,
        other => return Err(bad_arg(l, 1, "rawlen", "table or string", other)),
    };
    Ok(Dispatch::Return(vec![LuaValue::Integer(n)]))
}

fn lua_rawequal(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let a = check_any(l, &args, 1, "rawequal")?;
    let b = check_any(l, &args, 2, "rawequal")?;
    Ok(Dispatch::Return(vec![LuaValue::Boolean(a.raw_equal(&b))]))
}

fn lua_collectgarbage(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let opt = match args.opt(1) {
        None | Some(LuaValue::Nil) => "collect".to_string(),
        Some(LuaValue::String(s)) => s.to_string_lossy(),
        Some(other) => return Err(bad_arg(l, 1, "collectgarbage", "string", other)),
    };
    let result = match opt.as_str() {
        "collect" => {
            l.collect_garbage(true);
            LuaValue::Integer(0)
        }
        "step" => {
            l.collect_garbage(false);
            LuaValue::Boolean(false)
        }
        "stop" => {
            l.heap.gc.running = false;
            LuaValue::Integer(0)
        }
        "restart" => {
            l.heap.gc.running = true;
            LuaValue::Integer(0)
        }
        "count" => LuaValue::Float(l.heap.estimated_bytes() as f64 / 1024.0),
        "isrunning" => LuaValue::Boolean(l.heap.gc.running),
        "setpause" => {
            let old = l.heap.gc.pause;
            if let Some(v) = args.opt(2)
                && let Some(n) = number::to_integer(v)
            {
                l.heap.gc.pause = n.max(0) as u32;
            }
            LuaValue::Integer(old as i64)
        }
        "setstepmul" | "incremental" => {
            let old = l.heap.gc.stepmul;
            if let Some(v) = args.opt(2)
                && let Some(n) = number::to_integer(v)
            {
                l.heap.gc.stepmul = n.max(0) as u32;
            }
            LuaValue::Integer(old as i64)
        }
        other => {
            return Err(l.rt_error(format!(
                "bad argument #1 to 'collectgarbage' (invalid option '{}')",
                other
            )));
        }
    };
    Ok(Dispatch::Return(vec![result]))
}

fn lua_load(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let chunk_arg = check_any(l, &args, 1, "load")?;
    let chunk_name = match args.opt(2) {
        Some(LuaValue::String(s)) => s.to_string_lossy(),
        _ => "=(load)".to_string(),
    };
    let env = match args.opt(4) {
        Some(v) if !v.is_nil() => v.clone(),
        _ => LuaValue::Table(l.globals),
    };
    let source = match &chunk_arg {
        LuaValue::String(s) => s.as_bytes().to_vec(),
        LuaValue::Function(_) => {
            // Reader function: concatenate the pieces it produces.
            let mut bytes = Vec::new();
            loop {
                let piece = l.call_value(chunk_arg.clone(), Vec::new())?;
                match piece.into_iter().next() {
                    Some(LuaValue::String(s)) if !s.is_empty() => {
                        bytes.extend_from_slice(s.as_bytes());
                    }
                    _ => break,
                }
            }
            bytes
        }
        other => return Err(bad_arg(l, 1, "load", "string or function", other)),
    };
    match crate::stdlib::string::load_source(l, &source, &chunk_name, env) {
        Ok(func) => Ok(Dispatch::Return(vec![LuaValue::Function(func)])),
        Err(e) => {
            let msg = l.take_string(e.message().into_bytes());
            Ok(Dispatch::Return(vec![LuaValue::Nil, msg]))
        }
    }
}

fn lua_warn(_l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let mut text = String::new();
    for v in args.values() {
        if let LuaValue::String(s) = v {
            text.push_str(&s.to_string_lossy());
        }
    }
    // Control messages (leading '@') are accepted and ignored.
    if !text.starts_with('@') {
        eprintln!("Lua warning: {}", text);
    }
    Ok(Dispatch::Return(Vec::new()))
}
