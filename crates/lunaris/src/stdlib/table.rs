// Table library
// Implements: insert, remove, concat, unpack, pack, sort

use crate::error::LuaResult;
use crate::eval::native::{Args, Dispatch};
use crate::eval::LuaInterp;
use crate::lib_registry::LibraryModule;
use crate::number;
use crate::stdlib::{bad_arg, check_int, check_str, check_table, opt_int};
use crate::value::{LuaKey, LuaValue};

pub fn create_table_lib() -> LibraryModule {
    crate::lib_module!("table", {
        "insert" => table_insert,
        "remove" => table_remove,
        "concat" => table_concat,
        "unpack" => table_unpack,
        "pack" => table_pack,
        "sort" => table_sort,
    })
}

fn table_insert(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let t = check_table(l, &args, 1, "insert")?;
    let len = l.heap.table(t).raw_len();
    match args.len() {
        2 => {
            let v = args.get(2);
            l.heap.table_mut(t).raw_set_int(len + 1, v);
        }
        3 => {
            let pos = check_int(l, &args, 2, "insert")?;
            if pos < 1 || pos > len + 1 {
                return Err(l.rt_error(
                    "bad argument #2 to 'insert' (position out of bounds)",
                ));
            }
            let v = args.get(3);
            l.heap.table_mut(t).insert_at(pos, v);
        }
        _ => return Err(l.rt_error("wrong number of arguments to 'insert'")),
    }
    Ok(Dispatch::Return(Vec::new()))
}

fn table_remove(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let t = check_table(l, &args, 1, "remove")?;
    let len = l.heap.table(t).raw_len();
    let pos = opt_int(l, &args, 2, "remove", len)?;
    if len == 0 && args.get(2).is_nil() {
        return Ok(Dispatch::Return(vec![LuaValue::Nil]));
    }
    if len > 0 && (pos < 1 || pos > len + 1) {
        return Err(l.rt_error(
            "bad argument #2 to 'remove' (position out of bounds)",
        ));
    }
    let removed = l.heap.table_mut(t).remove_at(pos);
    Ok(Dispatch::Return(vec![removed]))
}

fn table_concat(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let t = check_table(l, &args, 1, "concat")?;
    let sep = if args.get(2).is_nil() {
        Vec::new()
    } else {
        check_str(l, &args, 2, "concat")?.as_bytes().to_vec()
    };
    let i = opt_int(l, &args, 3, "concat", 1)?;
    let j = opt_int(l, &args, 4, "concat", l.heap.table(t).raw_len())?;
    let mut out = Vec::new();
    let mut k = i;
    while k <= j {
        let v = l.heap.table(t).raw_get_int(k);
        match &v {
            LuaValue::String(s) => out.extend_from_slice(s.as_bytes()),
            LuaValue::Integer(_) | LuaValue::Float(_) => out.extend_from_slice(
                number::number_to_string(&v).unwrap_or_default().as_bytes(),
            ),
            other => {
                return Err(l.rt_error(format!(
                    "invalid value (at index {}) in table for 'concat' (a {})",
                    k,
                    other.type_name()
                )));
            }
        }
        if k < j {
            out.extend_from_slice(&sep);
        }
        k += 1;
    }
    Ok(Dispatch::Return(vec![l.take_string(out)]))
}

fn table_unpack(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let t = check_table(l, &args, 1, "unpack")?;
    let i = opt_int(l, &args, 2, "unpack", 1)?;
    let j = opt_int(l, &args, 3, "unpack", l.heap.table(t).raw_len())?;
    if i > j {
        return Ok(Dispatch::Return(Vec::new()));
    }
    let count = j - i + 1;
    if count > 1_000_000 {
        return Err(l.rt_error("too many results to unpack"));
    }
    let mut out = Vec::with_capacity(count as usize);
    let mut k = i;
    while k <= j {
        out.push(l.heap.table(t).raw_get_int(k));
        k += 1;
    }
    Ok(Dispatch::Return(out))
}

fn table_pack(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let n = args.len() as i64;
    let t = l.new_table();
    for (i, v) in args.into_values().into_iter().enumerate() {
        l.heap.table_mut(t).raw_set_int(i as i64 + 1, v);
    }
    let key = l.heap.interner.intern_str("n");
    l.heap
        .table_mut(t)
        .raw_set(LuaKey::String(key), LuaValue::Integer(n));
    Ok(Dispatch::Return(vec![LuaValue::Table(t)]))
}

fn table_sort(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let t = check_table(l, &args, 1, "sort")?;
    let comparator = match args.opt(2) {
        Some(v) if !v.is_nil() => match v {
            LuaValue::Function(_) => Some(v.clone()),
            other => return Err(bad_arg(l, 2, "sort", "function", other)),
        },
        _ => None,
    };
    let len = l.heap.table(t).raw_len();
    let mut items = Vec::with_capacity(len as usize);
    for k in 1..=len {
        items.push(l.heap.table(t).raw_get_int(k));
    }
    quicksort(l, &mut items, &comparator)?;
    for (i, v) in items.into_iter().enumerate() {
        l.heap.table_mut(t).raw_set_int(i as i64 + 1, v);
    }
    Ok(Dispatch::Return(Vec::new()))
}

fn sort_less(
    l: &mut LuaInterp,
    comparator: &Option<LuaValue>,
    a: &LuaValue,
    b: &LuaValue,
) -> LuaResult<bool> {
    match comparator {
        Some(f) => {
            let results = l.call_value(f.clone(), vec![a.clone(), b.clone()])?;
            Ok(results
                .into_iter()
                .next()
                .unwrap_or(LuaValue::Nil)
                .is_truthy())
        }
        None => l.less_than(a.clone(), b.clone()),
    }
}

/// In-place quicksort with middle pivot. The comparator may be Lua
/// code, so every comparison can error (and an inconsistent order
/// function is detected by the partition running away).
fn quicksort(
    l: &mut LuaInterp,
    items: &mut [LuaValue],
    comparator: &Option<LuaValue>,
) -> LuaResult<()> {
    if items.len() <= 1 {
        return Ok(());
    }
    let pivot = items[items.len() / 2].clone();
    let mut lo = 0usize;
    let mut hi = items.len() - 1;
    loop {
        while sort_less(l, comparator, &items[lo], &pivot)? {
            lo += 1;
            if lo >= items.len() {
                return Err(l.rt_error("invalid order function for sorting"));
            }
        }
        while sort_less(l, comparator, &pivot, &items[hi])? {
            if hi == 0 {
                return Err(l.rt_error("invalid order function for sorting"));
            }
            hi -= 1;
        }
        if lo >= hi {
            break;
        }
        items.swap(lo, hi);
        lo += 1;
        if hi == 0 {
            break;
        }
        hi -= 1;
    }
    let split = lo.max(1);
    let (left, right) = items.split_at_mut(split);
    quicksort(l, left, comparator)?;
    quicksort(l, right, comparator)
}
