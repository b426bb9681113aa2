// OS library (small surface)
// Implements: clock, time, date, getenv

use chrono::{Datelike, Local, TimeZone, Timelike, Utc};

use crate::error::LuaResult;
use crate::eval::native::{Args, Dispatch};
use crate::eval::LuaInterp;
use crate::lib_registry::LibraryModule;
use crate::number;
use crate::stdlib::{bad_arg, check_table};
use crate::value::{LuaKey, LuaValue};

pub fn create_os_lib() -> LibraryModule {
    crate::lib_module!("os", {
        "clock" => os_clock,
        "time" => os_time,
        "date" => os_date,
        "getenv" => os_getenv,
    })
}

fn os_clock(l: &mut LuaInterp, _args: Args) -> LuaResult<Dispatch> {
    let secs = l.start_time.elapsed().as_secs_f64();
    Ok(Dispatch::Return(vec![LuaValue::Float(secs)]))
}

fn table_field(l: &mut LuaInterp, t: crate::gc::TableId, name: &str) -> Option<i64> {
    let key = l.heap.interner.intern_str(name);
    let v = l.heap.table(t).raw_get(&LuaKey::String(key));
    number::to_integer(&v)
}

fn os_time(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    if args.get(1).is_nil() {
        let now = Utc::now().timestamp();
        return Ok(Dispatch::Return(vec![LuaValue::Integer(now)]));
    }
    let t = check_table(l, &args, 1, "time")?;
    let year = table_field(l, t, "year")
        .ok_or_else(|| l.rt_error("field 'year' missing in date table"))?;
    let month = table_field(l, t, "month")
        .ok_or_else(|| l.rt_error("field 'month' missing in date table"))?;
    let day = table_field(l, t, "day")
        .ok_or_else(|| l.rt_error("field 'day' missing in date table"))?;
    let hour = table_field(l, t, "hour").unwrap_or(12);
    let min = table_field(l, t, "min").unwrap_or(0);
    let sec = table_field(l, t, "sec").unwrap_or(0);
    let dt = Local
        .with_ymd_and_hms(
            year as i32,
            month as u32,
            day as u32,
            hour as u32,
            min as u32,
            sec as u32,
        )
        .single()
        .ok_or_else(|| l.rt_error("time result cannot be represented"))?;
    Ok(Dispatch::Return(vec![LuaValue::Integer(dt.timestamp())]))
}

fn os_date(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let format = match args.opt(1) {
        None | Some(LuaValue::Nil) => "%c".to_string(),
        Some(LuaValue::String(s)) => s.to_string_lossy(),
        Some(other) => return Err(bad_arg(l, 1, "date", "string", other)),
    };
    let when = match args.opt(2) {
        Some(v) if !v.is_nil() => number::to_integer(v)
            .ok_or_else(|| bad_arg(l, 2, "date", "number", v))?,
        _ => Utc::now().timestamp(),
    };
    let (utc, format) = match format.strip_prefix('!') {
        Some(rest) => (true, rest.to_string()),
        None => (false, format),
    };
    if let Some(rest) = format.strip_prefix("*t") {
        let _ = rest;
        let t = l.new_table();
        let (year, month, day, hour, min, sec, wday, yday) = if utc {
            let d = Utc.timestamp_opt(when, 0).single().unwrap_or_default();
            (
                d.year(),
                d.month(),
                d.day(),
                d.hour(),
                d.minute(),
                d.second(),
                d.weekday().num_days_from_sunday() + 1,
                d.ordinal(),
            )
        } else {
            let d = Local
                .timestamp_opt(when, 0)
                .single()
                .unwrap_or_else(|| Local.timestamp_opt(0, 0).single().unwrap());
            (
                d.year(),
                d.month(),
                d.day(),
                d.hour(),
                d.minute(),
                d.second(),
                d.weekday().num_days_from_sunday() + 1,
                d.ordinal(),
            )
        };
        let fields: [(&str, i64); 8] = [
            ("year", year as i64),
            ("month", month as i64),
            ("day", day as i64),
            ("hour", hour as i64),
            ("min", min as i64),
            ("sec", sec as i64),
            ("wday", wday as i64),
            ("yday", yday as i64),
        ];
        for (name, value) in fields {
            let key = l.heap.interner.intern_str(name);
            l.heap
                .table_mut(t)
                .raw_set(LuaKey::String(key), LuaValue::Integer(value));
        }
        let key = l.heap.interner.intern_str("isdst");
        l.heap
            .table_mut(t)
            .raw_set(LuaKey::String(key), LuaValue::Boolean(false));
        return Ok(Dispatch::Return(vec![LuaValue::Table(t)]));
    }
    let text = if utc {
        Utc.timestamp_opt(when, 0)
            .single()
            .unwrap_or_default()
            .format(&format)
            .to_string()
    } else {
        Local
            .timestamp_opt(when, 0)
            .single()
            .unwrap_or_else(|| Local.timestamp_opt(0, 0).single().unwrap())
            .format(&format)
            .to_string()
    };
    Ok(Dispatch::Return(vec![l.take_string(text.into_bytes())]))
}

fn os_getenv(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let name = crate::stdlib::check_str(l, &args, 1, "getenv")?;
    let value = name
        .as_str()
        .and_then(|n| std::env::var(n).ok());
    Ok(Dispatch::Return(vec![match value {
        Some(v) => l.take_string(v.into_bytes()),
        None => LuaValue::Nil,
    }]))
}
