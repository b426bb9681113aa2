// String library
// Implements: len, sub, upper, lower, rep, reverse, byte, char, find,
// match, gmatch, gsub, format, dump
//
// All operations are byte-oriented. The library installs the shared
// string metatable (`__index` = the library table) so `("x"):upper()`
// works.

use crate::error::{LuaError, LuaResult};
use crate::eval::native::{Args, Dispatch};
use crate::eval::LuaInterp;
use crate::gc::{FunctionId, LuaFunction};
use crate::lib_registry::LibraryModule;
use crate::number;
use crate::pattern::{first_match, Capture, PatternMatch};
use crate::stdlib::{bad_arg, check_any, check_int, check_str, opt_int};
use crate::value::{LuaValue, MetaMethod};

pub fn create_string_lib() -> LibraryModule {
    crate::lib_module!("string", {
        "len" => str_len,
        "sub" => str_sub,
        "upper" => str_upper,
        "lower" => str_lower,
        "rep" => str_rep,
        "reverse" => str_reverse,
        "byte" => str_byte,
        "char" => str_char,
        "find" => str_find,
        "match" => str_match,
        "gmatch" => str_gmatch,
        "gsub" => str_gsub,
        "format" => str_format,
        "dump" => str_dump,
    })
    .with_initializer(|l| {
        // Every string shares one metatable whose __index is the
        // library table, enabling method syntax on strings.
        let lib = l.get_global("string");
        let meta = l.new_table();
        let key = l.heap.meta_name(MetaMethod::Index).clone();
        l.heap
            .table_mut(meta)
            .raw_set(crate::value::LuaKey::String(key), lib);
        l.string_meta = Some(meta);
        Ok(())
    })
}

/// Translate a 1-based, possibly negative string position.
fn posrelat(pos: i64, len: usize) -> i64 {
    if pos >= 0 {
        pos
    } else if (-pos) as usize > len {
        0
    } else {
        len as i64 + pos + 1
    }
}

fn str_len(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let s = check_str(l, &args, 1, "len")?;
    Ok(Dispatch::Return(vec![LuaValue::Integer(s.len() as i64)]))
}

fn str_sub(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let s = check_str(l, &args, 1, "sub")?;
    let len = s.len();
    let mut i = posrelat(opt_int(l, &args, 2, "sub", 1)?, len);
    let mut j = posrelat(opt_int(l, &args, 3, "sub", -1)?, len);
    if i < 1 {
        i = 1;
    }
    if j > len as i64 {
        j = len as i64;
    }
    let out = if i > j {
        Vec::new()
    } else {
        s.as_bytes()[(i - 1) as usize..j as usize].to_vec()
    };
    Ok(Dispatch::Return(vec![l.take_string(out)]))
}

fn str_upper(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let s = check_str(l, &args, 1, "upper")?;
    let out = s.as_bytes().to_ascii_uppercase();
    Ok(Dispatch::Return(vec![l.take_string(out)]))
}

fn str_lower(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let s = check_str(l, &args, 1, "lower")?;
    let out = s.as_bytes().to_ascii_lowercase();
    Ok(Dispatch::Return(vec![l.take_string(out)]))
}

fn str_rep(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let s = check_str(l, &args, 1, "rep")?;
    let n = check_int(l, &args, 2, "rep")?;
    let sep = match args.opt(3) {
        Some(v) if !v.is_nil() => Some(check_str(l, &args, 3, "rep")?),
        _ => None,
    };
    let mut out = Vec::new();
    for i in 0..n.max(0) {
        if i > 0
            && let Some(sep) = &sep
        {
            out.extend_from_slice(sep.as_bytes());
        }
        out.extend_from_slice(s.as_bytes());
    }
    Ok(Dispatch::Return(vec![l.take_string(out)]))
}

fn str_reverse(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let s = check_str(l, &args, 1, "reverse")?;
    let mut out = s.as_bytes().to_vec();
    out.reverse();
    Ok(Dispatch::Return(vec![l.take_string(out)]))
}

fn str_byte(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let s = check_str(l, &args, 1, "byte")?;
    let len = s.len();
    let i = posrelat(opt_int(l, &args, 2, "byte", 1)?, len).max(1);
    let j = posrelat(opt_int(l, &args, 3, "byte", i)?, len).min(len as i64);
    let mut out = Vec::new();
    let mut k = i;
    while k <= j {
        out.push(LuaValue::Integer(s.as_bytes()[(k - 1) as usize] as i64));
        k += 1;
    }
    Ok(Dispatch::Return(out))
}

fn str_char(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let mut out = Vec::with_capacity(args.len());
    for n in 1..=args.len() {
        let c = check_int(l, &args, n, "char")?;
        if !(0..=255).contains(&c) {
            return Err(l.rt_error(format!(
                "bad argument #{} to 'char' (value out of range)",
                n
            )));
        }
        out.push(c as u8);
    }
    Ok(Dispatch::Return(vec![l.take_string(out)]))
}

// ===== pattern-matching entry points =====

fn pattern_error(l: &mut LuaInterp, e: String) -> LuaError {
    l.rt_error(e)
}

/// Captures of a match as Lua values; the whole match when there are
/// none.
fn push_captures(l: &mut LuaInterp, src: &[u8], m: &PatternMatch) -> Vec<LuaValue> {
    if m.captures.is_empty() {
        return vec![l.take_string(src[m.start..m.end].to_vec())];
    }
    m.captures
        .iter()
        .map(|c| match c {
            Capture::Str(a, b) => l.take_string(src[*a..*b].to_vec()),
            Capture::Pos(p) => LuaValue::Integer(*p as i64),
        })
        .collect()
}

fn str_find(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let s = check_str(l, &args, 1, "find")?;
    let pat = check_str(l, &args, 2, "find")?;
    let init = posrelat(opt_int(l, &args, 3, "find", 1)?, s.len()).max(1) as usize - 1;
    if init > s.len() {
        return Ok(Dispatch::Return(vec![LuaValue::Nil]));
    }
    let plain = args.get(4).is_truthy();
    if plain {
        let found = find_plain(s.as_bytes(), pat.as_bytes(), init);
        return Ok(Dispatch::Return(match found {
            Some(start) => vec![
                LuaValue::Integer(start as i64 + 1),
                LuaValue::Integer((start + pat.len()) as i64),
            ],
            None => vec![LuaValue::Nil],
        }));
    }
    match first_match(s.as_bytes(), pat.as_bytes(), init)
        .map_err(|e| pattern_error(l, e))?
    {
        Some(m) => {
            let mut out = vec![
                LuaValue::Integer(m.start as i64 + 1),
                LuaValue::Integer(m.end as i64),
            ];
            if !m.captures.is_empty() {
                out.extend(push_captures(l, s.as_bytes(), &m));
            }
            Ok(Dispatch::Return(out))
        }
        None => Ok(Dispatch::Return(vec![LuaValue::Nil])),
    }
}

fn find_plain(hay: &[u8], needle: &[u8], init: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(init);
    }
    hay.get(init..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + init)
}

fn str_match(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let s = check_str(l, &args, 1, "match")?;
    let pat = check_str(l, &args, 2, "match")?;
    let init = posrelat(opt_int(l, &args, 3, "match", 1)?, s.len()).max(1) as usize - 1;
    if init > s.len() {
        return Ok(Dispatch::Return(vec![LuaValue::Nil]));
    }
    match first_match(s.as_bytes(), pat.as_bytes(), init)
        .map_err(|e| pattern_error(l, e))?
    {
        Some(m) => Ok(Dispatch::Return(push_captures(l, s.as_bytes(), &m))),
        None => Ok(Dispatch::Return(vec![LuaValue::Nil])),
    }
}

fn str_gmatch(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let s = check_str(l, &args, 1, "gmatch")?;
    let pat = check_str(l, &args, 2, "gmatch")?;
    let iter = l.new_native_closure(
        "gmatch_iter",
        gmatch_iter,
        vec![
            LuaValue::String(s),
            LuaValue::String(pat),
            LuaValue::Integer(0),
        ],
    );
    Ok(Dispatch::Return(vec![iter]))
}

/// Lazy gmatch iterator; its position lives in an upvalue of the
/// closure being called.
fn gmatch_iter(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let fid: FunctionId = args.callee.expect("gmatch iterator without state");
    let (s, pat, pos) = {
        let LuaFunction::Native(n) = l.heap.function(fid) else {
            unreachable!()
        };
        let s = match &n.upvalues[0] {
            LuaValue::String(s) => s.clone(),
            _ => unreachable!(),
        };
        let pat = match &n.upvalues[1] {
            LuaValue::String(p) => p.clone(),
            _ => unreachable!(),
        };
        let pos = n.upvalues[2].as_integer().unwrap_or(0) as usize;
        (s, pat, pos)
    };
    if pos > s.len() {
        return Ok(Dispatch::Return(vec![LuaValue::Nil]));
    }
    match first_match(s.as_bytes(), pat.as_bytes(), pos)
        .map_err(|e| pattern_error(l, e))?
    {
        Some(m) => {
            // Empty matches advance one byte so iteration terminates.
            let next = if m.end == m.start { m.end + 1 } else { m.end };
            if let LuaFunction::Native(n) = &mut l.heap.functions.get_mut(fid.0).kind {
                n.upvalues[2] = LuaValue::Integer(next as i64);
            }
            Ok(Dispatch::Return(push_captures(l, s.as_bytes(), &m)))
        }
        None => Ok(Dispatch::Return(vec![LuaValue::Nil])),
    }
}

fn str_gsub(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let s = check_str(l, &args, 1, "gsub")?;
    let pat = check_str(l, &args, 2, "gsub")?;
    let repl = check_any(l, &args, 3, "gsub")?;
    match &repl {
        LuaValue::String(_)
        | LuaValue::Integer(_)
        | LuaValue::Float(_)
        | LuaValue::Table(_)
        | LuaValue::Function(_) => {}
        other => {
            return Err(bad_arg(
                l,
                3,
                "gsub",
                "string/function/table",
                other,
            ));
        }
    }
    let max_n = match args.opt(4) {
        Some(v) if !v.is_nil() => check_int(l, &args, 4, "gsub")?,
        _ => i64::MAX,
    };
    let src = s.as_bytes().to_vec();
    let anchored = pat.as_bytes().first() == Some(&b'^');
    let mut out: Vec<u8> = Vec::with_capacity(src.len());
    let mut pos = 0usize;
    let mut count: i64 = 0;
    while count < max_n && pos <= src.len() {
        let m = match first_match(&src, pat.as_bytes(), pos)
            .map_err(|e| pattern_error(l, e))?
        {
            Some(m) => m,
            None => break,
        };
        out.extend_from_slice(&src[pos..m.start]);
        count += 1;
        apply_replacement(l, &src, &m, &repl, &mut out)?;
        if m.end == m.start {
            // Empty match: emit the next byte and move on.
            if m.end < src.len() {
                out.push(src[m.end]);
            }
            pos = m.end + 1;
        } else {
            pos = m.end;
        }
        if anchored {
            break;
        }
    }
    if pos < src.len() {
        out.extend_from_slice(&src[pos..]);
    }
    Ok(Dispatch::Return(vec![
        l.take_string(out),
        LuaValue::Integer(count),
    ]))
}

fn apply_replacement(
    l: &mut LuaInterp,
    src: &[u8],
    m: &PatternMatch,
    repl: &LuaValue,
    out: &mut Vec<u8>,
) -> LuaResult<()> {
    let whole = &src[m.start..m.end];
    match repl {
        LuaValue::String(_) | LuaValue::Integer(_) | LuaValue::Float(_) => {
            let template = match repl {
                LuaValue::String(s) => s.as_bytes().to_vec(),
                other => number::number_to_string(other)
                    .unwrap_or_default()
                    .into_bytes(),
            };
            let mut i = 0;
            while i < template.len() {
                let c = template[i];
                if c == b'%' && i + 1 < template.len() {
                    let d = template[i + 1];
                    i += 2;
                    match d {
                        b'%' => out.push(b'%'),
                        b'0' => out.extend_from_slice(whole),
                        b'1'..=b'9' => {
                            let idx = (d - b'0') as usize;
                            let cap = capture_value(l, src, m, idx)?;
                            match &cap {
                                LuaValue::String(s) => {
                                    out.extend_from_slice(s.as_bytes())
                                }
                                other => out.extend_from_slice(
                                    number::number_to_string(other)
                                        .unwrap_or_default()
                                        .as_bytes(),
                                ),
                            }
                        }
                        _ => {
                            return Err(l.rt_error(
                                "invalid use of '%' in replacement string",
                            ));
                        }
                    }
                } else {
                    out.push(c);
                    i += 1;
                }
            }
            Ok(())
        }
        LuaValue::Table(t) => {
            let key = capture_value(l, src, m, 1)?;
            let v = l.heap.table(*t).raw_get_value(&key);
            emit_result(l, v, whole, out)
        }
        LuaValue::Function(_) => {
            let caps = push_captures(l, src, m);
            let results = l.call_value(repl.clone(), caps)?;
            let v = results.into_iter().next().unwrap_or(LuaValue::Nil);
            emit_result(l, v, whole, out)
        }
        _ => unreachable!(),
    }
}

/// Capture `idx` (1-based); with no captures, index 1 means the whole
/// match.
fn capture_value(
    l: &mut LuaInterp,
    src: &[u8],
    m: &PatternMatch,
    idx: usize,
) -> LuaResult<LuaValue> {
    if m.captures.is_empty() {
        if idx == 1 {
            return Ok(l.take_string(src[m.start..m.end].to_vec()));
        }
        return Err(l.rt_error(format!("invalid capture index %{}", idx)));
    }
    match m.captures.get(idx - 1) {
        Some(Capture::Str(a, b)) => Ok(l.take_string(src[*a..*b].to_vec())),
        Some(Capture::Pos(p)) => Ok(LuaValue::Integer(*p as i64)),
        None => Err(l.rt_error(format!("invalid capture index %{}", idx))),
    }
}

/// A table-lookup or function result becomes the replacement text:
/// nil/false keeps the original match, strings and numbers substitute,
/// anything else is an error.
fn emit_result(
    l: &mut LuaInterp,
    v: LuaValue,
    whole: &[u8],
    out: &mut Vec<u8>,
) -> LuaResult<()> {
    match v {
        LuaValue::Nil | LuaValue::Boolean(false) => {
            out.extend_from_slice(whole);
            Ok(())
        }
        LuaValue::String(s) => {
            out.extend_from_slice(s.as_bytes());
            Ok(())
        }
        other @ (LuaValue::Integer(_) | LuaValue::Float(_)) => {
            out.extend_from_slice(
                number::number_to_string(&other).unwrap_or_default().as_bytes(),
            );
            Ok(())
        }
        other => Err(l.rt_error(format!(
            "invalid replacement value (a {})",
            other.type_name()
        ))),
    }
}

// ===== string.format =====

fn str_format(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let fmt = check_str(l, &args, 1, "format")?;
    let fmt = fmt.as_bytes().to_vec();
    let mut out: Vec<u8> = Vec::with_capacity(fmt.len());
    let mut argn = 1usize;
    let mut i = 0usize;
    while i < fmt.len() {
        if fmt[i] != b'%' {
            out.push(fmt[i]);
            i += 1;
            continue;
        }
        i += 1;
        if fmt.get(i) == Some(&b'%') {
            out.push(b'%');
            i += 1;
            continue;
        }
        // Parse flags, width, precision.
        let spec_start = i;
        while i < fmt.len() && b"-+ #0".contains(&fmt[i]) {
            i += 1;
        }
        while i < fmt.len() && fmt[i].is_ascii_digit() {
            i += 1;
        }
        let mut precision: Option<usize> = None;
        if fmt.get(i) == Some(&b'.') {
            i += 1;
            let pstart = i;
            while i < fmt.len() && fmt[i].is_ascii_digit() {
                i += 1;
            }
            precision = Some(
                std::str::from_utf8(&fmt[pstart..i])
                    .unwrap_or("0")
                    .parse()
                    .unwrap_or(0),
            );
        }
        let spec = std::str::from_utf8(&fmt[spec_start..i])
            .unwrap_or("")
            .to_string();
        let conv = *fmt
            .get(i)
            .ok_or_else(|| l.rt_error("invalid conversion to 'format'"))?;
        i += 1;
        argn += 1;
        let rendered = format_one(l, &args, argn, conv, &spec, precision)?;
        out.extend_from_slice(&rendered);
    }
    Ok(Dispatch::Return(vec![l.take_string(out)]))
}

fn format_one(
    l: &mut LuaInterp,
    args: &Args,
    argn: usize,
    conv: u8,
    spec: &str,
    precision: Option<usize>,
) -> LuaResult<Vec<u8>> {
    let (flags, width) = split_spec(spec);
    let pad = |s: String| -> Vec<u8> {
        let mut s = s;
        if let Some(w) = width {
            if s.len() < w {
                if flags.contains('-') {
                    s.push_str(&" ".repeat(w - s.len()));
                } else if flags.contains('0')
                    && s.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '-')
                {
                    let (sign, rest) = if let Some(stripped) = s.strip_prefix('-') {
                        ("-", stripped.to_string())
                    } else {
                        ("", s.clone())
                    };
                    s = format!("{}{}{}", sign, "0".repeat(w - s.len()), rest);
                } else {
                    s = format!("{}{}", " ".repeat(w - s.len()), s);
                }
            }
        }
        s.into_bytes()
    };
    let text = match conv {
        b'd' | b'i' => {
            let n = check_int(l, args, argn, "format")?;
            let mut buf = itoa::Buffer::new();
            let mut s = buf.format(n).to_string();
            if flags.contains('+') && n >= 0 {
                s.insert(0, '+');
            }
            s
        }
        b'u' => {
            let n = check_int(l, args, argn, "format")?;
            format!("{}", n as u64)
        }
        b'x' => {
            let n = check_int(l, args, argn, "format")?;
            let s = format!("{:x}", n as u64);
            if flags.contains('#') { format!("0x{}", s) } else { s }
        }
        b'X' => {
            let n = check_int(l, args, argn, "format")?;
            let s = format!("{:X}", n as u64);
            if flags.contains('#') { format!("0X{}", s) } else { s }
        }
        b'o' => {
            let n = check_int(l, args, argn, "format")?;
            format!("{:o}", n as u64)
        }
        b'c' => {
            let n = check_int(l, args, argn, "format")?;
            return Ok(vec![n as u8]);
        }
        b'f' | b'F' => {
            let x = crate::stdlib::check_number(l, args, argn, "format")?;
            format!("{:.*}", precision.unwrap_or(6), x)
        }
        b'e' | b'E' => {
            let x = crate::stdlib::check_number(l, args, argn, "format")?;
            let s = format!("{:.*e}", precision.unwrap_or(6), x);
            let s = fix_exponent(&s);
            if conv == b'E' { s.to_uppercase() } else { s }
        }
        b'g' | b'G' => {
            let x = crate::stdlib::check_number(l, args, argn, "format")?;
            let s = number::format_g(x, precision.unwrap_or(6));
            if conv == b'G' { s.to_uppercase() } else { s }
        }
        b'a' | b'A' => {
            let x = crate::stdlib::check_number(l, args, argn, "format")?;
            let s = hex_float(x);
            if conv == b'A' { s.to_uppercase() } else { s }
        }
        b's' => {
            let v = args.get(argn);
            let mut s = l.tostring_value(&v)?.to_string_lossy();
            if let Some(p) = precision {
                s.truncate(p);
            }
            s
        }
        b'q' => {
            let v = args.get(argn);
            return Ok(quote_value(l, &v)?);
        }
        other => {
            return Err(l.rt_error(format!(
                "invalid conversion '%{}' to 'format'",
                other as char
            )));
        }
    };
    Ok(pad(text))
}

fn split_spec(spec: &str) -> (String, Option<usize>) {
    let mut flags = String::new();
    let mut rest = spec.chars().peekable();
    while let Some(&c) = rest.peek() {
        if "-+ #0".contains(c) {
            flags.push(c);
            rest.next();
        } else {
            break;
        }
    }
    let digits: String = rest.collect();
    (flags, digits.parse().ok())
}

/// C's `%e` prints at least two exponent digits.
fn fix_exponent(s: &str) -> String {
    match s.split_once('e') {
        Some((m, e)) => {
            let (sign, digits) = match e.strip_prefix('-') {
                Some(d) => ("-", d),
                None => ("+", e.strip_prefix('+').unwrap_or(e)),
            };
            format!("{}e{}{:0>2}", m, sign, digits)
        }
        None => s.to_string(),
    }
}

/// C's `%a`: hexadecimal float notation.
fn hex_float(x: f64) -> String {
    if x == 0.0 {
        return if x.is_sign_negative() {
            "-0x0p+0".to_string()
        } else {
            "0x0p+0".to_string()
        };
    }
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    let bits = x.to_bits();
    let sign = if bits >> 63 != 0 { "-" } else { "" };
    let raw_exp = ((bits >> 52) & 0x7FF) as i64;
    let mantissa = bits & 0x000F_FFFF_FFFF_FFFF;
    let (lead, exp, mantissa) = if raw_exp == 0 {
        (0, -1022, mantissa)
    } else {
        (1, raw_exp - 1023, mantissa)
    };
    let mut hex = format!("{:013x}", mantissa);
    while hex.ends_with('0') && hex.len() > 1 {
        hex.pop();
    }
    if hex == "0" {
        format!("{}0x{}p{:+}", sign, lead, exp)
    } else {
        format!("{}0x{}.{}p{:+}", sign, lead, hex, exp)
    }
}

/// `%q`: a string Lua can read back.
fn quote_value(l: &mut LuaInterp, v: &LuaValue) -> LuaResult<Vec<u8>> {
    match v {
        LuaValue::String(s) => {
            let mut out = vec![b'"'];
            for &c in s.as_bytes() {
                match c {
                    b'"' => out.extend_from_slice(b"\\\""),
                    b'\\' => out.extend_from_slice(b"\\\\"),
                    b'\n' => out.extend_from_slice(b"\\n"),
                    b'\r' => out.extend_from_slice(b"\\r"),
                    c if c < 32 || c == 127 => {
                        out.extend_from_slice(format!("\\{:03}", c).as_bytes())
                    }
                    c => out.push(c),
                }
            }
            out.push(b'"');
            Ok(out)
        }
        LuaValue::Integer(_) | LuaValue::Float(_) => Ok(number::number_to_string(v)
            .unwrap_or_default()
            .into_bytes()),
        LuaValue::Nil => Ok(b"nil".to_vec()),
        LuaValue::Boolean(b) => Ok(b.to_string().into_bytes()),
        other => Err(l.rt_error(format!(
            "bad argument to 'format' (value has no literal form, got {})",
            other.type_name()
        ))),
    }
}

// ===== string.dump / load =====

/// Dump header. The format is implementation-defined: it records the
/// function's shape and the source text of its body, which `load`
/// recompiles. Round-trips pure-Lua closures with no upvalues beyond
/// the global environment.
const DUMP_MAGIC: &[u8] = b"\x1bLunaris\x01";

fn str_dump(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let v = check_any(l, &args, 1, "dump")?;
    let Some(fid) = v.as_function() else {
        return Err(bad_arg(l, 1, "dump", "function", &v));
    };
    let LuaFunction::Lua(closure) = l.heap.function(fid) else {
        return Err(l.rt_error("unable to dump given function"));
    };
    let chunk = closure.chunk.clone();
    let proto = chunk.proto(closure.proto);
    let mut out = DUMP_MAGIC.to_vec();
    out.push(proto.params.len() as u8);
    out.push(proto.is_vararg as u8);
    for p in &proto.params {
        out.extend_from_slice(&(p.len() as u32).to_le_bytes());
        out.extend_from_slice(p.as_bytes());
    }
    let (a, b) = proto.body_span;
    let body = &chunk.source[a as usize..b as usize];
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body.as_bytes());
    Ok(Dispatch::Return(vec![l.take_string(out)]))
}

/// Compile source text or a dumped closure. Shared by `load`.
pub(crate) fn load_source(
    l: &mut LuaInterp,
    source: &[u8],
    chunk_name: &str,
    env: LuaValue,
) -> LuaResult<FunctionId> {
    if let Some(rest) = source.strip_prefix(DUMP_MAGIC) {
        return load_dumped(l, rest, chunk_name, env);
    }
    let text = std::str::from_utf8(source)
        .map_err(|_| l.rt_error("source chunk is not valid UTF-8"))?;
    l.load_chunk_with_env(text, chunk_name, env)
}

fn load_dumped(
    l: &mut LuaInterp,
    bytes: &[u8],
    chunk_name: &str,
    env: LuaValue,
) -> LuaResult<FunctionId> {
    let err = |l: &mut LuaInterp| l.rt_error("truncated precompiled chunk");
    let mut pos = 0usize;
    let take = |bytes: &[u8], pos: &mut usize, n: usize| -> Option<Vec<u8>> {
        let out = bytes.get(*pos..*pos + n)?.to_vec();
        *pos += n;
        Some(out)
    };
    let nparams = *bytes.first().ok_or_else(|| err(l))? as usize;
    let is_vararg = *bytes.get(1).ok_or_else(|| err(l))? != 0;
    pos = 2;
    let mut params = Vec::with_capacity(nparams);
    for _ in 0..nparams {
        let len_bytes = take(bytes, &mut pos, 4).ok_or_else(|| err(l))?;
        let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
        let name = take(bytes, &mut pos, len).ok_or_else(|| err(l))?;
        params.push(String::from_utf8_lossy(&name).into_owned());
    }
    let len_bytes = take(bytes, &mut pos, 4).ok_or_else(|| err(l))?;
    let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
    let body = take(bytes, &mut pos, len).ok_or_else(|| err(l))?;
    let body = String::from_utf8_lossy(&body);
    // Rebuild an equivalent function literal and compile it.
    let mut params = params;
    if is_vararg {
        params.push("...".to_string());
    }
    let text = format!("return function({})\n{}\nend", params.join(", "), body);
    let loader = l.load_chunk_with_env(&text, chunk_name, env)?;
    let results = l.call_value(LuaValue::Function(loader), Vec::new())?;
    match results.into_iter().next() {
        Some(LuaValue::Function(f)) => Ok(f),
        _ => Err(l.rt_error("corrupted precompiled chunk")),
    }
}
