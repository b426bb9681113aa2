// Math library
// Implements: abs, ceil, floor, sqrt, sin, cos, tan, asin, acos, atan,
// exp, log, fmod, modf, max, min, random, randomseed, tointeger, type,
// ult, and the constants pi, huge, maxinteger, mininteger

use crate::error::LuaResult;
use crate::eval::native::{Args, Dispatch};
use crate::eval::LuaInterp;
use crate::lib_registry::LibraryModule;
use crate::number;
use crate::stdlib::{bad_arg, check_any, check_int, check_number};
use crate::value::{LuaValue, LuaValueKind};

pub fn create_math_lib() -> LibraryModule {
    crate::lib_module!("math", {
        "abs" => math_abs,
        "ceil" => math_ceil,
        "floor" => math_floor,
        "sqrt" => math_sqrt,
        "sin" => math_sin,
        "cos" => math_cos,
        "tan" => math_tan,
        "asin" => math_asin,
        "acos" => math_acos,
        "atan" => math_atan,
        "exp" => math_exp,
        "log" => math_log,
        "fmod" => math_fmod,
        "modf" => math_modf,
        "max" => math_max,
        "min" => math_min,
        "random" => math_random,
        "randomseed" => math_randomseed,
        "tointeger" => math_tointeger,
        "type" => math_type,
        "ult" => math_ult,
    })
    .with_value("pi", |_| LuaValue::Float(std::f64::consts::PI))
    .with_value("huge", |_| LuaValue::Float(f64::INFINITY))
    .with_value("maxinteger", |_| LuaValue::Integer(i64::MAX))
    .with_value("mininteger", |_| LuaValue::Integer(i64::MIN))
}

fn math_abs(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let v = check_any(l, &args, 1, "abs")?;
    match v {
        LuaValue::Integer(i) => Ok(Dispatch::Return(vec![LuaValue::Integer(
            i.wrapping_abs(),
        )])),
        LuaValue::Float(f) => Ok(Dispatch::Return(vec![LuaValue::Float(f.abs())])),
        other => Err(bad_arg(l, 1, "abs", "number", &other)),
    }
}

/// floor/ceil return integers whenever the result fits.
fn floor_like(
    l: &mut LuaInterp,
    args: Args,
    fname: &str,
    f: fn(f64) -> f64,
) -> LuaResult<Dispatch> {
    let v = check_any(l, &args, 1, fname)?;
    match v {
        LuaValue::Integer(_) => Ok(Dispatch::Return(vec![v])),
        LuaValue::Float(x) => {
            let r = f(x);
            Ok(Dispatch::Return(vec![
                match number::float_to_integer(r) {
                    Some(i) => LuaValue::Integer(i),
                    None => LuaValue::Float(r),
                },
            ]))
        }
        other => Err(bad_arg(l, 1, fname, "number", &other)),
    }
}

fn math_floor(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    floor_like(l, args, "floor", f64::floor)
}

fn math_ceil(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    floor_like(l, args, "ceil", f64::ceil)
}

macro_rules! float_fn {
    ($rust_name:ident, $lua_name:literal, $op:expr) => {
        fn $rust_name(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
            let x = check_number(l, &args, 1, $lua_name)?;
            let f: fn(f64) -> f64 = $op;
            Ok(Dispatch::Return(vec![LuaValue::Float(f(x))]))
        }
    };
}

float_fn!(math_sqrt, "sqrt", f64::sqrt);
float_fn!(math_sin, "sin", f64::sin);
float_fn!(math_cos, "cos", f64::cos);
float_fn!(math_tan, "tan", f64::tan);
float_fn!(math_asin, "asin", f64::asin);
float_fn!(math_acos, "acos", f64::acos);
float_fn!(math_exp, "exp", f64::exp);

fn math_atan(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let y = check_number(l, &args, 1, "atan")?;
    let x = if args.get(2).is_nil() {
        1.0
    } else {
        check_number(l, &args, 2, "atan")?
    };
    Ok(Dispatch::Return(vec![LuaValue::Float(y.atan2(x))]))
}

fn math_log(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let x = check_number(l, &args, 1, "log")?;
    let r = if args.get(2).is_nil() {
        x.ln()
    } else {
        let base = check_number(l, &args, 2, "log")?;
        if base == 2.0 {
            x.log2()
        } else if base == 10.0 {
            x.log10()
        } else {
            x.ln() / base.ln()
        }
    };
    Ok(Dispatch::Return(vec![LuaValue::Float(r)]))
}

/// C-style fmod: the result keeps the sign of the dividend (unlike the
/// `%` operator).
fn math_fmod(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let a = check_any(l, &args, 1, "fmod")?;
    let b = check_any(l, &args, 2, "fmod")?;
    if let (LuaValue::Integer(x), LuaValue::Integer(y)) = (&a, &b) {
        if *y == 0 {
            return Err(l.rt_error("bad argument #2 to 'fmod' (zero)"));
        }
        if *y == -1 {
            return Ok(Dispatch::Return(vec![LuaValue::Integer(0)]));
        }
        return Ok(Dispatch::Return(vec![LuaValue::Integer(
            x.wrapping_rem(*y),
        )]));
    }
    let x = check_number(l, &args, 1, "fmod")?;
    let y = check_number(l, &args, 2, "fmod")?;
    Ok(Dispatch::Return(vec![LuaValue::Float(x % y)]))
}

fn math_modf(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let x = check_number(l, &args, 1, "modf")?;
    let int_part = x.trunc();
    let frac = if x.is_infinite() { 0.0 } else { x - int_part };
    let int_val = match number::float_to_integer(int_part) {
        Some(i) => LuaValue::Integer(i),
        None => LuaValue::Float(int_part),
    };
    Ok(Dispatch::Return(vec![int_val, LuaValue::Float(frac)]))
}

fn minmax(l: &mut LuaInterp, args: Args, fname: &str, want_max: bool) -> LuaResult<Dispatch> {
    if args.is_empty() {
        return Err(l.rt_error(format!(
            "bad argument #1 to '{}' (number expected, got no value)",
            fname
        )));
    }
    let mut best = check_any(l, &args, 1, fname)?;
    if best.as_number().is_none() {
        return Err(bad_arg(l, 1, fname, "number", &best));
    }
    for n in 2..=args.len() {
        let v = args.get(n);
        if v.as_number().is_none() {
            return Err(bad_arg(l, n, fname, "number", &v));
        }
        let beats = if want_max {
            number::num_lt(&best, &v).unwrap_or(false)
        } else {
            number::num_lt(&v, &best).unwrap_or(false)
        };
        if beats {
            best = v;
        }
    }
    Ok(Dispatch::Return(vec![best]))
}

fn math_max(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    minmax(l, args, "max", true)
}

fn math_min(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    minmax(l, args, "min", false)
}

fn math_random(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    match args.len() {
        0 => {
            let r = l.rng.next_float();
            Ok(Dispatch::Return(vec![LuaValue::Float(r)]))
        }
        1 => {
            let m = check_int(l, &args, 1, "random")?;
            if m == 0 {
                // All 64 bits.
                return Ok(Dispatch::Return(vec![LuaValue::Integer(
                    l.rng.next_u64() as i64,
                )]));
            }
            if m < 1 {
                return Err(l.rt_error(
                    "bad argument #1 to 'random' (interval is empty)",
                ));
            }
            let r = l.rng.int_in_range(1, m);
            Ok(Dispatch::Return(vec![LuaValue::Integer(r)]))
        }
        _ => {
            let m = check_int(l, &args, 1, "random")?;
            let n = check_int(l, &args, 2, "random")?;
            if m > n {
                return Err(l.rt_error(
                    "bad argument #2 to 'random' (interval is empty)",
                ));
            }
            let r = l.rng.int_in_range(m, n);
            Ok(Dispatch::Return(vec![LuaValue::Integer(r)]))
        }
    }
}

fn math_randomseed(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let (s1, s2) = if args.is_empty() || args.get(1).is_nil() {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        // Address entropy, like the reference implementation's use of
        // a stack address.
        let addr = std::ptr::from_ref::<LuaInterp>(l) as u64;
        (now, addr)
    } else {
        let s1 = check_int(l, &args, 1, "randomseed")? as u64;
        let s2 = if args.get(2).is_nil() {
            0
        } else {
            check_int(l, &args, 2, "randomseed")? as u64
        };
        (s1, s2)
    };
    l.rng = LuaRng::new(s1, s2);
    Ok(Dispatch::Return(vec![
        LuaValue::Integer(s1 as i64),
        LuaValue::Integer(s2 as i64),
    ]))
}

fn math_tointeger(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let v = check_any(l, &args, 1, "tointeger")?;
    Ok(Dispatch::Return(vec![match number::to_integer(&v) {
        Some(i) => LuaValue::Integer(i),
        None => LuaValue::Nil,
    }]))
}

fn math_type(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let v = check_any(l, &args, 1, "type")?;
    Ok(Dispatch::Return(vec![match v.kind() {
        LuaValueKind::Integer => l.new_string_from("integer"),
        LuaValueKind::Float => l.new_string_from("float"),
        _ => LuaValue::Nil,
    }]))
}

fn math_ult(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let m = check_int(l, &args, 1, "ult")?;
    let n = check_int(l, &args, 2, "ult")?;
    Ok(Dispatch::Return(vec![LuaValue::Boolean(
        (m as u64) < (n as u64),
    )]))
}

// ===== the generator =====

/// xoshiro256** seeded with splitmix64, the same generator the
/// reference implementation uses.
pub struct LuaRng {
    s: [u64; 4],
}

impl LuaRng {
    pub fn new(seed1: u64, seed2: u64) -> Self {
        let mut sm = seed1 ^ 0x9E37_79B9_7F4A_7C15;
        let mut next = || {
            sm = sm.wrapping_add(0x9E37_79B9_7F4A_7C15);
            let mut z = sm;
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            z ^ (z >> 31)
        };
        let mut rng = LuaRng {
            s: [next(), next() ^ seed2, next(), next()],
        };
        // Discard the first few outputs to decorrelate weak seeds.
        for _ in 0..16 {
            rng.next_u64();
        }
        rng
    }

    pub fn next_u64(&mut self) -> u64 {
        let result = self.s[1]
            .wrapping_mul(5)
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.s[1] << 17;
        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];
        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);
        result
    }

    /// A float in `[0, 1)` with 53 random bits.
    pub fn next_float(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Uniform integer in `[lo, hi]`, rejection-sampled to avoid
    /// modulo bias.
    pub fn int_in_range(&mut self, lo: i64, hi: i64) -> i64 {
        let span = (hi as u64).wrapping_sub(lo as u64);
        if span == u64::MAX {
            return self.next_u64() as i64;
        }
        let span = span + 1;
        let limit = u64::MAX - u64::MAX % span;
        loop {
            let r = self.next_u64();
            if r < limit {
                return lo.wrapping_add((r % span) as i64);
            }
        }
    }
}
