//! Centralized metamethod dispatch: one routine per arity class.
//!
//! Primitive rules run first; only when they do not apply is the
//! metatable consulted. Index and newindex chains loop through table
//! handlers with a hop limit, so cyclic `__index` graphs terminate
//! with an error instead of spinning.

use crate::error::{LuaError, LuaResult};
use crate::limits;
use crate::number::{self, NumError};
use crate::syntax::ast::{BinOp, UnOp};
use crate::value::{LuaKey, LuaValue, MetaMethod};

use super::LuaInterp;

/// Outcome of an index resolution: either a value, or a metamethod
/// call the machine must perform.
pub enum IndexOutcome {
    Value(LuaValue),
    Call { func: LuaValue, obj: LuaValue, key: LuaValue },
}

/// Outcome of a newindex resolution.
pub enum NewIndexOutcome {
    Done,
    Call {
        func: LuaValue,
        obj: LuaValue,
        key: LuaValue,
        value: LuaValue,
    },
}

/// Outcome of a binary/unary operator: a direct value, or a metamethod
/// call (optionally with a boolean coercion of the result).
pub enum ArithOutcome {
    Value(LuaValue),
    Call {
        func: LuaValue,
        args: Vec<LuaValue>,
        /// Coerce the call result to a boolean, negated when set to
        /// `Some(true)` (the `~=` / swapped-comparison cases).
        boolify: Option<bool>,
    },
}

impl LuaInterp {
    /// `obj[key]` with full `__index` chasing.
    pub(crate) fn resolve_index(
        &mut self,
        mut obj: LuaValue,
        key: LuaValue,
    ) -> LuaResult<IndexOutcome> {
        for _ in 0..limits::MAX_META_CHAIN {
            if let LuaValue::Table(t) = &obj {
                let raw = self.heap.table(*t).raw_get_value(&key);
                if !raw.is_nil() {
                    return Ok(IndexOutcome::Value(raw));
                }
                let mm = self.get_mm(&obj, MetaMethod::Index);
                if mm.is_nil() {
                    return Ok(IndexOutcome::Value(LuaValue::Nil));
                }
                if matches!(mm, LuaValue::Function(_)) {
                    return Ok(IndexOutcome::Call {
                        func: mm,
                        obj,
                        key,
                    });
                }
                obj = mm;
                continue;
            }
            let mm = self.get_mm(&obj, MetaMethod::Index);
            if mm.is_nil() {
                return Err(self.rt_error(format!(
                    "attempt to index a {} value",
                    obj.type_name()
                )));
            }
            if matches!(mm, LuaValue::Function(_)) {
                return Ok(IndexOutcome::Call {
                    func: mm,
                    obj,
                    key,
                });
            }
            obj = mm;
        }
        Err(self.rt_error("'__index' chain too long; possible loop"))
    }

    /// `obj[key] = value` with full `__newindex` chasing. The handler
    /// fires only when the key is absent under raw access.
    pub(crate) fn resolve_newindex(
        &mut self,
        mut obj: LuaValue,
        key: LuaValue,
        value: LuaValue,
    ) -> LuaResult<NewIndexOutcome> {
        for _ in 0..limits::MAX_META_CHAIN {
            if let LuaValue::Table(t) = &obj {
                let t = *t;
                let has_raw = !self.heap.table(t).raw_get_value(&key).is_nil();
                if has_raw {
                    let k = self.table_key(&key)?;
                    self.heap.table_mut(t).raw_set(k, value);
                    return Ok(NewIndexOutcome::Done);
                }
                let mm = self.get_mm(&obj, MetaMethod::NewIndex);
                if mm.is_nil() {
                    let k = self.table_key(&key)?;
                    self.heap.table_mut(t).raw_set(k, value);
                    return Ok(NewIndexOutcome::Done);
                }
                if matches!(mm, LuaValue::Function(_)) {
                    return Ok(NewIndexOutcome::Call {
                        func: mm,
                        obj,
                        key,
                        value,
                    });
                }
                obj = mm;
                continue;
            }
            let mm = self.get_mm(&obj, MetaMethod::NewIndex);
            if mm.is_nil() {
                return Err(self.rt_error(format!(
                    "attempt to index a {} value",
                    obj.type_name()
                )));
            }
            if matches!(mm, LuaValue::Function(_)) {
                return Ok(NewIndexOutcome::Call {
                    func: mm,
                    obj,
                    key,
                    value,
                });
            }
            obj = mm;
        }
        Err(self.rt_error("'__newindex' chain too long; possible loop"))
    }

    /// Validate a table key, mapping the forbidden kinds to their
    /// conventional messages.
    pub(crate) fn table_key(&mut self, key: &LuaValue) -> LuaResult<LuaKey> {
        LuaKey::from_value(key).map_err(|e| match e {
            crate::value::KeyError::Nil => self.rt_error("table index is nil"),
            crate::value::KeyError::NaN => self.rt_error("table index is NaN"),
        })
    }

    /// Binary operators other than `and`/`or`.
    pub(crate) fn binary_op(
        &mut self,
        op: BinOp,
        a: LuaValue,
        b: LuaValue,
    ) -> LuaResult<ArithOutcome> {
        match op {
            BinOp::Add
            | BinOp::Sub
            | BinOp::Mul
            | BinOp::Div
            | BinOp::IDiv
            | BinOp::Mod
            | BinOp::Pow => self.arith_event(op, a, b),
            BinOp::BAnd | BinOp::BOr | BinOp::BXor | BinOp::Shl | BinOp::Shr => {
                self.bitwise_event(op, a, b)
            }
            BinOp::Concat => self.concat_event(a, b),
            BinOp::Eq => self.equality_event(a, b, false),
            BinOp::Ne => self.equality_event(a, b, true),
            BinOp::Lt => self.order_event(a, b, MetaMethod::Lt, false),
            BinOp::Le => self.order_event(a, b, MetaMethod::Le, false),
            // a > b  ⇔  b < a; a >= b  ⇔  b <= a.
            BinOp::Gt => self.order_event(b, a, MetaMethod::Lt, false),
            BinOp::Ge => self.order_event(b, a, MetaMethod::Le, false),
            BinOp::And | BinOp::Or => unreachable!("short-circuit ops have no event"),
        }
    }

    fn arith_event(&mut self, op: BinOp, a: LuaValue, b: LuaValue) -> LuaResult<ArithOutcome> {
        // Strings that spell numbers coerce in arithmetic context.
        let na = number::to_number(&a);
        let nb = number::to_number(&b);
        if let (Some(x), Some(y)) = (na, nb) {
            let v = self.raw_arith(op, &x, &y)?;
            return Ok(ArithOutcome::Value(v));
        }
        let mm = MetaMethod::for_binop(op).expect("arith op");
        self.binary_meta(mm, a, b, None, |interp, a, b| {
            interp.rt_error(format!(
                "attempt to perform arithmetic on a {} value",
                if number::to_number(a).is_none() {
                    a.type_name()
                } else {
                    b.type_name()
                }
            ))
        })
    }

    /// Arithmetic over two definite numbers.
    pub(crate) fn raw_arith(
        &mut self,
        op: BinOp,
        a: &LuaValue,
        b: &LuaValue,
    ) -> LuaResult<LuaValue> {
        use LuaValue::{Float, Integer};
        let v = match op {
            BinOp::Add => match (a, b) {
                (Integer(x), Integer(y)) => Integer(number::int_add(*x, *y)),
                _ => Float(a.as_number().unwrap() + b.as_number().unwrap()),
            },
            BinOp::Sub => match (a, b) {
                (Integer(x), Integer(y)) => Integer(number::int_sub(*x, *y)),
                _ => Float(a.as_number().unwrap() - b.as_number().unwrap()),
            },
            BinOp::Mul => match (a, b) {
                (Integer(x), Integer(y)) => Integer(number::int_mul(*x, *y)),
                _ => Float(a.as_number().unwrap() * b.as_number().unwrap()),
            },
            // Division and exponentiation always produce floats.
            BinOp::Div => Float(a.as_number().unwrap() / b.as_number().unwrap()),
            BinOp::Pow => Float(a.as_number().unwrap().powf(b.as_number().unwrap())),
            BinOp::IDiv => match (a, b) {
                (Integer(x), Integer(y)) => Integer(
                    number::int_floordiv(*x, *y)
                        .map_err(|e| self.num_error(e))?,
                ),
                _ => Float(number::float_floordiv(
                    a.as_number().unwrap(),
                    b.as_number().unwrap(),
                )),
            },
            BinOp::Mod => match (a, b) {
                (Integer(x), Integer(y)) => {
                    Integer(number::int_mod(*x, *y).map_err(|e| self.num_error(e))?)
                }
                _ => Float(number::float_mod(
                    a.as_number().unwrap(),
                    b.as_number().unwrap(),
                )),
            },
            _ => unreachable!(),
        };
        Ok(v)
    }

    fn bitwise_event(
        &mut self,
        op: BinOp,
        a: LuaValue,
        b: LuaValue,
    ) -> LuaResult<ArithOutcome> {
        match (number::bit_operand(&a), number::bit_operand(&b)) {
            (Ok(x), Ok(y)) => {
                let v = match op {
                    BinOp::BAnd => x & y,
                    BinOp::BOr => x | y,
                    BinOp::BXor => x ^ y,
                    BinOp::Shl => number::int_shl(x, y),
                    BinOp::Shr => number::int_shr(x, y),
                    _ => unreachable!(),
                };
                Ok(ArithOutcome::Value(LuaValue::Integer(v)))
            }
            _ => {
                let mm = MetaMethod::for_binop(op).expect("bitwise op");
                self.binary_meta(mm, a, b, None, |interp, a, b| {
                    let offender = if number::bit_operand(a).is_err() { a } else { b };
                    if matches!(offender, LuaValue::Float(_)) {
                        interp.rt_error("number has no integer representation")
                    } else {
                        interp.rt_error(format!(
                            "attempt to perform bitwise operation on a {} value",
                            offender.type_name()
                        ))
                    }
                })
            }
        }
    }

    fn concat_event(&mut self, a: LuaValue, b: LuaValue) -> LuaResult<ArithOutcome> {
        if concatable(&a) && concatable(&b) {
            let mut bytes = concat_bytes(&a);
            bytes.extend(concat_bytes(&b));
            // Concatenation results are not interned.
            let s = LuaValue::String(self.heap.interner.fresh(bytes));
            return Ok(ArithOutcome::Value(s));
        }
        self.binary_meta(MetaMethod::Concat, a, b, None, |interp, a, b| {
            let offender = if concatable(a) { b } else { a };
            interp.rt_error(format!(
                "attempt to concatenate a {} value",
                offender.type_name()
            ))
        })
    }

    fn equality_event(
        &mut self,
        a: LuaValue,
        b: LuaValue,
        negate: bool,
    ) -> LuaResult<ArithOutcome> {
        if a.raw_equal(&b) {
            return Ok(ArithOutcome::Value(LuaValue::Boolean(!negate)));
        }
        // __eq fires only when both operands are tables or both are
        // full userdata.
        let comparable = matches!(
            (&a, &b),
            (LuaValue::Table(_), LuaValue::Table(_))
                | (LuaValue::Userdata(_), LuaValue::Userdata(_))
        );
        if comparable {
            let mm = {
                let first = self.get_mm(&a, MetaMethod::Eq);
                if first.is_nil() {
                    self.get_mm(&b, MetaMethod::Eq)
                } else {
                    first
                }
            };
            if !mm.is_nil() {
                return Ok(ArithOutcome::Call {
                    func: mm,
                    args: vec![a, b],
                    boolify: Some(negate),
                });
            }
        }
        Ok(ArithOutcome::Value(LuaValue::Boolean(negate)))
    }

    fn order_event(
        &mut self,
        a: LuaValue,
        b: LuaValue,
        mm: MetaMethod,
        negate: bool,
    ) -> LuaResult<ArithOutcome> {
        let primitive = match mm {
            MetaMethod::Lt => number::num_lt(&a, &b),
            MetaMethod::Le => number::num_le(&a, &b),
            _ => unreachable!(),
        };
        if let Some(r) = primitive {
            return Ok(ArithOutcome::Value(LuaValue::Boolean(r != negate)));
        }
        if let (LuaValue::String(x), LuaValue::String(y)) = (&a, &b) {
            let r = match mm {
                MetaMethod::Lt => x < y,
                _ => x <= y,
            };
            return Ok(ArithOutcome::Value(LuaValue::Boolean(r != negate)));
        }
        self.binary_meta(mm, a, b, Some(negate), |interp, a, b| {
            interp.rt_error(format!(
                "attempt to compare {} with {}",
                a.type_name(),
                b.type_name()
            ))
        })
    }

    /// Shared tail: consult the metamethod on either operand, or fail
    /// with the event-specific message.
    fn binary_meta(
        &mut self,
        mm: MetaMethod,
        a: LuaValue,
        b: LuaValue,
        boolify: Option<bool>,
        err: impl FnOnce(&mut Self, &LuaValue, &LuaValue) -> LuaError,
    ) -> LuaResult<ArithOutcome> {
        let handler = {
            let first = self.get_mm(&a, mm);
            if first.is_nil() { self.get_mm(&b, mm) } else { first }
        };
        if handler.is_nil() {
            return Err(err(self, &a, &b));
        }
        Ok(ArithOutcome::Call {
            func: handler,
            args: vec![a, b],
            boolify,
        })
    }

    pub(crate) fn unary_op(&mut self, op: UnOp, a: LuaValue) -> LuaResult<ArithOutcome> {
        match op {
            UnOp::Not => Ok(ArithOutcome::Value(LuaValue::Boolean(!a.is_truthy()))),
            UnOp::Neg => {
                match number::to_number(&a) {
                    Some(LuaValue::Integer(i)) => {
                        return Ok(ArithOutcome::Value(LuaValue::Integer(i.wrapping_neg())));
                    }
                    Some(LuaValue::Float(f)) => {
                        return Ok(ArithOutcome::Value(LuaValue::Float(-f)));
                    }
                    _ => {}
                }
                self.unary_meta(MetaMethod::Unm, a, |interp, a| {
                    interp.rt_error(format!(
                        "attempt to perform arithmetic on a {} value",
                        a.type_name()
                    ))
                })
            }
            UnOp::BNot => match number::bit_operand(&a) {
                Ok(x) => Ok(ArithOutcome::Value(LuaValue::Integer(!x))),
                Err(_) => self.unary_meta(MetaMethod::BNot, a, |interp, a| {
                    if matches!(a, LuaValue::Float(_)) {
                        interp.rt_error("number has no integer representation")
                    } else {
                        interp.rt_error(format!(
                            "attempt to perform bitwise operation on a {} value",
                            a.type_name()
                        ))
                    }
                }),
            },
            UnOp::Len => match &a {
                LuaValue::String(s) => {
                    Ok(ArithOutcome::Value(LuaValue::Integer(s.len() as i64)))
                }
                LuaValue::Table(t) => {
                    let mm = self.get_mm(&a, MetaMethod::Len);
                    if mm.is_nil() {
                        let n = self.heap.table(*t).raw_len();
                        Ok(ArithOutcome::Value(LuaValue::Integer(n)))
                    } else {
                        Ok(ArithOutcome::Call {
                            func: mm,
                            args: vec![a],
                            boolify: None,
                        })
                    }
                }
                _ => self.unary_meta(MetaMethod::Len, a, |interp, a| {
                    interp.rt_error(format!(
                        "attempt to get length of a {} value",
                        a.type_name()
                    ))
                }),
            },
        }
    }

    fn unary_meta(
        &mut self,
        mm: MetaMethod,
        a: LuaValue,
        err: impl FnOnce(&mut Self, &LuaValue) -> LuaError,
    ) -> LuaResult<ArithOutcome> {
        let handler = self.get_mm(&a, mm);
        if handler.is_nil() {
            return Err(err(self, &a));
        }
        // Unary events pass the operand twice, like the reference
        // implementation.
        let b = a.clone();
        Ok(ArithOutcome::Call {
            func: handler,
            args: vec![a, b],
            boolify: None,
        })
    }

    fn num_error(&mut self, e: NumError) -> LuaError {
        match e {
            NumError::DivByZero => self.rt_error("attempt to perform 'n//0'"),
            NumError::NoIntegerRepr => self.rt_error("number has no integer representation"),
        }
    }
}

fn concatable(v: &LuaValue) -> bool {
    matches!(
        v,
        LuaValue::String(_) | LuaValue::Integer(_) | LuaValue::Float(_)
    )
}

fn concat_bytes(v: &LuaValue) -> Vec<u8> {
    match v {
        LuaValue::String(s) => s.as_bytes().to_vec(),
        other => crate::number::number_to_string(other)
            .unwrap_or_default()
            .into_bytes(),
    }
}
