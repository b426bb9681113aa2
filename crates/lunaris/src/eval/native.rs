//! The builtin-function interface.
//!
//! A builtin receives the interpreter and its argument window and
//! returns a `Dispatch` telling the machine how to continue. Returning
//! plain values is the common case; the other variants let a builtin
//! request a control transfer (a protected call, a yield, a resume)
//! that the machine performs on its heap frames, so such builtins never
//! hold native stack across a suspension. That is what "yieldable"
//! means here: a builtin that instead re-enters the evaluator
//! synchronously (via `LuaInterp::call_value`) puts a boundary frame on
//! the stack, and yields cannot cross it.

use crate::error::LuaResult;
use crate::gc::{FunctionId, ThreadId};
use crate::value::LuaValue;

use super::LuaInterp;

pub type NativeFn = fn(&mut LuaInterp, Args) -> LuaResult<Dispatch>;

/// Argument window of a builtin call.
pub struct Args {
    values: Vec<LuaValue>,
    /// The function object being called, when it is a closure with
    /// upvalues (`coroutine.wrap`, `gmatch` iterators).
    pub callee: Option<FunctionId>,
}

impl Args {
    pub fn new(values: Vec<LuaValue>, callee: Option<FunctionId>) -> Self {
        Args { values, callee }
    }

    /// 1-based argument access; missing arguments read as nil.
    pub fn get(&self, n: usize) -> LuaValue {
        if n == 0 || n > self.values.len() {
            LuaValue::Nil
        } else {
            self.values[n - 1].clone()
        }
    }

    pub fn opt(&self, n: usize) -> Option<&LuaValue> {
        if n == 0 || n > self.values.len() {
            None
        } else {
            Some(&self.values[n - 1])
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<LuaValue> {
        self.values
    }

    pub fn values(&self) -> &[LuaValue] {
        &self.values
    }
}

/// What the machine should do after a builtin returns.
pub enum Dispatch {
    /// Ordinary completion.
    Return(Vec<LuaValue>),
    /// Run `func(args…)` inside a new protection frame; the call site
    /// receives `(true, results…)` or `(false, error)`. Yields pass
    /// through freely.
    Protect {
        func: LuaValue,
        args: Vec<LuaValue>,
        handler: Option<LuaValue>,
    },
    /// Suspend the current coroutine, handing the values to its
    /// resumer.
    Yield(Vec<LuaValue>),
    /// Switch to `co`. With `wrap`, results come back raw and errors
    /// propagate instead of becoming `(false, error)`.
    Resume {
        co: ThreadId,
        args: Vec<LuaValue>,
        wrap: bool,
    },
    /// Force a suspended coroutine dead, closing its to-be-closed
    /// variables in its own context.
    CloseCoroutine { co: ThreadId },
}
