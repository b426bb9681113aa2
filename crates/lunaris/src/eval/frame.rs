//! Call frames and continuation ops.
//!
//! The evaluator is an explicit machine: each Lua activation is a heap
//! frame holding a stack of pending `Op`s (the defunctionalized
//! continuation) and a stack of intermediate values. Control structures
//! push ops; calls push frames; coroutines swap whole frame stacks.
//! Because nothing recurses on the native stack, tail calls can replace
//! the current frame and `yield` can suspend mid-expression.

use smol_str::SmolStr;
use std::rc::Rc;

use crate::env::Scope;
use crate::error::LuaError;
use crate::gc::{FunctionId, TableId};
use crate::syntax::ast::{BinOp, BlockId, Chunk, ExprId, ProtoId, StatId, UnOp};
use crate::value::LuaValue;

/// How a caller wants a callee's results adjusted.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RetMode {
    /// Exactly one value (padded with nil).
    One,
    /// Every value, appended as-is.
    All,
}

/// An activation of a Lua closure.
pub struct LuaFrame {
    pub func: FunctionId,
    pub chunk: Rc<Chunk>,
    pub proto: ProtoId,
    /// Innermost scope currently open in this frame.
    pub env: Rc<Scope>,
    /// Pending continuation ops, innermost last.
    pub ops: Vec<Op>,
    /// Intermediate value stack.
    pub vals: Vec<LuaValue>,
    pub varargs: Rc<[LuaValue]>,
    /// Line currently executing, for errors and tracebacks.
    pub line: u32,
    /// How the caller consumes this frame's return values.
    pub ret: RetMode,
}

/// A `pcall`/`xpcall` boundary sitting between two activations.
pub struct ProtectFrame {
    pub handler: Option<LuaValue>,
    pub ret: RetMode,
    /// The message handler is currently running above this frame; its
    /// result becomes the captured error value.
    pub handling: bool,
}

pub enum Frame {
    Lua(LuaFrame),
    Protect(ProtectFrame),
    /// Native code re-entered the machine here; returns and errors stop
    /// at this marker, and yields may not cross it.
    Boundary,
}

/// Loop state for a numeric `for`. Integer loops are counted so the
/// control value never wraps past the limit.
#[derive(Clone, Copy, Debug)]
pub enum NumForState {
    Int { next: i64, step: i64, remaining: u64 },
    Float { next: f64, limit: f64, step: f64 },
}

/// A non-local control transfer in progress. While one is pending the
/// machine pops ops and frames, running scope closers on the way, until
/// something consumes the transfer.
#[derive(Clone)]
pub enum Transfer {
    Error(Box<LuaError>),
    Break,
    Goto(SmolStr),
    Return(Vec<LuaValue>),
    TailCall {
        func: LuaValue,
        args: Vec<LuaValue>,
    },
    /// `coroutine.close` unwinding: runs to-be-closed variables,
    /// bypasses protection frames, records the first close error.
    Closing { err: Option<Box<LuaError>> },
}

/// One continuation step.
pub enum Op {
    // ----- blocks and statements -----
    /// Execute `block.stats[idx..]`.
    Block { block: BlockId, idx: u32 },
    /// Restore `prev` as the frame env on block exit, running `__close`
    /// for this scope's to-be-closed boxes first (computed lazily).
    EnvPop {
        prev: Rc<Scope>,
        closes: Option<Vec<LuaValue>>,
    },
    /// Bind evaluated initializers to fresh locals.
    Local { stat: StatId, base: u32 },
    /// Perform a (possibly multi-target) assignment; `next` is the
    /// index of the next target to store.
    Assign { stat: StatId, base: u32, next: u32 },
    /// Choose an `if` arm once its condition is on the value stack.
    If { stat: StatId, arm: u32 },
    While { stat: StatId },
    Repeat { stat: StatId, base_env: Rc<Scope> },
    NumForPrep { stat: StatId, base: u32 },
    NumForLoop { stat: StatId, state: NumForState },
    GenForPrep { stat: StatId, base: u32 },
    /// Start the next iterator call of a generic `for`.
    GenForCall {
        stat: StatId,
        func: LuaValue,
        state: LuaValue,
        control: LuaValue,
    },
    /// Receive the iterator call's results and run the body or finish.
    GenForLoop {
        stat: StatId,
        func: LuaValue,
        state: LuaValue,
        base: u32,
    },
    /// A to-be-closed value guarding a generic `for`; closed exactly
    /// once on every exit path.
    Tbc { value: LuaValue },
    Return { stat: StatId, base: u32 },
    TailCall { base: u32, line: u32 },
    /// Re-raise a transfer after an interposed `__close` call finished.
    ResumeTransfer { transfer: Transfer },

    // ----- expressions -----
    /// Evaluate an expression; `multi` permits spreading at this site.
    Eval { expr: ExprId, multi: bool },
    Push { value: LuaValue },
    Bin { op: BinOp, line: u32 },
    /// Short-circuit right-hand sides.
    And { rhs: ExprId },
    Or { rhs: ExprId },
    Un { op: UnOp, line: u32 },
    /// Coerce a comparison metamethod result to a boolean.
    BoolResult { negate: bool },
    /// Pop key and object, push `obj[key]`.
    Index { line: u32 },
    /// Method lookup: pop the receiver, push `obj.name` then `obj`.
    SelfLookup { name: SmolStr, line: u32 },
    /// Reorder after an `__index` call resolved a method.
    SelfPush { obj: LuaValue },
    /// Call `vals[base]` with `vals[base+1..]` as arguments.
    Call { base: u32, multi: bool, line: u32 },
    /// Truncate the value stack (discarded results).
    PopTo { base: u32 },
    /// Table constructor steps.
    TableItem { table: TableId, index: i64 },
    TableKeyed { table: TableId, line: u32 },
    TableTail { table: TableId, index: i64, base: u32 },
}

/// Why a suspended thread is waiting, and how to hand it values when it
/// wakes up.
pub struct PendingWake {
    pub ret: RetMode,
    pub kind: PendingKind,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PendingKind {
    /// Suspended at its own `yield` call; resume arguments become that
    /// call's results.
    Yielded,
    /// Suspended because it resumed another coroutine; receives
    /// `(true, …)` / `(false, err)`, or raw values when wrapped.
    Resuming { wrap: bool },
}

/// Coroutine lifecycle states.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CoStatus {
    Suspended,
    Running,
    /// Resumed another coroutine and is waiting for it.
    Normal,
    Dead,
}
