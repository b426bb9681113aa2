//! The interpreter root and the frame machine.
//!
//! `LuaInterp` is the single mutable root everything hangs off: the
//! object heap (with the collector and string interner), the global
//! table, the coroutine resume chain, and the live frame stack of the
//! currently running coroutine. The machine loop pops one continuation
//! op at a time; non-local control (returns, breaks, gotos, errors,
//! tail calls, coroutine closing) is a pending `Transfer` that the loop
//! unwinds op-by-op and frame-by-frame, running to-be-closed handlers
//! on the way.

pub mod coroutine;
pub mod dispatch;
pub mod exec;
pub mod frame;
pub mod native;

use std::rc::Rc;

use crate::env::{Scope, VarAttrib};
use crate::error::{LuaError, LuaResult, TraceFrame, Traceback};
use crate::gc::{
    FunctionId, GcRef, Heap, LuaClosure, LuaFunction, NativeClosure, TableId, ThreadId,
};
use crate::limits;
use crate::stdlib::math::LuaRng;
use crate::syntax::parser;
use crate::value::{LuaStr, LuaTable, LuaUserdata, LuaValue, MetaMethod};

use frame::{CoStatus, Frame, LuaFrame, Op, ProtectFrame, RetMode, Transfer};
use native::{Args, Dispatch, NativeFn};

/// Tunables for a new interpreter.
pub struct LuaOptions {
    /// Maximum live frames per coroutine before "stack overflow".
    pub max_call_depth: usize,
}

impl Default for LuaOptions {
    fn default() -> Self {
        LuaOptions {
            max_call_depth: limits::MAX_CALL_DEPTH,
        }
    }
}

pub struct LuaInterp {
    pub(crate) heap: Heap,
    pub(crate) globals: TableId,
    pub(crate) main_thread: ThreadId,
    /// LIFO resume chain; the last entry is the running coroutine.
    pub(crate) chain: Vec<ThreadId>,
    /// Live frame stack of the running coroutine.
    pub(crate) frames: Vec<Frame>,
    /// Pending non-local transfer being unwound.
    pub(crate) transfer: Option<Transfer>,
    /// Set when the innermost run finishes (main chunk done, or a
    /// native re-entry boundary popped).
    run_result: Option<LuaResult<Vec<LuaValue>>>,
    /// Host-pinned values: GC roots for the duration of native calls.
    pub(crate) pins: Vec<LuaValue>,
    /// Shared metatable for all strings (the string library points its
    /// `__index` at itself).
    pub(crate) string_meta: Option<TableId>,
    pub(crate) opts: LuaOptions,
    pub(crate) rng: LuaRng,
    pub(crate) start_time: std::time::Instant,
}

impl LuaInterp {
    pub fn new(opts: LuaOptions) -> Self {
        let mut heap = Heap::new();
        let globals = heap.alloc_table(LuaTable::new());
        let main_thread = heap.alloc_thread(None);
        heap.thread_mut(main_thread).status = CoStatus::Running;
        LuaInterp {
            heap,
            globals,
            main_thread,
            chain: vec![main_thread],
            frames: Vec::new(),
            transfer: None,
            run_result: None,
            pins: Vec::new(),
            string_meta: None,
            opts,
            rng: LuaRng::new(0x2545F4914F6CDD1D, 0),
            start_time: std::time::Instant::now(),
        }
    }

    /// Register the standard libraries.
    pub fn open_libs(&mut self) {
        let registry = crate::lib_registry::create_standard_registry();
        registry
            .load_all(self)
            .expect("standard library registration failed");
    }

    // ===== public execution API =====

    /// Parse and run a chunk on the main thread, returning the values
    /// of its top-level `return` (if any).
    pub fn execute(&mut self, source: &str) -> LuaResult<Vec<LuaValue>> {
        self.execute_named(source, "main")
    }

    pub fn execute_named(&mut self, source: &str, name: &str) -> LuaResult<Vec<LuaValue>> {
        let func = self.load_chunk(source, name)?;
        debug_assert!(self.frames.is_empty(), "execute re-entered mid-run");
        self.begin_call(LuaValue::Function(func), Vec::new(), RetMode::All, 0)
            .map_err(|e| {
                self.frames.clear();
                e
            })?;
        let result = self.run_machine();
        self.frames.clear();
        self.transfer = None;
        result
    }

    /// Compile a chunk into a closure bound to the current globals.
    pub fn load_chunk(&mut self, source: &str, name: &str) -> LuaResult<FunctionId> {
        self.load_chunk_with_env(source, name, LuaValue::Table(self.globals))
    }

    pub fn load_chunk_with_env(
        &mut self,
        source: &str,
        name: &str,
        env: LuaValue,
    ) -> LuaResult<FunctionId> {
        let chunk = parser::parse(source, name).map_err(|e| LuaError::Syntax {
            message: format!("{}: {}", name, e.message),
            line: e.line,
        })?;
        let chunk = Rc::new(chunk);
        // `_ENV` is an ordinary local of the chunk's root scope.
        let root = Scope::root();
        let env_box = self.heap.alloc_box(env);
        root.declare(smol_str::SmolStr::new("_ENV"), VarAttrib::Regular, env_box);
        let main = chunk.main;
        Ok(self.heap.alloc_function(LuaFunction::Lua(LuaClosure {
            chunk,
            proto: main,
            env: root,
        })))
    }

    /// Call any Lua value from native code, re-entering the machine
    /// behind a boundary frame. Yields cannot cross this.
    pub fn call_value(
        &mut self,
        func: LuaValue,
        args: Vec<LuaValue>,
    ) -> LuaResult<Vec<LuaValue>> {
        let depth = self.frames.len();
        let pin_base = self.pins.len();
        self.pins.push(func.clone());
        self.pins.extend(args.iter().cloned());
        self.frames.push(Frame::Boundary);
        let line = self.current_line();
        let result = match self.begin_call(func, args, RetMode::All, line) {
            Ok(()) => self.run_machine(),
            Err(e) => {
                // The callee never started; drop the boundary.
                while self.frames.len() > depth {
                    self.frames.pop();
                }
                Err(e)
            }
        };
        self.pins.truncate(pin_base);
        result
    }

    // ===== the machine loop =====

    pub(crate) fn run_machine(&mut self) -> LuaResult<Vec<LuaValue>> {
        loop {
            if let Some(result) = self.run_result.take() {
                return result;
            }
            if self.heap.gc.pending && !self.heap.gc.in_cycle {
                self.auto_collect();
            }
            if self.transfer.is_some() {
                if let Err(e) = self.step_transfer() {
                    self.raise(e);
                }
                continue;
            }
            let op = match self.frames.last_mut() {
                Some(Frame::Lua(f)) => match f.ops.pop() {
                    Some(op) => op,
                    None => {
                        // Fell off the end of the function body.
                        self.transfer = Some(Transfer::Return(Vec::new()));
                        continue;
                    }
                },
                Some(Frame::Protect(_)) | Some(Frame::Boundary) | None => {
                    unreachable!("machine stepped on a non-executable frame")
                }
            };
            if let Err(e) = self.exec_op(op) {
                self.raise(e);
            }
        }
    }

    /// Convert a Rust-side error into a pending unwind.
    pub(crate) fn raise(&mut self, e: LuaError) {
        let e = match e {
            LuaError::Runtime {
                value,
                message,
                traceback,
            } => {
                let traceback = if traceback.frames.is_empty() {
                    self.build_traceback()
                } else {
                    traceback
                };
                LuaError::Runtime {
                    value,
                    message,
                    traceback,
                }
            }
            other => other,
        };
        // An error superseding an in-flight close keeps the close's
        // bookkeeping via the ResumeTransfer merge in unwind_op.
        self.transfer = Some(Transfer::Error(Box::new(e)));
    }

    // ===== transfer processing =====

    fn step_transfer(&mut self) -> LuaResult<()> {
        let t = self.transfer.take().expect("no pending transfer");
        enum TopAction {
            ThreadDone,
            UnwindOp(Op),
            FrameEnd,
            Protect,
            Boundary,
        }
        let action = match self.frames.last_mut() {
            None => TopAction::ThreadDone,
            Some(Frame::Lua(f)) => match f.ops.pop() {
                Some(op) => TopAction::UnwindOp(op),
                None => TopAction::FrameEnd,
            },
            Some(Frame::Protect(_)) => TopAction::Protect,
            Some(Frame::Boundary) => TopAction::Boundary,
        };
        match action {
            TopAction::ThreadDone => self.thread_finished(t),
            TopAction::UnwindOp(op) => self.unwind_op(op, t),
            TopAction::FrameEnd => {
                let frame = match self.frames.pop() {
                    Some(Frame::Lua(f)) => f,
                    _ => unreachable!(),
                };
                self.cross_frame(frame, t)
            }
            TopAction::Protect => {
                let p = match self.frames.pop() {
                    Some(Frame::Protect(p)) => p,
                    _ => unreachable!(),
                };
                match t {
                    Transfer::Error(e) => self.catch_error(p, *e),
                    Transfer::Closing { .. } => {
                        // coroutine.close bypasses protection frames.
                        self.transfer = Some(t);
                        Ok(())
                    }
                    _ => unreachable!("transfer stopped on a protect frame"),
                }
            }
            TopAction::Boundary => {
                self.frames.pop();
                match t {
                    Transfer::Error(e) => {
                        self.run_result = Some(Err(*e));
                        Ok(())
                    }
                    _ => unreachable!("only errors unwind across a boundary"),
                }
            }
        }
    }

    /// Unwind one op under a pending transfer. Loop ops consume breaks,
    /// blocks consume matching gotos, and scope closers interpose
    /// `__close` calls before the transfer continues.
    fn unwind_op(&mut self, op: Op, t: Transfer) -> LuaResult<()> {
        match op {
            Op::EnvPop { prev, closes } => self.unwind_env_pop(prev, closes, Some(t)),
            Op::Tbc { value } => self.unwind_tbc(value, Some(t)),
            Op::Block { block, idx: _ } => {
                if let Transfer::Goto(name) = &t {
                    let pos = {
                        let f = self.cur();
                        f.chunk.block(block).label_position(name)
                    };
                    if let Some(pos) = pos {
                        let f = self.cur();
                        f.ops.push(Op::Block {
                            block,
                            idx: pos as u32,
                        });
                        return Ok(());
                    }
                }
                self.transfer = Some(t);
                Ok(())
            }
            Op::While { .. }
            | Op::Repeat { .. }
            | Op::NumForLoop { .. }
            | Op::GenForCall { .. }
            | Op::GenForLoop { .. } => {
                if matches!(t, Transfer::Break) {
                    // Loop ends; anything beneath (scope pops, tbc
                    // guards) runs normally.
                    Ok(())
                } else {
                    self.transfer = Some(t);
                    Ok(())
                }
            }
            Op::ResumeTransfer { transfer: inner } => {
                self.transfer = Some(merge_transfers(t, inner));
                Ok(())
            }
            _ => {
                self.transfer = Some(t);
                Ok(())
            }
        }
    }

    /// Scope exit: run this scope's `__close` handlers (innermost
    /// declaration last-to-first), then restore the previous env. When
    /// `pending` is set we are unwinding; the transfer resumes after
    /// each handler.
    pub(crate) fn unwind_env_pop(
        &mut self,
        prev: Rc<Scope>,
        closes: Option<Vec<LuaValue>>,
        pending: Option<Transfer>,
    ) -> LuaResult<()> {
        let mut closes = match closes {
            Some(c) => c,
            None => {
                let env = self.cur().env.clone();
                let mut list = Vec::new();
                for cell in env.close_list() {
                    list.push(self.heap.box_value(cell).clone());
                }
                list
            }
        };
        while let Some(value) = closes.pop() {
            if !value.is_truthy() {
                // nil and false close to nothing.
                continue;
            }
            let errval = pending_error_value(&pending);
            let mm = self.get_mm(&value, MetaMethod::Close);
            let f = self.cur();
            f.ops.push(Op::EnvPop {
                prev,
                closes: Some(closes),
            });
            if let Some(t) = pending {
                f.ops.push(Op::ResumeTransfer { transfer: t });
            }
            let base = f.vals.len() as u32;
            f.ops.push(Op::PopTo { base });
            if mm.is_nil() {
                return Err(self.rt_error(format!(
                    "attempt to close non-closable value (a {})",
                    value.type_name()
                )));
            }
            let line = self.current_line();
            return self.begin_call(mm, vec![value, errval], RetMode::All, line);
        }
        let f = self.cur();
        f.env = prev;
        if let Some(t) = pending {
            self.transfer = Some(t);
        }
        Ok(())
    }

    /// A generic-for's to-be-closed guard; closes exactly once.
    pub(crate) fn unwind_tbc(
        &mut self,
        value: LuaValue,
        pending: Option<Transfer>,
    ) -> LuaResult<()> {
        if !value.is_truthy() {
            if let Some(t) = pending {
                self.transfer = Some(t);
            }
            return Ok(());
        }
        let errval = pending_error_value(&pending);
        let mm = self.get_mm(&value, MetaMethod::Close);
        if mm.is_nil() {
            if let Some(t) = pending {
                self.transfer = Some(t);
            }
            return Err(self.rt_error(format!(
                "attempt to close non-closable value (a {})",
                value.type_name()
            )));
        }
        let f = self.cur();
        if let Some(t) = pending {
            f.ops.push(Op::ResumeTransfer { transfer: t });
        }
        let base = f.vals.len() as u32;
        f.ops.push(Op::PopTo { base });
        let line = self.current_line();
        self.begin_call(mm, vec![value, errval], RetMode::All, line)
    }

    /// The transfer reached the bottom of a frame.
    fn cross_frame(&mut self, frame: LuaFrame, t: Transfer) -> LuaResult<()> {
        match t {
            Transfer::Return(vals) => self.deliver_return(vals, frame.ret),
            Transfer::TailCall { func, args } => {
                self.tail_invoke(func, args, frame.ret, frame.line)
            }
            Transfer::Error(_) | Transfer::Closing { .. } => {
                self.transfer = Some(t);
                Ok(())
            }
            Transfer::Break | Transfer::Goto(_) => {
                unreachable!("break/goto cannot leave a function")
            }
        }
    }

    /// Hand return values down the stack: through protect frames
    /// (wrapping in `true`/`false`), into the receiving Lua frame, out
    /// of a native boundary, or to a finished thread.
    pub(crate) fn deliver_return(
        &mut self,
        mut vals: Vec<LuaValue>,
        mut ret: RetMode,
    ) -> LuaResult<()> {
        loop {
            match self.frames.last_mut() {
                Some(Frame::Lua(f)) => {
                    adjust_values(&mut vals, ret);
                    f.vals.extend(vals);
                    return Ok(());
                }
                Some(Frame::Protect(_)) => {
                    let p = match self.frames.pop() {
                        Some(Frame::Protect(p)) => p,
                        _ => unreachable!(),
                    };
                    if p.handling {
                        // Handler result becomes the captured error.
                        let handled = vals.into_iter().next().unwrap_or(LuaValue::Nil);
                        vals = vec![LuaValue::Boolean(false), handled];
                    } else {
                        vals.insert(0, LuaValue::Boolean(true));
                    }
                    ret = p.ret;
                }
                Some(Frame::Boundary) => {
                    self.frames.pop();
                    self.run_result = Some(Ok(vals));
                    return Ok(());
                }
                None => return self.thread_finished(Transfer::Return(vals)),
            }
        }
    }

    /// An error reached a protection frame.
    fn catch_error(&mut self, p: ProtectFrame, e: LuaError) -> LuaResult<()> {
        if p.handling {
            // Error inside the message handler; capture it raw.
            return self.deliver_return(
                vec![LuaValue::Boolean(false), e.value()],
                p.ret,
            );
        }
        if let Some(handler) = p.handler {
            // Run the handler above a re-armed protect frame; its
            // result becomes the captured error value.
            self.frames.push(Frame::Protect(ProtectFrame {
                handler: None,
                ret: p.ret,
                handling: true,
            }));
            let line = self.current_line();
            return self.begin_call(handler, vec![e.value()], RetMode::One, line);
        }
        self.deliver_return(vec![LuaValue::Boolean(false), e.value()], p.ret)
    }

    /// The current thread ran out of frames.
    fn thread_finished(&mut self, t: Transfer) -> LuaResult<()> {
        let tid = self.current_thread();
        if tid == self.main_thread {
            match t {
                Transfer::Return(vals) => self.run_result = Some(Ok(vals)),
                Transfer::Error(e) => self.run_result = Some(Err(*e)),
                _ => unreachable!("invalid transfer at main-chunk bottom"),
            }
            return Ok(());
        }
        // A coroutine terminated; hand control back to its resumer.
        self.heap.thread_mut(tid).status = CoStatus::Dead;
        self.heap.thread_mut(tid).pending = None;
        self.chain.pop();
        let prev = *self.chain.last().expect("resume chain underflow");
        self.heap.thread_mut(prev).status = CoStatus::Running;
        let prev_frames = std::mem::take(&mut self.heap.thread_mut(prev).frames);
        self.frames = prev_frames;
        let wake = self
            .heap
            .thread_mut(prev)
            .pending
            .take()
            .expect("resumer without a pending wake");
        let wrap = match wake.kind {
            frame::PendingKind::Resuming { wrap } => wrap,
            frame::PendingKind::Yielded => {
                unreachable!("yielded thread cannot be a resumer")
            }
        };
        match t {
            Transfer::Return(mut vals) => {
                if !wrap {
                    vals.insert(0, LuaValue::Boolean(true));
                }
                self.deliver_return(vals, wake.ret)
            }
            Transfer::Error(e) => {
                if wrap {
                    self.transfer = Some(Transfer::Error(e));
                    Ok(())
                } else {
                    self.deliver_return(
                        vec![LuaValue::Boolean(false), e.value()],
                        wake.ret,
                    )
                }
            }
            Transfer::Closing { err } => match err {
                None => self.deliver_return(vec![LuaValue::Boolean(true)], wake.ret),
                Some(e) => self.deliver_return(
                    vec![LuaValue::Boolean(false), e.value()],
                    wake.ret,
                ),
            },
            _ => unreachable!("invalid transfer at coroutine bottom"),
        }
    }

    // ===== calls =====

    /// Start a call: resolve `__call` chains, then either push a Lua
    /// frame or run a builtin and deliver its outcome.
    pub(crate) fn begin_call(
        &mut self,
        mut func: LuaValue,
        mut args: Vec<LuaValue>,
        ret: RetMode,
        line: u32,
    ) -> LuaResult<()> {
        let mut hops = 0;
        let fid = loop {
            if let LuaValue::Function(fid) = func {
                break fid;
            }
            let mm = self.get_mm(&func, MetaMethod::Call);
            if mm.is_nil() {
                return Err(self.rt_error(format!(
                    "attempt to call a {} value",
                    func.type_name()
                )));
            }
            args.insert(0, func);
            func = mm;
            hops += 1;
            if hops > limits::MAX_CALL_CHAIN {
                return Err(self.rt_error("'__call' chain too long"));
            }
        };
        if self.frames.len() >= self.opts.max_call_depth {
            return Err(self.rt_error("stack overflow"));
        }
        match self.heap.function(fid) {
            LuaFunction::Lua(closure) => {
                let chunk = closure.chunk.clone();
                let proto_id = closure.proto;
                let outer = closure.env.clone();
                let proto = chunk.proto(proto_id);
                let nparams = proto.params.len();
                let is_vararg = proto.is_vararg;
                let body = proto.body;
                let proto_line = proto.line;
                let env = Scope::child(&outer);
                for (i, name) in chunk.proto(proto_id).params.iter().enumerate() {
                    let v = args.get(i).cloned().unwrap_or(LuaValue::Nil);
                    let cell = self.heap.alloc_box(v);
                    env.declare(name.clone(), VarAttrib::Regular, cell);
                }
                let varargs: Rc<[LuaValue]> = if is_vararg && args.len() > nparams {
                    args.split_off(nparams).into()
                } else {
                    Rc::from([])
                };
                self.frames.push(Frame::Lua(LuaFrame {
                    func: fid,
                    chunk,
                    proto: proto_id,
                    env,
                    // The scope pop closes any to-be-closed locals of
                    // the function body on every exit path, including
                    // tail calls.
                    ops: vec![
                        Op::EnvPop {
                            prev: outer,
                            closes: None,
                        },
                        Op::Block { block: body, idx: 0 },
                    ],
                    vals: Vec::new(),
                    varargs,
                    line: proto_line,
                    ret,
                }));
                Ok(())
            }
            LuaFunction::Native(native) => {
                let f = native.func;
                let has_upvalues = !native.upvalues.is_empty();
                let pin_base = self.pins.len();
                self.pins.push(LuaValue::Function(fid));
                self.pins.extend(args.iter().cloned());
                let dispatch = f(
                    self,
                    Args::new(args, if has_upvalues { Some(fid) } else { None }),
                );
                self.pins.truncate(pin_base);
                self.handle_dispatch(dispatch?, ret, line)
            }
        }
    }

    /// Tail call: the caller's frame is already gone; the callee
    /// inherits its result mode.
    fn tail_invoke(
        &mut self,
        func: LuaValue,
        args: Vec<LuaValue>,
        ret: RetMode,
        line: u32,
    ) -> LuaResult<()> {
        self.begin_call(func, args, ret, line)
    }

    fn handle_dispatch(
        &mut self,
        d: Dispatch,
        ret: RetMode,
        line: u32,
    ) -> LuaResult<()> {
        match d {
            Dispatch::Return(vals) => self.deliver_return(vals, ret),
            Dispatch::Protect {
                func,
                args,
                handler,
            } => {
                self.frames.push(Frame::Protect(ProtectFrame {
                    handler,
                    ret,
                    handling: false,
                }));
                self.begin_call(func, args, RetMode::All, line)
            }
            Dispatch::Yield(vals) => self.do_yield(vals, ret),
            Dispatch::Resume { co, args, wrap } => self.do_resume(co, args, wrap, ret),
            Dispatch::CloseCoroutine { co } => self.do_close(co, ret),
        }
    }

    // ===== frame helpers =====

    #[inline]
    pub(crate) fn cur(&mut self) -> &mut LuaFrame {
        match self.frames.last_mut() {
            Some(Frame::Lua(f)) => f,
            _ => unreachable!("no active Lua frame"),
        }
    }

    pub(crate) fn push_val(&mut self, v: LuaValue) {
        self.cur().vals.push(v);
    }

    pub(crate) fn pop_val(&mut self) -> LuaValue {
        self.cur().vals.pop().expect("value stack underflow")
    }

    pub(crate) fn current_thread(&self) -> ThreadId {
        *self.chain.last().expect("empty resume chain")
    }

    pub(crate) fn current_line(&self) -> u32 {
        for frame in self.frames.iter().rev() {
            if let Frame::Lua(f) = frame {
                return f.line;
            }
        }
        0
    }

    // ===== errors =====

    /// Build a runtime error with the conventional `source:line:`
    /// prefix from the current frame.
    pub(crate) fn rt_error(&mut self, msg: impl Into<String>) -> LuaError {
        let msg = msg.into();
        let located = match self.frames.iter().rev().find_map(|f| match f {
            Frame::Lua(f) => Some((f.chunk.name.clone(), f.line)),
            _ => None,
        }) {
            Some((source, line)) => format!("{}:{}: {}", source, line, msg),
            None => msg,
        };
        let value = LuaValue::String(self.heap.interner.take(located.clone().into_bytes()));
        LuaError::Runtime {
            value,
            message: located,
            traceback: self.build_traceback(),
        }
    }

    /// A raw error value (from `error(v)`), annotated only when it is a
    /// string and `level > 0`.
    pub(crate) fn raise_value(&mut self, value: LuaValue, level: i64) -> LuaError {
        let value = if level > 0
            && let LuaValue::String(s) = &value
        {
            let lua_frames: Vec<(String, u32)> = self
                .frames
                .iter()
                .rev()
                .filter_map(|f| match f {
                    Frame::Lua(f) => Some((f.chunk.name.clone(), f.line)),
                    _ => None,
                })
                .collect();
            match lua_frames.get((level - 1) as usize) {
                Some((source, line)) => {
                    let annotated =
                        format!("{}:{}: {}", source, line, s.to_string_lossy());
                    LuaValue::String(self.heap.interner.take(annotated.into_bytes()))
                }
                None => value.clone(),
            }
        } else {
            value
        };
        let message = self.describe_error_value(&value);
        LuaError::Runtime {
            value,
            message,
            traceback: self.build_traceback(),
        }
    }

    pub(crate) fn describe_error_value(&self, value: &LuaValue) -> String {
        match value {
            LuaValue::String(s) => s.to_string_lossy(),
            LuaValue::Nil => "nil".to_string(),
            LuaValue::Boolean(b) => b.to_string(),
            LuaValue::Integer(_) | LuaValue::Float(_) => crate::number::number_to_string(value)
                .unwrap_or_default(),
            other => format!("(error object is a {} value)", other.type_name()),
        }
    }

    pub(crate) fn build_traceback(&self) -> Traceback {
        let mut frames = Vec::new();
        for frame in self.frames.iter().rev() {
            match frame {
                Frame::Lua(f) => {
                    let proto = f.chunk.proto(f.proto);
                    let what = if proto.name == "main chunk" {
                        "main chunk".to_string()
                    } else if proto.name == "?" {
                        format!("function <{}:{}>", f.chunk.name, proto.line)
                    } else {
                        format!("function '{}'", proto.name)
                    };
                    frames.push(TraceFrame {
                        source: f.chunk.name.clone(),
                        line: f.line,
                        what,
                    });
                }
                Frame::Boundary => frames.push(TraceFrame {
                    source: "[C]".to_string(),
                    line: 0,
                    what: "?".to_string(),
                }),
                Frame::Protect(_) => {}
            }
        }
        Traceback { frames }
    }

    // ===== metamethods =====

    /// Metatable of a value, including the shared string metatable.
    pub(crate) fn metatable_for(&self, v: &LuaValue) -> Option<TableId> {
        match v {
            LuaValue::String(_) => self.string_meta,
            other => self.heap.metatable_of(other),
        }
    }

    pub(crate) fn get_mm(&self, v: &LuaValue, mm: MetaMethod) -> LuaValue {
        match self.metatable_for(v) {
            Some(meta) => self.heap.get_metamethod_of_table(meta, mm),
            None => LuaValue::Nil,
        }
    }

    // ===== allocation wrappers =====

    pub fn new_string(&mut self, bytes: &[u8]) -> LuaValue {
        LuaValue::String(self.heap.interner.intern(bytes))
    }

    pub fn new_string_from(&mut self, s: &str) -> LuaValue {
        LuaValue::String(self.heap.interner.intern_str(s))
    }

    pub fn take_string(&mut self, bytes: Vec<u8>) -> LuaValue {
        LuaValue::String(self.heap.interner.take(bytes))
    }

    pub fn new_table(&mut self) -> TableId {
        self.heap.alloc_table(LuaTable::new())
    }

    pub fn new_native_function(&mut self, name: &'static str, func: NativeFn) -> LuaValue {
        LuaValue::Function(self.heap.alloc_function(LuaFunction::Native(
            NativeClosure {
                name,
                func,
                upvalues: Vec::new(),
            },
        )))
    }

    pub fn new_native_closure(
        &mut self,
        name: &'static str,
        func: NativeFn,
        upvalues: Vec<LuaValue>,
    ) -> LuaValue {
        LuaValue::Function(self.heap.alloc_function(LuaFunction::Native(
            NativeClosure {
                name,
                func,
                upvalues,
            },
        )))
    }

    pub fn new_coroutine(&mut self, body: LuaValue) -> ThreadId {
        self.heap.alloc_thread(Some(body))
    }

    pub fn new_userdata(&mut self, data: LuaUserdata) -> LuaValue {
        LuaValue::Userdata(self.heap.alloc_userdata(data))
    }

    // ===== garbage collection driving =====

    fn gc_roots(&self) -> Vec<LuaValue> {
        let mut roots = Vec::with_capacity(8 + self.pins.len() + self.chain.len());
        roots.push(LuaValue::Table(self.globals));
        roots.push(LuaValue::Thread(self.main_thread));
        if let Some(meta) = self.string_meta {
            roots.push(LuaValue::Table(meta));
        }
        roots.extend(self.chain.iter().map(|t| LuaValue::Thread(*t)));
        roots.extend(self.pins.iter().cloned());
        // A transfer being unwound owns values too (return lists, the
        // error object, a tail callee).
        match &self.transfer {
            Some(Transfer::Error(e)) => roots.push(e.value()),
            Some(Transfer::Return(vals)) => roots.extend(vals.iter().cloned()),
            Some(Transfer::TailCall { func, args }) => {
                roots.push(func.clone());
                roots.extend(args.iter().cloned());
            }
            Some(Transfer::Closing { err: Some(e) }) => roots.push(e.value()),
            _ => {}
        }
        roots
    }

    fn auto_collect(&mut self) {
        let major = self.heap.gc.bytes
            > self
                .heap
                .gc
                .major_base
                .saturating_mul(2)
                .max(limits::GC_INITIAL_THRESHOLD);
        self.collect_garbage(major);
    }

    /// Run one collection cycle and any finalizers it queued.
    pub fn collect_garbage(&mut self, major: bool) {
        if self.heap.gc.in_cycle {
            return;
        }
        self.heap.gc.in_cycle = true;
        let roots = self.gc_roots();
        let outcome = self.heap.collect(major, &roots, &self.frames);
        for r in outcome.finalize_queue.into_iter().rev() {
            self.run_finalizer(r);
        }
        self.heap.gc.in_cycle = false;
        self.heap.gc.pending = false;
    }

    fn run_finalizer(&mut self, r: GcRef) {
        let value = match r {
            GcRef::Table(id) => LuaValue::Table(id),
            GcRef::Userdata(id) => LuaValue::Userdata(id),
            GcRef::Function(id) => LuaValue::Function(id),
            GcRef::Thread(id) => LuaValue::Thread(id),
            GcRef::Box(_) => return,
        };
        // Host destructor first, if any.
        if let GcRef::Userdata(id) = r {
            let fin = self.heap.userdata.get_mut(id.0).data.finalizer.take();
            if let Some(fin) = fin {
                fin(self.heap.userdata.get_mut(id.0).data.data.as_mut());
            }
        }
        let mm = self.get_mm(&value, MetaMethod::Gc);
        if mm.is_nil() {
            return;
        }
        if let Err(e) = self.call_value(mm, vec![value]) {
            // Finalizer errors are reported and dropped.
            eprintln!("lua: error in __gc metamethod ({})", e.message());
        }
    }

    // ===== host bridge =====

    pub fn set_global(&mut self, name: &str, value: LuaValue) {
        let key = self.heap.interner.intern_str(name);
        self.heap
            .table_mut(self.globals)
            .raw_set(crate::value::LuaKey::String(key), value);
    }

    pub fn get_global(&mut self, name: &str) -> LuaValue {
        let key = self.heap.interner.intern_str(name);
        self.heap
            .table(self.globals)
            .raw_get(&crate::value::LuaKey::String(key))
    }

    /// Register a host callable as a global function.
    pub fn register_function(&mut self, name: &'static str, func: NativeFn) {
        let f = self.new_native_function(name, func);
        self.set_global(name, f);
    }

    /// Invoke a global function by name with host-supplied arguments.
    pub fn call_function(
        &mut self,
        name: &str,
        args: Vec<LuaValue>,
    ) -> LuaResult<Vec<LuaValue>> {
        let func = self.get_global(name);
        self.call_value(func, args)
    }

    /// Keep a value alive across native work; returns a token for
    /// `unpin`.
    pub fn pin(&mut self, value: LuaValue) -> usize {
        self.pins.push(value);
        self.pins.len() - 1
    }

    pub fn unpin(&mut self, token: usize) {
        self.pins.truncate(token);
    }

    /// Populate the `arg` table: `0` is the script (or interpreter)
    /// name, `1..n` the positional arguments, `-1` the interpreter
    /// name when a script is present.
    pub fn set_arg_vector(&mut self, interp_name: &str, script: Option<&str>, args: &[&str]) {
        let t = self.new_table();
        match script {
            Some(script) => {
                let v = self.new_string_from(interp_name);
                self.heap.table_mut(t).raw_set_int(-1, v);
                let v = self.new_string_from(script);
                self.heap.table_mut(t).raw_set_int(0, v);
            }
            None => {
                let v = self.new_string_from(interp_name);
                self.heap.table_mut(t).raw_set_int(0, v);
            }
        }
        for (i, a) in args.iter().enumerate() {
            let v = self.new_string_from(a);
            self.heap.table_mut(t).raw_set_int(i as i64 + 1, v);
        }
        self.set_global("arg", LuaValue::Table(t));
    }

    /// Meta-aware `obj[key]` from native code (re-enters the machine
    /// for `__index` functions).
    pub fn index_value(&mut self, obj: LuaValue, key: LuaValue) -> LuaResult<LuaValue> {
        match self.resolve_index(obj, key)? {
            dispatch::IndexOutcome::Value(v) => Ok(v),
            dispatch::IndexOutcome::Call { func, obj, key } => {
                let results = self.call_value(func, vec![obj, key])?;
                Ok(results.into_iter().next().unwrap_or(LuaValue::Nil))
            }
        }
    }

    /// Meta-aware `obj[key] = value` from native code.
    pub fn setindex_value(
        &mut self,
        obj: LuaValue,
        key: LuaValue,
        value: LuaValue,
    ) -> LuaResult<()> {
        match self.resolve_newindex(obj, key, value)? {
            dispatch::NewIndexOutcome::Done => Ok(()),
            dispatch::NewIndexOutcome::Call {
                func,
                obj,
                key,
                value,
            } => {
                self.call_value(func, vec![obj, key, value])?;
                Ok(())
            }
        }
    }

    /// Meta-aware `a < b` from native code (`table.sort`'s default
    /// order).
    pub fn less_than(&mut self, a: LuaValue, b: LuaValue) -> LuaResult<bool> {
        use crate::syntax::ast::BinOp;
        match self.binary_op(BinOp::Lt, a, b)? {
            dispatch::ArithOutcome::Value(v) => Ok(v.is_truthy()),
            dispatch::ArithOutcome::Call { func, args, .. } => {
                let results = self.call_value(func, args)?;
                Ok(results
                    .into_iter()
                    .next()
                    .unwrap_or(LuaValue::Nil)
                    .is_truthy())
            }
        }
    }

    // ===== display =====

    /// `tostring` semantics, including `__tostring` and `__name`.
    pub fn tostring_value(&mut self, v: &LuaValue) -> LuaResult<LuaStr> {
        let mm = self.get_mm(v, MetaMethod::ToString);
        if !mm.is_nil() {
            let results = self.call_value(mm, vec![v.clone()])?;
            return match results.into_iter().next() {
                Some(LuaValue::String(s)) => Ok(s),
                Some(other) => match crate::number::number_to_string(&other) {
                    Some(s) => Ok(self.heap.interner.take(s.into_bytes())),
                    None => Err(self.rt_error("'__tostring' must return a string")),
                },
                None => Err(self.rt_error("'__tostring' must return a string")),
            };
        }
        let text = match v {
            LuaValue::Nil => "nil".to_string(),
            LuaValue::Boolean(b) => b.to_string(),
            LuaValue::Integer(_) | LuaValue::Float(_) => {
                crate::number::number_to_string(v).unwrap_or_default()
            }
            LuaValue::String(s) => return Ok(s.clone()),
            LuaValue::Table(id) => {
                let name = match self.get_mm(v, MetaMethod::Name) {
                    LuaValue::String(s) => s.to_string_lossy(),
                    _ => "table".to_string(),
                };
                format!("{}: 0x{:08x}", name, id.0)
            }
            LuaValue::Function(id) => format!("function: 0x{:08x}", id.0),
            LuaValue::Thread(id) => format!("thread: 0x{:08x}", id.0),
            LuaValue::Userdata(id) => {
                let name = match self.get_mm(v, MetaMethod::Name) {
                    LuaValue::String(s) => s.to_string_lossy(),
                    _ => "userdata".to_string(),
                };
                format!("{}: 0x{:08x}", name, id.0)
            }
        };
        Ok(self.heap.interner.take(text.into_bytes()))
    }
}

impl Default for LuaInterp {
    fn default() -> Self {
        let mut interp = LuaInterp::new(LuaOptions::default());
        interp.open_libs();
        interp
    }
}

// ===== small helpers =====

pub(crate) fn adjust_values(vals: &mut Vec<LuaValue>, ret: RetMode) {
    if ret == RetMode::One {
        vals.resize(1, LuaValue::Nil);
    }
}

fn pending_error_value(pending: &Option<Transfer>) -> LuaValue {
    match pending {
        Some(Transfer::Error(e)) => e.value(),
        Some(Transfer::Closing { err: Some(e) }) => e.value(),
        _ => LuaValue::Nil,
    }
}

fn merge_transfers(current: Transfer, interposed: Transfer) -> Transfer {
    match (current, interposed) {
        // An error raised by a __close handler while a coroutine close
        // was unwinding: the close keeps going and records the first
        // error.
        (Transfer::Error(e), Transfer::Closing { err }) => Transfer::Closing {
            err: Some(err.unwrap_or(e)),
        },
        (Transfer::Closing { err: a }, Transfer::Closing { err: b }) => Transfer::Closing {
            err: b.or(a),
        },
        // Otherwise the newest transfer wins; a fresh error supersedes
        // whatever was being unwound.
        (current, _) => current,
    }
}
