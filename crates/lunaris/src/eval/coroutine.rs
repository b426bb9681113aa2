//! Coroutine switching.
//!
//! At most one coroutine runs at a time; the interpreter keeps a LIFO
//! resume chain with the main thread at the bottom. A switch swaps the
//! live frame stack with the target thread's saved one and records how
//! the suspended side wants values delivered when it wakes. Because
//! protection (`pcall`) is a frame, not a native boundary, yields pass
//! through protected calls; only native re-entries block them.

use crate::error::LuaResult;
use crate::gc::ThreadId;
use crate::value::LuaValue;

use super::frame::{CoStatus, Frame, PendingKind, PendingWake, RetMode, Transfer};
use super::LuaInterp;

impl LuaInterp {
    /// `coroutine.yield(...)` from a builtin dispatch: suspend the
    /// running coroutine and hand `vals` to its resumer.
    pub(crate) fn do_yield(&mut self, vals: Vec<LuaValue>, ret: RetMode) -> LuaResult<()> {
        let tid = self.current_thread();
        if tid == self.main_thread {
            return Err(self.rt_error("attempt to yield from outside a coroutine"));
        }
        if self.frames.iter().any(|f| matches!(f, Frame::Boundary)) {
            return Err(self.rt_error("attempt to yield across a C-call boundary"));
        }
        // Park the current thread at its yield site.
        let frames = std::mem::take(&mut self.frames);
        {
            let t = self.heap.thread_mut(tid);
            t.status = CoStatus::Suspended;
            t.frames = frames;
            t.pending = Some(PendingWake {
                ret,
                kind: PendingKind::Yielded,
            });
        }
        self.chain.pop();
        let prev = *self.chain.last().expect("yield with no resumer");
        self.wake_thread(prev, vals, false)
    }

    /// `coroutine.resume(co, ...)` (or a wrapped call): switch into a
    /// suspended coroutine.
    pub(crate) fn do_resume(
        &mut self,
        co: ThreadId,
        args: Vec<LuaValue>,
        wrap: bool,
        ret: RetMode,
    ) -> LuaResult<()> {
        let status = self.coroutine_status(co);
        if status != CoStatus::Suspended {
            let what = match status {
                CoStatus::Dead => "dead",
                _ => "non-suspended",
            };
            let msg = format!("cannot resume {} coroutine", what);
            if wrap {
                return Err(self.rt_error(msg));
            }
            let s = self.take_string(msg.into_bytes());
            return self.deliver_return(vec![LuaValue::Boolean(false), s], ret);
        }
        // Park the resumer.
        let tid = self.current_thread();
        let frames = std::mem::take(&mut self.frames);
        {
            let t = self.heap.thread_mut(tid);
            t.status = CoStatus::Normal;
            t.frames = frames;
            t.pending = Some(PendingWake {
                ret,
                kind: PendingKind::Resuming { wrap },
            });
        }
        self.chain.push(co);
        let target = self.heap.thread_mut(co);
        target.status = CoStatus::Running;
        self.frames = std::mem::take(&mut self.heap.thread_mut(co).frames);
        let start = self.heap.thread_mut(co).start.take();
        match start {
            Some(body) => {
                // First resume: the arguments become the body's
                // parameters.
                self.begin_call(body, args, RetMode::All, 0)
            }
            None => {
                let wake = self
                    .heap
                    .thread_mut(co)
                    .pending
                    .take()
                    .expect("suspended coroutine without a pending wake");
                debug_assert!(matches!(wake.kind, PendingKind::Yielded));
                self.deliver_return(args, wake.ret)
            }
        }
    }

    /// `coroutine.close(co)`: force a suspended coroutine dead, running
    /// its to-be-closed variables in its own context.
    pub(crate) fn do_close(&mut self, co: ThreadId, ret: RetMode) -> LuaResult<()> {
        if self.chain.contains(&co) {
            return Err(self.rt_error("cannot close a running coroutine"));
        }
        match self.coroutine_status(co) {
            CoStatus::Dead => {
                return self.deliver_return(vec![LuaValue::Boolean(true)], ret);
            }
            CoStatus::Suspended => {}
            _ => return Err(self.rt_error("cannot close a running coroutine")),
        }
        if self.heap.thread(co).frames.is_empty() {
            // Never resumed (or already unwound): nothing to close.
            let t = self.heap.thread_mut(co);
            t.status = CoStatus::Dead;
            t.start = None;
            t.pending = None;
            return self.deliver_return(vec![LuaValue::Boolean(true)], ret);
        }
        // Switch in and unwind with a Closing transfer; protection
        // frames inside the coroutine do not catch it.
        let tid = self.current_thread();
        let frames = std::mem::take(&mut self.frames);
        {
            let t = self.heap.thread_mut(tid);
            t.status = CoStatus::Normal;
            t.frames = frames;
            t.pending = Some(PendingWake {
                ret,
                kind: PendingKind::Resuming { wrap: false },
            });
        }
        self.chain.push(co);
        let target = self.heap.thread_mut(co);
        target.status = CoStatus::Running;
        target.pending = None;
        self.frames = std::mem::take(&mut self.heap.thread_mut(co).frames);
        self.transfer = Some(Transfer::Closing { err: None });
        Ok(())
    }

    /// Hand values to a parked thread and make it current.
    fn wake_thread(
        &mut self,
        tid: ThreadId,
        vals: Vec<LuaValue>,
        _as_error: bool,
    ) -> LuaResult<()> {
        let t = self.heap.thread_mut(tid);
        t.status = CoStatus::Running;
        self.frames = std::mem::take(&mut self.heap.thread_mut(tid).frames);
        let wake = self
            .heap
            .thread_mut(tid)
            .pending
            .take()
            .expect("woken thread without a pending wake");
        match wake.kind {
            PendingKind::Resuming { wrap } => {
                let mut vals = vals;
                if !wrap {
                    vals.insert(0, LuaValue::Boolean(true));
                }
                self.deliver_return(vals, wake.ret)
            }
            PendingKind::Yielded => self.deliver_return(vals, wake.ret),
        }
    }

    /// Status as the `coroutine` library reports it.
    pub(crate) fn coroutine_status(&self, co: ThreadId) -> CoStatus {
        if co == self.current_thread() {
            return CoStatus::Running;
        }
        if self.chain.contains(&co) {
            return CoStatus::Normal;
        }
        self.heap.thread(co).status
    }
}
