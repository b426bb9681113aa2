//! Generational stop-the-world mark-and-sweep with full weak-table
//! semantics.
//!
//! Minor cycles trace the young generation, treating every old object
//! as a root (a conservative stand-in for a write barrier), and promote
//! survivors. Major cycles trace both generations and run the strict
//! phase order: mark with weak-set segregation, ephemeron convergence,
//! finalizable separation (with one resurrection mark wave), weak-entry
//! clearing, sweep, and only then finalizers, which the interpreter
//! runs because they are Lua calls.

mod heap;
mod ids;
mod string_interner;

pub use heap::{
    BoxObj, FunctionObj, GcControl, Heap, LuaClosure, LuaFunction, NativeClosure, Pool,
    TableObj, ThreadObj, UserdataObj,
};
pub use ids::{BoxId, FunctionId, GcHeader, GcRef, TableId, ThreadId, UserdataId};
pub use string_interner::StringInterner;

use std::rc::Rc;

use crate::env::Scope;
use crate::eval::frame::{Frame, Op, Transfer};
use crate::value::{LuaValue, MetaMethod};

/// What a finished cycle leaves for the interpreter to do.
pub struct CycleOutcome {
    /// Finalizable objects that died this cycle, in registration
    /// order; finalizers run newest-first.
    pub finalize_queue: Vec<GcRef>,
    pub major: bool,
}

struct WeakSets {
    values: Vec<TableId>,
    ephemerons: Vec<TableId>,
    all: Vec<TableId>,
}

impl Heap {
    /// Run one full collection cycle. `roots` are the interpreter's
    /// root values (globals, pins, chain threads); `live_frames` is the
    /// current thread's frame stack, which lives outside the heap.
    pub fn collect(
        &mut self,
        major: bool,
        roots: &[LuaValue],
        live_frames: &[Frame],
    ) -> CycleOutcome {
        self.gc.pending = false;

        // Phase 0: reset marks from the previous cycle.
        for r in self
            .gc
            .young
            .iter()
            .chain(self.gc.old.iter())
            .copied()
            .collect::<Vec<_>>()
        {
            self.header_mut(r).marked = false;
        }

        let mut wl: Vec<GcRef> = Vec::with_capacity(128);
        let mut weak = WeakSets {
            values: Vec::new(),
            ephemerons: Vec::new(),
            all: Vec::new(),
        };

        // Phase 1: mark from the root set.
        for v in roots {
            self.mark_value(v, &mut wl);
        }
        self.mark_frames(live_frames, &mut wl);
        if !major {
            // Interim conservative policy: the whole old generation is
            // a root for minor cycles.
            for r in self.gc.old.clone() {
                self.mark_ref(r, &mut wl);
            }
        }
        self.drain(&mut wl, &mut weak, major);

        if major {
            // Phase 2: ephemeron convergence.
            loop {
                let mut changed = false;
                let ephemerons = weak.ephemerons.clone();
                for t in ephemerons {
                    let entries: Vec<_> = self.table(t).iter_entries().collect();
                    for (k, v) in entries {
                        if self.value_is_marked(&k) && !self.value_is_marked(&v) {
                            self.mark_value(&v, &mut wl);
                            self.drain(&mut wl, &mut weak, major);
                            changed = true;
                        }
                    }
                }
                if !changed {
                    break;
                }
            }
        }

        // Phase 3: separate finalizables and resurrect them for the
        // finalizer's benefit. Objects parked by earlier minor cycles
        // stay alive until their finalizer actually runs.
        let mut finalize_queue = Vec::new();
        if major {
            for r in self.gc.pending_finalize.clone() {
                if self.contains(r) {
                    self.mark_ref(r, &mut wl);
                    self.drain(&mut wl, &mut weak, major);
                }
            }
            let order = self.gc.finalize_order.clone();
            for r in order {
                if !self.contains(r) {
                    continue;
                }
                let header = *self.header(r);
                if !header.marked && header.finalizable && !header.finalized {
                    self.header_mut(r).finalized = true;
                    self.gc.pending_finalize.push(r);
                    self.mark_ref(r, &mut wl);
                    self.drain(&mut wl, &mut weak, major);
                }
            }
            finalize_queue = std::mem::take(&mut self.gc.pending_finalize);

            // Phase 4: clear weak entries whose weak side died.
            let value_tables = weak.values.clone();
            for t in value_tables {
                self.clear_weak_entries(t, false, true);
            }
            let ephemerons = weak.ephemerons.clone();
            for t in ephemerons {
                self.clear_weak_entries(t, true, false);
            }
            let all = weak.all.clone();
            for t in all {
                self.clear_weak_entries(t, true, true);
            }
        }

        // Phase 5: sweep. The old generation is snapshotted first so
        // freshly promoted young survivors are not re-examined with
        // their marks already cleared. A dead finalizable object that
        // has not been finalized yet is parked (and kept) instead of
        // freed; minor cycles queue finalizers, only major cycles run
        // them.
        let old_snapshot = if major {
            std::mem::take(&mut self.gc.old)
        } else {
            Vec::new()
        };
        let young = std::mem::take(&mut self.gc.young);
        for r in young {
            let header = *self.header(r);
            if header.marked {
                let header = self.header_mut(r);
                header.marked = false;
                header.old = true;
                self.gc.old.push(r);
            } else if header.finalizable && !header.finalized {
                self.header_mut(r).finalized = true;
                self.header_mut(r).old = true;
                self.gc.pending_finalize.push(r);
                self.gc.old.push(r);
            } else {
                self.free_object(r);
            }
        }
        if major {
            for r in old_snapshot {
                if self.header(r).marked {
                    self.header_mut(r).marked = false;
                    self.gc.old.push(r);
                } else {
                    self.free_object(r);
                }
            }
            self.gc.major_count += 1;
            self.gc.major_base = self.gc.bytes;
        } else {
            self.gc.minor_count += 1;
        }
        let mut order = std::mem::take(&mut self.gc.finalize_order);
        order.retain(|&r| self.contains(r));
        self.gc.finalize_order = order;

        // New threshold: a pause multiplier over post-cycle usage.
        let base = self.estimated_bytes();
        self.gc.threshold = (base / 100)
            .saturating_mul(self.gc.pause as usize)
            .max(crate::limits::GC_INITIAL_THRESHOLD);

        CycleOutcome {
            finalize_queue,
            major,
        }
    }

    fn value_gc_ref(v: &LuaValue) -> Option<GcRef> {
        match v {
            LuaValue::Table(t) => Some(GcRef::Table(*t)),
            LuaValue::Function(f) => Some(GcRef::Function(*f)),
            LuaValue::Thread(t) => Some(GcRef::Thread(*t)),
            LuaValue::Userdata(u) => Some(GcRef::Userdata(*u)),
            _ => None,
        }
    }

    fn value_is_marked(&self, v: &LuaValue) -> bool {
        match Self::value_gc_ref(v) {
            Some(r) => self.header(r).marked,
            // Primitives and strings are not collectable.
            None => true,
        }
    }

    fn mark_value(&mut self, v: &LuaValue, wl: &mut Vec<GcRef>) {
        if let Some(r) = Self::value_gc_ref(v) {
            self.mark_ref(r, wl);
        }
    }

    fn mark_ref(&mut self, r: GcRef, wl: &mut Vec<GcRef>) {
        let header = self.header_mut(r);
        if !header.marked {
            header.marked = true;
            wl.push(r);
        }
    }

    fn mark_scope_chain(&mut self, scope: &Rc<Scope>, wl: &mut Vec<GcRef>) {
        let mut cur = scope.clone();
        loop {
            for cell in cur.own_cells() {
                self.mark_ref(GcRef::Box(cell), wl);
            }
            match cur.parent() {
                Some(p) => {
                    let next = p.clone();
                    cur = next;
                }
                None => break,
            }
        }
    }

    fn drain(&mut self, wl: &mut Vec<GcRef>, weak: &mut WeakSets, major: bool) {
        while let Some(r) = wl.pop() {
            self.trace_children(r, wl, weak, major);
        }
    }

    fn trace_children(
        &mut self,
        r: GcRef,
        wl: &mut Vec<GcRef>,
        weak: &mut WeakSets,
        major: bool,
    ) {
        match r {
            GcRef::Table(id) => {
                let meta = self.table(id).metatable();
                if let Some(m) = meta {
                    self.mark_ref(GcRef::Table(m), wl);
                }
                let (weak_k, weak_v) = if major {
                    self.weak_mode(meta)
                } else {
                    // Minor cycles keep weak entries alive; clearing is
                    // a major-cycle job.
                    (false, false)
                };
                match (weak_k, weak_v) {
                    (false, false) => {
                        let entries: Vec<_> = self.table(id).iter_entries().collect();
                        for (k, v) in entries {
                            self.mark_value(&k, wl);
                            self.mark_value(&v, wl);
                        }
                    }
                    (false, true) => {
                        let entries: Vec<_> = self.table(id).iter_entries().collect();
                        for (k, _) in entries {
                            self.mark_value(&k, wl);
                        }
                        weak.values.push(id);
                    }
                    (true, false) => weak.ephemerons.push(id),
                    (true, true) => weak.all.push(id),
                }
            }
            GcRef::Function(id) => match &self.functions.get(id.0).kind {
                LuaFunction::Lua(closure) => {
                    let env = closure.env.clone();
                    self.mark_scope_chain(&env, wl);
                }
                LuaFunction::Native(native) => {
                    let upvalues = native.upvalues.clone();
                    for v in upvalues {
                        self.mark_value(&v, wl);
                    }
                }
            },
            GcRef::Thread(id) => {
                let (values, scopes, start) = {
                    let t = self.threads.get(id.0);
                    let (values, scopes) = frame_children(&t.frames);
                    (values, scopes, t.start.clone())
                };
                for v in values {
                    self.mark_value(&v, wl);
                }
                for s in scopes {
                    self.mark_scope_chain(&s, wl);
                }
                if let Some(v) = start {
                    self.mark_value(&v, wl);
                }
            }
            GcRef::Userdata(id) => {
                if let Some(m) = self.userdata.get(id.0).data.metatable() {
                    self.mark_ref(GcRef::Table(m), wl);
                }
            }
            GcRef::Box(id) => {
                let v = self.box_value(id).clone();
                self.mark_value(&v, wl);
            }
        }
    }

    fn mark_frames(&mut self, frames: &[Frame], wl: &mut Vec<GcRef>) {
        let (values, scopes) = frame_children(frames);
        for v in values {
            self.mark_value(&v, wl);
        }
        for s in scopes {
            self.mark_scope_chain(&s, wl);
        }
    }

    /// Parse a table's `__mode` into (weak keys, weak values).
    fn weak_mode(&self, meta: Option<TableId>) -> (bool, bool) {
        let Some(meta) = meta else {
            return (false, false);
        };
        let mode = self.get_metamethod_of_table(meta, MetaMethod::Mode);
        match mode {
            LuaValue::String(s) => {
                let bytes = s.as_bytes();
                (bytes.contains(&b'k'), bytes.contains(&b'v'))
            }
            _ => (false, false),
        }
    }

    fn clear_weak_entries(&mut self, t: TableId, by_key: bool, by_value: bool) {
        let entries: Vec<_> = self.table(t).iter_entries().collect();
        let mut dead_keys = Vec::new();
        for (k, v) in entries {
            let key_dead = by_key && !self.value_is_marked(&k);
            let value_dead = by_value && !self.value_is_marked(&v);
            if key_dead || value_dead {
                dead_keys.push(k);
            }
        }
        for k in dead_keys {
            if let Ok(key) = crate::value::LuaKey::from_value(&k) {
                self.table_mut(t).raw_set(key, LuaValue::Nil);
            }
        }
    }
}

/// Collect every value and scope a frame stack can reach. The ops stack
/// embeds values (pending table constructors, to-be-closed guards,
/// iterator state, suspended transfers), so it is walked too.
fn frame_children(frames: &[Frame]) -> (Vec<LuaValue>, Vec<Rc<Scope>>) {
    let mut values = Vec::new();
    let mut scopes = Vec::new();
    for frame in frames {
        match frame {
            Frame::Lua(f) => {
                values.push(LuaValue::Function(f.func));
                values.extend(f.vals.iter().cloned());
                values.extend(f.varargs.iter().cloned());
                scopes.push(f.env.clone());
                for op in &f.ops {
                    op_children(op, &mut values, &mut scopes);
                }
            }
            Frame::Protect(p) => {
                if let Some(h) = &p.handler {
                    values.push(h.clone());
                }
            }
            Frame::Boundary => {}
        }
    }
    (values, scopes)
}

fn op_children(op: &Op, values: &mut Vec<LuaValue>, scopes: &mut Vec<Rc<Scope>>) {
    match op {
        Op::Push { value } | Op::Tbc { value } | Op::SelfPush { obj: value } => {
            values.push(value.clone());
        }
        Op::EnvPop { prev, closes } => {
            scopes.push(prev.clone());
            if let Some(closes) = closes {
                values.extend(closes.iter().cloned());
            }
        }
        Op::Repeat { base_env, .. } => scopes.push(base_env.clone()),
        Op::GenForCall {
            func,
            state,
            control,
            ..
        } => {
            values.push(func.clone());
            values.push(state.clone());
            values.push(control.clone());
        }
        Op::GenForLoop { func, state, .. } => {
            values.push(func.clone());
            values.push(state.clone());
        }
        Op::TableItem { table, .. }
        | Op::TableKeyed { table, .. }
        | Op::TableTail { table, .. } => {
            values.push(LuaValue::Table(*table));
        }
        Op::ResumeTransfer { transfer } => transfer_children(transfer, values),
        _ => {}
    }
}

fn transfer_children(transfer: &Transfer, values: &mut Vec<LuaValue>) {
    match transfer {
        Transfer::Error(e) => values.push(e.value()),
        Transfer::Return(vals) => values.extend(vals.iter().cloned()),
        Transfer::TailCall { func, args } => {
            values.push(func.clone());
            values.extend(args.iter().cloned());
        }
        Transfer::Closing { err } => {
            if let Some(e) = err {
                values.push(e.value());
            }
        }
        Transfer::Break | Transfer::Goto(_) => {}
    }
}
