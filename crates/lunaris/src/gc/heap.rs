//! The object heap: typed slot pools for every collectable kind, plus
//! the allocation accounting that drives collection triggers.
//!
//! Objects are addressed by index; a freed slot goes on a free list and
//! is reused. The collector guarantees no reachable id is ever freed,
//! so lookups are infallible.

use std::rc::Rc;

use crate::env::Scope;
use crate::eval::frame::{CoStatus, Frame, PendingWake};
use crate::eval::native::NativeFn;
use crate::gc::ids::*;
use crate::gc::string_interner::StringInterner;
use crate::limits;
use crate::syntax::ast::{Chunk, ProtoId};
use crate::value::{LuaStr, LuaTable, LuaUserdata, LuaValue, MetaMethod};

pub struct Pool<T> {
    slots: Vec<Option<T>>,
    free: Vec<u32>,
}

impl<T> Pool<T> {
    fn new() -> Self {
        Pool {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    fn alloc(&mut self, obj: T) -> u32 {
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(obj);
            idx
        } else {
            self.slots.push(Some(obj));
            (self.slots.len() - 1) as u32
        }
    }

    #[inline(always)]
    pub fn get(&self, idx: u32) -> &T {
        self.slots[idx as usize].as_ref().expect("stale object id")
    }

    #[inline(always)]
    pub fn get_mut(&mut self, idx: u32) -> &mut T {
        self.slots[idx as usize].as_mut().expect("stale object id")
    }

    pub fn contains(&self, idx: u32) -> bool {
        self.slots
            .get(idx as usize)
            .is_some_and(|slot| slot.is_some())
    }

    fn release(&mut self, idx: u32) -> Option<T> {
        let obj = self.slots[idx as usize].take();
        if obj.is_some() {
            self.free.push(idx);
        }
        obj
    }
}

// ===== object kinds =====

pub struct TableObj {
    pub header: GcHeader,
    pub data: LuaTable,
}

pub struct FunctionObj {
    pub header: GcHeader,
    pub kind: LuaFunction,
}

pub enum LuaFunction {
    Lua(LuaClosure),
    Native(NativeClosure),
}

/// An interpreted closure: a prototype plus the scope chain captured at
/// creation. `_ENV` resolves through that chain like any other name.
pub struct LuaClosure {
    pub chunk: Rc<Chunk>,
    pub proto: ProtoId,
    pub env: Rc<Scope>,
}

/// A builtin: host function pointer plus optional upvalues (used by
/// `coroutine.wrap` and `gmatch` to carry state between calls).
pub struct NativeClosure {
    pub name: &'static str,
    pub func: NativeFn,
    pub upvalues: Vec<LuaValue>,
}

pub struct BoxObj {
    pub header: GcHeader,
    pub value: LuaValue,
}

pub struct UserdataObj {
    pub header: GcHeader,
    pub data: LuaUserdata,
}

pub struct ThreadObj {
    pub header: GcHeader,
    pub status: CoStatus,
    /// Saved frame stack; empty while the thread is the current one
    /// (the interpreter holds the live stack then).
    pub frames: Vec<Frame>,
    /// Body function, consumed by the first resume.
    pub start: Option<LuaValue>,
    pub pending: Option<PendingWake>,
}

// ===== allocation accounting =====

/// Rough per-object byte estimates for trigger accounting and
/// `collectgarbage("count")`.
const TABLE_COST: usize = 128;
const FUNCTION_COST: usize = 96;
const THREAD_COST: usize = 512;
const USERDATA_COST: usize = 64;
const BOX_COST: usize = 32;

pub struct GcControl {
    pub young: Vec<GcRef>,
    pub old: Vec<GcRef>,
    /// Finalizable objects in registration order.
    pub finalize_order: Vec<GcRef>,
    /// Dead finalizable objects waiting for their finalizer; minor
    /// cycles append here, major cycles drain it.
    pub pending_finalize: Vec<GcRef>,
    /// Estimated live bytes.
    pub bytes: usize,
    /// Next collection fires when `bytes` exceeds this.
    pub threshold: usize,
    /// Live bytes after the last major cycle, for major scheduling.
    pub major_base: usize,
    pub pause: u32,
    pub stepmul: u32,
    /// Collection enabled (`collectgarbage "stop"` clears it).
    pub running: bool,
    /// A cycle is wanted; the evaluator polls this at op boundaries.
    pub pending: bool,
    /// Re-entrancy latch: set while collecting or running finalizers.
    pub in_cycle: bool,
    pub minor_count: usize,
    pub major_count: usize,
}

impl GcControl {
    fn new() -> Self {
        GcControl {
            young: Vec::new(),
            old: Vec::new(),
            finalize_order: Vec::new(),
            pending_finalize: Vec::new(),
            bytes: 0,
            threshold: limits::GC_INITIAL_THRESHOLD,
            major_base: 0,
            pause: limits::DEFAULT_GC_PAUSE,
            stepmul: limits::DEFAULT_GC_STEPMUL,
            running: true,
            pending: false,
            in_cycle: false,
            minor_count: 0,
            major_count: 0,
        }
    }
}

// ===== the heap =====

pub struct Heap {
    pub tables: Pool<TableObj>,
    pub functions: Pool<FunctionObj>,
    pub threads: Pool<ThreadObj>,
    pub userdata: Pool<UserdataObj>,
    pub boxes: Pool<BoxObj>,
    pub interner: StringInterner,
    pub gc: GcControl,
    /// Pre-interned metamethod names, indexed by `MetaMethod as usize`.
    meta_names: Vec<LuaStr>,
}

impl Heap {
    pub fn new() -> Self {
        let mut interner = StringInterner::new();
        let meta_names = MetaMethod::ALL
            .iter()
            .map(|mm| interner.intern_str(mm.name()))
            .collect();
        Heap {
            tables: Pool::new(),
            functions: Pool::new(),
            threads: Pool::new(),
            userdata: Pool::new(),
            boxes: Pool::new(),
            interner,
            gc: GcControl::new(),
            meta_names,
        }
    }

    #[inline(always)]
    pub fn meta_name(&self, mm: MetaMethod) -> &LuaStr {
        &self.meta_names[mm as usize]
    }

    fn account(&mut self, cost: usize) {
        self.gc.bytes += cost;
        if self.gc.running && !self.gc.in_cycle && self.gc.bytes > self.gc.threshold {
            self.gc.pending = true;
        }
    }

    fn track(&mut self, r: GcRef) {
        self.gc.young.push(r);
    }

    pub fn alloc_table(&mut self, data: LuaTable) -> TableId {
        let id = TableId(self.tables.alloc(TableObj {
            header: GcHeader::new(),
            data,
        }));
        self.track(GcRef::Table(id));
        self.account(TABLE_COST);
        id
    }

    pub fn alloc_function(&mut self, kind: LuaFunction) -> FunctionId {
        let id = FunctionId(self.functions.alloc(FunctionObj {
            header: GcHeader::new(),
            kind,
        }));
        self.track(GcRef::Function(id));
        self.account(FUNCTION_COST);
        id
    }

    pub fn alloc_thread(&mut self, start: Option<LuaValue>) -> ThreadId {
        let id = ThreadId(self.threads.alloc(ThreadObj {
            header: GcHeader::new(),
            status: CoStatus::Suspended,
            frames: Vec::new(),
            start,
            pending: None,
        }));
        self.track(GcRef::Thread(id));
        self.account(THREAD_COST);
        id
    }

    pub fn alloc_userdata(&mut self, data: LuaUserdata) -> UserdataId {
        let finalizable = data.finalizer.is_some();
        let id = UserdataId(self.userdata.alloc(UserdataObj {
            header: GcHeader::new(),
            data,
        }));
        self.track(GcRef::Userdata(id));
        if finalizable {
            self.userdata.get_mut(id.0).header.finalizable = true;
            self.gc.finalize_order.push(GcRef::Userdata(id));
        }
        self.account(USERDATA_COST);
        id
    }

    pub fn alloc_box(&mut self, value: LuaValue) -> BoxId {
        let id = BoxId(self.boxes.alloc(BoxObj {
            header: GcHeader::new(),
            value,
        }));
        self.track(GcRef::Box(id));
        self.account(BOX_COST);
        id
    }

    // ----- convenience accessors -----

    #[inline(always)]
    pub fn table(&self, id: TableId) -> &LuaTable {
        &self.tables.get(id.0).data
    }

    #[inline(always)]
    pub fn table_mut(&mut self, id: TableId) -> &mut LuaTable {
        &mut self.tables.get_mut(id.0).data
    }

    #[inline(always)]
    pub fn function(&self, id: FunctionId) -> &LuaFunction {
        &self.functions.get(id.0).kind
    }

    #[inline(always)]
    pub fn thread(&self, id: ThreadId) -> &ThreadObj {
        self.threads.get(id.0)
    }

    #[inline(always)]
    pub fn thread_mut(&mut self, id: ThreadId) -> &mut ThreadObj {
        self.threads.get_mut(id.0)
    }

    #[inline(always)]
    pub fn box_value(&self, id: BoxId) -> &LuaValue {
        &self.boxes.get(id.0).value
    }

    #[inline(always)]
    pub fn set_box_value(&mut self, id: BoxId, value: LuaValue) {
        self.boxes.get_mut(id.0).value = value;
    }

    /// Metatable of an arbitrary value. Strings have none here; the
    /// string library installs one at the interpreter level.
    pub fn metatable_of(&self, v: &LuaValue) -> Option<TableId> {
        match v {
            LuaValue::Table(t) => self.table(*t).metatable(),
            LuaValue::Userdata(u) => self.userdata.get(u.0).data.metatable(),
            _ => None,
        }
    }

    /// Raw metamethod lookup, no `__metatable` protection involved.
    pub fn get_metamethod(&self, v: &LuaValue, mm: MetaMethod) -> LuaValue {
        let Some(meta) = self.metatable_of(v) else {
            return LuaValue::Nil;
        };
        let key = self.meta_name(mm).clone();
        self.table(meta).raw_get_value(&LuaValue::String(key))
    }

    pub fn get_metamethod_of_table(&self, meta: TableId, mm: MetaMethod) -> LuaValue {
        let key = self.meta_name(mm).clone();
        self.table(meta).raw_get_value(&LuaValue::String(key))
    }

    /// Record that an object gained a finalizer (its metatable was set
    /// with a `__gc` field present). Registration order is finalization
    /// order, reversed.
    pub fn mark_finalizable(&mut self, r: GcRef) {
        if self.header(r).finalizable {
            return;
        }
        self.header_mut(r).finalizable = true;
        self.gc.finalize_order.push(r);
    }

    pub fn header(&self, r: GcRef) -> &GcHeader {
        match r {
            GcRef::Table(id) => &self.tables.get(id.0).header,
            GcRef::Function(id) => &self.functions.get(id.0).header,
            GcRef::Thread(id) => &self.threads.get(id.0).header,
            GcRef::Userdata(id) => &self.userdata.get(id.0).header,
            GcRef::Box(id) => &self.boxes.get(id.0).header,
        }
    }

    pub fn header_mut(&mut self, r: GcRef) -> &mut GcHeader {
        match r {
            GcRef::Table(id) => &mut self.tables.get_mut(id.0).header,
            GcRef::Function(id) => &mut self.functions.get_mut(id.0).header,
            GcRef::Thread(id) => &mut self.threads.get_mut(id.0).header,
            GcRef::Userdata(id) => &mut self.userdata.get_mut(id.0).header,
            GcRef::Box(id) => &mut self.boxes.get_mut(id.0).header,
        }
    }

    pub fn contains(&self, r: GcRef) -> bool {
        match r {
            GcRef::Table(id) => self.tables.contains(id.0),
            GcRef::Function(id) => self.functions.contains(id.0),
            GcRef::Thread(id) => self.threads.contains(id.0),
            GcRef::Userdata(id) => self.userdata.contains(id.0),
            GcRef::Box(id) => self.boxes.contains(id.0),
        }
    }

    pub(crate) fn free_object(&mut self, r: GcRef) {
        let cost = match r {
            GcRef::Table(id) => {
                self.tables.release(id.0);
                TABLE_COST
            }
            GcRef::Function(id) => {
                self.functions.release(id.0);
                FUNCTION_COST
            }
            GcRef::Thread(id) => {
                self.threads.release(id.0);
                THREAD_COST
            }
            GcRef::Userdata(id) => {
                if let Some(mut obj) = self.userdata.release(id.0) {
                    // Host finalizer that never ran (object died after
                    // its resurrection window).
                    if let Some(fin) = obj.data.finalizer.take()
                        && !obj.header.finalized
                    {
                        fin(obj.data.data.as_mut());
                    }
                }
                USERDATA_COST
            }
            GcRef::Box(id) => {
                self.boxes.release(id.0);
                BOX_COST
            }
        };
        self.gc.bytes = self.gc.bytes.saturating_sub(cost);
    }

    /// Estimated heap footprint in bytes.
    pub fn estimated_bytes(&self) -> usize {
        self.gc.bytes + self.interner.bytes
    }
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new()
    }
}
