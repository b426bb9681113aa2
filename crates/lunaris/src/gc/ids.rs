//! Typed identifiers for pooled GC objects.
//!
//! Every collectable object lives in a typed slot pool inside the heap
//! and is addressed by a plain `u32` index wrapped in a newtype. Values
//! hold these ids instead of pointers; the collector owns the slots.

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        pub struct $name(pub(crate) u32);

        impl $name {
            #[inline(always)]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

define_id!(
    /// Identity of a Lua table.
    TableId
);
define_id!(
    /// Identity of a function object (closure or builtin).
    FunctionId
);
define_id!(
    /// Identity of a coroutine.
    ThreadId
);
define_id!(
    /// Identity of a full userdata object.
    UserdataId
);
define_id!(
    /// Identity of an upvalue box (one mutable cell holding a value).
    BoxId
);

/// Unified reference to any collectable object, used by the collector's
/// worklists and generation lists.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum GcRef {
    Table(TableId),
    Function(FunctionId),
    Thread(ThreadId),
    Userdata(UserdataId),
    Box(BoxId),
}

/// Per-object collector state, embedded in every pooled object.
#[derive(Clone, Copy, Debug, Default)]
pub struct GcHeader {
    /// Mark bit for the current cycle.
    pub marked: bool,
    /// Object has survived a minor collection.
    pub old: bool,
    /// Object has a `__gc` metamethod or a host finalizer.
    pub finalizable: bool,
    /// Finalizer already ran (or is queued); never finalize twice.
    pub finalized: bool,
}

impl GcHeader {
    pub fn new() -> Self {
        GcHeader::default()
    }
}
