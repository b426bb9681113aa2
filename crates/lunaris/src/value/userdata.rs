//! Full userdata: host-owned opaque payloads with optional metatables.

use std::any::Any;

use crate::gc::TableId;

/// Host destructor invoked when the collector finalizes the userdata.
/// Runs once; it sees only the payload, never the interpreter.
pub type UserdataFinalizer = fn(&mut dyn Any);

pub struct LuaUserdata {
    pub data: Box<dyn Any>,
    meta: Option<TableId>,
    pub(crate) finalizer: Option<UserdataFinalizer>,
}

impl LuaUserdata {
    pub fn new(data: Box<dyn Any>) -> Self {
        LuaUserdata {
            data,
            meta: None,
            finalizer: None,
        }
    }

    pub fn with_finalizer(data: Box<dyn Any>, finalizer: UserdataFinalizer) -> Self {
        LuaUserdata {
            data,
            meta: None,
            finalizer: Some(finalizer),
        }
    }

    #[inline(always)]
    pub fn metatable(&self) -> Option<TableId> {
        self.meta
    }

    pub fn set_metatable(&mut self, meta: Option<TableId>) {
        self.meta = meta;
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.data.downcast_mut::<T>()
    }
}
