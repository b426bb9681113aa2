// Lunaris
// A tree-walking Lua 5.4 interpreter with a generational GC

#[cfg(test)]
mod test;

pub mod env;
pub mod error;
pub mod eval;
pub mod gc;
pub mod lib_registry;
pub mod limits;
pub mod number;
pub mod pattern;
pub mod stdlib;
pub mod syntax;
pub mod value;

pub use error::{LuaError, LuaResult, Traceback};
pub use eval::native::{Args, Dispatch, NativeFn};
pub use eval::{LuaInterp, LuaOptions};
pub use lib_registry::LibraryRegistry;
pub use value::{LuaStr, LuaTable, LuaUserdata, LuaValue, LuaValueKind};

/// Main entry point for executing Lua code: fresh interpreter,
/// standard libraries, one chunk.
pub fn execute(source: &str) -> LuaResult<Vec<LuaValue>> {
    let mut interp = LuaInterp::new(LuaOptions::default());
    interp.open_libs();
    interp.execute(source)
}

/// Execute Lua code on an existing interpreter instance.
pub fn execute_with_interp(
    interp: &mut LuaInterp,
    source: &str,
) -> LuaResult<Vec<LuaValue>> {
    interp.execute(source)
}
