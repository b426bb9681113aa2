// Library registration system for the standard libraries.
// Provides a clean way to register Rust functions as Lua libraries.

use crate::error::LuaResult;
use crate::eval::native::NativeFn;
use crate::eval::LuaInterp;
use crate::stdlib;
use crate::value::LuaValue;

/// Type for value initializers - functions that create values when the
/// module loads.
pub type ValueInitializer = fn(&mut LuaInterp) -> LuaValue;

/// Type for module initializers - functions that set up additional
/// module state after the entries are registered.
pub type ModuleInitializer = fn(&mut LuaInterp) -> LuaResult<()>;

/// Entry in a library module - a function or a value.
pub enum LibraryEntry {
    Function(&'static str, NativeFn),
    Value(ValueInitializer),
}

/// A library module containing multiple functions and values.
pub struct LibraryModule {
    pub name: &'static str,
    pub entries: Vec<(&'static str, LibraryEntry)>,
    pub initializer: Option<ModuleInitializer>,
}

impl LibraryModule {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Vec::new(),
            initializer: None,
        }
    }

    pub fn with_function(mut self, name: &'static str, func: NativeFn) -> Self {
        self.entries.push((name, LibraryEntry::Function(name, func)));
        self
    }

    pub fn with_value(mut self, name: &'static str, value_init: ValueInitializer) -> Self {
        self.entries.push((name, LibraryEntry::Value(value_init)));
        self
    }

    pub fn with_initializer(mut self, init: ModuleInitializer) -> Self {
        self.initializer = Some(init);
        self
    }
}

/// Builder macro for library modules.
#[macro_export]
macro_rules! lib_module {
    ($name:expr, {
        $($item_name:expr => $item:expr),* $(,)?
    }) => {{
        let mut module = $crate::lib_registry::LibraryModule::new($name);
        $(
            module.entries.push((
                $item_name,
                $crate::lib_registry::LibraryEntry::Function($item_name, $item),
            ));
        )*
        module
    }};
}

/// Registry for the standard libraries.
pub struct LibraryRegistry {
    modules: Vec<LibraryModule>, // Vec preserves registration order
}

impl LibraryRegistry {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    pub fn register(&mut self, module: LibraryModule) {
        self.modules.push(module);
    }

    /// Load all registered libraries into an interpreter.
    pub fn load_all(&self, interp: &mut LuaInterp) -> LuaResult<()> {
        for module in &self.modules {
            self.load_module(interp, module)?;
        }
        Ok(())
    }

    pub fn load_module(&self, interp: &mut LuaInterp, module: &LibraryModule) -> LuaResult<()> {
        if module.name == "_G" {
            // Global functions register directly.
            for (name, entry) in &module.entries {
                let value = match entry {
                    LibraryEntry::Function(fname, func) => {
                        interp.new_native_function(*fname, *func)
                    }
                    LibraryEntry::Value(value_init) => value_init(interp),
                };
                interp.set_global(name, value);
            }
        } else {
            let lib_table = interp.new_table();
            for (name, entry) in &module.entries {
                let value = match entry {
                    LibraryEntry::Function(fname, func) => {
                        interp.new_native_function(*fname, *func)
                    }
                    LibraryEntry::Value(value_init) => value_init(interp),
                };
                let key = interp.new_string(name.as_bytes());
                let key = interp.table_key(&key)?;
                interp.heap.table_mut(lib_table).raw_set(key, value);
            }
            interp.set_global(module.name, LuaValue::Table(lib_table));
        }
        if let Some(init_fn) = module.initializer {
            init_fn(interp)?;
        }
        Ok(())
    }

    pub fn get_module(&self, name: &str) -> Option<&LibraryModule> {
        self.modules.iter().find(|m| m.name == name)
    }
}

impl Default for LibraryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The standard library set this runtime ships.
pub fn create_standard_registry() -> LibraryRegistry {
    let mut registry = LibraryRegistry::new();
    registry.register(stdlib::basic::create_basic_lib());
    registry.register(stdlib::string::create_string_lib());
    registry.register(stdlib::table::create_table_lib());
    registry.register(stdlib::math::create_math_lib());
    registry.register(stdlib::coroutine::create_coroutine_lib());
    registry.register(stdlib::os::create_os_lib());
    registry
}
