use std::collections::HashSet;

use memory::Value;

use crate::error::RuntimeError;
use crate::module::ModuleDef;
use crate::native::{Arity, NativeFn, NativeFunction, Results};

use super::runtime::Runtime;

/// Trait for native function registration
pub trait NativeRegistry {
    /// Function value for `native`. Registering the same name and entry
    /// point again returns the existing value.
    fn define_native(&mut self, native: NativeFunction) -> Value;

    /// Export table for a static module definition.
    fn new_lib(&mut self, def: &ModuleDef) -> Result<Value, RuntimeError>;

    /// Export table built from a runtime list of `(name, function)` pairs.
    /// Entries are variadic with variable results.
    fn register(&mut self, functions: &[(&'static str, NativeFn)]) -> Result<Value, RuntimeError>;
}

impl NativeRegistry for Runtime {
    fn define_native(&mut self, native: NativeFunction) -> Value {
        let id = native.identity();
        if let Some(&idx) = self.native_ids.get(&id) {
            return Value::function(idx);
        }
        self.natives.push(native);
        let idx = (self.natives.len() - 1) as u32;
        self.native_ids.insert(id, idx);
        Value::function(idx)
    }

    fn new_lib(&mut self, def: &ModuleDef) -> Result<Value, RuntimeError> {
        let table = self.new_table(0, def.functions.len())?;
        // Anchor while the entries are filled in.
        self.push_value(table)?;
        for native in def.functions {
            let func = self.define_native(*native);
            self.set_field(table, native.name, func)?;
        }
        self.pop(1);
        Ok(table)
    }

    fn register(&mut self, functions: &[(&'static str, NativeFn)]) -> Result<Value, RuntimeError> {
        let mut seen = HashSet::with_capacity(functions.len());
        if let Some((name, _)) = functions.iter().find(|(name, _)| !seen.insert(*name)) {
            return Err(RuntimeError::raised(format!("duplicate export '{}'", name)));
        }
        let table = self.new_table(0, functions.len())?;
        self.push_value(table)?;
        for &(name, func) in functions {
            let func = self.define_native(NativeFunction::new(
                name,
                func,
                Arity::ANY,
                Results::Variable,
            ));
            self.set_field(table, name, func)?;
        }
        self.pop(1);
        Ok(table)
    }
}

/// Host-visible globals. Every global is a collection root.
impl Runtime {
    pub fn set_global(&mut self, name: &str, value: Value) {
        if let Value::Foreign(r) = value {
            self.heap.publish_foreign(r);
        }
        if value.is_nil() {
            self.globals.remove(name);
        } else {
            self.globals.insert(name.to_string(), value);
        }
    }

    pub fn get_global(&self, name: &str) -> Value {
        self.globals.get(name).copied().unwrap_or(Value::Nil)
    }

    /// Push a global (typically a function) for a following `call`.
    pub fn push_global(&mut self, name: &str) -> Result<(), RuntimeError> {
        let value = self.get_global(name);
        self.push_value(value)
    }

    /// Define `native` and expose it as the global `native.name`.
    pub fn set_native_global(&mut self, native: NativeFunction) -> Value {
        let func = self.define_native(native);
        self.set_global(native.name, func);
        func
    }
}
