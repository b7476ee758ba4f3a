//! Module loader: resolves a requested module name to its entry point by
//! naming convention and caches the export table it produces.

use std::collections::HashMap;

use memory::Value;

use crate::error::RuntimeError;
use crate::machine::{ControlFlowOps, NativeRegistry, Runtime};
use crate::module::{entry_symbol, ModuleDef};
use crate::native::NativeFunction;

/// What an entry-point symbol resolves to.
#[derive(Debug, Clone, Copy)]
pub enum ModuleEntry {
    /// Static export table.
    Def(&'static ModuleDef),
    /// Open function called with the module name; must return the export
    /// table.
    Open(NativeFunction),
}

/// Per-runtime registry of available and loaded modules.
#[derive(Debug, Default)]
pub struct ModuleLoader {
    entries: HashMap<String, ModuleEntry>,
    loaded: HashMap<String, Value>,
}

impl ModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, symbol: String, entry: ModuleEntry) {
        self.entries.insert(symbol, entry);
    }

    fn check_replace(&self, symbol: &str) -> Result<(), RuntimeError> {
        if self.loaded.contains_key(symbol) {
            return Err(RuntimeError::raised(format!(
                "cannot replace '{}': module already loaded",
                symbol
            )));
        }
        Ok(())
    }

    /// Make a static module available under its entry symbol.
    pub fn preload(&mut self, def: &'static ModuleDef) -> Result<(), RuntimeError> {
        let symbol = def.entry_symbol();
        if let Some(ModuleEntry::Def(existing)) = self.entries.get(&symbol) {
            if std::ptr::eq(*existing, def) {
                return Ok(());
            }
        }
        self.check_replace(&symbol)?;
        self.insert(symbol, ModuleEntry::Def(def));
        Ok(())
    }

    /// Register an open function; its name is the entry symbol
    /// (`luaopen_...`).
    pub fn preload_open(&mut self, open: NativeFunction) -> Result<(), RuntimeError> {
        self.check_replace(open.name)?;
        self.insert(open.name.to_string(), ModuleEntry::Open(open));
        Ok(())
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains_key(&entry_symbol(name))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub(crate) fn loaded_values(&self) -> impl Iterator<Item = Value> + '_ {
        self.loaded.values().copied()
    }
}

impl Runtime {
    /// Load a module once and return its export table. Later requests for
    /// the same entry symbol return the same table.
    pub fn require(&mut self, name: &str) -> Result<Value, RuntimeError> {
        let symbol = entry_symbol(name);
        if let Some(&table) = self.loader.loaded.get(&symbol) {
            tracing::trace!(target: "satell::loader", module = name, "cached");
            return Ok(table);
        }
        let entry = self
            .loader
            .entries
            .get(&symbol)
            .copied()
            .ok_or_else(|| RuntimeError::ModuleNotFound {
                name: name.to_string(),
                symbol: symbol.clone(),
            })?;

        let table = match entry {
            ModuleEntry::Def(def) => self.new_lib(def)?,
            ModuleEntry::Open(open) => {
                let func = self.define_native(open);
                self.push_value(func)?;
                self.push(name)?;
                self.call(1, Some(1))?;
                let table = self.pop_value();
                if !table.is_table() {
                    return Err(RuntimeError::raised(format!(
                        "module '{}' entry point returned {}, not a table",
                        name,
                        table.kind()
                    )));
                }
                table
            }
        };

        self.loader.loaded.insert(symbol.clone(), table);
        tracing::debug!(target: "satell::loader", module = name, symbol = %symbol, "module loaded");
        Ok(table)
    }
}
