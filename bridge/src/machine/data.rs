use memory::{TableKey, Value};

use crate::error::RuntimeError;
use crate::marshal::{format_number, ByteStr};

use super::runtime::Runtime;

fn not_a_table(value: Value) -> RuntimeError {
    RuntimeError::raised(format!("attempt to index a non-table value ({})", value.kind()))
}

/// Strings and tables.
impl Runtime {
    pub fn new_string(&mut self, bytes: &[u8]) -> Result<Value, RuntimeError> {
        Ok(Value::string(self.heap.alloc_string(bytes)?))
    }

    /// Contents of a string value; `None` for other kinds.
    pub fn string_bytes(&self, value: Value) -> Option<ByteStr> {
        match value {
            Value::String(h) => self.heap.get_string(h).cloned(),
            _ => None,
        }
    }

    /// Fresh table with room for `narr` sequence and `nrec` keyed entries.
    /// Not anchored until it is pushed or stored.
    pub fn new_table(&mut self, narr: usize, nrec: usize) -> Result<Value, RuntimeError> {
        Ok(Value::table(self.heap.alloc_table(narr, nrec)?))
    }

    /// Push a fresh table.
    pub fn create_table(&mut self, narr: usize, nrec: usize) -> Result<Value, RuntimeError> {
        let table = self.new_table(narr, nrec)?;
        self.push_value(table)?;
        Ok(table)
    }

    /// `t[key] = value` without metamethods. Nil values delete the entry.
    pub fn raw_set(&mut self, table: Value, key: Value, value: Value) -> Result<(), RuntimeError> {
        let Value::Table(h) = table else {
            return Err(not_a_table(table));
        };
        let key = match self.heap.key_for(key)? {
            Some(k) => k,
            None if key.is_nil() => return Err(RuntimeError::raised("table index is nil")),
            None => return Err(RuntimeError::raised("table index is NaN")),
        };
        for v in [key.as_ref_value(), Some(value)].into_iter().flatten() {
            if let Value::Foreign(r) = v {
                self.heap.publish_foreign(r);
            }
        }
        self.heap.table_set(h, key, value)?;
        Ok(())
    }

    /// `t[key]` without metamethods. Nil and NaN keys read as nil.
    pub fn raw_get(&self, table: Value, key: Value) -> Result<Value, RuntimeError> {
        let Value::Table(h) = table else {
            return Err(not_a_table(table));
        };
        let Some(key) = self.heap.key_for(key)? else {
            return Ok(Value::Nil);
        };
        Ok(self.heap.get_table(h).map_or(Value::Nil, |t| t.get(&key)))
    }

    pub fn set_field(&mut self, table: Value, name: &str, value: Value) -> Result<(), RuntimeError> {
        let Value::Table(h) = table else {
            return Err(not_a_table(table));
        };
        if let Value::Foreign(r) = value {
            self.heap.publish_foreign(r);
        }
        self.heap.table_set(h, TableKey::str(name), value)?;
        Ok(())
    }

    pub fn get_field(&self, table: Value, name: &str) -> Result<Value, RuntimeError> {
        let Value::Table(h) = table else {
            return Err(not_a_table(table));
        };
        Ok(self
            .heap
            .get_table(h)
            .map_or(Value::Nil, |t| t.get(&TableKey::str(name))))
    }

    /// Length of a string (bytes) or the border of a table's sequence.
    pub fn raw_len(&self, value: Value) -> Result<usize, RuntimeError> {
        match value {
            Value::String(_) => Ok(self.string_bytes(value).map_or(0, |s| s.len())),
            Value::Table(h) => Ok(self.heap.get_table(h).map_or(0, |t| t.len())),
            other => Err(RuntimeError::raised(format!(
                "attempt to get length of a {} value",
                other.kind()
            ))),
        }
    }

    /// Sequence part of a table, in order.
    pub fn table_to_vec(&self, table: Value) -> Result<Vec<Value>, RuntimeError> {
        let Value::Table(h) = table else {
            return Err(not_a_table(table));
        };
        Ok(self
            .heap
            .get_table(h)
            .map(|t| t.array.clone())
            .unwrap_or_default())
    }

    /// Sequence of strings as owned Rust strings (lossy UTF-8).
    pub fn table_strings(&self, table: Value) -> Result<Vec<String>, RuntimeError> {
        Ok(self
            .table_to_vec(table)?
            .into_iter()
            .map(|v| self.to_display(v))
            .collect())
    }

    /// Helper to format values for display.
    pub fn to_display(&self, value: Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(_) | Value::Float(_) => format_number(value).unwrap_or_default(),
            Value::String(_) => self
                .string_bytes(value)
                .map(|s| String::from_utf8_lossy(&s).into_owned())
                .unwrap_or_else(|| "<bad string>".into()),
            Value::Table(h) => format!("table: {:#x}", h),
            Value::Function(h) => match self.natives.get(h as usize) {
                Some(n) => format!("function: builtin '{}'", n.name),
                None => format!("function: {:#x}", h),
            },
            Value::Foreign(r) => match self.heap.foreign_tag(r) {
                Ok(tag) => format!("{}: {}#{}", tag, r.index, r.generation),
                Err(_) => format!("foreign: {}#{} (finalized)", r.index, r.generation),
            },
            Value::Thread(h) => format!("thread: {:#x}", h),
        }
    }
}
