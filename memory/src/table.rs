use std::collections::{HashMap, TryReserveError};
use std::rc::Rc;

use crate::foreign::ForeignRef;
use crate::value::Value;

/// Normalized table key.
///
/// String keys hold the bytes themselves so lookups compare by content.
/// Floats with an integral value are stored as `Int`, which is why `Float`
/// only ever carries a non-integral, non-NaN bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TableKey {
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(Rc<[u8]>),
    Table(u32),
    Function(u32),
    Foreign(ForeignRef),
    Thread(u32),
}

impl TableKey {
    pub fn str(s: &str) -> Self {
        TableKey::Str(Rc::from(s.as_bytes()))
    }

    /// Float key normalization. `None` for NaN.
    pub fn from_float(f: f64) -> Option<Self> {
        if f.is_nan() {
            None
        } else if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
            Some(TableKey::Int(f as i64))
        } else {
            Some(TableKey::Float(f.to_bits()))
        }
    }

    /// Heap reference carried by the key, for tracing.
    pub fn as_ref_value(&self) -> Option<Value> {
        match self {
            TableKey::Table(h) => Some(Value::table(*h)),
            TableKey::Function(h) => Some(Value::function(*h)),
            TableKey::Thread(h) => Some(Value::thread(*h)),
            TableKey::Foreign(r) => Some(Value::foreign(*r)),
            TableKey::Bool(_) | TableKey::Int(_) | TableKey::Float(_) | TableKey::Str(_) => None,
        }
    }
}

/// Associative container with an array region (`1..=array.len()`) and a
/// hash region for everything else.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub array: Vec<Value>,
    pub hash: HashMap<TableKey, Value>,
    /// Bytes the heap has charged for this table; released on sweep.
    pub(crate) charged: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(narr: usize, nrec: usize) -> Self {
        Self {
            array: Vec::with_capacity(narr),
            hash: HashMap::with_capacity(nrec),
            charged: 0,
        }
    }

    pub fn get(&self, key: &TableKey) -> Value {
        if let TableKey::Int(i) = key {
            if let Some(v) = self.array_slot(*i) {
                return *v;
            }
        }
        self.hash.get(key).copied().unwrap_or(Value::Nil)
    }

    pub fn get_int(&self, i: i64) -> Value {
        self.get(&TableKey::Int(i))
    }

    /// Assigning nil removes the entry.
    pub fn set(&mut self, key: TableKey, value: Value) {
        if let TableKey::Int(i) = key {
            let len = self.array.len() as i64;
            if i >= 1 && i <= len {
                self.array[(i - 1) as usize] = value;
                if value.is_nil() && i == len {
                    self.trim_array();
                }
                return;
            }
            if i == len + 1 && !value.is_nil() {
                self.hash.remove(&key);
                self.array.push(value);
                self.migrate_from_hash();
                return;
            }
        }
        if value.is_nil() {
            self.hash.remove(&key);
        } else {
            self.hash.insert(key, value);
        }
    }

    /// Border of the array region (the `#` operator on sequences).
    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty() && self.hash.is_empty()
    }

    /// Every value and every heap-referencing key, for the mark phase.
    pub fn references(&self) -> impl Iterator<Item = Value> + '_ {
        self.array
            .iter()
            .copied()
            .chain(self.hash.values().copied())
            .chain(self.hash.keys().filter_map(TableKey::as_ref_value))
            .filter(Value::is_obj)
    }

    /// Grow capacity so that `set(key, value)` will not reallocate.
    pub(crate) fn reserve_for(&mut self, key: &TableKey, value: Value) -> Result<(), TryReserveError> {
        if value.is_nil() {
            return Ok(());
        }
        if let TableKey::Int(i) = *key {
            let len = self.array.len() as i64;
            if i >= 1 && i <= len {
                return Ok(());
            }
            if i == len + 1 {
                // The push plus every hash entry it pulls into the array.
                let mut extra = 1;
                while self.hash.contains_key(&TableKey::Int(len + 1 + extra as i64)) {
                    extra += 1;
                }
                return self.array.try_reserve(extra);
            }
        }
        if self.hash.contains_key(key) {
            Ok(())
        } else {
            self.hash.try_reserve(1)
        }
    }

    pub(crate) fn shrink_to(&mut self, array: usize, hash: usize) {
        self.array.shrink_to(array);
        self.hash.shrink_to(hash);
    }

    pub(crate) fn capacities(&self) -> (usize, usize) {
        (self.array.capacity(), self.hash.capacity())
    }

    pub(crate) fn approx_size(&self) -> usize {
        self.array.capacity() * std::mem::size_of::<Value>()
            + self.hash.capacity()
                * (std::mem::size_of::<TableKey>() + std::mem::size_of::<Value>())
    }

    fn array_slot(&self, i: i64) -> Option<&Value> {
        if i >= 1 {
            self.array.get((i - 1) as usize)
        } else {
            None
        }
    }

    fn trim_array(&mut self) {
        while matches!(self.array.last(), Some(Value::Nil)) {
            self.array.pop();
        }
    }

    fn migrate_from_hash(&mut self) {
        loop {
            let next = TableKey::Int(self.array.len() as i64 + 1);
            match self.hash.remove(&next) {
                Some(v) => self.array.push(v),
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ints_use_array_region() {
        let mut t = Table::new();
        t.set(TableKey::Int(1), Value::int(10));
        t.set(TableKey::Int(2), Value::int(20));
        assert_eq!(t.array.len(), 2);
        assert!(t.hash.is_empty());
        assert_eq!(t.get_int(2), Value::int(20));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_out_of_order_keys_migrate_into_array() {
        let mut t = Table::new();
        t.set(TableKey::Int(3), Value::int(3));
        t.set(TableKey::Int(2), Value::int(2));
        assert_eq!(t.len(), 0);
        t.set(TableKey::Int(1), Value::int(1));
        assert_eq!(t.len(), 3);
        assert!(t.hash.is_empty());
    }

    #[test]
    fn test_nil_assignment_removes() {
        let mut t = Table::new();
        t.set(TableKey::str("k"), Value::bool(true));
        t.set(TableKey::Int(1), Value::int(1));
        t.set(TableKey::str("k"), Value::nil());
        t.set(TableKey::Int(1), Value::nil());
        assert!(t.is_empty());
        assert_eq!(t.get(&TableKey::str("k")), Value::Nil);
    }

    #[test]
    fn test_float_keys_normalize() {
        assert_eq!(TableKey::from_float(2.0), Some(TableKey::Int(2)));
        assert_eq!(TableKey::from_float(f64::NAN), None);
        assert!(matches!(TableKey::from_float(0.5), Some(TableKey::Float(_))));
    }

    #[test]
    fn test_references_skip_immediates() {
        let mut t = Table::new();
        t.set(TableKey::Int(1), Value::int(1));
        t.set(TableKey::Table(9), Value::table(4));
        let refs: Vec<Value> = t.references().collect();
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&Value::table(4)));
        assert!(refs.contains(&Value::table(9)));
    }
}
