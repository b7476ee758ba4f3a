use std::fmt;

use crate::foreign::ForeignRef;

/// Kind tag of a [`Value`]. One per variant, no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Nil,
    Boolean,
    Integer,
    Float,
    String,
    Table,
    Function,
    Foreign,
    Thread,
}

impl Kind {
    pub const ALL: [Kind; 9] = [
        Kind::Nil,
        Kind::Boolean,
        Kind::Integer,
        Kind::Float,
        Kind::String,
        Kind::Table,
        Kind::Function,
        Kind::Foreign,
        Kind::Thread,
    ];

    /// Name used in diagnostics (`integer expected, got table`).
    pub fn name(self) -> &'static str {
        match self {
            Kind::Nil => "nil",
            Kind::Boolean => "boolean",
            Kind::Integer => "integer",
            Kind::Float => "float",
            Kind::String => "string",
            Kind::Table => "table",
            Kind::Function => "function",
            Kind::Foreign => "foreign",
            Kind::Thread => "thread",
        }
    }

    #[inline]
    pub fn is_number(self) -> bool {
        matches!(self, Kind::Integer | Kind::Float)
    }

    /// True for kinds whose payload lives in the heap.
    #[inline]
    pub fn is_obj(self) -> bool {
        matches!(
            self,
            Kind::String | Kind::Table | Kind::Function | Kind::Foreign | Kind::Thread
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stack slot.
///
/// Immediates (nil, booleans, numbers) are stored inline. Everything else is a
/// handle into one of the heap arenas; `Function` handles index the runtime's
/// native function table, which is not collected.
#[derive(Clone, Copy, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(u32),
    Table(u32),
    Function(u32),
    Foreign(ForeignRef),
    Thread(u32),
}

impl Default for Value {
    fn default() -> Self {
        Value::Nil
    }
}

impl Value {
    // --- Constructors ---

    #[inline]
    pub fn nil() -> Self {
        Value::Nil
    }

    #[inline]
    pub fn bool(b: bool) -> Self {
        Value::Bool(b)
    }

    #[inline]
    pub fn int(val: i64) -> Self {
        Value::Int(val)
    }

    #[inline]
    pub fn float(val: f64) -> Self {
        Value::Float(val)
    }

    #[inline]
    pub fn string(handle: u32) -> Self {
        Value::String(handle)
    }

    #[inline]
    pub fn table(handle: u32) -> Self {
        Value::Table(handle)
    }

    #[inline]
    pub fn function(handle: u32) -> Self {
        Value::Function(handle)
    }

    #[inline]
    pub fn foreign(r: ForeignRef) -> Self {
        Value::Foreign(r)
    }

    #[inline]
    pub fn thread(handle: u32) -> Self {
        Value::Thread(handle)
    }

    // --- Checkers ---

    #[inline]
    pub fn kind(&self) -> Kind {
        match self {
            Value::Nil => Kind::Nil,
            Value::Bool(_) => Kind::Boolean,
            Value::Int(_) => Kind::Integer,
            Value::Float(_) => Kind::Float,
            Value::String(_) => Kind::String,
            Value::Table(_) => Kind::Table,
            Value::Function(_) => Kind::Function,
            Value::Foreign(_) => Kind::Foreign,
            Value::Thread(_) => Kind::Thread,
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    #[inline]
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    #[inline]
    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_))
    }

    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, Value::Float(_))
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        self.kind().is_number()
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    #[inline]
    pub fn is_table(&self) -> bool {
        matches!(self, Value::Table(_))
    }

    #[inline]
    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    #[inline]
    pub fn is_foreign(&self) -> bool {
        matches!(self, Value::Foreign(_))
    }

    #[inline]
    pub fn is_obj(&self) -> bool {
        self.kind().is_obj()
    }

    #[inline]
    pub fn is_falsey(&self) -> bool {
        matches!(self, Value::Nil | Value::Bool(false))
    }

    // --- Accessors ---

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[inline]
    pub fn as_foreign(&self) -> Option<ForeignRef> {
        match self {
            Value::Foreign(r) => Some(*r),
            _ => None,
        }
    }

    /// Arena index for heap kinds. Foreign references yield their slot index.
    #[inline]
    pub fn as_handle(&self) -> Option<u32> {
        match self {
            Value::String(h) | Value::Table(h) | Value::Function(h) | Value::Thread(h) => {
                Some(*h)
            }
            Value::Foreign(r) => Some(r.index),
            Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Float(_) => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::String(h) => write!(f, "String({})", h),
            Value::Table(h) => write!(f, "Table({})", h),
            Value::Function(h) => write!(f, "Function({})", h),
            Value::Foreign(r) => write!(f, "Foreign({}#{})", r.index, r.generation),
            Value::Thread(h) => write!(f, "Thread({})", h),
        }
    }
}
