use std::fmt;

use crate::error::RuntimeError;
use crate::machine::Runtime;

// The unified signature for ALL extensions (bundled or external).
// Arguments are read from the current frame; results are pushed onto the
// stack and the return value says how many were pushed.
pub type NativeFn = fn(rt: &mut Runtime) -> Result<usize, RuntimeError>;

/// Accepted argument count range. `max: None` is variadic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    pub const ANY: Arity = Arity::at_least(0);

    pub const fn exact(n: usize) -> Self {
        Self {
            min: n,
            max: Some(n),
        }
    }

    pub const fn range(min: usize, max: usize) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    pub const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.map_or(true, |max| count <= max)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "[{},{}]", self.min, max),
            None => write!(f, "[{},inf)", self.min),
        }
    }
}

/// Declared result count. `Variable` must be chosen explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Results {
    Fixed(usize),
    Variable,
}

/// Name + entry point + calling contract of one exported function.
#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub func: NativeFn,
    pub arity: Arity,
    pub results: Results,
}

impl NativeFunction {
    pub const fn new(name: &'static str, func: NativeFn, arity: Arity, results: Results) -> Self {
        Self {
            name,
            func,
            arity,
            results,
        }
    }

    /// Identity used to deduplicate registrations.
    pub(crate) fn identity(&self) -> (&'static str, usize) {
        (self.name, self.func as usize)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("results", &self.results)
            .finish()
    }
}
