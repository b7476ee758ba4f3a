use crate::error::RuntimeError;
use crate::marshal::FromStack;
use crate::native::{Arity, NativeFunction, Results};

/// Sequential argument position within a frame (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgCursor {
    next: usize,
}

impl ArgCursor {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Index the next `advance` will hand out.
    pub fn position(&self) -> usize {
        self.next
    }

    fn advance(&mut self) -> usize {
        let idx = self.next;
        self.next += 1;
        idx
    }
}

impl Default for ArgCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// Represents a single native invocation on the value stack.
///
/// Each frame tracks:
/// - `base`: absolute slot of argument 1
/// - `nargs`: arguments supplied by the caller
/// - the callee's declared arity and result contract
/// - `cursor`: next argument for sequential reads
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub base: usize,
    pub nargs: usize,
    pub name: &'static str,
    pub arity: Arity,
    pub results: Results,
    pub cursor: ArgCursor,
}

impl CallFrame {
    pub fn new(native: &NativeFunction, base: usize, nargs: usize) -> Self {
        Self {
            base,
            nargs,
            name: native.name,
            arity: native.arity,
            results: native.results,
            cursor: ArgCursor::new(),
        }
    }
}

/// Sequential argument consumption for native bodies.
impl super::Runtime {
    fn advance_cursor(&mut self) -> i32 {
        match self.frames.last_mut() {
            Some(frame) => frame.cursor.advance() as i32,
            None => 1,
        }
    }

    /// Read the next argument as `T`, failing with the standard diagnostic
    /// for its position.
    pub fn next_arg<T: FromStack>(&mut self) -> Result<T, RuntimeError> {
        let idx = self.advance_cursor();
        T::read_from(self, idx)
    }

    /// Like `next_arg`, but a nil or missing argument yields `None`.
    pub fn next_optional<T: FromStack>(&mut self) -> Result<Option<T>, RuntimeError> {
        let idx = self.advance_cursor();
        <Option<T>>::read_from(self, idx)
    }

    /// Position of the next argument `next_arg` will read.
    pub fn arg_position(&self) -> usize {
        self.frames.last().map_or(1, |f| f.cursor.position())
    }

    /// Name of the native function currently executing.
    pub fn current_function(&self) -> Option<&'static str> {
        self.frames.last().map(|f| f.name)
    }
}
