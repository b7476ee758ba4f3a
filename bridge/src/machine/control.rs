use std::panic::{self, AssertUnwindSafe};

use memory::Value;

use crate::config::PanicPolicy;
use crate::error::{ErrorValue, RuntimeError};
use crate::native::{NativeFunction, Results};
use crate::panic_boundary::catch_panic_raw;

use super::frame::CallFrame;
use super::gc::GarbageCollector;
use super::runtime::{DiagnosticLevel, Runtime};

/// Outcome of a protected call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallStatus {
    /// Number of results left on the stack.
    Returned(usize),
    /// The callee raised; the stack is back below the function slot.
    Failed(RuntimeError),
}

impl CallStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, CallStatus::Returned(_))
    }

    pub fn error(&self) -> Option<&RuntimeError> {
        match self {
            CallStatus::Failed(e) => Some(e),
            CallStatus::Returned(_) => None,
        }
    }
}

/// Trait for calling into native functions through the value stack
pub trait ControlFlowOps {
    /// Call the function sitting below the top `nargs` values. On return the
    /// function slot and arguments are replaced by the results, adjusted to
    /// `want` when given. Returns the number of results left.
    fn call(&mut self, nargs: usize, want: Option<usize>) -> Result<usize, RuntimeError>;

    /// `call`, but a raise becomes `CallStatus::Failed`. Out-of-memory keeps
    /// unwinding until the outermost protected call.
    fn pcall(&mut self, nargs: usize, want: Option<usize>) -> Result<CallStatus, RuntimeError>;
}

impl ControlFlowOps for Runtime {
    fn call(&mut self, nargs: usize, want: Option<usize>) -> Result<usize, RuntimeError> {
        let func_slot = self.callee_slot(nargs)?;
        let result = self.call_at(func_slot, nargs, want);
        if result.is_err() {
            self.stack.truncate(func_slot);
        }
        if self.frames.is_empty() {
            self.step_gc();
        }
        result
    }

    fn pcall(&mut self, nargs: usize, want: Option<usize>) -> Result<CallStatus, RuntimeError> {
        let func_slot = self.callee_slot(nargs)?;
        let depth = self.frames.len();

        self.protected_depth += 1;
        let result = catch_panic_raw(AssertUnwindSafe(|| self.call(nargs, want)));
        self.protected_depth -= 1;
        let result = match result {
            Ok(result) => result,
            Err((_, payload)) => {
                self.stack.truncate(func_slot);
                self.frames.truncate(depth);
                panic::resume_unwind(payload)
            }
        };

        match result {
            Ok(n) => Ok(CallStatus::Returned(n)),
            Err(err) => {
                self.stack.truncate(func_slot);
                self.frames.truncate(depth);
                if matches!(err, RuntimeError::OutOfMemory) && self.protected_depth > 0 {
                    return Err(err);
                }
                let kind = err.kind();
                if kind.is_fatal() || kind.is_programming_error() {
                    tracing::error!(target: "satell::call", kind = %kind, "{err}");
                } else {
                    tracing::debug!(target: "satell::call", kind = %kind, "{err}");
                }
                Ok(CallStatus::Failed(err))
            }
        }
    }
}

impl Runtime {
    fn callee_slot(&self, nargs: usize) -> Result<usize, RuntimeError> {
        let available = self.gettop();
        if nargs >= available {
            return Err(RuntimeError::raised(format!(
                "call expects a function and {} arguments, frame holds {} values",
                nargs, available
            )));
        }
        Ok(self.stack.len() - nargs - 1)
    }

    fn call_at(
        &mut self,
        func_slot: usize,
        nargs: usize,
        want: Option<usize>,
    ) -> Result<usize, RuntimeError> {
        let callee = self.stack.get(func_slot).unwrap_or(Value::Nil);
        let native = match callee {
            Value::Function(h) => self
                .natives
                .get(h as usize)
                .copied()
                .ok_or_else(|| RuntimeError::raised("attempt to call a dangling function"))?,
            other => {
                return Err(RuntimeError::raised(format!(
                    "attempt to call a non-function value ({})",
                    other.kind()
                )))
            }
        };

        if self.frames.len() >= self.config.max_call_depth {
            return Err(RuntimeError::ResourceExhausted {
                what: "call depth",
                limit: self.config.max_call_depth,
            });
        }

        // Arity before any argument is looked at.
        if !native.arity.accepts(nargs) {
            tracing::debug!(
                target: "satell::call",
                function = native.name,
                expected = %native.arity,
                actual = nargs,
                "arity mismatch"
            );
            return Err(RuntimeError::Arity {
                function: native.name.to_string(),
                expected: native.arity,
                actual: nargs,
            });
        }

        self.stack.ensure(self.config.initial_stack)?;

        let depth = self.frames.len();
        let base = func_slot + 1;
        self.frames.push(CallFrame::new(&native, base, nargs));
        tracing::trace!(target: "satell::call", function = native.name, nargs, depth, "enter");

        let outcome = self.run_native(&native, depth);

        self.frames.truncate(depth);
        tracing::trace!(target: "satell::call", function = native.name, depth, "leave");

        let (claimed, produced) = match outcome? {
            Some(claimed) => (claimed, self.check_results(&native, base, claimed)?),
            // A swallowed panic still yields the declared count, as nils.
            None => {
                let n = match native.results {
                    Results::Fixed(n) => n,
                    Results::Variable => 0,
                };
                self.stack.ensure(n)?;
                for _ in 0..n {
                    self.stack.push(Value::Nil)?;
                }
                (n, n)
            }
        };

        let first = self.stack.len() - claimed;
        self.stack.move_down(first, produced, func_slot);

        match want {
            Some(wanted) if wanted < produced => {
                self.stack.truncate(func_slot + wanted);
                Ok(wanted)
            }
            Some(wanted) => {
                self.stack.ensure(wanted - produced)?;
                for _ in produced..wanted {
                    self.stack.push(Value::Nil)?;
                }
                Ok(wanted)
            }
            None => Ok(produced),
        }
    }

    /// Runs the body behind the panic boundary and applies the panic policy.
    /// `Ok(None)` when a panic was swallowed. A propagated panic leaves the
    /// frames and stack as they were before the call at `depth`.
    fn run_native(
        &mut self,
        native: &NativeFunction,
        depth: usize,
    ) -> Result<Option<usize>, RuntimeError> {
        let func = native.func;
        match catch_panic_raw(AssertUnwindSafe(|| func(self))) {
            Ok(result) => result.map(Some),
            Err((caught, payload)) => match self.config.panic_policy {
                PanicPolicy::CatchAndRaise => {
                    tracing::warn!(target: "satell::call", function = native.name, "{caught}");
                    Err(RuntimeError::NativeRaised(ErrorValue {
                        message: caught.to_string(),
                        location: Some(native.name.to_string()),
                    }))
                }
                PanicPolicy::LogAndSwallow => {
                    tracing::error!(target: "satell::call", function = native.name, "{caught}");
                    self.record(
                        DiagnosticLevel::Error,
                        "satell::call",
                        format!("{}: {}", native.name, caught),
                    );
                    Ok(None)
                }
                PanicPolicy::Propagate => {
                    let func_slot = self
                        .frames
                        .get(depth)
                        .map_or(self.stack.len(), |f| f.base - 1);
                    self.frames.truncate(depth);
                    self.stack.truncate(func_slot);
                    panic::resume_unwind(payload)
                }
            },
        }
    }

    /// Number of results to keep from the `claimed` values on top.
    fn check_results(
        &self,
        native: &NativeFunction,
        base: usize,
        claimed: usize,
    ) -> Result<usize, RuntimeError> {
        let available = self.stack.len().saturating_sub(base);
        if claimed > available {
            return Err(RuntimeError::ResultCount {
                function: native.name.to_string(),
                expected: claimed,
                actual: available,
            });
        }
        match native.results {
            Results::Fixed(n) if claimed < n => Err(RuntimeError::ResultCount {
                function: native.name.to_string(),
                expected: n,
                actual: claimed,
            }),
            Results::Fixed(n) => Ok(n),
            Results::Variable => Ok(claimed),
        }
    }

    /// Error value for an explicit failure at the caller's location
    /// (`return Err(rt.raise("..."))`).
    #[track_caller]
    pub fn raise(&self, message: impl Into<String>) -> RuntimeError {
        let mut value = ErrorValue::here(message);
        if let Some(name) = self.current_function() {
            value.message = format!("{}: {}", name, value.message);
        }
        RuntimeError::NativeRaised(value)
    }

    /// `bad argument #index (message)`.
    pub fn argument_error(&self, index: usize, message: impl Into<String>) -> RuntimeError {
        RuntimeError::InvalidArgument {
            index: index as i32,
            message: message.into(),
        }
    }

    /// Push the script-visible error table: `kind`, `message` and, when
    /// known, `location`.
    pub fn push_error_value(&mut self, err: &RuntimeError) -> Result<Value, RuntimeError> {
        let table = self.create_table(0, 3)?;
        let kind = self.new_string(err.kind().name().as_bytes())?;
        self.set_field(table, "kind", kind)?;
        let message = match err {
            RuntimeError::NativeRaised(v) => v.message.clone(),
            other => other.to_string(),
        };
        let message = self.new_string(message.as_bytes())?;
        self.set_field(table, "message", message)?;
        if let Some(loc) = err.location() {
            let loc = self.new_string(loc.as_bytes())?;
            self.set_field(table, "location", loc)?;
        }
        Ok(table)
    }
}
