use std::any::Any;

use memory::{Finalizer, ForeignRef, ForeignState, Kind, TypeTag, Value};

use crate::error::RuntimeError;

use super::runtime::Runtime;

/// Foreign handles from the module author's side.
impl Runtime {
    /// Wrap `payload` in a collectable handle. The handle stays rooted until
    /// it is first pushed or stored in a table.
    pub fn new_foreign<T: Any>(
        &mut self,
        tag: TypeTag,
        payload: T,
        finalizer: Option<Finalizer<T>>,
    ) -> Result<Value, RuntimeError> {
        let handle = self.heap.alloc_foreign(tag, payload, finalizer)?;
        tracing::trace!(target: "satell::foreign", tag = %tag, index = handle.index, "constructed");
        Ok(Value::foreign(handle))
    }

    /// `new_foreign` and push.
    pub fn push_foreign<T: Any>(
        &mut self,
        tag: TypeTag,
        payload: T,
        finalizer: Option<Finalizer<T>>,
    ) -> Result<Value, RuntimeError> {
        let value = self.new_foreign(tag, payload, finalizer)?;
        self.push_value(value)?;
        Ok(value)
    }

    /// Type-tagged access to a handle's payload.
    pub fn with_foreign<T: Any, R>(
        &mut self,
        value: Value,
        tag: TypeTag,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, RuntimeError> {
        let Value::Foreign(handle) = value else {
            return Err(RuntimeError::raised(format!(
                "'{}' expected, got {}",
                tag,
                value.kind()
            )));
        };
        self.access(handle, tag, f)
    }

    /// Argument form of `with_foreign`: the value at `index` must be a
    /// foreign handle tagged `tag`.
    pub fn check_foreign<T: Any, R>(
        &mut self,
        index: i32,
        tag: TypeTag,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, RuntimeError> {
        match self.value_at(index) {
            Value::Foreign(handle) => self.access(handle, tag, f),
            other => Err(RuntimeError::TypeMismatch {
                expected: Kind::Foreign,
                actual: other.kind(),
                index,
            }),
        }
    }

    fn access<T: Any, R>(
        &mut self,
        handle: ForeignRef,
        tag: TypeTag,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, RuntimeError> {
        match self.heap.foreign_mut::<T>(handle, tag) {
            Ok(payload) => Ok(f(payload)),
            Err(e) => {
                let err = RuntimeError::from(e);
                if matches!(err, RuntimeError::UseAfterFinalize { .. }) {
                    tracing::error!(
                        target: "satell::foreign",
                        tag = %tag,
                        index = handle.index,
                        generation = handle.generation,
                        "access to finalized handle"
                    );
                }
                Err(err)
            }
        }
    }

    /// Finalize a handle now (explicit `close()`). The collector will not
    /// run its finalizer again.
    pub fn close_foreign(&mut self, value: Value, tag: TypeTag) -> Result<(), RuntimeError> {
        let Value::Foreign(handle) = value else {
            return Err(RuntimeError::raised(format!(
                "'{}' expected, got {}",
                tag,
                value.kind()
            )));
        };
        let job = match self.heap.release_foreign(handle, tag) {
            Ok(job) => job,
            Err(e) => {
                let err = RuntimeError::from(e);
                if matches!(err, RuntimeError::UseAfterFinalize { .. }) {
                    tracing::error!(target: "satell::foreign", tag = %tag, index = handle.index, "close of finalized handle");
                }
                return Err(err);
            }
        };
        tracing::debug!(target: "satell::foreign", tag = %tag, index = handle.index, "closed");
        self.run_finalizer(job);
        Ok(())
    }

    /// Lifecycle state of a handle; `None` for non-foreign values.
    pub fn foreign_state(&self, value: Value) -> Option<ForeignState> {
        value.as_foreign().map(|h| self.heap.foreign_state(h))
    }
}
