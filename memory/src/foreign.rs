//! Foreign handles: opaque native payloads owned by the collector.
//!
//! A slot moves through `Constructed -> Live -> Finalizing -> Tombstoned`.
//! The heap decides *when* a slot dies; the native side owns the payload
//! until its finalizer has run. Once the finalizer is handed out the payload
//! is gone from the slot, so nothing can reach it through the heap again.

use std::any::{Any, TypeId};
use std::fmt;

use crate::error::HeapError;

/// Runtime type tag attached to every foreign payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag(&'static str);

impl TypeTag {
    pub const fn new(name: &'static str) -> Self {
        TypeTag(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.0)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Reference to a foreign slot. The generation changes every time the slot
/// is recycled, so stale references never alias a newer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForeignRef {
    pub index: u32,
    pub generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignState {
    /// Allocated but never published to the stack or a table.
    Constructed,
    Live,
    /// Finalizer handed out; payload no longer reachable through the slot.
    Finalizing,
    Tombstoned,
}

/// Finalizer as seen by module authors: receives the payload only.
pub type Finalizer<T> = Box<dyn FnOnce(&mut T) -> Result<(), String>>;

type ErasedFinalizer = Box<dyn FnOnce(&mut dyn Any) -> Result<(), String>>;

pub struct ForeignSlot {
    tag: TypeTag,
    type_id: TypeId,
    generation: u32,
    state: ForeignState,
    payload: Option<Box<dyn Any>>,
    finalizer: Option<ErasedFinalizer>,
    size: usize,
}

impl ForeignSlot {
    pub(crate) fn new<T: Any>(
        tag: TypeTag,
        payload: T,
        finalizer: Option<Finalizer<T>>,
        generation: u32,
    ) -> Self {
        let finalizer = finalizer.map(|f| -> ErasedFinalizer {
            Box::new(move |any: &mut dyn Any| match any.downcast_mut::<T>() {
                Some(p) => f(p),
                None => Err(format!("payload of '{}' changed type", tag)),
            })
        });
        Self {
            tag,
            type_id: TypeId::of::<T>(),
            generation,
            state: ForeignState::Constructed,
            payload: Some(Box::new(payload)),
            finalizer,
            size: std::mem::size_of::<T>(),
        }
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn state(&self) -> ForeignState {
        self.state
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// `Constructed -> Live`. A no-op in every other state.
    pub(crate) fn publish(&mut self) {
        if self.state == ForeignState::Constructed {
            self.state = ForeignState::Live;
        }
    }

    pub(crate) fn is_accessible(&self) -> bool {
        matches!(self.state, ForeignState::Constructed | ForeignState::Live)
    }

    pub(crate) fn payload_mut<T: Any>(
        &mut self,
        handle: ForeignRef,
        expected: TypeTag,
    ) -> Result<&mut T, HeapError> {
        if !self.is_accessible() {
            return Err(HeapError::UseAfterFinalize { handle });
        }
        if self.tag != expected || self.type_id != TypeId::of::<T>() {
            return Err(HeapError::ForeignTypeMismatch {
                expected,
                actual: self.tag,
            });
        }
        self.payload
            .as_mut()
            .and_then(|p| p.downcast_mut::<T>())
            .ok_or(HeapError::UseAfterFinalize { handle })
    }

    /// `Live|Constructed -> Finalizing`: moves payload and finalizer into a job.
    pub(crate) fn begin_finalization(&mut self, handle: ForeignRef) -> Option<FinalizeJob> {
        if !self.is_accessible() {
            return None;
        }
        self.state = ForeignState::Finalizing;
        let mut payload = self.payload.take()?;
        let finalizer = self.finalizer.take();
        Some(FinalizeJob {
            target: handle,
            tag: self.tag,
            run: Box::new(move || {
                let result = match finalizer {
                    Some(f) => f(payload.as_mut()),
                    None => Ok(()),
                };
                drop(payload);
                result
            }),
        })
    }

    /// `Finalizing -> Tombstoned`.
    pub(crate) fn tombstone(&mut self) {
        self.payload = None;
        self.finalizer = None;
        self.state = ForeignState::Tombstoned;
    }
}

impl fmt::Debug for ForeignSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignSlot")
            .field("tag", &self.tag)
            .field("generation", &self.generation)
            .field("state", &self.state)
            .finish()
    }
}

/// A pending finalizer together with the payload it consumes.
///
/// The heap never runs finalizers itself; the owner of the panic boundary
/// runs the job and reports back with `Heap::complete_finalization`.
pub struct FinalizeJob {
    pub target: ForeignRef,
    pub tag: TypeTag,
    run: Box<dyn FnOnce() -> Result<(), String>>,
}

impl FinalizeJob {
    /// Runs the finalizer (if any) and drops the payload.
    pub fn run(self) -> Result<(), String> {
        (self.run)()
    }
}

impl fmt::Debug for FinalizeJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinalizeJob")
            .field("target", &self.target)
            .field("tag", &self.tag)
            .finish()
    }
}
