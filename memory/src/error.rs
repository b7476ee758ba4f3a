use thiserror::Error;

use crate::foreign::{ForeignRef, TypeTag};
use crate::value::Kind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error("attempt to use finalized foreign handle #{}", handle.index)]
    UseAfterFinalize { handle: ForeignRef },

    #[error("foreign handle type mismatch ('{expected}' expected, got '{actual}')")]
    ForeignTypeMismatch { expected: TypeTag, actual: TypeTag },

    #[error("not enough memory")]
    OutOfMemory,

    #[error("dangling {kind} handle {handle}")]
    Dangling { kind: Kind, handle: u32 },
}
