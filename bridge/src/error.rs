use std::fmt;
use std::panic::Location;

use memory::{ForeignRef, HeapError, Kind, TypeTag};
use serde::Serialize;
use thiserror::Error;

use crate::native::Arity;

/// Payload of an explicit application error raised by a native function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorValue {
    pub message: String,
    pub location: Option<String>,
}

impl ErrorValue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    /// Error value tagged with the caller's source location.
    #[track_caller]
    pub fn here(message: impl Into<String>) -> Self {
        let loc = Location::caller();
        Self {
            message: message.into(),
            location: Some(format!("{}:{}", loc.file(), loc.line())),
        }
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}: {}", loc, self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("wrong number of arguments to '{function}' (expected {expected}, got {actual})")]
    Arity {
        function: String,
        expected: Arity,
        actual: usize,
    },

    #[error("bad argument #{index} ({expected} expected, got {actual})")]
    TypeMismatch {
        expected: Kind,
        actual: Kind,
        index: i32,
    },

    #[error("bad argument #{index} ({reason})")]
    Coercion { index: i32, reason: String },

    #[error("bad argument #{index} ({message})")]
    InvalidArgument { index: i32, message: String },

    #[error("foreign handle type mismatch ('{expected}' expected, got '{actual}')")]
    ForeignTypeMismatch { expected: TypeTag, actual: TypeTag },

    #[error("attempt to use finalized foreign handle #{}", handle.index)]
    UseAfterFinalize { handle: ForeignRef },

    #[error("stack overflow ({what} limit of {limit} exceeded)")]
    ResourceExhausted { what: &'static str, limit: usize },

    #[error("not enough memory")]
    OutOfMemory,

    #[error("{0}")]
    NativeRaised(ErrorValue),

    #[error("'{function}' must produce {expected} results, produced {actual}")]
    ResultCount {
        function: String,
        expected: usize,
        actual: usize,
    },

    #[error("module '{name}' not found (no entry point '{symbol}')")]
    ModuleNotFound { name: String, symbol: String },
}

impl RuntimeError {
    /// Explicit application error at the caller's location.
    #[track_caller]
    pub fn raised(message: impl Into<String>) -> Self {
        RuntimeError::NativeRaised(ErrorValue::here(message))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::Arity { .. } => ErrorKind::ArityError,
            RuntimeError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            RuntimeError::Coercion { .. } => ErrorKind::CoercionError,
            RuntimeError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            RuntimeError::ForeignTypeMismatch { .. } => ErrorKind::ForeignTypeMismatch,
            RuntimeError::UseAfterFinalize { .. } => ErrorKind::UseAfterFinalize,
            RuntimeError::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            RuntimeError::OutOfMemory => ErrorKind::OutOfMemory,
            RuntimeError::NativeRaised(_) => ErrorKind::NativeRaised,
            RuntimeError::ResultCount { .. } => ErrorKind::ResultCount,
            RuntimeError::ModuleNotFound { .. } => ErrorKind::ModuleNotFound,
        }
    }

    /// Originating location, when the error carries one.
    pub fn location(&self) -> Option<&str> {
        match self {
            RuntimeError::NativeRaised(v) => v.location.as_deref(),
            _ => None,
        }
    }
}

impl From<HeapError> for RuntimeError {
    fn from(e: HeapError) -> Self {
        match e {
            HeapError::UseAfterFinalize { handle } => RuntimeError::UseAfterFinalize { handle },
            HeapError::ForeignTypeMismatch { expected, actual } => {
                RuntimeError::ForeignTypeMismatch { expected, actual }
            }
            HeapError::OutOfMemory => RuntimeError::OutOfMemory,
            HeapError::Dangling { .. } => RuntimeError::NativeRaised(ErrorValue::new(e.to_string())),
        }
    }
}

/// Script-visible error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    ArityError,
    TypeMismatch,
    CoercionError,
    InvalidArgument,
    ForeignTypeMismatch,
    UseAfterFinalize,
    ResourceExhausted,
    OutOfMemory,
    NativeRaised,
    ResultCount,
    ModuleNotFound,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::ArityError => "ArityError",
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::CoercionError => "CoercionError",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::ForeignTypeMismatch => "ForeignTypeMismatch",
            ErrorKind::UseAfterFinalize => "UseAfterFinalize",
            ErrorKind::ResourceExhausted => "ResourceExhausted",
            ErrorKind::OutOfMemory => "OutOfMemory",
            ErrorKind::NativeRaised => "NativeRaised",
            ErrorKind::ResultCount => "ResultCount",
            ErrorKind::ModuleNotFound => "ModuleNotFound",
        }
    }

    /// Caught at the nearest protected call and handed to script as a value.
    pub fn is_recoverable(self) -> bool {
        !self.is_fatal()
    }

    /// Native code broke the bridge contract. Still catchable, logged loudly.
    pub fn is_programming_error(self) -> bool {
        matches!(self, ErrorKind::UseAfterFinalize | ErrorKind::ResultCount)
    }

    /// Propagates to the outermost protected call without being retried.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::OutOfMemory)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_message() {
        let err = RuntimeError::Arity {
            function: "split".into(),
            expected: Arity::exact(2),
            actual: 1,
        };
        assert_eq!(
            err.to_string(),
            "wrong number of arguments to 'split' (expected [2,2], got 1)"
        );
        assert_eq!(err.kind(), ErrorKind::ArityError);
    }

    #[test]
    fn test_type_mismatch_message() {
        let err = RuntimeError::TypeMismatch {
            expected: Kind::Integer,
            actual: Kind::Table,
            index: 1,
        };
        assert_eq!(err.to_string(), "bad argument #1 (integer expected, got table)");
    }

    #[test]
    fn test_raised_captures_location() {
        let err = RuntimeError::raised("boom");
        let loc = err.location().expect("location");
        assert!(loc.contains("error.rs"), "{loc}");
        assert!(err.to_string().ends_with(": boom"));
    }

    #[test]
    fn test_heap_errors_convert() {
        let handle = ForeignRef {
            index: 1,
            generation: 0,
        };
        let err: RuntimeError = HeapError::UseAfterFinalize { handle }.into();
        assert_eq!(err, RuntimeError::UseAfterFinalize { handle });
        let err: RuntimeError = HeapError::OutOfMemory.into();
        assert!(err.kind().is_fatal());
    }

    #[test]
    fn test_error_classes() {
        assert!(ErrorKind::TypeMismatch.is_recoverable());
        assert!(ErrorKind::UseAfterFinalize.is_programming_error());
        assert!(ErrorKind::UseAfterFinalize.is_recoverable());
        assert!(!ErrorKind::OutOfMemory.is_recoverable());
    }
}
