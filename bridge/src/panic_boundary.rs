//! Panic-vs-result boundary for native code.
//!
//! Panics are reserved for native-side programmer errors. They must never
//! cross into the runtime's frames, so every native entry point and every
//! finalizer runs behind [`catch_panic`]. What happens to a caught panic is
//! decided by the runtime's [`PanicPolicy`](crate::config::PanicPolicy).

use std::any::Any;
use std::fmt;
use std::panic::{self, UnwindSafe};

/// A caught panic with its message extracted.
#[derive(Debug, Clone)]
pub struct PanicError {
    message: String,
    payload_kind: PayloadKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadKind {
    Text,
    Opaque,
}

impl PanicError {
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        match extract_panic_message(&payload) {
            Some(message) => Self {
                message,
                payload_kind: PayloadKind::Text,
            },
            None => Self {
                message: "unknown panic payload".to_string(),
                payload_kind: PayloadKind::Opaque,
            },
        }
    }

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload_kind: PayloadKind::Text,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn had_text_payload(&self) -> bool {
        self.payload_kind == PayloadKind::Text
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "native panic: {}", self.message)
    }
}

impl std::error::Error for PanicError {}

/// Handles `&str` and `String` payloads.
fn extract_panic_message(payload: &Box<dyn Any + Send>) -> Option<String> {
    if let Some(s) = payload.downcast_ref::<&str>() {
        Some((*s).to_string())
    } else {
        payload.downcast_ref::<String>().cloned()
    }
}

/// Run `f`, turning a panic into `Err(PanicError)` and keeping the payload
/// for callers that want to resume it.
pub fn catch_panic_raw<T>(
    f: impl FnOnce() -> T + UnwindSafe,
) -> Result<T, (PanicError, Box<dyn Any + Send>)> {
    panic::catch_unwind(f).map_err(|payload| {
        let err = match extract_panic_message(&payload) {
            Some(message) => PanicError::new(message),
            None => PanicError {
                message: "unknown panic payload".to_string(),
                payload_kind: PayloadKind::Opaque,
            },
        };
        (err, payload)
    })
}

/// Run `f`, turning a panic into `Err(PanicError)`.
pub fn catch_panic<T>(f: impl FnOnce() -> T + UnwindSafe) -> Result<T, PanicError> {
    panic::catch_unwind(f).map_err(PanicError::from_payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catch_panic_on_success() {
        assert_eq!(catch_panic(|| 42).unwrap(), 42);
    }

    #[test]
    fn catch_panic_on_str_panic() {
        let err = catch_panic(|| -> i32 { panic!("boom") }).unwrap_err();
        assert_eq!(err.message(), "boom");
        assert_eq!(err.to_string(), "native panic: boom");
        assert!(err.had_text_payload());
    }

    #[test]
    fn catch_panic_on_formatted_panic() {
        let err = catch_panic(|| -> i32 {
            let idx = 9;
            panic!("index {} out of range", idx);
        })
        .unwrap_err();
        assert_eq!(err.message(), "index 9 out of range");
    }

    #[test]
    fn catch_panic_unknown_payload() {
        let err = catch_panic(|| -> i32 { std::panic::panic_any(42_i32) }).unwrap_err();
        assert_eq!(err.message(), "unknown panic payload");
        assert!(!err.had_text_payload());
    }

    #[test]
    fn catch_panic_raw_keeps_payload() {
        let (err, payload) = catch_panic_raw(|| -> () { panic!("kept") }).unwrap_err();
        assert_eq!(err.message(), "kept");
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"kept"));
    }
}
