//! Machine module - runtime implementation
//!
//! The runtime is split into focused submodules, each adding one concern to
//! `Runtime`: stack access, frames, calls, tables, foreign handles, the
//! collector and native registration.

mod control;
mod data;
mod foreign;
mod frame;
mod gc;
mod native;
mod runtime;
mod stack;

// Public API
pub use control::{CallStatus, ControlFlowOps};
pub use frame::{ArgCursor, CallFrame};
pub use gc::GarbageCollector;
pub use native::NativeRegistry;
pub use runtime::{Diagnostic, DiagnosticLevel, Runtime};
pub use stack::ValueStack;
