pub mod config;
pub mod error;
pub mod loader;
pub mod logging;
pub mod machine;
pub mod marshal;
pub mod module;
pub mod native;
pub mod panic_boundary;
pub mod stdlib;

pub use config::{ConfigError, LogConfig, LogFormat, PanicPolicy, RuntimeConfig};
pub use error::{ErrorKind, ErrorValue, RuntimeError};
pub use loader::{ModuleEntry, ModuleLoader};
pub use machine::{
    CallStatus, ControlFlowOps, Diagnostic, DiagnosticLevel, GarbageCollector, NativeRegistry,
    Runtime,
};
pub use marshal::{ByteStr, FromStack, IntoStack, Typed};
pub use module::{entry_symbol, ModuleDef};
pub use native::{Arity, NativeFn, NativeFunction, Results};

pub use memory::{Finalizer, ForeignRef, ForeignState, Kind, TypeTag, Value};
