use std::collections::HashMap;

use memory::{Heap, Value};
use serde::Serialize;

use crate::config::RuntimeConfig;
use crate::loader::ModuleLoader;
use crate::native::NativeFunction;

use super::frame::CallFrame;
use super::stack::ValueStack;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Warn,
    Error,
}

/// Non-fatal event recorded on the runtime (finalizer failures, swallowed
/// panics). Mirrors what is sent to `tracing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub target: &'static str,
    pub message: String,
}

/// One embedded runtime instance: value stack, native frames, heap and
/// module registry. Instances share nothing.
pub struct Runtime {
    pub heap: Heap,
    pub(crate) stack: ValueStack,
    pub(crate) frames: Vec<CallFrame>,
    pub(crate) natives: Vec<NativeFunction>,
    pub(crate) native_ids: HashMap<(&'static str, usize), u32>,
    pub(crate) globals: HashMap<String, Value>,
    pub loader: ModuleLoader,
    pub config: RuntimeConfig,
    pub(crate) diagnostics: Vec<Diagnostic>,
    /// Number of `pcall`s currently on the Rust call stack.
    pub(crate) protected_depth: usize,
    closed: bool,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Runtime with default limits and the bundled modules preloaded.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let mut heap = Heap::with_limit(config.heap_limit);
        heap.next_gc_threshold = config.gc_threshold;

        let mut rt = Self {
            heap,
            stack: ValueStack::new(config.stack_limit, config.initial_stack),
            frames: Vec::with_capacity(16),
            natives: Vec::new(),
            native_ids: HashMap::new(),
            globals: HashMap::new(),
            loader: ModuleLoader::new(),
            config,
            diagnostics: Vec::new(),
            protected_depth: 0,
            closed: false,
        };

        crate::stdlib::open_all(&mut rt.loader);

        rt
    }

    /// Finalizes every foreign handle that still owns a payload, newest
    /// first. Can be called again: handles created after an earlier close
    /// are finalized by the next one, and drop always closes.
    pub fn close(&mut self) {
        self.closed = true;
        self.stack.truncate(0);
        self.frames.clear();
        self.protected_depth = 0;
        let jobs = self.heap.drain_foreign();
        if jobs.is_empty() {
            return;
        }
        tracing::debug!(target: "satell::gc", handles = jobs.len(), "closing runtime");
        for job in jobs {
            self.run_finalizer(job);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Nesting depth of native frames currently executing.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn diagnostics_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.diagnostics)
    }

    /// Callers emit the matching `tracing` event themselves; targets must be
    /// literals there.
    pub(crate) fn record(&mut self, level: DiagnosticLevel, target: &'static str, message: String) {
        self.diagnostics.push(Diagnostic {
            level,
            target,
            message,
        });
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.close();
    }
}
