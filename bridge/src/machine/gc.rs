use std::panic::AssertUnwindSafe;

use memory::{FinalizeJob, Value};

use crate::panic_boundary::catch_panic;

use super::runtime::{DiagnosticLevel, Runtime};

/// Trait for garbage collection operations
pub trait GarbageCollector {
    fn collect_garbage(&mut self);
    fn mark_roots(&self) -> Vec<Value>;
}

impl GarbageCollector for Runtime {
    fn collect_garbage(&mut self) {
        let before = self.heap.bytes_allocated;

        let roots = self.mark_roots();
        self.heap.trace(roots);
        let report = self.heap.sweep();

        let finalized = report.finalize.len();
        for job in report.finalize {
            self.run_finalizer(job);
        }

        // Dynamic threshold: double the live size, never below the configured floor.
        self.heap.next_gc_threshold =
            std::cmp::max(self.heap.bytes_allocated * 2, self.config.gc_threshold);

        tracing::debug!(
            target: "satell::gc",
            before,
            after = self.heap.bytes_allocated,
            strings = report.strings_freed,
            tables = report.tables_freed,
            threads = report.threads_freed,
            finalized,
            "collection finished"
        );
    }

    fn mark_roots(&self) -> Vec<Value> {
        let mut roots = Vec::new();

        // 1. Stack
        roots.extend_from_slice(self.stack.as_slice());

        // 2. Globals
        roots.extend(self.globals.values().copied());

        // 3. Loaded module tables
        roots.extend(self.loader.loaded_values());

        roots
    }
}

impl Runtime {
    /// Collect when the allocation threshold has been crossed. Only called
    /// between host-level calls, when no native body holds unanchored values.
    pub(crate) fn step_gc(&mut self) {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
    }

    /// Run one finalizer behind the panic boundary. Failures become warning
    /// diagnostics; the handle is tombstoned either way.
    pub(crate) fn run_finalizer(&mut self, job: FinalizeJob) {
        let target = job.target;
        let tag = job.tag;
        let failure = match catch_panic(AssertUnwindSafe(|| job.run())) {
            Ok(Ok(())) => None,
            Ok(Err(msg)) => Some(msg),
            Err(panic) => Some(panic.to_string()),
        };
        self.heap.complete_finalization(target);

        if let Some(msg) = failure {
            let message = format!("finalizer for '{}' #{} failed: {}", tag, target.index, msg);
            tracing::warn!(target: "satell::gc", "{message}");
            self.record(DiagnosticLevel::Warn, "satell::gc", message);
        } else {
            tracing::trace!(target: "satell::gc", tag = %tag, index = target.index, "finalized");
        }
    }
}
