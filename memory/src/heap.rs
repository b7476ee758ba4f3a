use std::any::Any;
use std::collections::HashSet;
use std::rc::Rc;

use crate::error::HeapError;
use crate::foreign::{FinalizeJob, Finalizer, ForeignRef, ForeignSlot, ForeignState, TypeTag};
use crate::table::{Table, TableKey};
use crate::value::{Kind, Value};

/// Minimum collection threshold (1 MiB).
pub const MIN_GC_THRESHOLD: usize = 1024 * 1024;

/// Saved value stack of a coroutine. Only traced here; scheduling belongs to
/// the interpreter.
#[derive(Debug, Clone, Default)]
pub struct ThreadState {
    pub stack: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct Arena<T> {
    pub data: Vec<Option<T>>,
    pub free_indices: Vec<u32>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            free_indices: Vec::new(),
        }
    }

    fn alloc(&mut self, item: T) -> u32 {
        if let Some(idx) = self.free_indices.pop() {
            self.data[idx as usize] = Some(item);
            idx
        } else {
            let index = self.data.len() as u32;
            self.data.push(Some(item));
            index
        }
    }

    fn get(&self, index: u32) -> Option<&T> {
        self.data.get(index as usize).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.data.get_mut(index as usize).and_then(Option::as_mut)
    }

    fn is_free(&self, index: u32) -> bool {
        matches!(self.data.get(index as usize), Some(None))
    }

    fn live(&self) -> usize {
        self.data.iter().filter(|slot| slot.is_some()).count()
    }
}

/// What one sweep reclaimed, plus the finalizers that still have to run.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub strings_freed: usize,
    pub tables_freed: usize,
    pub threads_freed: usize,
    pub finalize: Vec<FinalizeJob>,
}

pub struct Heap {
    // Typed Arenas
    pub strings: Arena<Rc<[u8]>>,
    pub tables: Arena<Table>,
    pub threads: Arena<ThreadState>,
    foreign: Vec<ForeignSlot>,
    free_foreign: Vec<u32>,

    // Mark State (One set per arena type)
    pub marked_strings: HashSet<u32>,
    pub marked_tables: HashSet<u32>,
    pub marked_threads: HashSet<u32>,
    pub marked_foreign: HashSet<u32>,

    // GC Metrics
    pub bytes_allocated: usize,
    pub next_gc_threshold: usize,
    limit: Option<usize>,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Self {
            strings: Arena::new(),
            tables: Arena::new(),
            threads: Arena::new(),
            foreign: Vec::new(),
            free_foreign: Vec::new(),

            marked_strings: HashSet::new(),
            marked_tables: HashSet::new(),
            marked_threads: HashSet::new(),
            marked_foreign: HashSet::new(),

            bytes_allocated: 0,
            next_gc_threshold: MIN_GC_THRESHOLD,
            limit: None,
        }
    }

    /// Heap that refuses allocations once `limit` bytes are in use.
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::new()
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    fn charge(&mut self, bytes: usize) -> Result<(), HeapError> {
        let next = self
            .bytes_allocated
            .checked_add(bytes)
            .ok_or(HeapError::OutOfMemory)?;
        if matches!(self.limit, Some(limit) if next > limit) {
            tracing::error!(
                target: "satell::gc",
                requested = bytes,
                in_use = self.bytes_allocated,
                "heap limit reached"
            );
            return Err(HeapError::OutOfMemory);
        }
        self.bytes_allocated = next;
        Ok(())
    }

    fn release(&mut self, bytes: usize) {
        self.bytes_allocated = self.bytes_allocated.saturating_sub(bytes);
    }

    pub fn should_collect(&self) -> bool {
        self.bytes_allocated > self.next_gc_threshold
    }

    // --- Strings ---

    pub fn alloc_string(&mut self, bytes: &[u8]) -> Result<u32, HeapError> {
        self.charge(bytes.len())?;
        let mut buf = Vec::new();
        if buf.try_reserve_exact(bytes.len()).is_err() {
            self.release(bytes.len());
            return Err(HeapError::OutOfMemory);
        }
        buf.extend_from_slice(bytes);
        Ok(self.strings.alloc(Rc::from(buf)))
    }

    pub fn get_string(&self, index: u32) -> Option<&Rc<[u8]>> {
        self.strings.get(index)
    }

    pub fn is_string_free(&self, index: u32) -> bool {
        self.strings.is_free(index)
    }

    // --- Tables ---

    pub fn alloc_table(&mut self, narr: usize, nrec: usize) -> Result<u32, HeapError> {
        let mut table = Table::with_capacity(narr, nrec);
        table.charged = table.approx_size();
        self.charge(table.charged)?;
        Ok(self.tables.alloc(table))
    }

    /// `t[key] = value`, charging any capacity the write needs. Past the
    /// limit the table is left unchanged and `OutOfMemory` is returned.
    pub fn table_set(&mut self, index: u32, key: TableKey, value: Value) -> Result<(), HeapError> {
        let dangling = HeapError::Dangling {
            kind: Kind::Table,
            handle: index,
        };
        let table = self.tables.get_mut(index).ok_or(dangling.clone())?;
        let (array_cap, hash_cap) = table.capacities();
        table
            .reserve_for(&key, value)
            .map_err(|_| HeapError::OutOfMemory)?;
        let grown = table.approx_size().saturating_sub(table.charged);

        if grown > 0 {
            if let Err(e) = self.charge(grown) {
                if let Some(table) = self.tables.get_mut(index) {
                    table.shrink_to(array_cap, hash_cap);
                }
                return Err(e);
            }
        }
        let table = self.tables.get_mut(index).ok_or(dangling)?;
        table.charged += grown;
        table.set(key, value);
        Ok(())
    }

    pub fn get_table(&self, index: u32) -> Option<&Table> {
        self.tables.get(index)
    }

    pub fn is_table_free(&self, index: u32) -> bool {
        self.tables.is_free(index)
    }

    pub fn is_table_marked(&self, index: u32) -> bool {
        self.marked_tables.contains(&index)
    }

    /// Normalize a value into a table key. `Ok(None)` for nil and NaN.
    pub fn key_for(&self, value: Value) -> Result<Option<TableKey>, HeapError> {
        let key = match value {
            Value::Nil => None,
            Value::Bool(b) => Some(TableKey::Bool(b)),
            Value::Int(i) => Some(TableKey::Int(i)),
            Value::Float(f) => TableKey::from_float(f),
            Value::String(h) => {
                let s = self.get_string(h).ok_or(HeapError::Dangling {
                    kind: Kind::String,
                    handle: h,
                })?;
                Some(TableKey::Str(s.clone()))
            }
            Value::Table(h) => Some(TableKey::Table(h)),
            Value::Function(h) => Some(TableKey::Function(h)),
            Value::Foreign(r) => Some(TableKey::Foreign(r)),
            Value::Thread(h) => Some(TableKey::Thread(h)),
        };
        Ok(key)
    }

    // --- Threads ---

    pub fn alloc_thread(&mut self) -> Result<u32, HeapError> {
        self.charge(std::mem::size_of::<ThreadState>())?;
        Ok(self.threads.alloc(ThreadState::default()))
    }

    pub fn get_thread_mut(&mut self, index: u32) -> Option<&mut ThreadState> {
        self.threads.get_mut(index)
    }

    // --- Foreign handles ---

    pub fn alloc_foreign<T: Any>(
        &mut self,
        tag: TypeTag,
        payload: T,
        finalizer: Option<Finalizer<T>>,
    ) -> Result<ForeignRef, HeapError> {
        self.charge(std::mem::size_of::<T>().max(1))?;
        let (index, generation) = match self.free_foreign.pop() {
            Some(idx) => {
                let generation = self.foreign[idx as usize].generation().wrapping_add(1);
                self.foreign[idx as usize] = ForeignSlot::new(tag, payload, finalizer, generation);
                (idx, generation)
            }
            None => {
                let idx = self.foreign.len() as u32;
                self.foreign.push(ForeignSlot::new(tag, payload, finalizer, 0));
                (idx, 0)
            }
        };
        Ok(ForeignRef { index, generation })
    }

    fn slot(&self, handle: ForeignRef) -> Option<&ForeignSlot> {
        self.foreign
            .get(handle.index as usize)
            .filter(|s| s.generation() == handle.generation)
    }

    fn slot_mut(&mut self, handle: ForeignRef) -> Option<&mut ForeignSlot> {
        self.foreign
            .get_mut(handle.index as usize)
            .filter(|s| s.generation() == handle.generation)
    }

    /// State of the handle's slot. A recycled slot reports `Tombstoned` for
    /// every reference to an earlier generation.
    pub fn foreign_state(&self, handle: ForeignRef) -> ForeignState {
        self.slot(handle)
            .map(ForeignSlot::state)
            .unwrap_or(ForeignState::Tombstoned)
    }

    pub fn foreign_tag(&self, handle: ForeignRef) -> Result<TypeTag, HeapError> {
        match self.slot(handle) {
            Some(slot) if slot.is_accessible() => Ok(slot.tag()),
            _ => Err(HeapError::UseAfterFinalize { handle }),
        }
    }

    pub fn foreign_mut<T: Any>(
        &mut self,
        handle: ForeignRef,
        tag: TypeTag,
    ) -> Result<&mut T, HeapError> {
        self.slot_mut(handle)
            .ok_or(HeapError::UseAfterFinalize { handle })?
            .payload_mut(handle, tag)
    }

    /// Marks a constructed handle as published. Stale handles are ignored.
    pub fn publish_foreign(&mut self, handle: ForeignRef) {
        if let Some(slot) = self.slot_mut(handle) {
            slot.publish();
        }
    }

    /// Early, explicit finalization (`close()`).
    pub fn release_foreign(
        &mut self,
        handle: ForeignRef,
        tag: TypeTag,
    ) -> Result<FinalizeJob, HeapError> {
        let slot = self
            .slot_mut(handle)
            .ok_or(HeapError::UseAfterFinalize { handle })?;
        if !slot.is_accessible() {
            return Err(HeapError::UseAfterFinalize { handle });
        }
        if slot.tag() != tag {
            return Err(HeapError::ForeignTypeMismatch {
                expected: tag,
                actual: slot.tag(),
            });
        }
        slot.begin_finalization(handle)
            .ok_or(HeapError::UseAfterFinalize { handle })
    }

    /// `Finalizing -> Tombstoned`; the slot becomes reusable.
    pub fn complete_finalization(&mut self, handle: ForeignRef) {
        let Some(slot) = self.slot_mut(handle) else {
            return;
        };
        if slot.state() != ForeignState::Finalizing {
            return;
        }
        slot.tombstone();
        let size = slot.size().max(1);
        self.release(size);
        self.free_foreign.push(handle.index);
    }

    /// Every handle that still owns a payload, newest first. Used on teardown.
    pub fn drain_foreign(&mut self) -> Vec<FinalizeJob> {
        let mut jobs = Vec::new();
        for idx in (0..self.foreign.len()).rev() {
            let slot = &mut self.foreign[idx];
            let handle = ForeignRef {
                index: idx as u32,
                generation: slot.generation(),
            };
            if let Some(job) = slot.begin_finalization(handle) {
                jobs.push(job);
            }
        }
        jobs
    }

    pub fn live_foreign(&self) -> usize {
        self.foreign.iter().filter(|s| s.is_accessible()).count()
    }

    pub fn live_strings(&self) -> usize {
        self.strings.live()
    }

    pub fn live_tables(&self) -> usize {
        self.tables.live()
    }

    // Tracing (Mark Phase) logic
    pub fn trace(&mut self, roots: Vec<Value>) {
        let mut worklist = roots;

        while let Some(val) = worklist.pop() {
            match val {
                Value::String(h) => {
                    self.marked_strings.insert(h);
                }
                Value::Table(h) => {
                    if self.marked_tables.insert(h) {
                        if let Some(t) = self.tables.get(h) {
                            worklist.extend(t.references());
                        }
                    }
                }
                Value::Thread(h) => {
                    if self.marked_threads.insert(h) {
                        if let Some(th) = self.threads.get(h) {
                            worklist.extend(th.stack.iter().copied().filter(Value::is_obj));
                        }
                    }
                }
                Value::Foreign(r) => {
                    if self.slot(r).is_some() {
                        self.marked_foreign.insert(r.index);
                    }
                }
                // Native functions live in the runtime's table, not here.
                Value::Function(_) => {}
                Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Float(_) => {}
            }
        }
    }

    pub fn sweep(&mut self) -> SweepReport {
        let mut report = SweepReport::default();
        let mut reclaimed = 0usize;

        // Strings
        for i in 0..self.strings.data.len() {
            let idx = i as u32;
            if !self.marked_strings.contains(&idx) {
                if let Some(s) = self.strings.data[i].take() {
                    reclaimed += s.len();
                    self.strings.free_indices.push(idx);
                    report.strings_freed += 1;
                }
            }
        }
        self.marked_strings.clear();

        // Tables
        for i in 0..self.tables.data.len() {
            let idx = i as u32;
            if !self.marked_tables.contains(&idx) {
                if let Some(t) = self.tables.data[i].take() {
                    reclaimed += t.charged;
                    self.tables.free_indices.push(idx);
                    report.tables_freed += 1;
                }
            }
        }
        self.marked_tables.clear();

        // Threads
        for i in 0..self.threads.data.len() {
            let idx = i as u32;
            if !self.marked_threads.contains(&idx) && self.threads.data[i].take().is_some() {
                reclaimed += std::mem::size_of::<ThreadState>();
                self.threads.free_indices.push(idx);
                report.threads_freed += 1;
            }
        }
        self.marked_threads.clear();

        // Foreign: unreachable live handles are queued for finalization.
        // Constructed handles have never been published and stay rooted.
        for idx in (0..self.foreign.len()).rev() {
            if self.marked_foreign.contains(&(idx as u32)) {
                continue;
            }
            let slot = &mut self.foreign[idx];
            if slot.state() != ForeignState::Live {
                continue;
            }
            let handle = ForeignRef {
                index: idx as u32,
                generation: slot.generation(),
            };
            if let Some(job) = slot.begin_finalization(handle) {
                report.finalize.push(job);
            }
        }
        self.marked_foreign.clear();

        self.release(reclaimed);
        report
    }
}
