use memory::Value;

use crate::error::RuntimeError;
use crate::marshal::IntoStack;

/// Growable value stack bounded by a slot limit.
#[derive(Debug)]
pub struct ValueStack {
    slots: Vec<Value>,
    limit: usize,
}

impl ValueStack {
    pub fn new(limit: usize, initial: usize) -> Self {
        Self {
            slots: Vec::with_capacity(initial.min(limit)),
            limit,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Make room for `extra` more slots without exceeding the limit.
    pub fn ensure(&mut self, extra: usize) -> Result<(), RuntimeError> {
        let wanted = self.slots.len().saturating_add(extra);
        if wanted > self.limit {
            tracing::warn!(target: "satell::stack", wanted, limit = self.limit, "stack limit reached");
            return Err(RuntimeError::ResourceExhausted {
                what: "value stack",
                limit: self.limit,
            });
        }
        self.slots
            .try_reserve(extra)
            .map_err(|_| RuntimeError::OutOfMemory)
    }

    pub fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        self.ensure(1)?;
        self.slots.push(value);
        Ok(())
    }

    #[inline]
    pub fn get(&self, pos: usize) -> Option<Value> {
        self.slots.get(pos).copied()
    }

    pub fn set(&mut self, pos: usize, value: Value) {
        if let Some(slot) = self.slots.get_mut(pos) {
            *slot = value;
        }
    }

    pub fn truncate(&mut self, len: usize) {
        self.slots.truncate(len);
    }

    /// Copy `count` values starting at `from` down to `to` (`to <= from`)
    /// and drop everything above them.
    pub fn move_down(&mut self, from: usize, count: usize, to: usize) {
        self.slots.copy_within(from..from + count, to);
        self.slots.truncate(to + count);
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.slots
    }
}

/// Index normalization and raw stack access, relative to the current frame.
impl super::Runtime {
    /// First stack slot of the current frame (0 at host level).
    #[inline]
    pub(crate) fn frame_base(&self) -> usize {
        self.frames.last().map_or(0, |f| f.base)
    }

    /// Absolute slot for a frame-relative index. Positive indices are
    /// 1-based from the frame base, negative ones count down from the top.
    /// `None` for 0 and for anything outside `[base, top)`.
    pub fn abs_index(&self, index: i32) -> Option<usize> {
        let base = self.frame_base();
        let top = self.stack.len();
        match index {
            0 => None,
            i if i > 0 => {
                let pos = base + (i as usize - 1);
                (pos < top).then_some(pos)
            }
            i => {
                let back = i.unsigned_abs() as usize;
                (back <= top - base).then(|| top - back)
            }
        }
    }

    /// Value at `index`, nil when the slot does not exist.
    pub fn value_at(&self, index: i32) -> Value {
        self.abs_index(index)
            .and_then(|pos| self.stack.get(pos))
            .unwrap_or(Value::Nil)
    }

    /// Number of values in the current frame.
    pub fn gettop(&self) -> usize {
        self.stack.len() - self.frame_base()
    }

    /// Grow with nils or shrink the current frame to exactly `n` values.
    pub fn settop(&mut self, n: usize) -> Result<(), RuntimeError> {
        let target = self.frame_base() + n;
        if target <= self.stack.len() {
            self.stack.truncate(target);
            return Ok(());
        }
        self.stack.ensure(target - self.stack.len())?;
        while self.stack.len() < target {
            self.stack.push(Value::Nil)?;
        }
        Ok(())
    }

    /// Remove `n` values from the top of the current frame.
    pub fn pop(&mut self, n: usize) {
        let keep = self.gettop().saturating_sub(n);
        self.stack.truncate(self.frame_base() + keep);
    }

    /// Push a raw value. A foreign handle becomes `Live` the first time it
    /// reaches the stack.
    pub fn push_value(&mut self, value: Value) -> Result<(), RuntimeError> {
        if let Value::Foreign(handle) = value {
            self.heap.publish_foreign(handle);
        }
        self.stack.push(value)
    }

    pub fn push<T: IntoStack>(&mut self, value: T) -> Result<(), RuntimeError> {
        value.push_to(self)
    }

    /// Remove and return the top value of the current frame.
    pub fn pop_value(&mut self) -> Value {
        if self.gettop() == 0 {
            return Value::Nil;
        }
        let top = self.value_at(-1);
        self.pop(1);
        top
    }

    /// Ensure room for `extra` more slots (`luaL_checkstack`).
    pub fn check_stack(&mut self, extra: usize) -> Result<(), RuntimeError> {
        self.stack.ensure(extra)
    }

    /// Stack contents of the current frame, bottom first.
    pub fn frame_values(&self) -> &[Value] {
        &self.stack.as_slice()[self.frame_base()..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Runtime;

    #[test]
    fn test_push_respects_limit() {
        let mut stack = ValueStack::new(2, 2);
        stack.push(Value::int(1)).unwrap();
        stack.push(Value::int(2)).unwrap();
        assert_eq!(
            stack.push(Value::int(3)),
            Err(RuntimeError::ResourceExhausted {
                what: "value stack",
                limit: 2
            })
        );
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_move_down() {
        let mut stack = ValueStack::new(16, 4);
        for i in 0..6 {
            stack.push(Value::int(i)).unwrap();
        }
        stack.move_down(4, 2, 1);
        assert_eq!(stack.as_slice(), &[Value::int(0), Value::int(4), Value::int(5)]);
    }

    #[test]
    fn test_index_normalization_at_host_level() {
        let mut rt = Runtime::new();
        rt.push(10i64).unwrap();
        rt.push(20i64).unwrap();
        rt.push(30i64).unwrap();
        assert_eq!(rt.abs_index(1), Some(0));
        assert_eq!(rt.abs_index(3), Some(2));
        assert_eq!(rt.abs_index(-1), Some(2));
        assert_eq!(rt.abs_index(-3), Some(0));
        assert_eq!(rt.abs_index(0), None);
        assert_eq!(rt.abs_index(4), None);
        assert_eq!(rt.abs_index(-4), None);
        assert_eq!(rt.value_at(9), Value::Nil);
    }

    #[test]
    fn test_settop_pads_and_truncates() {
        let mut rt = Runtime::new();
        rt.push(1i64).unwrap();
        rt.settop(3).unwrap();
        assert_eq!(rt.gettop(), 3);
        assert_eq!(rt.value_at(3), Value::Nil);
        rt.settop(1).unwrap();
        assert_eq!(rt.gettop(), 1);
        assert_eq!(rt.pop_value(), Value::int(1));
        assert_eq!(rt.pop_value(), Value::Nil);
    }
}
