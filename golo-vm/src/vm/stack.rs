// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Value stack shared by every frame of a VM.
//!
//! A frame owns the window starting at its base: arguments first, then the
//! remaining local slots (null until stored), then its operands. Local
//! accesses are relative to the base and checked against that window.

use crate::value::Value;

use super::frame::CallFrame;
use super::{Result, RuntimeError};

#[derive(Debug, Default)]
pub struct ValueStack {
    values: Vec<Value>,
}

impl ValueStack {
    pub fn new() -> Self {
        Self {
            values: Vec::with_capacity(256),
        }
    }

    /// Lay out a new frame's slots and return its base. `local_count` covers
    /// the arguments; extra arguments still get a slot each.
    pub fn enter_frame(&mut self, args: Vec<Value>, local_count: usize) -> usize {
        let base = self.values.len();
        let slots = local_count.max(args.len());
        self.values.extend(args);
        self.values.resize(base + slots, Value::Null);
        base
    }

    /// Drop a frame's slots and operands.
    pub fn leave_frame(&mut self, frame: &CallFrame) {
        self.values.truncate(frame.base);
    }

    /// Discard a frame's operands, keeping its locals. Handlers start here.
    pub fn reset_operands(&mut self, frame: &CallFrame) {
        self.values.truncate(frame.locals_end());
    }

    pub fn local(&self, frame: &CallFrame, slot: u16) -> Result<Value> {
        let index = self.local_index(frame, slot)?;
        Ok(self.values[index].clone())
    }

    pub fn set_local(&mut self, frame: &CallFrame, slot: u16, value: Value) -> Result<()> {
        let index = self.local_index(frame, slot)?;
        self.values[index] = value;
        Ok(())
    }

    fn local_index(&self, frame: &CallFrame, slot: u16) -> Result<usize> {
        let index = frame.base + slot as usize;
        if slot as usize >= frame.prototype.local_count as usize || index >= self.values.len() {
            return Err(RuntimeError::Internal(format!(
                "local slot {} outside the frame of {}",
                slot, frame.prototype.name
            )));
        }
        Ok(index)
    }

    #[inline]
    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    #[inline]
    pub fn pop(&mut self) -> Result<Value> {
        self.values.pop().ok_or(RuntimeError::StackUnderflow)
    }

    /// The value `distance` below the top (0 = top).
    #[inline]
    pub fn peek(&self, distance: usize) -> Result<Value> {
        if distance >= self.values.len() {
            return Err(RuntimeError::StackUnderflow);
        }
        Ok(self.values[self.values.len() - 1 - distance].clone())
    }

    /// Pop the top `n` values, bottom first.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>> {
        if n > self.values.len() {
            return Err(RuntimeError::StackUnderflow);
        }
        let start = self.values.len() - n;
        Ok(self.values.drain(start..).collect())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chunk::{CodeUnit, FunctionPrototype};

    fn frame(base: usize, local_count: u16) -> CallFrame {
        let mut prototype = FunctionPrototype::new("f", 1, false);
        prototype.local_count = local_count;
        CallFrame::new(base, Arc::new(CodeUnit::native("m")), Arc::new(prototype))
    }

    #[test]
    fn test_frame_window() {
        let mut stack = ValueStack::new();
        stack.push(Value::from("caller"));
        let base = stack.enter_frame(vec![Value::Integer(1)], 3);
        assert_eq!(base, 1);
        let f = frame(base, 3);
        assert_eq!(stack.len(), f.locals_end());
        assert_eq!(stack.local(&f, 0).unwrap(), Value::Integer(1));
        assert!(stack.local(&f, 2).unwrap().is_null());
        stack.set_local(&f, 2, Value::from("x")).unwrap();
        assert_eq!(stack.peek(0).unwrap(), Value::from("x"));
        assert!(stack.local(&f, 3).is_err());

        stack.push(Value::Integer(7));
        stack.push(Value::Integer(8));
        stack.reset_operands(&f);
        assert_eq!(stack.len(), 4);
        stack.leave_frame(&f);
        assert_eq!(stack.pop().unwrap(), Value::from("caller"));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_pop_n_keeps_order() {
        let mut stack = ValueStack::new();
        for n in 1..=4 {
            stack.push(Value::Integer(n));
        }
        let top = stack.pop_n(2).unwrap();
        assert_eq!(top, vec![Value::Integer(3), Value::Integer(4)]);
        assert_eq!(stack.len(), 2);
        assert!(matches!(stack.pop_n(3), Err(RuntimeError::StackUnderflow)));
    }
}
