// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Throw and exception unwinding.
//!
//! An error unwinds the frames of the current run. Each frame's handler
//! table is searched, innermost entry first, for a range covering the
//! faulting instruction. The handler starts with the frame's locals intact
//! and the exception value on top of them.

use crate::vm::{Result, RuntimeError, VM};

impl VM {
    /// Pop the thrown value and turn it into the error to unwind with.
    pub(crate) fn execute_throw(&mut self) -> Result<RuntimeError> {
        let value = self.stack.pop()?;
        Ok(RuntimeError::from_thrown(value))
    }

    /// Transfer control to the nearest handler for `err`, or fail once the
    /// frames above `entry_depth` are exhausted.
    pub(crate) fn unwind(&mut self, err: RuntimeError, entry_depth: usize) -> Result<()> {
        while self.frames.len() > entry_depth {
            let frame = self
                .frames
                .last()
                .ok_or(RuntimeError::Internal("No active frame".into()))?;
            let faulting = frame.ip.saturating_sub(1);
            let handler = frame
                .prototype
                .chunk
                .handlers
                .iter()
                .find(|entry| entry.covers(faulting))
                .map(|entry| entry.handler);

            if let Some(handler) = handler {
                log::trace!(
                    "{} caught in {} at {}",
                    err.kind(),
                    frame.prototype.name,
                    handler
                );
                self.stack.reset_operands(frame);
                self.frame_mut()?.ip = handler;
                self.stack.push(err.into_value());
                return Ok(());
            }

            if let Some(frame) = self.frames.pop() {
                self.stack.leave_frame(&frame);
            }
        }
        Err(err)
    }
}
