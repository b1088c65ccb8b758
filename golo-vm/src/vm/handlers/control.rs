// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Control flow opcode handlers: jumps and Return.

use crate::opcode::OpCode;
use crate::utils::as_condition;
use crate::value::Value;
use crate::vm::{Result, RuntimeError, VM};

impl VM {
    /// Execute a control flow opcode.
    pub(crate) fn execute_control(&mut self, op: OpCode, entry_depth: usize) -> Result<ControlFlow> {
        match op {
            OpCode::Jump(offset) => {
                self.jump(offset)?;
            }
            OpCode::JumpIfFalse(offset) => {
                if !as_condition(&self.stack.peek(0)?)? {
                    self.jump(offset)?;
                }
            }
            OpCode::JumpIfTrue(offset) => {
                if as_condition(&self.stack.peek(0)?)? {
                    self.jump(offset)?;
                }
            }
            OpCode::PopJumpIfFalse(offset) => {
                if !as_condition(&self.stack.pop()?)? {
                    self.jump(offset)?;
                }
            }
            OpCode::PopJumpIfTrue(offset) => {
                if as_condition(&self.stack.pop()?)? {
                    self.jump(offset)?;
                }
            }
            OpCode::Return => {
                let result = self.stack.pop()?;
                let frame = self
                    .frames
                    .pop()
                    .ok_or(RuntimeError::Internal("Return without a frame".into()))?;

                // Drop the frame's arguments, locals and temporaries.
                self.stack.leave_frame(&frame);
                if self.frames.len() <= entry_depth {
                    return Ok(ControlFlow::Return(result));
                }
                self.stack.push(result);
            }
            _ => {
                return Err(RuntimeError::Internal(format!(
                    "execute_control: unexpected opcode {:?}",
                    op
                )));
            }
        }
        Ok(ControlFlow::Continue)
    }
}

/// Control flow result from executing an opcode.
pub enum ControlFlow {
    /// Continue execution.
    Continue,
    /// The entered frame returned with the given value.
    Return(Value),
}
