// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Variable opcode handlers: LoadLocal, StoreLocal, LoadStatic, StoreStatic.

use crate::opcode::OpCode;
use crate::vm::{Result, RuntimeError, VM};

impl VM {
    /// Execute a variable opcode.
    pub(crate) fn execute_variables(&mut self, op: OpCode) -> Result<()> {
        match op {
            OpCode::LoadLocal(slot) => {
                let val = self.stack.local(self.frame()?, slot)?;
                self.stack.push(val);
            }
            OpCode::StoreLocal(slot) => {
                let val = self.stack.pop()?;
                let frame = self
                    .frames
                    .last()
                    .ok_or(RuntimeError::Internal("No active frame".into()))?;
                self.stack.set_local(frame, slot, val)?;
            }
            OpCode::LoadStatic(slot) => {
                let val = self
                    .frame()?
                    .unit
                    .statics
                    .read()
                    .get(slot as usize)
                    .cloned()
                    .ok_or_else(|| missing_static(slot))?;
                self.stack.push(val);
            }
            OpCode::StoreStatic(slot) => {
                let val = self.stack.pop()?;
                let frame = self.frame()?;
                let mut statics = frame.unit.statics.write();
                let target = statics
                    .get_mut(slot as usize)
                    .ok_or_else(|| missing_static(slot))?;
                *target = val;
            }
            _ => {
                return Err(RuntimeError::Internal(format!(
                    "execute_variables: unexpected opcode {:?}",
                    op
                )));
            }
        }
        Ok(())
    }
}

fn missing_static(slot: u16) -> RuntimeError {
    RuntimeError::Internal(format!("module state slot {} out of bounds", slot))
}
