// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Bytecode emission trait for the generator.
//!
//! Control-flow shapes shared by statements and expressions are written once
//! against this trait.

use crate::opcode::OpCode;
use crate::value::Value;

use super::ir::{Block, Expr};
use super::types::Result;

/// Trait for types that can emit bytecode.
pub trait BytecodeEmitter {
    /// Emit an opcode.
    fn emit(&mut self, op: OpCode);

    /// Emit a constant load.
    fn emit_constant(&mut self, value: Value) -> Result<()>;

    /// Emit a jump instruction and return its offset for patching.
    fn emit_jump(&mut self, op: OpCode) -> usize;

    /// Patch a forward jump at the given offset to land here.
    fn patch_jump(&mut self, offset: usize) -> Result<()>;

    /// Compile an expression, leaving its value on the stack.
    fn compile_expr(&mut self, expr: &Expr) -> Result<()>;

    /// Compile a block, leaving the stack as it was.
    fn compile_block(&mut self, block: &Block) -> Result<()>;
}

/// Control flow compilation using the BytecodeEmitter trait.
pub mod control {
    use super::*;

    /// `if cond { then } else { otherwise }` as a statement.
    pub fn compile_if<E: BytecodeEmitter>(
        emitter: &mut E,
        condition: &Expr,
        then: &Block,
        otherwise: Option<&dyn Fn(&mut E) -> Result<()>>,
    ) -> Result<()> {
        emitter.compile_expr(condition)?;
        let else_jump = emitter.emit_jump(OpCode::PopJumpIfFalse(0));

        emitter.compile_block(then)?;

        match otherwise {
            // A returning branch never falls through to the end.
            Some(compile_else) if then.returns() => {
                emitter.patch_jump(else_jump)?;
                compile_else(emitter)
            }
            Some(compile_else) => {
                let end_jump = emitter.emit_jump(OpCode::Jump(0));
                emitter.patch_jump(else_jump)?;
                compile_else(emitter)?;
                emitter.patch_jump(end_jump)
            }
            None => emitter.patch_jump(else_jump),
        }
    }

    /// `a and b` with short-circuit evaluation.
    pub fn compile_and<E: BytecodeEmitter>(emitter: &mut E, left: &Expr, right: &Expr) -> Result<()> {
        emitter.compile_expr(left)?;
        emitter.emit(OpCode::Dup);
        let end_jump = emitter.emit_jump(OpCode::JumpIfFalse(0));
        emitter.emit(OpCode::Pop);
        emitter.compile_expr(right)?;
        emitter.patch_jump(end_jump)
    }

    /// `a or b` with short-circuit evaluation.
    pub fn compile_or<E: BytecodeEmitter>(emitter: &mut E, left: &Expr, right: &Expr) -> Result<()> {
        emitter.compile_expr(left)?;
        emitter.emit(OpCode::Dup);
        let end_jump = emitter.emit_jump(OpCode::JumpIfTrue(0));
        emitter.emit(OpCode::Pop);
        emitter.compile_expr(right)?;
        emitter.patch_jump(end_jump)
    }
}
