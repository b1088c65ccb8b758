// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Call frames for the VM.

use std::sync::Arc;

use crate::chunk::{CodeUnit, FunctionPrototype};

/// A call frame on the VM's call stack.
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// Instruction pointer (index into the prototype's code).
    pub ip: usize,

    /// Stack base: index of the first local slot. Arguments occupy the
    /// first slots.
    pub base: usize,

    /// The unit the function belongs to. Call sites resolve from here.
    pub unit: Arc<CodeUnit>,

    pub prototype: Arc<FunctionPrototype>,
}

impl CallFrame {
    pub fn new(base: usize, unit: Arc<CodeUnit>, prototype: Arc<FunctionPrototype>) -> Self {
        Self {
            ip: 0,
            base,
            unit,
            prototype,
        }
    }

    /// Stack height with every local slot allocated.
    pub fn locals_end(&self) -> usize {
        self.base + self.prototype.local_count as usize
    }
}
