// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Opcode handlers, organised by category.

pub mod collections;
pub mod control;
pub mod exceptions;
pub mod invoke;
pub mod variables;
