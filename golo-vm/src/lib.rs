// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Compiler back-end, bytecode virtual machine and inline-caching dispatch
//! runtime for Golo.
//!
//! Source is parsed by `golo-parser`, lowered to an IR, checked, and compiled
//! to code units. Every call in the generated code goes through a call site
//! that resolves its target on first use and caches it.

pub mod chunk;
pub mod compiler;
pub mod dispatch;
pub mod loader;
pub mod opcode;
pub mod runtime;
pub mod utils;
pub mod value;
pub mod vm;

pub use chunk::{Chunk, CodeUnit, FunctionPrototype, LineInfo, UnitFunction};
pub use compiler::{CompileError, CompilerOptions, compile};
pub use loader::{LoadError, LoadedModule, Loader};
pub use opcode::OpCode;
pub use runtime::{Runtime, RuntimeOptions};
pub use value::{TypeKey, Value};
pub use vm::{RuntimeError, VM};
