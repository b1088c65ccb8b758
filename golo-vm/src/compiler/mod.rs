// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Compiler: transforms a Golo parse tree into code units.
//!
//! The compiler runs in five passes:
//! 1. Lowering: parse tree to IR, with reference tables per block
//! 2. Closure capture: captured names become synthetic parameters
//! 3. Slot assignment and verification: local slots, batched diagnostics
//! 4. Code generation: IR to bytecode, one call site per invocation
//! 5. Auxiliary units for structs and unions

pub mod capture;
pub mod codegen;
pub mod diagnostics;
pub mod emit;
pub mod ir;
pub mod lower;
pub mod slots;
pub mod types;
pub mod units;

use golo_parser::{CompilationUnit, Parser};
use thiserror::Error;

pub use codegen::{CompiledModule, generate, resolve_class};
pub use diagnostics::{CompilationError, Problem, ProblemCollector, ProblemKind};
pub use lower::MODULE_INIT;
pub use types::CodegenError;

/// Compiler settings.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Name used in diagnostics.
    pub source_name: String,
    /// Keep source positions for line info in the generated code.
    pub keep_positions: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            source_name: "<source>".to_string(),
            keep_positions: true,
        }
    }
}

impl CompilerOptions {
    pub fn named(source_name: impl Into<String>) -> Self {
        CompilerOptions {
            source_name: source_name.into(),
            ..CompilerOptions::default()
        }
    }
}

/// Why a compilation failed.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Problems in the user's program.
    #[error(transparent)]
    Compilation(#[from] CompilationError),

    /// An internal invariant broken during code generation.
    #[error(transparent)]
    Codegen(#[from] CodegenError),
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// Parse and compile Golo source.
pub fn compile(source: &str, options: &CompilerOptions) -> Result<CompiledModule> {
    let unit = Parser::parse_str(source)
        .map_err(|e| CompilationError::from_parse_error(&options.source_name, &e))?;
    compile_unit(&unit, options)
}

/// Compile an already parsed unit.
pub fn compile_unit(unit: &CompilationUnit, options: &CompilerOptions) -> Result<CompiledModule> {
    let mut problems = ProblemCollector::new();
    let mut module = match lower::lower(unit, &mut problems) {
        Ok(module) => module,
        Err(fatal) => {
            let mut error = match problems.finish(&options.source_name) {
                Ok(()) => CompilationError {
                    source_name: options.source_name.clone(),
                    problems: Vec::new(),
                },
                Err(error) => error,
            };
            error.problems.push(fatal);
            return Err(error.into());
        }
    };

    capture::run(&mut module);
    slots::run(&mut module, &mut problems);
    problems.finish(&options.source_name)?;
    log::debug!("module {} verified", module.name);

    if !options.keep_positions {
        module.positions.clear();
    }
    Ok(generate(&module)?)
}
