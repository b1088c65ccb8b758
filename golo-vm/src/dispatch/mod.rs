// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Dynamic dispatch through inline-cached call sites.
//!
//! Generated code knows only the symbolic descriptor of each call: a name,
//! an operand count and a few flags. The first execution of a site resolves
//! a target, later ones go through the site's [`InlineCache`].
//!
//! | Site | Guarded on | Resolution |
//! |------|-----------|------------|
//! | function | nothing | [`function_call`] |
//! | method | receiver class, plus argument classes when overloaded | [`method_call`] |
//! | operator | exact operand classes | [`operator`] |
//! | closure | identity of the callee | [`closure_call`] |

pub mod augmentation;
pub mod cache;
pub mod closure_call;
pub mod function_call;
pub mod method_call;
pub mod operator;

use std::fmt;
use std::sync::Arc;

use crate::chunk::CodeUnit;
use crate::compiler::ir::OperatorKind;
use crate::runtime::NativeMethodFn;
use crate::value::{FunctionRef, Value};

pub use cache::{CacheKey, CacheStats, InlineCache};
pub use closure_call::ClosureCallSite;
pub use function_call::FunctionCallSite;
pub use method_call::MethodCallSite;
pub use operator::{OperatorCallSite, OperatorFn};

/// One call site of a chunk.
pub enum CallSite {
    Function(FunctionCallSite),
    Method(MethodCallSite),
    Operator(OperatorCallSite),
    Closure(ClosureCallSite),
}

impl CallSite {
    /// `name(...)` with `arity` arguments. Constant sites evaluate once.
    pub fn function(name: &str, arity: usize, constant: bool) -> Self {
        CallSite::Function(FunctionCallSite::new(name, arity, constant))
    }

    /// `receiver: name(...)`; `arity` counts the receiver.
    pub fn method(name: &str, arity: usize, null_safe: bool) -> Self {
        CallSite::Method(MethodCallSite::new(name, arity, null_safe))
    }

    pub fn operator(op: OperatorKind, arity: usize) -> Self {
        CallSite::Operator(OperatorCallSite::new(op, arity))
    }

    /// `callee(...)` with `arity` arguments after the callee.
    pub fn closure(arity: usize) -> Self {
        CallSite::Closure(ClosureCallSite::new(arity))
    }

    /// Number of values the site takes off the stack.
    pub fn operand_count(&self) -> usize {
        match self {
            CallSite::Function(site) => site.arity,
            CallSite::Method(site) => site.arity,
            CallSite::Operator(site) => site.arity,
            CallSite::Closure(site) => site.arity + 1,
        }
    }

    pub fn stats(&self) -> CacheStats {
        match self {
            CallSite::Function(site) => site.stats(),
            CallSite::Method(site) => site.stats(),
            CallSite::Operator(site) => site.stats(),
            CallSite::Closure(site) => site.stats(),
        }
    }
}

impl fmt::Debug for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallSite::Function(site) => write!(
                f,
                "function {}/{}{}",
                site.name,
                site.arity,
                if site.constant { " (constant)" } else { "" }
            ),
            CallSite::Method(site) => write!(
                f,
                "method {}/{}{}",
                site.name,
                site.arity,
                if site.null_safe { " (null-safe)" } else { "" }
            ),
            CallSite::Operator(site) => write!(f, "operator {}/{}", site.op.name(), site.arity),
            CallSite::Closure(site) => write!(f, "closure/{}", site.arity),
        }
    }
}

/// What a linked call site invokes.
#[derive(Clone)]
pub enum Callee {
    /// A function of a code unit, bytecode or native.
    Function { unit: Arc<CodeUnit>, index: usize },
    /// A function reference; its bound values go before the arguments.
    Reference(Arc<FunctionRef>),
    /// A built-in method; the receiver is the first argument.
    Native(NativeMethodFn),
    Operator(OperatorFn),
    /// Already computed.
    Value(Value),
}

impl fmt::Debug for Callee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callee::Function { unit, index } => write!(f, "Function({}#{})", unit.name, index),
            Callee::Reference(r) => write!(f, "Reference({:?})", r),
            Callee::Native(_) => write!(f, "Native"),
            Callee::Operator(_) => write!(f, "Operator"),
            Callee::Value(v) => write!(f, "Value({})", v),
        }
    }
}
