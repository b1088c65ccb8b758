// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Closure call sites: `f(...)` where `f` is a value.
//!
//! The arity check runs once per function reference; the site then guards
//! on the identity of the reference.

use std::sync::{Arc, Weak};

use crate::runtime::Runtime;
use crate::utils::check_arity;
use crate::value::{FunctionRef, Value};
use crate::vm::{Result, RuntimeError};

use super::{CacheKey, CacheStats, Callee, InlineCache};

/// Identity of the called function reference.
pub struct CalleeIdentity(Weak<FunctionRef>);

impl CacheKey for CalleeIdentity {
    type Slot = ();

    fn matches(&self, operands: &[Value]) -> bool {
        match operands.first() {
            Some(Value::Function(f)) => std::ptr::eq(Arc::as_ptr(f), self.0.as_ptr()),
            _ => false,
        }
    }

    fn slot(&self) -> Option<()> {
        None
    }

    fn slot_of(_: &[Value]) -> Option<()> {
        None
    }
}

pub struct ClosureCallSite {
    /// Arguments after the callee.
    pub arity: usize,
    cache: InlineCache<CalleeIdentity, ()>,
}

impl ClosureCallSite {
    pub fn new(arity: usize) -> Self {
        ClosureCallSite {
            arity,
            cache: InlineCache::new(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The reference to call; `operands` holds the callee, then the
    /// arguments.
    pub fn link(&self, runtime: &Runtime, operands: &[Value]) -> Result<Callee> {
        let reference = match operands.first() {
            Some(Value::Function(f)) => f,
            Some(other) => return Err(RuntimeError::NotCallable(other.type_name())),
            None => {
                return Err(RuntimeError::Internal(
                    "closure call without a callee".into(),
                ));
            }
        };
        if self.cache.lookup(operands, |_| Some(())).is_some() {
            return Ok(Callee::Reference(Arc::clone(reference)));
        }

        check_arity(self.arity, reference.arity(), reference.is_varargs())?;
        log::debug!("linked closure call to {:?}", reference);
        self.cache.relink(
            CalleeIdentity(Arc::downgrade(reference)),
            (),
            runtime.options().megamorphic_threshold,
        );
        Ok(Callee::Reference(Arc::clone(reference)))
    }
}
